//! fluxgate - controller actions to InfluxDB line protocol
//!
//! Exposes the write actions of a device-automation controller and turns
//! each invocation into a buffered InfluxDB write:
//!
//! action -> variable interpolation -> parse -> build -> encode -> dispatch
//!
//! The pipeline is usable on its own; [`lifecycle::Instance`] wraps it in
//! the host lifecycle (init / reconfigure / destroy) and health reporting.

pub mod actions;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod pipeline;
pub mod shutdown;
pub mod status;
pub mod variables;

/// Service information
pub const SERVICE_NAME: &str = "fluxgate";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use actions::{Action, ActionOutcome, BoolChoice, BooleanOptions, LineOptions, PointOptions};
pub use config::{Config, InfluxConfig};
pub use error::{ActionError, LifecycleError};
pub use lifecycle::{Connector, InfluxConnector, Instance, LifecycleState, MemoryConnector};
pub use pipeline::Pipeline;
pub use status::{InstanceStatus, StatusCell};
pub use variables::{VariableMap, VariableResolver};
