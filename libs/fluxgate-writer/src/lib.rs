//! fluxgate write path
//!
//! Buffers encoded line protocol and forwards it in batches to an
//! InfluxDB-compatible sink.
//!
//! # Key Components
//!
//! - **LineSink trait**: the external client seam (transmit + health)
//! - **InfluxClient**: InfluxDB 2.x sink backed by the official client
//! - **MemorySink**: in-memory sink for tests and dry runs
//! - **Dispatcher**: write buffer with explicit and periodic flushing

pub mod dispatcher;
pub mod error;
pub mod sink;

#[cfg(feature = "influxdb")]
pub mod influx;

// Re-exports
pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherStats, DispatcherStatsSnapshot};
pub use error::{Result, WriteError};
pub use sink::{LineSink, MemorySink};

#[cfg(feature = "influxdb")]
pub use influx::InfluxClient;
