//! Error types for the fluxgate service

use fluxgate_proto::ProtoError;
use fluxgate_writer::WriteError;
use thiserror::Error;

use crate::lifecycle::LifecycleState;

/// Failure of a single action invocation
///
/// Never affects lines already buffered by other invocations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    /// Input could not be turned into a point or line
    #[error(transparent)]
    Point(#[from] ProtoError),

    /// The sink rejected or failed a flush
    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("Instance is not ready (state: {0})")]
    NotReady(LifecycleState),
}

/// Failure of a lifecycle transition
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: LifecycleState,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Connect(#[from] WriteError),
}
