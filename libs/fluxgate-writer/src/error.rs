//! Error types for fluxgate-writer

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WriteError {
    /// Health/ping check failed or the endpoint is unreachable
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    /// Transient transmit failure (network error, 5xx, 429)
    #[error("Write failed: {0}")]
    Transport(String),

    /// The server refused the batch itself; resending it cannot succeed
    #[error("Write rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Client could not be constructed from the given settings
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl WriteError {
    /// Whether the same batch may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WriteError::Transport(_) | WriteError::ConnectionFailure(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WriteError>;
