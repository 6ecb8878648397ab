//! Instance status reported to the host

use std::fmt;

use fluxgate_writer::Result as WriteResult;
use parking_lot::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InstanceStatus {
    /// No health result yet
    #[default]
    Connecting,
    Ok,
    ConnectionFailure(String),
    UnknownError(String),
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Connecting => f.write_str("connecting"),
            InstanceStatus::Ok => f.write_str("ok"),
            InstanceStatus::ConnectionFailure(msg) => write!(f, "connection_failure: {msg}"),
            InstanceStatus::UnknownError(msg) => write!(f, "unknown_error: {msg}"),
        }
    }
}

/// Shared, updatable status slot
#[derive(Debug, Default)]
pub struct StatusCell {
    inner: RwLock<InstanceStatus>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> InstanceStatus {
        self.inner.read().clone()
    }

    pub fn set(&self, status: InstanceStatus) {
        let mut current = self.inner.write();
        if *current != status {
            tracing::debug!("Instance status changed: {} -> {}", *current, status);
            *current = status;
        }
    }

    /// Fold a flush result into the status
    ///
    /// Failures become `UnknownError`; a flush that delivered lines proves
    /// the connection and restores `Ok`.
    pub fn record_flush(&self, result: &WriteResult<usize>) {
        match result {
            Ok(0) => {},
            Ok(_) => self.set(InstanceStatus::Ok),
            Err(e) => self.set(InstanceStatus::UnknownError(e.to_string())),
        }
    }
}
