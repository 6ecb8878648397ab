//! Sink trait: the external client the dispatcher forwards to
//!
//! Implementations:
//! - `InfluxClient`: InfluxDB 2.x over HTTP(S) with bearer-token auth
//! - `MemorySink`: records batches in memory, for tests and dry runs

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Result, WriteError};

#[async_trait]
pub trait LineSink: Send + Sync + 'static {
    /// Transmit one batch of encoded lines
    async fn write_lines(&self, lines: &[String]) -> Result<()>;

    /// Connectivity/health check
    async fn health(&self) -> Result<()>;
}

/// In-memory sink
///
/// Every successful `write_lines` call is recorded as one batch.
#[derive(Debug)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<String>>>,
    write_calls: AtomicU64,
    fail_writes: AtomicBool,
    reject_writes: AtomicBool,
    healthy: AtomicBool,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            write_calls: AtomicU64::new(0),
            fail_writes: AtomicBool::new(false),
            reject_writes: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
        }
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Answer subsequent writes like a server refusing the batch (HTTP 400)
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::Relaxed);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    /// Successfully transmitted batches, in order
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().clone()
    }

    /// All successfully transmitted lines, flattened
    pub fn lines(&self) -> Vec<String> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    /// Number of transmit attempts, including failed ones
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LineSink for MemorySink {
    async fn write_lines(&self, lines: &[String]) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(WriteError::Transport("memory sink write failure".to_string()));
        }
        if self.reject_writes.load(Ordering::Relaxed) {
            return Err(WriteError::Rejected {
                status: 400,
                message: "memory sink rejected batch".to_string(),
            });
        }
        self.batches.lock().push(lines.to_vec());
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        if self.healthy.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(WriteError::ConnectionFailure(
                "memory sink marked unhealthy".to_string(),
            ))
        }
    }
}
