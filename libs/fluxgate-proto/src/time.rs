//! Clocks for the encoder
//!
//! The encoder reads milliseconds and scales them itself, so a clock only
//! has to answer "what millisecond is it".

use std::sync::atomic::{AtomicI64, Ordering};

pub trait TimeProvider: Send + Sync + 'static {
    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;
}

/// Wall clock (UTC)
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock
///
/// Stands still until `set` or `advance` moves it.
#[derive(Debug)]
pub struct FixedTimeProvider {
    millis: AtomicI64,
}

impl FixedTimeProvider {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::Relaxed);
    }

    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::Relaxed);
    }
}

impl TimeProvider for FixedTimeProvider {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::Relaxed)
    }
}
