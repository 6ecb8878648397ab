//! Write buffer / dispatcher
//!
//! Collects encoded lines in memory and forwards them to a [`LineSink`] in
//! batches.
//!
//! # Behavior
//! - `enqueue`/`write_raw` return immediately and never fail
//! - a full batch (`batch_size`) wakes the background flush loop
//! - `flush` drains everything as one batch; flushes are serialized
//! - no retry layer: a transiently failed batch is put back (bounded by
//!   `max_buffer_lines`) or dropped, depending on `retain_on_failure`
//! - a batch the server rejects is always dropped so it cannot block
//!   later writes
//!
//! # Usage
//! ```ignore
//! let dispatcher = Arc::new(Dispatcher::new(Arc::new(sink), DispatcherConfig::default()));
//! let shutdown = Arc::new(Notify::new());
//! tokio::spawn({
//!     let dispatcher = dispatcher.clone();
//!     let shutdown = shutdown.clone();
//!     async move { dispatcher.flush_loop_with_shutdown(shutdown, |_| {}).await }
//! });
//!
//! dispatcher.enqueue("temp,room=lab celsius=21.5 1700000000000000000");
//! dispatcher.flush().await?;
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::error::{Result, WriteError};
use crate::sink::LineSink;

/// Dispatcher configuration
///
/// Defaults follow the InfluxDB client libraries' write options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Lines per batch before a flush is requested (default: 1000)
    pub batch_size: usize,
    /// Periodic flush interval in milliseconds (default: 60000)
    pub flush_interval_ms: u64,
    /// Upper bound on buffered lines; oldest lines are dropped beyond it (default: 32000)
    pub max_buffer_lines: usize,
    /// Keep a failed batch for the next flush instead of dropping it (default: true)
    pub retain_on_failure: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            flush_interval_ms: 60_000,
            max_buffer_lines: 32_000,
            retain_on_failure: true,
        }
    }
}

/// Statistics for monitoring dispatcher behavior
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Total lines accepted by enqueue/write_raw
    pub buffered_lines: AtomicU64,
    /// Successful flush operations
    pub flush_count: AtomicU64,
    /// Lines transmitted successfully
    pub lines_flushed: AtomicU64,
    /// Flushes requested because a batch filled up
    pub forced_flushes: AtomicU64,
    /// Failed flush operations
    pub flush_errors: AtomicU64,
    /// Lines discarded after a failure or buffer overflow
    pub dropped_lines: AtomicU64,
}

impl DispatcherStats {
    /// Get a snapshot of current stats
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            buffered_lines: self.buffered_lines.load(Ordering::Relaxed),
            flush_count: self.flush_count.load(Ordering::Relaxed),
            lines_flushed: self.lines_flushed.load(Ordering::Relaxed),
            forced_flushes: self.forced_flushes.load(Ordering::Relaxed),
            flush_errors: self.flush_errors.load(Ordering::Relaxed),
            dropped_lines: self.dropped_lines.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherStatsSnapshot {
    pub buffered_lines: u64,
    pub flush_count: u64,
    pub lines_flushed: u64,
    pub forced_flushes: u64,
    pub flush_errors: u64,
    pub dropped_lines: u64,
}

/// Buffered line dispatcher
pub struct Dispatcher<S> {
    sink: Arc<S>,
    /// Pending lines, oldest first
    pending: Mutex<VecDeque<String>>,
    /// Serializes flushes so batches leave in buffer order
    flush_lock: tokio::sync::Mutex<()>,
    /// Wakes the flush loop when a batch fills up
    flush_notify: Notify,
    config: DispatcherConfig,
    stats: DispatcherStats,
}

impl<S: LineSink> Dispatcher<S> {
    pub fn new(sink: Arc<S>, config: DispatcherConfig) -> Self {
        Self {
            sink,
            pending: Mutex::new(VecDeque::with_capacity(config.batch_size)),
            flush_lock: tokio::sync::Mutex::new(()),
            flush_notify: Notify::new(),
            config,
            stats: DispatcherStats::default(),
        }
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn stats(&self) -> &DispatcherStats {
        &self.stats
    }

    /// Number of lines waiting for the next flush
    pub fn pending_lines(&self) -> usize {
        self.pending.lock().len()
    }

    /// Buffer an encoded point (returns immediately)
    pub fn enqueue(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!("Sent to Influx: {}", line);
        self.push(line);
    }

    /// Buffer a caller-formatted line, bypassing point encoding
    pub fn write_raw(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!(raw = true, "Sent to Influx: {}", line);
        self.push(line);
    }

    fn push(&self, line: String) {
        let (len, overflow) = {
            let mut pending = self.pending.lock();
            pending.push_back(line);
            let overflow = pending.len().saturating_sub(self.config.max_buffer_lines);
            pending.drain(..overflow);
            (pending.len(), overflow)
        };

        self.stats.buffered_lines.fetch_add(1, Ordering::Relaxed);
        if overflow > 0 {
            self.record_dropped(overflow, "write buffer full, dropping oldest lines");
        }

        if len >= self.config.batch_size {
            self.stats.forced_flushes.fetch_add(1, Ordering::Relaxed);
            self.flush_notify.notify_one();
        }
    }

    /// Remove and return all pending lines without transmitting them
    pub fn take_pending(&self) -> Vec<String> {
        self.pending.lock().drain(..).collect()
    }

    /// Transmit all pending lines as one batch
    ///
    /// Returns the number of lines flushed; an empty buffer is a no-op.
    pub async fn flush(&self) -> Result<usize> {
        let _guard = self.flush_lock.lock().await;

        let lines = self.take_pending();
        if lines.is_empty() {
            return Ok(0);
        }

        let count = lines.len();
        match self.sink.write_lines(&lines).await {
            Ok(()) => {
                self.stats.flush_count.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .lines_flushed
                    .fetch_add(count as u64, Ordering::Relaxed);
                tracing::debug!(lines = count, "InfluxDB buffer flushed");
                Ok(count)
            },
            Err(e) => {
                self.stats.flush_errors.fetch_add(1, Ordering::Relaxed);
                self.restore_failed(lines, &e);
                Err(e)
            },
        }
    }

    fn restore_failed(&self, lines: Vec<String>, error: &WriteError) {
        if !error.is_retryable() {
            tracing::warn!(error = %error, "InfluxDB rejected batch");
            self.record_dropped(lines.len(), "batch rejected, dropping it");
            return;
        }
        if !self.config.retain_on_failure {
            self.record_dropped(lines.len(), "flush failed, dropping batch");
            return;
        }

        let overflow = {
            let mut pending = self.pending.lock();
            // Failed batch is older than anything enqueued during the flush
            for line in lines.into_iter().rev() {
                pending.push_front(line);
            }
            let overflow = pending.len().saturating_sub(self.config.max_buffer_lines);
            pending.drain(..overflow);
            overflow
        };

        if overflow > 0 {
            self.record_dropped(overflow, "flush failed and buffer full, dropping oldest lines");
        }
    }

    fn record_dropped(&self, count: usize, reason: &str) {
        self.stats
            .dropped_lines
            .fetch_add(count as u64, Ordering::Relaxed);
        tracing::warn!(dropped = count, "{}", reason);
    }

    /// Background flush loop with shutdown support
    ///
    /// Flushes every `flush_interval_ms` or when a batch fills up, and once
    /// more when `shutdown` is notified. `on_flush` observes every flush
    /// result that moved lines or failed.
    pub async fn flush_loop_with_shutdown<F>(&self, shutdown: Arc<Notify>, mut on_flush: F)
    where
        F: FnMut(&Result<usize>) + Send,
    {
        let interval = Duration::from_millis(self.config.flush_interval_ms.max(1));

        loop {
            tokio::select! {
                biased;  // Check shutdown first

                _ = shutdown.notified() => {
                    tracing::debug!("Dispatcher received shutdown signal");
                    let result = self.flush().await;
                    if let Err(e) = &result {
                        tracing::warn!(error = %e, "Dispatcher final flush failed");
                    }
                    on_flush(&result);
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
                _ = self.flush_notify.notified() => {}
            }

            let result = self.flush().await;
            match &result {
                Ok(0) => continue,
                Ok(_) => {},
                Err(e) => tracing::warn!(error = %e, "Dispatcher flush failed"),
            }
            on_flush(&result);
        }

        tracing::debug!("Dispatcher flush loop stopped");
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use tracing_test::traced_test;

    fn dispatcher(config: DispatcherConfig) -> (Arc<MemorySink>, Dispatcher<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (sink.clone(), Dispatcher::new(sink, config))
    }

    #[test]
    fn test_config_default() {
        let config = DispatcherConfig::default();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.flush_interval_ms, 60_000);
        assert_eq!(config.max_buffer_lines, 32_000);
        assert!(config.retain_on_failure);
    }

    #[test]
    fn test_enqueue_buffers_without_sending() {
        let (sink, dispatcher) = dispatcher(DispatcherConfig::default());

        dispatcher.enqueue("m v=1 1");
        dispatcher.write_raw("m v=2 2");

        assert_eq!(dispatcher.pending_lines(), 2);
        assert_eq!(sink.write_calls(), 0);
        assert_eq!(dispatcher.stats().snapshot().buffered_lines, 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_enqueue_emits_audit_trace() {
        let (_sink, dispatcher) = dispatcher(DispatcherConfig::default());

        dispatcher.enqueue("temp,room=lab celsius=21.5 1700000000000000000");
        dispatcher.write_raw("m,tag1=value1 field1=1234.5 1700000000000000000");

        assert!(logs_contain(
            "Sent to Influx: temp,room=lab celsius=21.5 1700000000000000000"
        ));
        assert!(logs_contain(
            "Sent to Influx: m,tag1=value1 field1=1234.5 1700000000000000000"
        ));
    }

    #[tokio::test]
    async fn test_flush_sends_one_batch_in_order() {
        let (sink, dispatcher) = dispatcher(DispatcherConfig::default());

        dispatcher.enqueue("m v=1 1");
        dispatcher.write_raw("m v=2 2");
        dispatcher.enqueue("m v=3 3");

        assert_eq!(dispatcher.flush().await.unwrap(), 3);
        assert_eq!(sink.batches(), vec![vec!["m v=1 1", "m v=2 2", "m v=3 3"]]);
        assert_eq!(dispatcher.pending_lines(), 0);

        let stats = dispatcher.stats().snapshot();
        assert_eq!(stats.flush_count, 1);
        assert_eq!(stats.lines_flushed, 3);
    }

    #[tokio::test]
    async fn test_flush_empty_is_noop() {
        let (sink, dispatcher) = dispatcher(DispatcherConfig::default());

        assert_eq!(dispatcher.flush().await.unwrap(), 0);
        assert_eq!(dispatcher.flush().await.unwrap(), 0);
        assert_eq!(sink.write_calls(), 0);
        assert_eq!(dispatcher.stats().snapshot().flush_count, 0);
    }

    #[tokio::test]
    async fn test_failed_flush_retains_batch() {
        let (sink, dispatcher) = dispatcher(DispatcherConfig::default());
        sink.set_fail_writes(true);

        dispatcher.enqueue("m v=1 1");
        dispatcher.enqueue("m v=2 2");

        let err = dispatcher.flush().await.unwrap_err();
        assert!(matches!(err, WriteError::Transport(_)));
        assert_eq!(dispatcher.pending_lines(), 2);

        // New writes queue behind the retained batch
        dispatcher.enqueue("m v=3 3");
        sink.set_fail_writes(false);

        assert_eq!(dispatcher.flush().await.unwrap(), 3);
        assert_eq!(sink.lines(), vec!["m v=1 1", "m v=2 2", "m v=3 3"]);
        assert_eq!(dispatcher.stats().snapshot().flush_errors, 1);
    }

    #[tokio::test]
    async fn test_failed_flush_drops_batch_when_not_retaining() {
        let (sink, dispatcher) = dispatcher(DispatcherConfig {
            retain_on_failure: false,
            ..DispatcherConfig::default()
        });
        sink.set_fail_writes(true);

        dispatcher.enqueue("m v=1 1");
        assert!(dispatcher.flush().await.is_err());

        assert_eq!(dispatcher.pending_lines(), 0);
        assert_eq!(dispatcher.stats().snapshot().dropped_lines, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_rejected_batch_is_dropped_not_retained() {
        let (sink, dispatcher) = dispatcher(DispatcherConfig::default());
        sink.set_reject_writes(true);

        dispatcher.enqueue("my temp,room=lab celsius=1 1");
        let err = dispatcher.flush().await.unwrap_err();
        assert!(matches!(err, WriteError::Rejected { status: 400, .. }));
        assert_eq!(dispatcher.pending_lines(), 0);
        assert!(logs_contain("InfluxDB rejected batch"));

        sink.set_reject_writes(false);
        dispatcher.enqueue("temp,room=lab celsius=2 2");
        assert_eq!(dispatcher.flush().await.unwrap(), 1);
        assert_eq!(sink.lines(), vec!["temp,room=lab celsius=2 2"]);

        let stats = dispatcher.stats().snapshot();
        assert_eq!(stats.dropped_lines, 1);
        assert_eq!(stats.flush_errors, 1);
    }

    #[test]
    fn test_buffer_bound_drops_oldest() {
        let (_sink, dispatcher) = dispatcher(DispatcherConfig {
            max_buffer_lines: 2,
            ..DispatcherConfig::default()
        });

        dispatcher.enqueue("a");
        dispatcher.enqueue("b");
        dispatcher.enqueue("c");

        assert_eq!(dispatcher.take_pending(), vec!["b", "c"]);
        assert_eq!(dispatcher.stats().snapshot().dropped_lines, 1);
    }

    #[test]
    fn test_full_batch_requests_flush() {
        let (_sink, dispatcher) = dispatcher(DispatcherConfig {
            batch_size: 2,
            ..DispatcherConfig::default()
        });

        dispatcher.enqueue("a");
        assert_eq!(dispatcher.stats().snapshot().forced_flushes, 0);
        dispatcher.enqueue("b");
        assert_eq!(dispatcher.stats().snapshot().forced_flushes, 1);
    }

    #[tokio::test]
    async fn test_flush_loop_final_flush_on_shutdown() {
        let (sink, dispatcher) = dispatcher(DispatcherConfig::default());
        let dispatcher = Arc::new(dispatcher);
        let shutdown = Arc::new(Notify::new());

        dispatcher.enqueue("m v=1 1");

        let handle = tokio::spawn({
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown.clone();
            async move { dispatcher.flush_loop_with_shutdown(shutdown, |_| {}).await }
        });

        shutdown.notify_one();
        handle.await.unwrap();

        assert_eq!(sink.lines(), vec!["m v=1 1"]);
    }

    #[tokio::test]
    async fn test_flush_loop_flushes_full_batch() {
        let (sink, dispatcher) = dispatcher(DispatcherConfig {
            batch_size: 2,
            ..DispatcherConfig::default()
        });
        let dispatcher = Arc::new(dispatcher);
        let shutdown = Arc::new(Notify::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let handle = tokio::spawn({
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown.clone();
            async move {
                dispatcher
                    .flush_loop_with_shutdown(shutdown, move |result| {
                        let _ = tx.send(result.clone());
                    })
                    .await
            }
        });

        dispatcher.enqueue("a");
        dispatcher.enqueue("b");

        let result = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Ok(2));
        assert_eq!(sink.batches(), vec![vec!["a", "b"]]);

        shutdown.notify_one();
        handle.await.unwrap();
    }
}
