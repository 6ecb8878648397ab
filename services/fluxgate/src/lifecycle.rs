//! Instance lifecycle
//!
//! `Uninitialized -> Ready -> Reconfiguring -> Ready ... -> Destroyed`
//!
//! The instance owns the active pipeline behind an `ArcSwapOption`. Actions
//! load whatever pipeline is current; reconfiguration builds the replacement
//! first, swaps it in, and only then retires the old one.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use fluxgate_proto::{LineEncoder, SystemTimeProvider, TimeProvider};
use fluxgate_writer::{Dispatcher, InfluxClient, LineSink, MemorySink, WriteError};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::actions::{Action, ActionOutcome};
use crate::config::{Config, InfluxConfig};
use crate::error::{ActionError, LifecycleError};
use crate::pipeline::Pipeline;
use crate::status::{InstanceStatus, StatusCell};
use crate::variables::VariableResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Ready,
    Reconfiguring,
    Destroyed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Ready => "ready",
            LifecycleState::Reconfiguring => "reconfiguring",
            LifecycleState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Builds the sink for a connection config
pub trait Connector: Send + Sync + 'static {
    type Sink: LineSink;

    fn connect(&self, config: &InfluxConfig) -> Result<Arc<Self::Sink>, WriteError>;
}

/// InfluxDB 2.x over HTTP
#[derive(Debug, Clone, Copy, Default)]
pub struct InfluxConnector;

impl Connector for InfluxConnector {
    type Sink = InfluxClient;

    fn connect(&self, config: &InfluxConfig) -> Result<Arc<InfluxClient>, WriteError> {
        let client = InfluxClient::new(&config.url, &config.org, &config.bucket, &config.token)?;
        Ok(Arc::new(client))
    }
}

/// Hands out one shared in-memory sink regardless of config
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    sink: Arc<MemorySink>,
}

impl MemoryConnector {
    pub fn new(sink: Arc<MemorySink>) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &Arc<MemorySink> {
        &self.sink
    }
}

impl Connector for MemoryConnector {
    type Sink = MemorySink;

    fn connect(&self, _config: &InfluxConfig) -> Result<Arc<MemorySink>, WriteError> {
        Ok(self.sink.clone())
    }
}

struct Active<S> {
    pipeline: Arc<Pipeline<S>>,
    shutdown: Arc<Notify>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

pub struct Instance<C: Connector> {
    connector: C,
    resolver: Arc<dyn VariableResolver>,
    clock: Arc<dyn TimeProvider>,
    state: RwLock<LifecycleState>,
    status: Arc<StatusCell>,
    active: ArcSwapOption<Active<C::Sink>>,
    /// Serializes init / reconfigure / destroy
    transition: tokio::sync::Mutex<()>,
}

impl<C: Connector> Instance<C> {
    pub fn new(connector: C, resolver: Arc<dyn VariableResolver>) -> Self {
        Self {
            connector,
            resolver,
            clock: Arc::new(SystemTimeProvider),
            state: RwLock::new(LifecycleState::Uninitialized),
            status: Arc::new(StatusCell::new()),
            active: ArcSwapOption::empty(),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the encoder clock (tests)
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    pub fn status(&self) -> InstanceStatus {
        self.status.get()
    }

    /// Currently active pipeline, if any
    pub fn pipeline(&self) -> Option<Arc<Pipeline<C::Sink>>> {
        self.active.load_full().map(|active| active.pipeline.clone())
    }

    /// Build the first pipeline and start a health check
    ///
    /// The health check runs in the background and only updates the status;
    /// writes are accepted and buffered as soon as this returns.
    pub async fn init(&self, config: &Config) -> Result<(), LifecycleError> {
        let _transition = self.transition.lock().await;
        self.expect_state("init", LifecycleState::Uninitialized)?;

        let active = self.start(config)?;
        self.active.store(Some(Arc::new(active)));
        self.set_state(LifecycleState::Ready);

        info!(
            url = %config.influxdb.url,
            org = %config.influxdb.org,
            bucket = %config.influxdb.bucket,
            "InfluxDB instance initialized"
        );
        Ok(())
    }

    /// Swap in a pipeline for new settings
    ///
    /// If the new settings are rejected the old pipeline stays active.
    pub async fn config_updated(&self, config: &Config) -> Result<(), LifecycleError> {
        let _transition = self.transition.lock().await;
        self.expect_state("reconfigure", LifecycleState::Ready)?;
        self.set_state(LifecycleState::Reconfiguring);

        let active = match self.start(config) {
            Ok(active) => active,
            Err(e) => {
                warn!("Reconfiguration rejected, keeping current connection: {}", e);
                self.set_state(LifecycleState::Ready);
                return Err(e);
            },
        };

        let previous = self.active.swap(Some(Arc::new(active)));
        self.set_state(LifecycleState::Ready);
        info!(url = %config.influxdb.url, "InfluxDB instance reconfigured");

        if let Some(previous) = previous {
            self.retire(previous).await;
        }
        Ok(())
    }

    /// Stop the flush task after a final flush
    ///
    /// Calling it again is a no-op.
    pub async fn destroy(&self) -> Result<(), LifecycleError> {
        let _transition = self.transition.lock().await;
        if self.state() == LifecycleState::Destroyed {
            return Ok(());
        }

        self.set_state(LifecycleState::Destroyed);
        if let Some(previous) = self.active.swap(None) {
            self.retire(previous).await;
        }
        info!("InfluxDB instance destroyed");
        Ok(())
    }

    /// Wait for the health check of the active pipeline to finish
    ///
    /// Returns at once if there is no pipeline or the check already ran.
    pub async fn health_checked(&self) {
        let Some(active) = self.active.load_full() else {
            return;
        };
        let health_task = active.health_task.lock().take();
        if let Some(health_task) = health_task {
            if let Err(e) = health_task.await {
                warn!("Health check ended abnormally: {}", e);
            }
        }
    }

    /// Execute one action against the active pipeline
    ///
    /// Failures are logged and reflected in the status; they never touch
    /// lines buffered by other invocations.
    pub async fn handle_action(&self, action: &Action) -> Result<ActionOutcome, ActionError> {
        let Some(active) = self.active.load_full() else {
            return Err(ActionError::NotReady(self.state()));
        };

        let result = active.pipeline.execute(action).await;
        match (&result, action) {
            (Ok(ActionOutcome::Flushed(lines)), _) => self.status.record_flush(&Ok(*lines)),
            (Ok(ActionOutcome::Buffered), _) => {},
            (Err(e), Action::FlushBuffer) => {
                error!("Error flushing InfluxDB buffer: {}", e);
                self.status.set(InstanceStatus::UnknownError(e.to_string()));
            },
            (Err(e), _) => {
                error!(action = action.name(), "Error sending to Influx: {}", e);
                self.status.set(InstanceStatus::UnknownError(e.to_string()));
            },
        }
        result
    }

    fn expect_state(
        &self,
        action: &'static str,
        expected: LifecycleState,
    ) -> Result<(), LifecycleError> {
        let state = self.state();
        if state == expected {
            Ok(())
        } else {
            Err(LifecycleError::InvalidState { action, state })
        }
    }

    fn set_state(&self, state: LifecycleState) {
        let mut current = self.state.write();
        debug!("Instance state: {} -> {}", *current, state);
        *current = state;
    }

    fn start(&self, config: &Config) -> Result<Active<C::Sink>, LifecycleError> {
        config
            .validate()
            .map_err(|e| LifecycleError::Config(e.to_string()))?;

        let sink = self.connector.connect(&config.influxdb)?;
        let dispatcher = Arc::new(Dispatcher::new(sink, config.writer.clone()));
        let encoder = LineEncoder::new(self.clock.clone());
        let pipeline = Arc::new(Pipeline::new(
            dispatcher.clone(),
            encoder,
            self.resolver.clone(),
        ));

        let health_task = tokio::spawn(check_health(
            dispatcher.sink().clone(),
            self.status.clone(),
        ));

        let shutdown = Arc::new(Notify::new());
        let status = self.status.clone();
        let loop_shutdown = shutdown.clone();
        let flush_task = tokio::spawn(async move {
            dispatcher
                .flush_loop_with_shutdown(loop_shutdown, move |result| status.record_flush(result))
                .await;
        });

        Ok(Active {
            pipeline,
            shutdown,
            flush_task: Mutex::new(Some(flush_task)),
            health_task: Mutex::new(Some(health_task)),
        })
    }

    async fn retire(&self, active: Arc<Active<C::Sink>>) {
        // A late result for the old sink must not overwrite the new status
        if let Some(health_task) = active.health_task.lock().take() {
            health_task.abort();
        }
        active.shutdown.notify_one();

        let flush_task = active.flush_task.lock().take();
        if let Some(flush_task) = flush_task {
            if let Err(e) = flush_task.await {
                warn!("Flush task ended abnormally: {}", e);
            }
        }

        let leftover = active.pipeline.dispatcher().take_pending();
        if !leftover.is_empty() {
            warn!(
                lines = leftover.len(),
                "Discarding InfluxDB lines that could not be flushed"
            );
        }
    }
}

async fn check_health<S: LineSink>(sink: Arc<S>, status: Arc<StatusCell>) {
    match sink.health().await {
        Ok(()) => {
            info!("InfluxDB is healthy");
            status.set(InstanceStatus::Ok);
        },
        Err(e) => {
            warn!("InfluxDB is not healthy: {}", e);
            status.set(InstanceStatus::ConnectionFailure(e.to_string()));
        },
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::variables::VariableMap;
    use std::time::Duration;
    use fluxgate_proto::FixedTimeProvider;
    use tracing_test::traced_test;

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.influxdb.token = "token".to_string();
        config.influxdb.org = "acme".to_string();
        config.influxdb.bucket = "telemetry".to_string();
        config
    }

    fn create_test_instance() -> (Arc<MemorySink>, Instance<MemoryConnector>) {
        let sink = Arc::new(MemorySink::new());
        let instance = Instance::new(
            MemoryConnector::new(sink.clone()),
            Arc::new(VariableMap::new()),
        )
        .with_clock(Arc::new(FixedTimeProvider::new(1_700_000_000_000)));
        (sink, instance)
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let (_sink, instance) = create_test_instance();
        assert_eq!(instance.state(), LifecycleState::Uninitialized);
        assert!(instance.pipeline().is_none());

        instance.init(&create_test_config()).await.unwrap();
        assert_eq!(instance.state(), LifecycleState::Ready);
        assert!(instance.pipeline().is_some());

        instance.config_updated(&create_test_config()).await.unwrap();
        assert_eq!(instance.state(), LifecycleState::Ready);

        instance.destroy().await.unwrap();
        assert_eq!(instance.state(), LifecycleState::Destroyed);
        assert!(instance.pipeline().is_none());

        // Idempotent
        instance.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let (_sink, instance) = create_test_instance();

        let err = instance
            .config_updated(&create_test_config())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidState {
                action: "reconfigure",
                state: LifecycleState::Uninitialized
            }
        ));

        instance.init(&create_test_config()).await.unwrap();
        assert!(instance.init(&create_test_config()).await.is_err());

        instance.destroy().await.unwrap();
        let err = instance.init(&create_test_config()).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot init while destroyed");
    }

    #[tokio::test]
    async fn test_init_rejects_invalid_config() {
        let (_sink, instance) = create_test_instance();

        let err = instance.init(&Config::default()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Config(_)));
        assert_eq!(instance.state(), LifecycleState::Uninitialized);
    }

    #[tokio::test]
    async fn test_rejected_reconfiguration_keeps_pipeline() {
        let (_sink, instance) = create_test_instance();
        instance.init(&create_test_config()).await.unwrap();
        let before = instance.pipeline().unwrap();

        let mut bad = create_test_config();
        bad.influxdb.token.clear();
        assert!(instance.config_updated(&bad).await.is_err());

        assert_eq!(instance.state(), LifecycleState::Ready);
        assert!(Arc::ptr_eq(&before, &instance.pipeline().unwrap()));
    }

    #[tokio::test]
    async fn test_action_before_init_is_not_ready() {
        let (_sink, instance) = create_test_instance();

        let err = instance.handle_action(&Action::FlushBuffer).await.unwrap_err();
        assert_eq!(err, ActionError::NotReady(LifecycleState::Uninitialized));
    }

    #[tokio::test]
    async fn test_health_check_sets_status() {
        let (sink, instance) = create_test_instance();
        assert_eq!(instance.status(), InstanceStatus::Connecting);

        instance.init(&create_test_config()).await.unwrap();
        instance.health_checked().await;
        assert_eq!(instance.status(), InstanceStatus::Ok);

        sink.set_healthy(false);
        instance.config_updated(&create_test_config()).await.unwrap();
        instance.health_checked().await;
        assert!(matches!(
            instance.status(),
            InstanceStatus::ConnectionFailure(_)
        ));
    }

    /// Sink whose health check waits until released
    struct SlowHealthSink {
        inner: MemorySink,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl LineSink for SlowHealthSink {
        async fn write_lines(&self, lines: &[String]) -> fluxgate_writer::Result<()> {
            self.inner.write_lines(lines).await
        }

        async fn health(&self) -> fluxgate_writer::Result<()> {
            self.release.notified().await;
            Ok(())
        }
    }

    struct SlowHealthConnector {
        sink: Arc<SlowHealthSink>,
    }

    impl Connector for SlowHealthConnector {
        type Sink = SlowHealthSink;

        fn connect(&self, _config: &InfluxConfig) -> Result<Arc<SlowHealthSink>, WriteError> {
            Ok(self.sink.clone())
        }
    }

    #[tokio::test]
    async fn test_slow_health_check_does_not_block_writes() {
        let sink = Arc::new(SlowHealthSink {
            inner: MemorySink::new(),
            release: Notify::new(),
        });
        let instance = Instance::new(
            SlowHealthConnector { sink: sink.clone() },
            Arc::new(VariableMap::new()),
        )
        .with_clock(Arc::new(FixedTimeProvider::new(1_700_000_000_000)));

        tokio::time::timeout(Duration::from_secs(1), instance.init(&create_test_config()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(instance.status(), InstanceStatus::Connecting);

        let action: Action =
            serde_json::from_str(r#"{"action":"write_float_point","value":"1"}"#).unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(1), instance.handle_action(&action))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Buffered);

        sink.release.notify_one();
        instance.health_checked().await;
        assert_eq!(instance.status(), InstanceStatus::Ok);
    }

    #[tokio::test]
    async fn test_reconfigure_abandons_pending_health_check() {
        let sink = Arc::new(SlowHealthSink {
            inner: MemorySink::new(),
            release: Notify::new(),
        });
        let instance = Instance::new(
            SlowHealthConnector { sink: sink.clone() },
            Arc::new(VariableMap::new()),
        );
        instance.init(&create_test_config()).await.unwrap();

        tokio::time::timeout(
            Duration::from_secs(1),
            instance.config_updated(&create_test_config()),
        )
        .await
        .unwrap()
        .unwrap();

        // Only the new pipeline's check is still waiting
        sink.release.notify_one();
        instance.health_checked().await;
        assert_eq!(instance.status(), InstanceStatus::Ok);
        assert_eq!(instance.state(), LifecycleState::Ready);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_write_is_logged() {
        let (_sink, instance) = create_test_instance();
        instance.init(&create_test_config()).await.unwrap();
        instance.health_checked().await;

        let action: Action =
            serde_json::from_str(r#"{"action":"write_float_point","value":"abc"}"#).unwrap();
        assert!(instance.handle_action(&action).await.is_err());

        assert!(logs_contain("Error sending to Influx"));
        assert!(matches!(instance.status(), InstanceStatus::UnknownError(_)));
    }
}
