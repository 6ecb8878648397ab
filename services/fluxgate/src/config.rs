//! fluxgate configuration
//!
//! Priority (lowest to highest):
//! 1. built-in defaults
//! 2. YAML file
//! 3. `FLUXGATE_` environment variables, nested with `__`
//!    (e.g. `FLUXGATE_INFLUXDB__TOKEN`, `FLUXGATE_WRITER__BATCH_SIZE`)

use std::path::Path;

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use fluxgate_writer::DispatcherConfig;
use serde::{Deserialize, Serialize};

/// InfluxDB connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            token: String::new(),
            org: String::new(),
            bucket: String::new(),
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub influxdb: InfluxConfig,
    #[serde(default)]
    pub writer: DispatcherConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            influxdb: InfluxConfig::default(),
            writer: DispatcherConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub const DEFAULT_PATH: &'static str = "config/fluxgate.yaml";
    pub const ENV_PREFIX: &'static str = "FLUXGATE_";

    /// Load configuration from a YAML file plus environment overrides
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    }

    /// Check the settings the adapter cannot work without
    ///
    /// Connection settings are only checked for non-emptiness.
    pub fn validate(&self) -> Result<()> {
        let influx = &self.influxdb;
        if influx.url.trim().is_empty() {
            bail!("InfluxDB URL cannot be empty");
        }
        if influx.token.trim().is_empty() {
            bail!("InfluxDB token cannot be empty");
        }
        if influx.org.trim().is_empty() {
            bail!("InfluxDB organization cannot be empty");
        }
        if influx.bucket.trim().is_empty() {
            bail!("InfluxDB bucket cannot be empty");
        }

        if self.writer.batch_size == 0 {
            bail!("writer.batch_size must be greater than 0");
        }
        if self.writer.flush_interval_ms == 0 {
            bail!("writer.flush_interval_ms must be greater than 0");
        }
        if self.writer.max_buffer_lines < self.writer.batch_size {
            bail!("writer.max_buffer_lines must be at least writer.batch_size");
        }

        Ok(())
    }
}
