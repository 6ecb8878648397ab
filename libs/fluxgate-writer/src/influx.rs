//! `InfluxDB` 2.x sink backed by the official client

use async_trait::async_trait;
use influxdb2::{Client, RequestError};

use crate::error::{Result, WriteError};
use crate::sink::LineSink;

/// `InfluxDB` 2.x client bound to one org/bucket
#[derive(Debug)]
pub struct InfluxClient {
    client: Client,
    url: String,
    org: String,
    bucket: String,
}

impl InfluxClient {
    /// Create a new client
    ///
    /// Only non-emptiness is checked; the endpoint is not contacted.
    pub fn new(url: &str, org: &str, bucket: &str, token: &str) -> Result<Self> {
        for (name, value) in [("url", url), ("org", org), ("bucket", bucket), ("token", token)] {
            if value.trim().is_empty() {
                return Err(WriteError::InvalidConfig(format!("{name} cannot be empty")));
            }
        }

        tracing::debug!(
            "Creating InfluxDB client: url={}, org={}, bucket={}",
            url,
            org,
            bucket
        );
        let client = Client::new(url, org, token);

        Ok(Self {
            client,
            url: url.to_string(),
            org: org.to_string(),
            bucket: bucket.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl LineSink for InfluxClient {
    async fn write_lines(&self, lines: &[String]) -> Result<()> {
        let body = lines.join("\n");

        tracing::debug!(
            "Writing to InfluxDB: org={}, bucket={}, lines={}, data_len={}",
            self.org,
            self.bucket,
            lines.len(),
            body.len()
        );

        self.client
            .write_line_protocol(&self.org, &self.bucket, body)
            .await
            .map_err(write_error)
    }

    async fn health(&self) -> Result<()> {
        let health = self
            .client
            .health()
            .await
            .map_err(|e| WriteError::ConnectionFailure(format!("Health check failed: {e}")))?;

        tracing::debug!("InfluxDB health check: {:?}", health);

        let ready = self
            .client
            .ready()
            .await
            .map_err(|e| WriteError::ConnectionFailure(format!("Ready check failed: {e}")))?;

        if !ready {
            return Err(WriteError::ConnectionFailure(
                "InfluxDB is not ready".to_string(),
            ));
        }

        Ok(())
    }
}

fn write_error(err: RequestError) -> WriteError {
    match err {
        RequestError::Http { status, text } => classify_status(status.as_u16(), text),
        other => WriteError::Transport(other.to_string()),
    }
}

/// 4xx other than 429 means the batch itself was refused
fn classify_status(status: u16, text: String) -> WriteError {
    if (400..500).contains(&status) && status != 429 {
        WriteError::Rejected {
            status,
            message: text,
        }
    } else {
        WriteError::Transport(format!("HTTP {status}: {text}"))
    }
}
