//! Transport to the agent's pipeline-stats intake.

use std::io::Write as _;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::container;
use crate::error::GenericError;

/// Path of the pipeline-stats intake on the agent.
const PIPELINE_STATS_PATH: &str = "/v0.1/pipeline_stats";

/// Request timeout for intake calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers encoded stats payloads to a collector.
///
/// Implementations own their timeout and retry policy; the aggregator treats any error as a
/// counted, non-retried flush failure.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Delivers one MessagePack-encoded stats payload.
    async fn send_pipeline_stats(&self, payload: Vec<u8>) -> Result<(), GenericError>;
}

/// HTTP transport POSTing gzip-compressed MessagePack to the Datadog agent.
pub struct AgentTransport {
    client: reqwest::Client,
    endpoint: String,
    container_id: Option<String>,
}

impl AgentTransport {
    /// Creates a transport for the agent named in the configuration.
    pub fn new(config: &Config) -> Result<Self, GenericError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!(
                "http://{}:{}{}",
                config.agent_host, config.agent_port, PIPELINE_STATS_PATH
            ),
            container_id: container::container_id().map(str::to_string),
        })
    }

    /// Returns the full intake URL this transport posts to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Body of the agent's intake acknowledgement.
#[derive(Deserialize)]
struct AckResponse {
    #[serde(default)]
    acknowledged: bool,
}

#[async_trait]
impl Transport for AgentTransport {
    async fn send_pipeline_stats(&self, payload: Vec<u8>) -> Result<(), GenericError> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(payload.len() / 2), Compression::default());
        encoder.write_all(&payload).context("failed to gzip payload")?;
        let body = encoder.finish().context("failed to gzip payload")?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/msgpack")
            .header("Content-Encoding", "gzip")
            .header("Datadog-Meta-Lang", "rust")
            .header("Datadog-Meta-Tracer-Version", env!("CARGO_PKG_VERSION"))
            .body(body);
        if let Some(container_id) = &self.container_id {
            request = request.header("Datadog-Container-ID", container_id.as_str());
        }

        let response = request.send().await.context("failed to reach the agent")?;
        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(anyhow::anyhow!("agent rejected pipeline stats with status {}", status));
        }

        // The canonical success is `202 {"acknowledged": true}`; anything else in the body is
        // diagnostic only.
        if let Ok(ack) = response.json::<AckResponse>().await {
            if !ack.acknowledged {
                debug!("Agent accepted pipeline stats without acknowledging them.");
            }
        }

        Ok(())
    }
}
