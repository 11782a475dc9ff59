//! HTTP collector polling agent `/stats` endpoints
//!
//! Agents expose their system statistics as JSON:
//!
//! ```json
//! {
//!   "agent_id": "a1",
//!   "system": {
//!     "cpu_usage": 25.5,
//!     "memory_usage": 45.2,
//!     "disk_usage": 60.1,
//!     "network_in": 1024,
//!     "network_out": 512,
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   },
//!   "processes": []
//! }
//! ```
//!
//! Each poll turns the `system` block into the five standard metrics.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};

use super::{CPU, DISK, MEMORY, Metric, MetricsCollector, NETWORK_IN, NETWORK_OUT};
use crate::agents::Agent;
use crate::error::{Error, Result};

/// Port assumed for agents without an explicit endpoint
pub const DEFAULT_AGENT_PORT: u16 = 3000;

/// Header carrying the shared agent secret
pub const SECRET_HEADER: &str = "X-MONITORING-SECRET";

/// Where and how to reach one agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEndpoint {
    /// e.g. `http://10.0.0.4:3000`
    pub base_url: String,
    pub token: Option<String>,
}

impl AgentEndpoint {
    pub fn new(host: &str, port: u16, token: Option<String>) -> Self {
        Self {
            base_url: format!("http://{host}:{port}"),
            token,
        }
    }
}

/// System block of an agent stats report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub network_in: f64,
    pub network_out: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SystemStats {
    /// The five standard metrics, all stamped with the collection time `at`.
    ///
    /// The agent's own `timestamp` is not used.
    pub fn into_metrics(self, at: DateTime<Utc>) -> Vec<Metric> {
        vec![
            Metric::new(CPU, self.cpu_usage, at),
            Metric::new(MEMORY, self.memory_usage, at),
            Metric::new(DISK, self.disk_usage, at),
            Metric::new(NETWORK_IN, self.network_in, at),
            Metric::new(NETWORK_OUT, self.network_out, at),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct AgentStats {
    system: SystemStats,
}

/// Collector that fetches stats from each agent over HTTP
pub struct HttpCollector {
    /// Reused across requests
    client: reqwest::Client,
    endpoints: HashMap<String, AgentEndpoint>,
}

impl HttpCollector {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Collection(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoints: HashMap::new(),
        })
    }

    /// Route polls for `agent_id` to `endpoint`
    pub fn with_endpoint(mut self, agent_id: impl Into<String>, endpoint: AgentEndpoint) -> Self {
        self.endpoints.insert(agent_id.into(), endpoint);
        self
    }

    fn endpoint_for(&self, agent: &Agent) -> AgentEndpoint {
        self.endpoints.get(&agent.id).cloned().unwrap_or_else(|| {
            let host = agent.ip_address.as_deref().unwrap_or(&agent.hostname);
            AgentEndpoint::new(host, DEFAULT_AGENT_PORT, None)
        })
    }
}

#[async_trait]
impl MetricsCollector for HttpCollector {
    #[instrument(skip(self, agent), fields(agent_id = %agent.id))]
    async fn collect(&self, agent: &Agent) -> Result<Vec<Metric>> {
        let endpoint = self.endpoint_for(agent);
        let url = format!("{}/stats", endpoint.base_url.trim_end_matches('/'));

        trace!("requesting stats from {url}");

        let mut request = self.client.get(&url);
        if let Some(token) = &endpoint.token {
            request = request.header(SECRET_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Collection(format!("failed to reach {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Collection(format!(
                "{url} answered with HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Collection(format!("failed to read response body: {e}")))?;

        let collected_at = Utc::now();
        let stats: AgentStats = serde_json::from_str(&body)
            .map_err(|e| Error::Collection(format!("failed to parse stats JSON: {e}")))?;

        trace!(reported_at = ?stats.system.timestamp, "stats received");

        Ok(stats.system.into_metrics(collected_at))
    }
}
