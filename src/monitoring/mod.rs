//! Periodic telemetry collection and threshold evaluation
//!
//! Each monitored agent gets its own polling task. On every tick the task
//! collects a batch of [`Metric`]s, appends them to the agent's series and
//! raises an alert for every metric above its threshold.
//!
//! ```text
//! ticker ─► registry lookup ─► collector ─► append series ─► compare thresholds ─► AlertManager
//!   ▲
//!   └── commands (PollNow, UpdateInterval) + cancellation
//! ```

pub mod collector;
pub mod monitor;
pub mod thresholds;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::Agent;
use crate::error::Result;

pub use collector::{AgentEndpoint, HttpCollector, SystemStats};
pub use monitor::{Monitor, TickOutcome};
pub use thresholds::ThresholdTable;

pub const CPU: &str = "cpu";
pub const MEMORY: &str = "memory";
pub const DISK: &str = "disk";
pub const NETWORK_IN: &str = "network_in";
pub const NETWORK_OUT: &str = "network_out";

/// Names of the metrics every collection reports
pub const STANDARD_METRICS: [&str; 5] = [CPU, MEMORY, DISK, NETWORK_IN, NETWORK_OUT];

/// A single named, timestamped reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp,
        }
    }
}

/// Source of telemetry for registered agents
#[async_trait]
pub trait MetricsCollector: Send + Sync {
    /// Collect one batch of readings for `agent`
    async fn collect(&self, agent: &Agent) -> Result<Vec<Metric>>;
}
