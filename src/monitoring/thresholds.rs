use std::collections::HashMap;

use tokio::sync::RwLock;

/// Per-agent, per-metric alert thresholds
#[derive(Debug, Default)]
pub struct ThresholdTable {
    limits: RwLock<HashMap<String, HashMap<String, f64>>>,
}

impl ThresholdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the threshold for `metric` on `agent_id`
    pub async fn set(&self, agent_id: &str, metric: &str, threshold: f64) {
        let mut limits = self.limits.write().await;
        limits
            .entry(agent_id.to_string())
            .or_default()
            .insert(metric.to_string(), threshold);
    }

    pub async fn get(&self, agent_id: &str, metric: &str) -> Option<f64> {
        let limits = self.limits.read().await;
        limits.get(agent_id)?.get(metric).copied()
    }

    /// Snapshot of every threshold configured for `agent_id`
    pub async fn for_agent(&self, agent_id: &str) -> HashMap<String, f64> {
        let limits = self.limits.read().await;
        limits.get(agent_id).cloned().unwrap_or_default()
    }
}
