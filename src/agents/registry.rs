//! In-memory agent directory

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::{Agent, AgentStatus};
use crate::error::{Error, Result};

/// Thread-safe directory of known agents
///
/// Agents are upserted by id and never removed.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the agent with the same id
    pub async fn register(&self, agent: Agent) {
        let mut agents = self.agents.write().await;
        debug!(agent_id = %agent.id, "registering agent");
        agents.insert(agent.id.clone(), agent);
    }

    pub async fn get(&self, agent_id: &str) -> Result<Agent> {
        let agents = self.agents.read().await;
        agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| Error::not_found("agent", agent_id))
    }

    /// Point-in-time copy of all registered agents
    pub async fn list(&self) -> Vec<Agent> {
        let agents = self.agents.read().await;
        agents.values().cloned().collect()
    }

    /// Record a heartbeat: refresh the timestamp and mark the agent online
    pub async fn heartbeat(&self, agent_id: &str) -> Result<Agent> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| Error::not_found("agent", agent_id))?;

        agent.last_heartbeat = Utc::now();
        agent.status = AgentStatus::Online;
        trace!(agent_id, "heartbeat");

        Ok(agent.clone())
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }
}
