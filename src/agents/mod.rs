//! Managed agents and command dispatch

pub mod dispatcher;
pub mod registry;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use dispatcher::{CommandDispatcher, FanOutOutcome, Submission};
pub use registry::AgentRegistry;

/// Default timeout carried by commands that don't declare one
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Online,
    Offline,
    Degraded,
}

/// A managed remote host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub hostname: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Agent {
    /// A freshly seen, online agent
    pub fn new(id: impl Into<String>, hostname: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            hostname: hostname.into(),
            ip_address: None,
            os: None,
            architecture: None,
            version: None,
            last_heartbeat: Utc::now(),
            status: AgentStatus::Online,
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// A command to run on one or more agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCommand {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout", with = "crate::queue::duration_nanos")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_COMMAND_TIMEOUT
}

impl AgentCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
