use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::trace;

/// Queue store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// In-process store, lost on restart
    #[default]
    Memory,

    /// SQLite database file at `queue.path`
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,

    /// Database file, used by the sqlite backend
    #[serde(default = "default_sqlite_path")]
    pub path: PathBuf,

    /// Key namespace for jobs and the pending list
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            path: default_sqlite_path(),
            prefix: default_prefix(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./fleet-queue.db")
}

fn default_prefix() -> String {
    String::from("fleet")
}

/// An agent registered at start-up
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub hostname: String,
    #[serde(default = "crate::util::get_default_agent_port")]
    pub port: u16,
    pub token: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,

    /// Polling interval in seconds, falls back to `monitoring.default_interval`
    pub interval: Option<u64>,

    /// Metric name to alert threshold
    #[serde(default)]
    pub thresholds: HashMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_interval")]
    pub default_interval: u64,
    #[serde(default = "default_collector_timeout")]
    pub collector_timeout: u64,

    /// Start polling every configured agent on start-up
    #[serde(default = "default_autostart")]
    pub autostart: bool,
}

impl MonitoringConfig {
    pub fn interval_for(&self, agent: &AgentConfig) -> Duration {
        Duration::from_secs(agent.interval.unwrap_or(self.default_interval))
    }

    pub fn collector_timeout(&self) -> Duration {
        Duration::from_secs(self.collector_timeout)
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            default_interval: default_interval(),
            collector_timeout: default_collector_timeout(),
            autostart: default_autostart(),
        }
    }
}

fn default_interval() -> u64 {
    15
}

fn default_collector_timeout() -> u64 {
    30
}

fn default_autostart() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct DispatchConfig {
    /// Cap on concurrent fan-out submissions; unbounded when absent
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifierConfig {
    Discord(Discord),
    Slack(Webhook),
    Webhook(Webhook),
    Email(Email),
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Email {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub notifiers: Vec<NotifierConfig>,
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file {path}"))?;
    parse_config(&file_content)
        .inspect(|config| trace!("loaded config: {config:?}"))
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let mut config: Config =
        serde_json::from_str(content).context("Invalid configuration file provided!")?;

    if let Some(prefix) = crate::util::get_queue_prefix() {
        config.queue.prefix = prefix;
    }

    Ok(config)
}
