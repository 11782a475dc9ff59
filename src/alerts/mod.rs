//! Threshold alerts and their delivery
//!
//! Alerts are raised by the monitor, stored by the [`AlertManager`] and fanned
//! out to every registered [`Notifier`]. Notifiers only differ in transport:
//!
//! - [`discord::DiscordNotifier`]: Discord webhook with an embed
//! - [`webhook::SlackNotifier`]: Slack incoming webhook
//! - [`webhook::WebhookNotifier`]: generic JSON POST
//! - `email::EmailNotifier`: SMTP (feature `email`)

pub mod discord;
#[cfg(feature = "email")]
pub mod email;
pub mod manager;
pub mod notifier;
pub mod webhook;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use manager::AlertManager;
pub use notifier::{Notifier, NotifyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertStatus::Active => f.write_str("active"),
            AlertStatus::Resolved => f.write_str("resolved"),
        }
    }
}

/// A metric value that exceeded its configured threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub agent_id: String,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub status: AlertStatus,
}

impl Alert {
    /// An active alert for `metric` observed at `timestamp`
    pub fn breach(
        agent_id: &str,
        metric: &str,
        value: f64,
        threshold: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: alert_id(agent_id, metric, timestamp),
            agent_id: agent_id.to_string(),
            metric: metric.to_string(),
            value,
            threshold,
            message: format!("{metric} exceeded threshold ({value:.2} > {threshold:.2})"),
            timestamp,
            status: AlertStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

/// `{agent}-{metric}-{unix nanos}`
pub fn alert_id(agent_id: &str, metric: &str, timestamp: DateTime<Utc>) -> String {
    match timestamp.timestamp_nanos_opt() {
        Some(nanos) => format!("{agent_id}-{metric}-{nanos}"),
        None => format!("{agent_id}-{metric}-{}us", timestamp.timestamp_micros()),
    }
}
