use async_trait::async_trait;
use thiserror::Error;

use super::Alert;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to send notification: {0}")]
    SendFailed(String),
    #[error("invalid notifier configuration: {0}")]
    InvalidConfiguration(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// A delivery channel for alert notifications.
///
/// Every implementation gets the same alert and reports success or failure;
/// the alert manager runs each call in its own task.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name used in logs (e.g. "discord", "webhook")
    fn name(&self) -> &str;

    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError>;
}
