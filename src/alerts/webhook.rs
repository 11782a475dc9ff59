use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{info, instrument};

use super::{Alert, Notifier, NotifyError};

/// Posts each alert as JSON to an arbitrary URL
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip(self, alert), fields(alert_id = %alert.id))]
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        let payload = json!({
            "message": alert.message,
            "agent": alert.agent_id,
            "timestamp": alert.timestamp.to_rfc3339(),
            "alert": alert,
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::SendFailed(format!(
                "webhook answered with HTTP {}",
                response.status()
            )));
        }

        info!("Successfully sent webhook alert");
        Ok(())
    }
}

/// Posts each alert to a Slack incoming webhook
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    client: Client,
    url: String,
}

impl SlackNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    fn format_message(alert: &Alert) -> String {
        format!(
            ":warning: *{} alert* on `{}`: {}",
            alert.metric, alert.agent_id, alert.message
        )
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    #[instrument(skip(self, alert), fields(alert_id = %alert.id))]
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        let payload = json!({ "text": Self::format_message(alert) });

        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::SendFailed(format!(
                "slack answered with HTTP {status}: {body}"
            )));
        }

        info!("Successfully sent Slack alert");
        Ok(())
    }
}
