use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument};

use super::{Alert, AlertStatus, Notifier, NotifyError};

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

/// Sends alerts to a Discord channel webhook as embeds
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: Client,
    url: String,

    /// Mentioned in the message content when set
    user_id: Option<String>,
}

impl DiscordNotifier {
    pub fn new(url: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            user_id,
        }
    }

    pub fn build_alert_embed(&self, alert: &Alert) -> Embed {
        let (title, color) = match alert.status {
            AlertStatus::Active => (format!("⚠️ {} Alert", alert.metric), 15158332), // Red
            AlertStatus::Resolved => (format!("✅ {} Recovered", alert.metric), 3066993), // Green
        };

        Embed {
            title: Some(title),
            description: Some(format!("Agent **{}**: {}", alert.agent_id, alert.message)),
            color: Some(color),
            fields: vec![
                EmbedField {
                    name: "📈 Current Value".to_string(),
                    value: format!("{:.2}", alert.value),
                    inline: true,
                },
                EmbedField {
                    name: "⚠️ Threshold".to_string(),
                    value: format!("{:.2}", alert.threshold),
                    inline: true,
                },
                EmbedField {
                    name: "📊 Status".to_string(),
                    value: create_progress_bar(alert.value, alert.threshold),
                    inline: false,
                },
            ],
            footer: Some(EmbedFooter {
                text: format!("Agent: {} | Alert: {}", alert.agent_id, alert.id),
            }),
            timestamp: Some(alert.timestamp.to_rfc3339()),
        }
    }

    pub fn build_message(&self, alert: &Alert) -> Message {
        let mut builder = MessageBuilder::new().add_embed(self.build_alert_embed(alert));
        if let Some(user_id) = &self.user_id {
            builder = builder.content(format!(
                "🚨 ({} ~ {} {:.1}) <@{user_id}>",
                alert.agent_id, alert.metric, alert.value
            ));
        }
        builder.build()
    }
}

fn create_progress_bar(current: f64, limit: f64) -> String {
    if limit <= 0.0 {
        return format!("🔴 `{}` above limit", "█".repeat(10));
    }

    let ratio = current / limit;
    let percentage = ratio * 100.0;
    let filled = ((ratio * 10.0).max(0.0) as usize).min(10);
    let bar = "█".repeat(filled) + &"░".repeat(10 - filled);

    let status_emoji = if percentage >= 100.0 {
        "🔴"
    } else if percentage >= 80.0 {
        "🟠"
    } else if percentage >= 60.0 {
        "🟡"
    } else {
        "🟢"
    };

    format!("{status_emoji} `{bar}` {percentage:.1}% of limit")
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &str {
        "discord"
    }

    #[instrument(skip(self, alert), fields(alert_id = %alert.id))]
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        let message = self.build_message(alert);
        let response = self.client.post(&self.url).json(&message).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Discord API error response: {body}");
            return Err(NotifyError::SendFailed(format!(
                "discord answered with HTTP {status}"
            )));
        }

        info!("Successfully sent Discord message");
        Ok(())
    }
}
