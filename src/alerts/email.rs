use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, instrument};

use super::{Alert, Notifier, NotifyError};

/// SMTP relay settings
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
}

/// Mails each alert through an SMTP relay, upgrading with STARTTLS
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    pub fn new(settings: &SmtpSettings) -> Result<Self, NotifyError> {
        let from = parse_mailbox(&settings.from)?;
        let to = settings
            .to
            .iter()
            .map(|address| parse_mailbox(address))
            .collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(NotifyError::InvalidConfiguration(
                "email notifier needs at least one recipient".to_string(),
            ));
        }

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| NotifyError::InvalidConfiguration(format!("smtp relay {}: {e}", settings.host)))?
            .port(settings.port);

        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    fn build_message(&self, alert: &Alert) -> Result<Message, NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(format!("[{}] {} alert on {}", alert.status, alert.metric, alert.agent_id))
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        let body = format!(
            "{}\n\nagent:     {}\nmetric:    {}\nvalue:     {:.2}\nthreshold: {:.2}\nalert id:  {}\nraised at: {}\n",
            alert.message,
            alert.agent_id,
            alert.metric,
            alert.value,
            alert.threshold,
            alert.id,
            alert.timestamp.to_rfc3339(),
        );

        builder
            .body(body)
            .map_err(|e| NotifyError::SendFailed(format!("failed to build email: {e}")))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .parse()
        .map_err(|e| NotifyError::InvalidConfiguration(format!("invalid address {address:?}: {e}")))
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    #[instrument(skip(self, alert), fields(alert_id = %alert.id))]
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        let message = self.build_message(alert)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::SendFailed(format!("smtp delivery failed: {e}")))?;

        info!("Successfully sent email alert");
        Ok(())
    }
}
