//! Email delivery over SMTP with STARTTLS.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor, message::header::ContentType,
    transport::smtp::authentication::Credentials,
};
use std::time::Duration;
use tracing::info;

use super::{NotificationSender, SenderError};

/// Used when neither `smtp_from` nor `smtp_user` is configured.
pub const DEFAULT_FROM_ADDRESS: &str = "metrics@localhost";

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
}

pub struct EmailSender {
    config: SmtpConfig,
    recipients: Vec<String>,
    timeout: Duration,
}

impl EmailSender {
    pub fn new(config: SmtpConfig, recipients: Vec<String>, timeout: Duration) -> Self {
        Self {
            config,
            recipients,
            timeout,
        }
    }

    fn build_message(&self, subject: &str, body: &str) -> Result<Message, SenderError> {
        if self.recipients.is_empty() {
            return Err(SenderError::InvalidConfiguration(
                "No email recipients configured".to_string(),
            ));
        }

        let mut builder = Message::builder()
            .from(self.config.from_address.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.recipients {
            builder = builder.to(recipient.parse()?);
        }
        builder
            .body(body.to_string())
            .map_err(|e| SenderError::Build(e.to_string()))
    }
}

#[async_trait]
impl NotificationSender for EmailSender {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<(), SenderError> {
        let email = self.build_message(subject, body)?;

        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)?
                .port(self.config.port)
                .timeout(Some(self.timeout));

        if let (Some(user), Some(pass)) = (&self.config.user, &self.config.password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        transport_builder.build().send(email).await?;

        info!(recipients = self.recipients.len(), %subject, "Alert email sent.");
        Ok(())
    }
}
