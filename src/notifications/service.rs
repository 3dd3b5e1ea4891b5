use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::senders::{
    NotificationSender, SenderError,
    discord::DiscordSender,
    email::{EmailSender, SmtpConfig},
    webhook::WebhookSender,
};
use crate::alerting::settings::NotifySettings;

/// Delivers a fired alert to whatever channels the settings enable.
///
/// Implementations never fail: channel errors are handled internally.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, channels: &NotifySettings, subject: &str, body: &str);
}

pub struct NotificationService {
    smtp: Option<SmtpConfig>,
    client: Client,
    timeout: Duration,
}

impl NotificationService {
    /// `timeout` bounds every outbound channel call.
    pub fn new(smtp: Option<SmtpConfig>, timeout: Duration) -> Result<Self, SenderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            smtp,
            client,
            timeout,
        })
    }

    fn senders_for(&self, channels: &NotifySettings) -> Vec<Box<dyn NotificationSender>> {
        let mut senders: Vec<Box<dyn NotificationSender>> = Vec::new();

        if channels.email.enabled {
            match &self.smtp {
                Some(smtp) if !channels.email.to.is_empty() => senders.push(Box::new(
                    EmailSender::new(smtp.clone(), channels.email.to.clone(), self.timeout),
                )),
                Some(_) => debug!("Email channel enabled without recipients. Skipping."),
                None => debug!("Email channel enabled but SMTP is not configured. Skipping."),
            }
        }

        if channels.webhook.enabled {
            match non_empty(&channels.webhook.url) {
                Some(url) => senders.push(Box::new(WebhookSender::new(self.client.clone(), url))),
                None => debug!("Webhook channel enabled without a URL. Skipping."),
            }
        }

        if channels.discord.enabled {
            match non_empty(&channels.discord.webhook_url) {
                Some(url) => senders.push(Box::new(DiscordSender::new(self.client.clone(), url))),
                None => debug!("Discord channel enabled without a webhook URL. Skipping."),
            }
        }

        senders
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[async_trait]
impl AlertNotifier for NotificationService {
    async fn notify(&self, channels: &NotifySettings, subject: &str, body: &str) {
        let senders = self.senders_for(channels);
        if senders.is_empty() {
            debug!(%subject, "No notification channels enabled.");
            return;
        }

        let results = join_all(senders.iter().map(|sender| sender.send(subject, body))).await;

        for (sender, result) in senders.iter().zip(results) {
            match result {
                Ok(()) => info!(channel = sender.name(), %subject, "Notification sent."),
                Err(e) => warn!(channel = sender.name(), error = %e, "Notification channel failed."),
            }
        }
    }
}
