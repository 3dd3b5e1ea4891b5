use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{NotificationSender, SenderError, ensure_success};

/// Posts `{"subject", "message"}` to a generic webhook.
pub struct WebhookSender {
    client: Client,
    url: String,
}

impl WebhookSender {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<(), SenderError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "subject": subject, "message": body }))
            .send()
            .await?;
        ensure_success("Webhook", response).await
    }
}
