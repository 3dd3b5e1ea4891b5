use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{NotificationSender, SenderError, ensure_success};

/// Discord messages are capped at 2000 characters.
const MAX_CONTENT_CHARS: usize = 2000;

pub struct DiscordSender {
    client: Client,
    webhook_url: String,
}

impl DiscordSender {
    pub fn new(client: Client, webhook_url: impl Into<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }
}

fn content(subject: &str, body: &str) -> String {
    let text = format!("**{subject}**\n{body}");
    if text.chars().count() <= MAX_CONTENT_CHARS {
        return text;
    }
    text.chars().take(MAX_CONTENT_CHARS).collect()
}

#[async_trait]
impl NotificationSender for DiscordSender {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<(), SenderError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&json!({ "content": content(subject, body) }))
            .send()
            .await?;
        ensure_success("Discord webhook", response).await
    }
}
