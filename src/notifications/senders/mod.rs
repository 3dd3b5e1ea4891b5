use async_trait::async_trait;
use thiserror::Error;

pub mod discord;
pub mod email;
pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Email build error: {0}")]
    Build(String),
}

/// One notification channel. Each sender carries its own destination config.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Channel name used in logs.
    fn name(&self) -> &'static str;

    async fn send(&self, subject: &str, body: &str) -> Result<(), SenderError>;
}

/// Maps a non-2xx response to a send failure that includes the body.
pub(crate) async fn ensure_success(
    channel: &str,
    response: reqwest::Response,
) -> Result<(), SenderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let text = response.text().await.unwrap_or_default();
    Err(SenderError::SendFailed(format!(
        "{channel} returned {status}: {text}"
    )))
}
