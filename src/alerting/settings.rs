//! Alert thresholds and channel configuration, read from the `global` setting.
//!
//! Every field falls back to its default on its own, nested channel blocks
//! included, so a partial document never drops keys it does not mention.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub enabled: bool,
    pub dedup_minutes: i64,
    pub low_disk_free_pct_threshold: f64,
    pub heartbeat_grace_multiplier: i64,
    pub heartbeat_min_grace_seconds: i64,
    pub notify: NotifySettings,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dedup_minutes: 15,
            low_disk_free_pct_threshold: 10.0,
            heartbeat_grace_multiplier: 3,
            heartbeat_min_grace_seconds: 120,
            notify: NotifySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub email: EmailNotify,
    pub webhook: WebhookNotify,
    pub discord: DiscordNotify,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailNotify {
    pub enabled: bool,
    pub to: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookNotify {
    pub enabled: bool,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordNotify {
    pub enabled: bool,
    pub webhook_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_yields_defaults() {
        let settings: AlertSettings = serde_json::from_value(json!({})).unwrap();
        assert_eq!(settings, AlertSettings::default());
        assert!(!settings.notify.email.enabled);
        assert!(settings.notify.webhook.url.is_none());
    }

    #[test]
    fn partial_nested_block_keeps_sibling_defaults() {
        let settings: AlertSettings = serde_json::from_value(json!({
            "dedup_minutes": 5,
            "notify": { "webhook": { "url": "http://hooks.local/a" } }
        }))
        .unwrap();

        assert_eq!(settings.dedup_minutes, 5);
        assert_eq!(settings.heartbeat_min_grace_seconds, 120);
        assert!(!settings.notify.webhook.enabled);
        assert_eq!(settings.notify.webhook.url.as_deref(), Some("http://hooks.local/a"));
        assert_eq!(settings.notify.discord, DiscordNotify::default());
    }
}
