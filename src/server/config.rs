use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::notifications::senders::email::{DEFAULT_FROM_ADDRESS, SmtpConfig};

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub database_url: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_scheduler_enabled")]
    pub scheduler_enabled: bool,

    #[serde(default = "default_scheduler_interval_seconds")]
    pub scheduler_interval_seconds: u64,

    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub smtp_from: Option<String>,

    #[serde(default = "default_notify_timeout_seconds")]
    pub notify_timeout_seconds: u64,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
pub struct PartialServerConfig {
    database_url: Option<String>,
    listen_addr: Option<String>,
    log_dir: Option<String>,
    scheduler_enabled: Option<bool>,
    scheduler_interval_seconds: Option<u64>,
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    smtp_user: Option<String>,
    smtp_password: Option<String>,
    smtp_from: Option<String>,
    notify_timeout_seconds: Option<u64>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_scheduler_interval_seconds() -> u64 {
    30
}

fn default_smtp_port() -> u16 {
    587
}

fn default_notify_timeout_seconds() -> u64 {
    10
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config: PartialServerConfig = match config_path.map(Path::new) {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
                toml::from_str(&contents)
                    .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))?
            }
            _ => PartialServerConfig::default(),
        };

        // 2. Load from environment variables
        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        Self::merge(env_config, file_config)
    }

    /// Environment wins over file; defaults fill the rest.
    pub fn merge(env: PartialServerConfig, file: PartialServerConfig) -> Result<Self, String> {
        let config = ServerConfig {
            database_url: non_blank(env.database_url.or(file.database_url))
                .ok_or("DATABASE_URL is required")?,
            listen_addr: env.listen_addr.or(file.listen_addr)
                .unwrap_or_else(default_listen_addr),
            log_dir: env.log_dir.or(file.log_dir)
                .unwrap_or_else(default_log_dir),
            scheduler_enabled: env.scheduler_enabled.or(file.scheduler_enabled)
                .unwrap_or_else(default_scheduler_enabled),
            scheduler_interval_seconds: env.scheduler_interval_seconds.or(file.scheduler_interval_seconds)
                .unwrap_or_else(default_scheduler_interval_seconds),
            smtp_host: non_blank(env.smtp_host.or(file.smtp_host)),
            smtp_port: env.smtp_port.or(file.smtp_port)
                .unwrap_or_else(default_smtp_port),
            smtp_user: non_blank(env.smtp_user.or(file.smtp_user)),
            smtp_password: env.smtp_password.or(file.smtp_password),
            smtp_from: non_blank(env.smtp_from.or(file.smtp_from)),
            notify_timeout_seconds: env.notify_timeout_seconds.or(file.notify_timeout_seconds)
                .unwrap_or_else(default_notify_timeout_seconds),
        };

        if config.scheduler_interval_seconds == 0 {
            return Err("SCHEDULER_INTERVAL_SECONDS must be at least 1".to_string());
        }
        Ok(config)
    }

    /// SMTP settings for the email channel, if a host is configured.
    pub fn smtp_config(&self) -> Option<SmtpConfig> {
        let host = self.smtp_host.clone()?;
        let from_address = self
            .smtp_from
            .clone()
            .or_else(|| self.smtp_user.clone())
            .unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string());
        Some(SmtpConfig {
            host,
            port: self.smtp_port,
            user: self.smtp_user.clone(),
            password: self.smtp_password.clone(),
            from_address,
        })
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_seconds)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_seconds)
    }
}
