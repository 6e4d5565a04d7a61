//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default Telegram Bot API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Default album wait window.
pub const DEFAULT_ALBUM_LATENCY: Duration = Duration::from_millis(10);

/// Relay configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bot API token.
    pub bot_token: SecretString,
    /// Bot API base URL (overridable for tests and self-hosted API servers).
    pub api_base: String,
    /// Destination chat (channel id or `@username`).
    pub channel_id: String,
    /// The only user allowed to run `/pattern`.
    pub admin_id: i64,
    /// Where the current template is persisted.
    pub template_file: PathBuf,
    /// How long an album stays open for new members.
    pub album_latency: Duration,
    /// Drop updates that queued while the bot was offline.
    pub skip_updates: bool,
}

impl RelayConfig {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let bot_token = SecretString::from(required("TELEGRAM_BOT_TOKEN")?);
        let channel_id = required("RELAY_CHANNEL_ID")?;

        let admin_raw = required("RELAY_ADMIN_ID")?;
        let admin_id = admin_raw
            .parse::<i64>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "RELAY_ADMIN_ID".into(),
                message: format!("{admin_raw:?} is not a numeric user id ({e})"),
            })?;

        let api_base = lookup("TELEGRAM_API_BASE")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let template_file = lookup("RELAY_TEMPLATE_FILE")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("template.json"));

        let album_latency = match lookup("RELAY_ALBUM_LATENCY_MS") {
            Some(raw) => {
                let ms = raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| ConfigError::InvalidValue {
                        key: "RELAY_ALBUM_LATENCY_MS".into(),
                        message: e.to_string(),
                    })?;
                Duration::from_millis(ms)
            }
            None => DEFAULT_ALBUM_LATENCY,
        };

        let skip_updates = lookup("RELAY_SKIP_UPDATES")
            .map(|s| !matches!(s.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        Ok(Self {
            bot_token,
            api_base,
            channel_id,
            admin_id,
            template_file,
            album_latency,
            skip_updates,
        })
    }
}
