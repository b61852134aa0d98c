//! Configuration types.
//!
//! Everything is read from the process environment once at startup and then
//! passed by reference to the components that need it.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default long-poll timeout for `getUpdates`, in seconds.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 60;

/// Public Bot API endpoint.
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Default SMTP transport timeout, in seconds.
pub const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 30;

/// Telegram Bot API settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout: Duration,
    /// Bot API server, without the `/bot<token>` part.
    pub api_base: String,
}

/// Outbound SMTP settings.
///
/// Kept raw: the relay starts without them, and a missing or malformed value
/// only fails the send that needs it.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// `host:port` of the mail relay.
    pub server: Option<String>,
    /// Used both as the `From:` header and as the SMTP auth identity.
    pub sender: Option<String>,
    pub password: SecretString,
    pub timeout: Duration,
}

/// Full relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub telegram: TelegramConfig,
    pub smtp: SmtpConfig,
}

impl RelayConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// Only the bot token is required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bot_token = optional("TELEGRAM_BOT_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".to_string()))?;
        let poll_timeout = parse_secs(&lookup, "TELEGRAM_POLL_TIMEOUT_SECS", DEFAULT_POLL_TIMEOUT_SECS)?;

        let password = lookup("SMTP_PASSWORD").unwrap_or_default();
        let timeout = parse_secs(&lookup, "SMTP_TIMEOUT_SECS", DEFAULT_SMTP_TIMEOUT_SECS)
            .unwrap_or_else(|e| {
                tracing::warn!("{e}; using {DEFAULT_SMTP_TIMEOUT_SECS}s");
                Duration::from_secs(DEFAULT_SMTP_TIMEOUT_SECS)
            });

        Ok(Self {
            telegram: TelegramConfig {
                bot_token: SecretString::from(bot_token),
                poll_timeout,
                api_base: optional("TELEGRAM_API_URL")
                    .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
            },
            smtp: SmtpConfig {
                server: optional("SMTP_SERVER"),
                sender: optional("SMTP_EMAIL"),
                password: SecretString::from(password),
                timeout,
            },
        })
    }
}

fn parse_secs<F>(lookup: &F, key: &str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected whole seconds, got {raw:?}: {e}"),
            }),
    }
}
