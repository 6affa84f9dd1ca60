//! Configuration management for safewatch.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "safewatch";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "incidents.db";

/// Default prefix for map links sent to contacts.
pub const DEFAULT_MAP_LINK_BASE: &str = "https://www.google.com/maps/search/?api=1&query=";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SAFEWATCH_`, sections split by `__`)
/// 2. TOML config file at `~/.config/safewatch/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Bearer-token configuration.
    pub auth: AuthConfig,
    /// Outbound notification configuration.
    pub notifier: NotifierConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/safewatch/incidents.db`
    pub database_path: Option<PathBuf>,
}

/// Token signing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for signing bearer tokens.
    pub jwt_secret: String,
    /// Lifetime of issued tokens in hours.
    pub token_ttl_hours: u32,
}

/// Which transport delivers notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// Write notifications to the log only.
    #[default]
    Log,
    /// Send SMS through the Twilio REST API.
    Twilio,
}

/// Notification-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Transport to use.
    pub kind: NotifierKind,
    /// Prefix of the map link; `"{lat},{lon}"` is appended.
    pub map_link_base: String,
    /// Maximum number of pending notification jobs.
    pub queue_capacity: usize,
    /// Per-send timeout in seconds.
    pub timeout_secs: u64,
    /// Twilio credentials, used when `kind = "twilio"`.
    pub twilio: TwilioConfig,
}

/// Twilio REST API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwilioConfig {
    /// Account SID.
    pub account_sid: Option<String>,
    /// Auth token.
    pub auth_token: Option<String>,
    /// Sender phone number.
    pub from_number: Option<String>,
    /// API base URL.
    pub api_base_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret".to_string(),
            token_ttl_hours: 24,
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Log,
            map_link_base: DEFAULT_MAP_LINK_BASE.to_string(),
            queue_capacity: 256,
            timeout_secs: 10,
            twilio: TwilioConfig::default(),
        }
    }
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            api_base_url: "https://api.twilio.com".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("SAFEWATCH_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(invalid("auth.jwt_secret must not be empty"));
        }

        if self.auth.token_ttl_hours == 0 {
            return Err(invalid("auth.token_ttl_hours must be greater than 0"));
        }

        if self.notifier.queue_capacity == 0 {
            return Err(invalid("notifier.queue_capacity must be greater than 0"));
        }

        if self.notifier.timeout_secs == 0 {
            return Err(invalid("notifier.timeout_secs must be greater than 0"));
        }

        if self.notifier.kind == NotifierKind::Twilio {
            let twilio = &self.notifier.twilio;
            for (name, value) in [
                ("account_sid", &twilio.account_sid),
                ("auth_token", &twilio.auth_token),
                ("from_number", &twilio.from_number),
            ] {
                if value.as_deref().map_or(true, str::is_empty) {
                    return Err(invalid(format!(
                        "notifier.twilio.{name} is required when notifier.kind is twilio"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the notifier send timeout as a Duration.
    #[must_use]
    pub fn notifier_timeout(&self) -> Duration {
        Duration::from_secs(self.notifier.timeout_secs)
    }

    /// A copy with secrets masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.auth.jwt_secret = REDACTED.to_string();
        if config.notifier.twilio.auth_token.is_some() {
            config.notifier.twilio.auth_token = Some(REDACTED.to_string());
        }
        config
    }
}

const REDACTED: &str = "********";

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
