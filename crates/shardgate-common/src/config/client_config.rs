//! Client configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub app: AppSettings,
    pub gateway: GatewaySettings,
    pub reconnect: ReconnectSettings,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Gateway connection settings
#[derive(Clone, Deserialize)]
pub struct GatewaySettings {
    pub url: String,
    pub token: String,
    #[serde(default = "default_api_version")]
    pub api_version: u8,
    #[serde(default)]
    pub intents: u64,
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,
    #[serde(default = "default_identify_interval_ms")]
    pub identify_interval_ms: u64,
    #[serde(default)]
    pub large_threshold: Option<u16>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl std::fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("intents", &self.intents)
            .field("shard_count", &self.shard_count)
            .field("identify_interval_ms", &self.identify_interval_ms)
            .field("large_threshold", &self.large_threshold)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

/// Reconnect backoff settings
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    #[serde(default = "default_alert_after")]
    pub alert_after_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            alert_after_attempts: default_alert_after(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "shardgate".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_api_version() -> u8 {
    10
}

fn default_shard_count() -> u32 {
    1
}

fn default_identify_interval_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.3
}

fn default_alert_after() -> u32 {
    10
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    ///
    /// `from_env` is this with `std::env::var`; tests pass a map instead.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env: lookup("APP_ENV")
                    .and_then(|s| Environment::parse(&s))
                    .unwrap_or_default(),
            },
            gateway: GatewaySettings {
                url: lookup("GATEWAY_URL").ok_or(ConfigError::MissingVar("GATEWAY_URL"))?,
                token: lookup("GATEWAY_TOKEN").ok_or(ConfigError::MissingVar("GATEWAY_TOKEN"))?,
                api_version: parse_or(&lookup, "GATEWAY_API_VERSION", default_api_version)?,
                intents: parse_or(&lookup, "GATEWAY_INTENTS", || 0)?,
                shard_count: parse_or(&lookup, "GATEWAY_SHARD_COUNT", default_shard_count)?,
                identify_interval_ms: parse_or(
                    &lookup,
                    "GATEWAY_IDENTIFY_INTERVAL_MS",
                    default_identify_interval_ms,
                )?,
                large_threshold: lookup("GATEWAY_LARGE_THRESHOLD")
                    .map(|s| parse_value("GATEWAY_LARGE_THRESHOLD", &s))
                    .transpose()?,
                connect_timeout_ms: parse_or(
                    &lookup,
                    "GATEWAY_CONNECT_TIMEOUT_MS",
                    default_connect_timeout_ms,
                )?,
            },
            reconnect: ReconnectSettings {
                initial_delay_ms: parse_or(
                    &lookup,
                    "RECONNECT_INITIAL_DELAY_MS",
                    default_initial_delay_ms,
                )?,
                max_delay_ms: parse_or(&lookup, "RECONNECT_MAX_DELAY_MS", default_max_delay_ms)?,
                multiplier: parse_or(&lookup, "RECONNECT_MULTIPLIER", default_multiplier)?,
                jitter: parse_or(&lookup, "RECONNECT_JITTER", default_jitter)?,
                alert_after_attempts: parse_or(&lookup, "RECONNECT_ALERT_AFTER", default_alert_after)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.shard_count == 0 {
            return Err(ConfigError::InvalidValue(
                "GATEWAY_SHARD_COUNT",
                "must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.reconnect.jitter) {
            return Err(ConfigError::InvalidValue(
                "RECONNECT_JITTER",
                "must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue(
                "RECONNECT_MULTIPLIER",
                "must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T, F, D>(lookup: &F, key: &'static str, default: D) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
    D: FnOnce() -> T,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default()),
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key, raw.to_string()))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
