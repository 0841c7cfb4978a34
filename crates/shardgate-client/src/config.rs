//! Typed gateway configuration
//!
//! [`GatewayConfig`] is what controllers and the coordinator run with. It can be
//! built directly or converted from the environment-loaded [`ClientConfig`].

use crate::backoff::ReconnectConfig;
use crate::protocol::{IdentifyProperties, Intents};
use shardgate_common::ClientConfig;
use std::time::Duration;

/// Where the first heartbeat's jitter fraction comes from
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum HeartbeatJitter {
    /// Uniformly random in `[0, 1)`
    #[default]
    Random,
    /// Fixed fraction of the interval
    Fixed(f64),
}

impl HeartbeatJitter {
    /// Draw a fraction in `[0, 1]`
    #[must_use]
    pub fn sample(self) -> f64 {
        match self {
            Self::Random => rand::random::<f64>(),
            Self::Fixed(fraction) => fraction.clamp(0.0, 1.0),
        }
    }
}

/// Gateway client configuration
#[derive(Clone)]
pub struct GatewayConfig {
    /// Gateway URL used for fresh sessions
    pub url: String,
    /// Authentication token
    pub token: String,
    /// Gateway API version appended to the URL
    pub api_version: u8,
    /// Requested intents
    pub intents: Intents,
    /// Identify connection properties
    pub properties: IdentifyProperties,
    /// Identify `large_threshold`
    pub large_threshold: Option<u16>,
    /// Total number of shards
    pub shard_count: u32,
    /// Minimum spacing between identify commands across all shards
    pub identify_interval: Duration,
    /// Maximum time a connect attempt may take
    pub connect_timeout: Duration,
    /// Reconnect backoff policy
    pub reconnect: ReconnectConfig,
    /// Raise a struggling-shard alert every this many consecutive attempts (0 disables)
    pub alert_after_attempts: u32,
    /// First-heartbeat jitter source
    pub heartbeat_jitter: HeartbeatJitter,
}

impl GatewayConfig {
    /// Create a configuration with defaults for everything but URL and token
    #[must_use]
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            api_version: 10,
            intents: Intents::empty(),
            properties: IdentifyProperties::new(),
            large_threshold: None,
            shard_count: 1,
            identify_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
            alert_after_attempts: 10,
            heartbeat_jitter: HeartbeatJitter::Random,
        }
    }

    #[must_use]
    pub fn with_intents(mut self, intents: Intents) -> Self {
        self.intents = intents;
        self
    }

    #[must_use]
    pub fn with_shard_count(mut self, shard_count: u32) -> Self {
        self.shard_count = shard_count.max(1);
        self
    }

    #[must_use]
    pub fn with_identify_interval(mut self, interval: Duration) -> Self {
        self.identify_interval = interval;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[must_use]
    pub fn with_alert_after_attempts(mut self, attempts: u32) -> Self {
        self.alert_after_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_heartbeat_jitter(mut self, jitter: HeartbeatJitter) -> Self {
        self.heartbeat_jitter = jitter;
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: IdentifyProperties) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub fn with_large_threshold(mut self, threshold: u16) -> Self {
        self.large_threshold = Some(threshold);
        self
    }

    /// Append the version and encoding query to a gateway URL
    ///
    /// URLs that already carry a query are left untouched.
    #[must_use]
    pub fn connect_url(&self, base: &str) -> String {
        if base.contains('?') {
            base.to_string()
        } else {
            format!("{base}?v={}&encoding=json", self.api_version)
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("intents", &self.intents)
            .field("shard_count", &self.shard_count)
            .field("identify_interval", &self.identify_interval)
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect", &self.reconnect)
            .field("alert_after_attempts", &self.alert_after_attempts)
            .finish_non_exhaustive()
    }
}

impl From<&ClientConfig> for GatewayConfig {
    fn from(config: &ClientConfig) -> Self {
        let gateway = &config.gateway;
        let reconnect = &config.reconnect;

        let mut out = Self::new(gateway.url.clone(), gateway.token.clone())
            .with_intents(Intents::from_bits_retain(gateway.intents))
            .with_shard_count(gateway.shard_count)
            .with_identify_interval(Duration::from_millis(gateway.identify_interval_ms))
            .with_connect_timeout(Duration::from_millis(gateway.connect_timeout_ms))
            .with_alert_after_attempts(reconnect.alert_after_attempts)
            .with_reconnect(ReconnectConfig {
                initial_delay: Duration::from_millis(reconnect.initial_delay_ms),
                max_delay: Duration::from_millis(reconnect.max_delay_ms),
                multiplier: reconnect.multiplier,
                jitter: reconnect.jitter,
            });
        out.api_version = gateway.api_version;
        out.large_threshold = gateway.large_threshold;
        out
    }
}
