//! Configuration for batch publishing.
//!
//! ## Keys
//!
//! | Key                        | Description                                   | Default |
//! |----------------------------|-----------------------------------------------|---------|
//! | `bootstrap.servers`        | Broker addresses                              | required |
//! | `client.id`                | Client identifier reported to brokers         | (none)  |
//! | `acks`                     | `all`, `1` or `0`                             | `all`   |
//! | `message.timeout.ms`       | Per-record delivery timeout                   | `30000` |
//! | `default.topic`            | Topic for payload / consumed batches          | (none)  |
//! | `retry.max`                | Retries after the first attempt               | `2`     |
//! | `retry.backoff.ms`         | Initial backoff between attempts              | `100`   |
//! | `retry.backoff.max.ms`     | Backoff cap                                   | `5000`  |
//! | `retry.backoff.multiplier` | Backoff growth factor                         | `2.0`   |
//! | `retry.jitter`             | Randomize backoff by ±25%                     | `true`  |
//!
//! Any other key is kept in `client_overrides` and handed to the broker client
//! untouched (e.g. `compression.type`, `security.protocol`).

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;

fn default_acks() -> String {
    "all".to_string()
}

fn default_message_timeout_ms() -> u64 {
    30_000
}

fn default_retry_max() -> usize {
    2
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_retry_backoff_max_ms() -> u64 {
    5_000
}

fn default_retry_backoff_multiplier() -> f64 {
    2.0
}

fn default_retry_jitter() -> bool {
    true
}

const KNOWN_KEYS: &[&str] = &[
    "bootstrap.servers",
    "client.id",
    "acks",
    "message.timeout.ms",
    "default.topic",
    "retry.max",
    "retry.backoff.ms",
    "retry.backoff.max.ms",
    "retry.backoff.multiplier",
    "retry.jitter",
];

/// Broker and retry settings for a batch publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProducerConfig {
    /// Comma-separated list of broker addresses.
    pub bootstrap_servers: String,

    pub client_id: Option<String>,

    /// Acknowledgement level: `all`, `1` or `0`.
    #[serde(default = "default_acks")]
    pub acks: String,

    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,

    /// Target topic for batches that do not carry their own.
    pub default_topic: Option<String>,

    #[serde(default = "default_retry_max")]
    pub retry_max: usize,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,

    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: f64,

    #[serde(default = "default_retry_jitter")]
    pub retry_jitter: bool,

    /// Extra broker client settings passed through verbatim.
    #[serde(default)]
    pub client_overrides: HashMap<String, String>,
}

impl BatchProducerConfig {
    /// Config with defaults for everything but the broker list.
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            client_id: None,
            acks: default_acks(),
            message_timeout_ms: default_message_timeout_ms(),
            default_topic: None,
            retry_max: default_retry_max(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_backoff_max_ms: default_retry_backoff_max_ms(),
            retry_backoff_multiplier: default_retry_backoff_multiplier(),
            retry_jitter: default_retry_jitter(),
            client_overrides: HashMap::new(),
        }
    }

    /// Parse a config from a string key-value map.
    ///
    /// Required key: `bootstrap.servers`. The result is validated.
    pub fn from_config_map(config: &HashMap<String, String>) -> Result<Self> {
        let bootstrap_servers = config
            .get("bootstrap.servers")
            .ok_or_else(|| {
                ClientError::ConfigError("missing required 'bootstrap.servers'".to_string())
            })?
            .clone();

        let mut parsed = Self::new(bootstrap_servers);
        parsed.client_id = config.get("client.id").cloned();
        parsed.default_topic = config.get("default.topic").cloned();
        if let Some(acks) = config.get("acks") {
            parsed.acks = acks.clone();
        }
        if let Some(v) = parse_key(config, "message.timeout.ms")? {
            parsed.message_timeout_ms = v;
        }
        if let Some(v) = parse_key(config, "retry.max")? {
            parsed.retry_max = v;
        }
        if let Some(v) = parse_key(config, "retry.backoff.ms")? {
            parsed.retry_backoff_ms = v;
        }
        if let Some(v) = parse_key(config, "retry.backoff.max.ms")? {
            parsed.retry_backoff_max_ms = v;
        }
        if let Some(v) = parse_key(config, "retry.backoff.multiplier")? {
            parsed.retry_backoff_multiplier = v;
        }
        if let Some(v) = parse_key(config, "retry.jitter")? {
            parsed.retry_jitter = v;
        }

        parsed.client_overrides = config
            .iter()
            .filter(|(k, _)| !KNOWN_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        parsed.validate()?;
        Ok(parsed)
    }

    /// Check value ranges and required fields.
    pub fn validate(&self) -> Result<()> {
        if self.bootstrap_servers.trim().is_empty() {
            return Err(ClientError::ConfigError(
                "'bootstrap.servers' must not be empty".to_string(),
            ));
        }
        if !matches!(self.acks.as_str(), "all" | "-1" | "1" | "0") {
            return Err(ClientError::ConfigError(format!(
                "invalid 'acks' value '{}': expected all, 1 or 0",
                self.acks
            )));
        }
        if self.message_timeout_ms == 0 {
            return Err(ClientError::ConfigError(
                "'message.timeout.ms' must be > 0".to_string(),
            ));
        }
        if matches!(self.default_topic.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err(ClientError::ConfigError(
                "'default.topic' must not be empty".to_string(),
            ));
        }
        if !self.retry_backoff_multiplier.is_finite() || self.retry_backoff_multiplier < 1.0 {
            return Err(ClientError::ConfigError(
                "'retry.backoff.multiplier' must be >= 1.0".to_string(),
            ));
        }
        if self.retry_backoff_ms > self.retry_backoff_max_ms {
            return Err(ClientError::ConfigError(format!(
                "'retry.backoff.ms' ({}) exceeds 'retry.backoff.max.ms' ({})",
                self.retry_backoff_ms, self.retry_backoff_max_ms
            )));
        }
        Ok(())
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_max,
            initial_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_backoff: Duration::from_millis(self.retry_backoff_max_ms),
            backoff_multiplier: self.retry_backoff_multiplier,
            jitter: self.retry_jitter,
        }
    }
}

fn parse_key<T: FromStr>(config: &HashMap<String, String>, key: &str) -> Result<Option<T>> {
    match config.get(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ClientError::ConfigError(format!("invalid value '{}' for '{}'", raw, key))
        }),
    }
}
