// src/config/mod.rs

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::{Result, ThrottleError};

/// Settings shared by every throttle instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Name used in log lines to tell throttle instances apart
    #[serde(default = "default_name")]
    pub name: String,

    /// Upper bound on a single `process` call; `None` waits on the store indefinitely
    #[serde(default, with = "option_duration_serde")]
    pub timeout: Option<Duration>,
}

fn default_name() -> String {
    "throttle".to_string()
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            timeout: None,
        }
    }
}

/// Configuration for Redis event store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Connections opened by the store; commands rotate over them (0 opens one)
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connection timeout
    #[serde(default = "default_conn_timeout", with = "duration_serde")]
    pub connection_timeout: Duration,

    /// Prefix for every key the store writes
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_pool_size() -> u32 {
    10
}

fn default_conn_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_key_prefix() -> String {
    "throttle".to_string()
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: default_pool_size(),
            connection_timeout: default_conn_timeout(),
            key_prefix: default_key_prefix(),
        }
    }

    /// Builds a config from `THROTTLE_REDIS_URL`, `THROTTLE_KEY_PREFIX` and
    /// `THROTTLE_CONNECTION_TIMEOUT_MS`, reading a `.env` file first if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let url = env::var("THROTTLE_REDIS_URL")
            .map_err(|_| ThrottleError::Config("THROTTLE_REDIS_URL is not set".to_string()))?;
        let mut config = Self::new(url);

        if let Ok(prefix) = env::var("THROTTLE_KEY_PREFIX") {
            config.key_prefix = prefix;
        }

        if let Ok(timeout) = env::var("THROTTLE_CONNECTION_TIMEOUT_MS") {
            let millis = timeout.parse::<u64>().map_err(|e| {
                ThrottleError::Config(format!(
                    "THROTTLE_CONNECTION_TIMEOUT_MS must be an integer: {}",
                    e
                ))
            })?;
            config.connection_timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }
}

/// Configuration for in-memory event store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryConfig {
    /// Maximum number of events to hold
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// Whether to run a background task that drops events older than `retention`
    #[serde(default = "default_use_background_task")]
    pub use_background_task: bool,

    /// How often the background task runs
    #[serde(default = "default_cleanup_interval", with = "duration_serde")]
    pub cleanup_interval: Duration,

    /// Age after which the background task discards events regardless of throttle
    #[serde(default = "default_retention", with = "duration_serde")]
    pub retention: Duration,
}

fn default_max_events() -> usize {
    100_000
}

fn default_use_background_task() -> bool {
    false
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_retention() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
            use_background_task: default_use_background_task(),
            cleanup_interval: default_cleanup_interval(),
            retention: default_retention(),
        }
    }
}

// Helper module to serialize/deserialize Duration with serde
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

pub(crate) mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
