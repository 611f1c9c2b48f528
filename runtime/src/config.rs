//! Environment-based configuration.
//!
//! Every setting has a default; `BANK_ACCOUNT_*` variables override them.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `BANK_ACCOUNT_RETRY_MAX_ATTEMPTS` | `3` |
//! | `BANK_ACCOUNT_RETRY_DELAY_MS` | `1000` |
//! | `BANK_ACCOUNT_EMISSION_ORDER` | `emit-then-persist` |
//! | `BANK_ACCOUNT_PUBSUB_NAME` | `eventsource` |
//! | `BANK_ACCOUNT_TOPIC` | `transactions` |
//! | `BANK_ACCOUNT_MESSAGE_TTL_SECS` | `3600` |
//! | `BANK_ACCOUNT_IDLE_TIMEOUT_SECS` | `30` |
//! | `BANK_ACCOUNT_MAILBOX_CAPACITY` | `64` |
//! | `BANK_ACCOUNT_CALL_TIMEOUT_MS` | unset (wait indefinitely) |
//! | `BANK_ACCOUNT_BROKERS` | unset |
//! | `BANK_ACCOUNT_DATABASE_URL` | unset |
//! | `BANK_ACCOUNT_METRICS_ADDR` | unset |
//!
//! # Example
//!
//! ```no_run
//! use account_entity_runtime::config::AppConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::from_env()?;
//! println!("Emission order: {}", config.emission_order);
//! # Ok(())
//! # }
//! ```

use crate::host::{DEFAULT_IDLE_TIMEOUT, DEFAULT_MAILBOX_CAPACITY, HostConfig};
use crate::processor::{EmissionOrder, ProcessorConfig};
use crate::retry::{MAX_RETRIES, RETRY_DELAY, RetryPolicy};
use account_entity_core::event_emitter::{
    DEFAULT_MESSAGE_TTL, DEFAULT_PUBSUB_NAME, DEFAULT_TOPIC, EventDestination,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Prefix shared by every configuration variable.
pub const ENV_PREFIX: &str = "BANK_ACCOUNT_";

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("Failed to parse {var}={value:?}: {reason}")]
    Parse {
        /// Variable name.
        var: String,
        /// Raw value.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// Values parsed but do not make sense together.
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Total attempts for store and stream operations.
    pub retry_max_attempts: u32,
    /// Fixed delay between attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Order of emission and persistence.
    pub emission_order: EmissionOrder,
    /// Pub/sub component name carried with every event.
    pub pubsub_name: String,
    /// Topic transaction records are published to.
    pub topic: String,
    /// Message time-to-live, in seconds.
    pub message_ttl_secs: u64,
    /// Inactivity before an entity is deactivated, in seconds.
    pub idle_timeout_secs: u64,
    /// Queued calls per entity.
    pub mailbox_capacity: usize,
    /// Caller-side timeout, in milliseconds.
    pub call_timeout_ms: Option<u64>,
    /// Kafka/Redpanda bootstrap servers.
    pub brokers: Option<String>,
    /// Postgres connection string.
    pub database_url: Option<String>,
    /// Address for the Prometheus endpoint.
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            retry_max_attempts: MAX_RETRIES,
            retry_delay_ms: u64::try_from(RETRY_DELAY.as_millis()).unwrap_or(u64::MAX),
            emission_order: EmissionOrder::default(),
            pubsub_name: DEFAULT_PUBSUB_NAME.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            message_ttl_secs: DEFAULT_MESSAGE_TTL.as_secs(),
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            call_timeout_ms: None,
            brokers: None,
            database_url: None,
            metrics_addr: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed or the result is invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// `lookup` receives full variable names (`BANK_ACCOUNT_TOPIC`, ...).
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed or the result is invalid
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = Source { lookup };
        let defaults = Self::default();

        let config = Self {
            retry_max_attempts: source
                .parsed("RETRY_MAX_ATTEMPTS")?
                .unwrap_or(defaults.retry_max_attempts),
            retry_delay_ms: source
                .parsed("RETRY_DELAY_MS")?
                .unwrap_or(defaults.retry_delay_ms),
            emission_order: source
                .parsed("EMISSION_ORDER")?
                .unwrap_or(defaults.emission_order),
            pubsub_name: source.raw("PUBSUB_NAME").unwrap_or(defaults.pubsub_name),
            topic: source.raw("TOPIC").unwrap_or(defaults.topic),
            message_ttl_secs: source
                .parsed("MESSAGE_TTL_SECS")?
                .unwrap_or(defaults.message_ttl_secs),
            idle_timeout_secs: source
                .parsed("IDLE_TIMEOUT_SECS")?
                .unwrap_or(defaults.idle_timeout_secs),
            mailbox_capacity: source
                .parsed("MAILBOX_CAPACITY")?
                .unwrap_or(defaults.mailbox_capacity),
            call_timeout_ms: source.parsed("CALL_TIMEOUT_MS")?,
            brokers: source.raw("BROKERS"),
            database_url: source.raw("DATABASE_URL"),
            metrics_addr: source.parsed("METRICS_ADDR")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::Validation("retry_max_attempts must be > 0".to_string()));
        }
        if self.mailbox_capacity == 0 {
            return Err(ConfigError::Validation("mailbox_capacity must be > 0".to_string()));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::Validation("idle_timeout_secs must be > 0".to_string()));
        }
        if self.call_timeout_ms == Some(0) {
            return Err(ConfigError::Validation("call_timeout_ms must be > 0 when set".to_string()));
        }
        if self.pubsub_name.trim().is_empty() {
            return Err(ConfigError::Validation("pubsub_name cannot be empty".to_string()));
        }
        if self.topic.trim().is_empty() {
            return Err(ConfigError::Validation("topic cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Retry policy for store and stream operations.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(self.retry_max_attempts)
            .delay(Duration::from_millis(self.retry_delay_ms))
            .build()
    }

    /// Processor settings.
    #[must_use]
    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig::default()
            .with_retry_policy(self.retry_policy())
            .with_order(self.emission_order)
    }

    /// Host settings.
    #[must_use]
    pub fn host_config(&self) -> HostConfig {
        HostConfig::default()
            .with_mailbox_capacity(self.mailbox_capacity)
            .with_idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .with_call_timeout(self.call_timeout_ms.map(Duration::from_millis))
    }

    /// Where transaction records go.
    #[must_use]
    pub fn destination(&self) -> EventDestination {
        EventDestination::new(
            self.pubsub_name.clone(),
            self.topic.clone(),
            Duration::from_secs(self.message_ttl_secs),
        )
    }
}

struct Source<F> {
    lookup: F,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{key}")).filter(|value| !value.trim().is_empty())
    }

    fn parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.raw(key)
            .map(|value| {
                value.trim().parse().map_err(|e: T::Err| ConfigError::Parse {
                    var: format!("{ENV_PREFIX}{key}"),
                    value: value.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }
}
