//! Configuration for the [`crate::notifier::Notifier`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NotifierError, Result};

/// Runtime configuration for a [`crate::notifier::Notifier`].
///
/// Defaults and constraints mirror the values every constructor validates
/// against; construct via [`NotifierConfig::default`] and override fields,
/// then call [`NotifierConfig::validate`] (also run implicitly by
/// `Notifier::new`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Initial delay between reconnect attempts. Must be > 0.
    #[serde(default = "default_reconnect_interval", with = "duration_secs")]
    pub reconnect_interval: Duration,

    /// Cap on the exponentially-backed-off reconnect delay. Must be >=
    /// `reconnect_interval`.
    #[serde(default = "default_max_reconnect_interval", with = "duration_secs")]
    pub max_reconnect_interval: Duration,

    /// Maximum number of reconnect attempts per disconnect episode before
    /// giving up (0 = unlimited).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Multiplier applied to the backoff delay after each failed attempt.
    /// Must be >= 1.0.
    #[serde(default = "default_reconnect_backoff_multiplier")]
    pub reconnect_backoff_multiplier: f64,

    /// Maximum payload size in bytes accepted by `Publish`. Must be in
    /// `1..8000`.
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,

    /// Interval at which the supervisor pings the connection. Must be > 0.
    #[serde(default = "default_ping_interval", with = "duration_secs")]
    pub ping_interval: Duration,

    /// Per-callback timeout (0 disables the bound).
    #[serde(default = "default_callback_timeout", with = "duration_secs")]
    pub callback_timeout: Duration,

    /// Size of the dispatcher's concurrency bulkhead (max callback tasks
    /// in flight per notification). Must be > 0.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Bound on how long `Shutdown` waits for workers to drain. Must be > 0.
    #[serde(default = "default_shutdown_timeout", with = "duration_secs")]
    pub shutdown_timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: default_reconnect_interval(),
            max_reconnect_interval: default_max_reconnect_interval(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_backoff_multiplier: default_reconnect_backoff_multiplier(),
            max_payload_size: default_max_payload_size(),
            ping_interval: default_ping_interval(),
            callback_timeout: default_callback_timeout(),
            buffer_size: default_buffer_size(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl NotifierConfig {
    /// Read overrides from the process environment on top of the defaults.
    ///
    /// Unset or unparsable variables fall back silently to the default,
    /// following the same `ok().and_then(...).unwrap_or(default)` shape
    /// used throughout the stack's env-driven config loaders.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            reconnect_interval: env_duration("PGNOTIFY_RECONNECT_INTERVAL_SECS", defaults.reconnect_interval),
            max_reconnect_interval: env_duration(
                "PGNOTIFY_MAX_RECONNECT_INTERVAL_SECS",
                defaults.max_reconnect_interval,
            ),
            max_reconnect_attempts: std::env::var("PGNOTIFY_MAX_RECONNECT_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_reconnect_attempts),
            reconnect_backoff_multiplier: std::env::var("PGNOTIFY_RECONNECT_BACKOFF_MULTIPLIER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.reconnect_backoff_multiplier),
            max_payload_size: std::env::var("PGNOTIFY_MAX_PAYLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_payload_size),
            ping_interval: env_duration("PGNOTIFY_PING_INTERVAL_SECS", defaults.ping_interval),
            callback_timeout: env_duration("PGNOTIFY_CALLBACK_TIMEOUT_SECS", defaults.callback_timeout),
            buffer_size: std::env::var("PGNOTIFY_BUFFER_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.buffer_size),
            shutdown_timeout: env_duration("PGNOTIFY_SHUTDOWN_TIMEOUT_SECS", defaults.shutdown_timeout),
        }
    }

    /// Validate the constraints documented on each field.
    pub fn validate(&self) -> Result<()> {
        if self.reconnect_interval.is_zero() {
            return Err(NotifierError::InvalidConfig {
                reason: "reconnect_interval must be > 0".to_string(),
            });
        }
        if self.max_reconnect_interval < self.reconnect_interval {
            return Err(NotifierError::InvalidConfig {
                reason: "max_reconnect_interval must be >= reconnect_interval".to_string(),
            });
        }
        if self.reconnect_backoff_multiplier < 1.0 {
            return Err(NotifierError::InvalidConfig {
                reason: "reconnect_backoff_multiplier must be >= 1.0".to_string(),
            });
        }
        if self.max_payload_size == 0 || self.max_payload_size >= 8000 {
            return Err(NotifierError::InvalidConfig {
                reason: "max_payload_size must be in 1..8000".to_string(),
            });
        }
        if self.ping_interval.is_zero() {
            return Err(NotifierError::InvalidConfig { reason: "ping_interval must be > 0".to_string() });
        }
        if self.buffer_size == 0 {
            return Err(NotifierError::InvalidConfig { reason: "buffer_size must be > 0".to_string() });
        }
        if self.shutdown_timeout.is_zero() {
            return Err(NotifierError::InvalidConfig {
                reason: "shutdown_timeout must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

fn env_duration(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

const fn default_reconnect_interval() -> Duration {
    Duration::from_secs(1)
}

const fn default_max_reconnect_interval() -> Duration {
    Duration::from_secs(30)
}

const fn default_max_reconnect_attempts() -> u32 {
    0
}

const fn default_reconnect_backoff_multiplier() -> f64 {
    2.0
}

const fn default_max_payload_size() -> usize {
    7900
}

const fn default_ping_interval() -> Duration {
    Duration::from_secs(30)
}

const fn default_callback_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_buffer_size() -> usize {
    100
}

const fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
