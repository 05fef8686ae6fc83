//! Protection manager configuration

use std::str::FromStr;
use std::time::Duration;

use crate::{ProtectionError, ProtectionResult};

/// Bounded retry policy for transient enforcer failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total apply attempts per reconciliation, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let micros = self.initial_backoff.as_micros() as f64 * self.multiplier.max(1.0).powi(exponent);
        Duration::from_micros(micros.round() as u64).min(self.max_backoff)
    }
}

/// Protection manager configuration
#[derive(Debug, Clone)]
pub struct ProtectionConfig {
    /// Intent at process start
    pub default_enabled: bool,
    /// Apply the default intent as soon as the manager starts
    pub assert_on_start: bool,
    pub retry: RetryPolicy,
    /// Periodic verification interval (None disables it)
    pub reconcile_interval: Option<Duration>,
    /// Capacity of the outcome event channel
    pub event_capacity: usize,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            default_enabled: false,
            assert_on_start: true,
            retry: RetryPolicy::default(),
            reconcile_interval: None,
            event_capacity: 64,
        }
    }
}

pub const ENV_DEFAULT_ENABLED: &str = "SCREENGUARD_DEFAULT_ENABLED";
pub const ENV_MAX_ATTEMPTS: &str = "SCREENGUARD_MAX_ATTEMPTS";
pub const ENV_RETRY_BACKOFF_MS: &str = "SCREENGUARD_RETRY_BACKOFF_MS";
pub const ENV_RECONCILE_INTERVAL_MS: &str = "SCREENGUARD_RECONCILE_INTERVAL_MS";

impl ProtectionConfig {
    /// Build from `SCREENGUARD_*` environment variables over the defaults
    pub fn from_env() -> ProtectionResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup over the defaults
    pub fn from_lookup<F>(lookup: F) -> ProtectionResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_DEFAULT_ENABLED) {
            config.default_enabled = parse_bool(ENV_DEFAULT_ENABLED, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
            config.retry.max_attempts = parse_number(ENV_MAX_ATTEMPTS, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_BACKOFF_MS) {
            config.retry.initial_backoff =
                Duration::from_millis(parse_number(ENV_RETRY_BACKOFF_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_RECONCILE_INTERVAL_MS) {
            let millis: u64 = parse_number(ENV_RECONCILE_INTERVAL_MS, &value)?;
            config.reconcile_interval = (millis > 0).then(|| Duration::from_millis(millis));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ProtectionResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(ProtectionError::InvalidConfig {
                key: ENV_MAX_ATTEMPTS,
                value: "0".to_string(),
            });
        }
        if self.event_capacity == 0 {
            return Err(ProtectionError::InvalidConfig {
                key: "event_capacity",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_bool(key: &'static str, value: &str) -> ProtectionResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ProtectionError::InvalidConfig {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_number<T: FromStr>(key: &'static str, value: &str) -> ProtectionResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ProtectionError::InvalidConfig {
            key,
            value: value.to_string(),
        })
}
