//! Configuration for guarded targets
//!
//! Settings deserialize from TOML with every field optional; durations are
//! expressed in milliseconds. A [`ResilienceConfig`] carries crate-wide
//! defaults plus per-target overrides keyed by target name.
//!
//! ```toml
//! [default.retry]
//! max_attempts = 3
//!
//! [targets."payment-gateway".breaker]
//! failure_rate_threshold = 40.0
//! wait_duration_ms = 5000
//!
//! [targets."payment-gateway".bulkhead]
//! worker_count = 4
//! queue_capacity = 16
//! ```

use crate::bulkhead::{BulkheadConfig, QueuedBulkheadConfig};
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::retry::{Backoff, RetryConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors loading or parsing a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Circuit breaker settings as they appear in a config file
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSettings {
    pub failure_rate_threshold: f64,
    pub slow_rate_threshold: f64,
    pub slow_call_duration_ms: u64,
    pub window_size: usize,
    pub min_samples: usize,
    pub wait_duration_ms: u64,
    pub half_open_permits: usize,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_rate_threshold: defaults.failure_rate_threshold,
            slow_rate_threshold: defaults.slow_rate_threshold,
            slow_call_duration_ms: defaults.slow_call_duration.as_millis() as u64,
            window_size: defaults.window_size,
            min_samples: defaults.min_samples,
            wait_duration_ms: defaults.wait_duration.as_millis() as u64,
            half_open_permits: defaults.half_open_permits,
        }
    }
}

impl From<&BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        Self {
            failure_rate_threshold: settings.failure_rate_threshold,
            slow_rate_threshold: settings.slow_rate_threshold,
            slow_call_duration: Duration::from_millis(settings.slow_call_duration_ms),
            window_size: settings.window_size,
            min_samples: settings.min_samples,
            wait_duration: Duration::from_millis(settings.wait_duration_ms),
            half_open_permits: settings.half_open_permits,
        }
    }
}

/// Backoff strategy selector for config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
}

/// Retry settings as they appear in a config file
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub strategy: BackoffStrategy,
    pub initial_backoff_ms: u64,
    pub backoff_factor: f64,
    pub max_backoff_ms: u64,
    pub overall_timeout_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: BackoffStrategy::Exponential,
            initial_backoff_ms: 100,
            backoff_factor: 2.0,
            max_backoff_ms: 2_000,
            overall_timeout_ms: 10_000,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        let backoff = match settings.strategy {
            BackoffStrategy::Fixed => Backoff::Fixed(Duration::from_millis(settings.initial_backoff_ms)),
            BackoffStrategy::Exponential => Backoff::Exponential {
                initial: Duration::from_millis(settings.initial_backoff_ms),
                factor: settings.backoff_factor,
                max: Duration::from_millis(settings.max_backoff_ms),
            },
        };
        Self {
            max_attempts: settings.max_attempts,
            backoff,
            overall_timeout: Duration::from_millis(settings.overall_timeout_ms),
        }
    }
}

/// Bulkhead settings (both variants) as they appear in a config file
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BulkheadSettings {
    pub max_concurrent: usize,
    /// Bounded wait for a slot; `0` means immediate rejection at capacity
    pub acquire_timeout_ms: Option<u64>,
    pub worker_count: usize,
    pub queue_capacity: usize,
}

impl Default for BulkheadSettings {
    fn default() -> Self {
        let inline = BulkheadConfig::default();
        let queued = QueuedBulkheadConfig::default();
        Self {
            max_concurrent: inline.max_concurrent,
            acquire_timeout_ms: inline.acquire_timeout.map(|d| d.as_millis() as u64),
            worker_count: queued.worker_count,
            queue_capacity: queued.queue_capacity,
        }
    }
}

impl From<&BulkheadSettings> for BulkheadConfig {
    fn from(settings: &BulkheadSettings) -> Self {
        Self {
            max_concurrent: settings.max_concurrent,
            acquire_timeout: settings
                .acquire_timeout_ms
                .and_then(|ms| (ms > 0).then(|| Duration::from_millis(ms))),
        }
    }
}

impl From<&BulkheadSettings> for QueuedBulkheadConfig {
    fn from(settings: &BulkheadSettings) -> Self {
        Self {
            worker_count: settings.worker_count,
            queue_capacity: settings.queue_capacity,
        }
    }
}

/// Complete per-target guard configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    pub breaker: BreakerSettings,
    pub retry: RetrySettings,
    pub bulkhead: BulkheadSettings,
}

/// Crate-wide defaults plus per-target overrides
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceConfig {
    /// Applied to every target without an explicit override
    pub default: TargetConfig,
    /// Overrides keyed by target name
    pub targets: HashMap<String, TargetConfig>,
}

impl ResilienceConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration from a TOML file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// The effective configuration for one target
    pub fn for_target(&self, name: &str) -> &TargetConfig {
        self.targets.get(name).unwrap_or(&self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ResilienceConfig::from_toml_str("").unwrap();
        let target = config.for_target("anything");
        assert_eq!(target.retry.max_attempts, 3);
        assert_eq!(target.breaker.window_size, 20);
        assert_eq!(target.bulkhead.max_concurrent, 10);
    }

    #[test]
    fn test_target_override() {
        let text = r#"
            [default.retry]
            max_attempts = 2

            [targets."payment-gateway".breaker]
            failure_rate_threshold = 40.0
            wait_duration_ms = 5000

            [targets."payment-gateway".retry]
            strategy = "fixed"
            initial_backoff_ms = 50
        "#;
        let config = ResilienceConfig::from_toml_str(text).unwrap();

        let payment = config.for_target("payment-gateway");
        assert_eq!(payment.breaker.failure_rate_threshold, 40.0);
        assert_eq!(payment.breaker.wait_duration_ms, 5000);
        assert_eq!(payment.retry.strategy, BackoffStrategy::Fixed);
        // Unset sections fall back to field defaults, not the [default] table
        assert_eq!(payment.bulkhead.max_concurrent, 10);

        let other = config.for_target("inventory-service");
        assert_eq!(other.retry.max_attempts, 2);
    }

    #[test]
    fn test_conversion_to_runtime_configs() {
        let settings = RetrySettings {
            strategy: BackoffStrategy::Fixed,
            initial_backoff_ms: 250,
            ..Default::default()
        };
        let runtime: RetryConfig = (&settings).into();
        match runtime.backoff {
            Backoff::Fixed(delay) => assert_eq!(delay, Duration::from_millis(250)),
            other => panic!("expected fixed backoff, got {:?}", other),
        }

        let settings = BreakerSettings {
            slow_call_duration_ms: 750,
            ..Default::default()
        };
        let runtime: CircuitBreakerConfig = (&settings).into();
        assert_eq!(runtime.slow_call_duration, Duration::from_millis(750));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resilience.toml");
        std::fs::write(&path, "[default.retry]\nmax_attempts = 5\n").unwrap();

        let config = ResilienceConfig::from_path(&path).unwrap();
        assert_eq!(config.for_target("anything").retry.max_attempts, 5);

        let missing = ResilienceConfig::from_path(dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = ResilienceConfig::from_toml_str("[default.retry]\nmax_atempts = 3\n");
        assert!(result.is_err());
    }
}
