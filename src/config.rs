//! Crate-wide configuration with environment-variable loading.

use std::time::Duration;

use crate::rate_limit::limiter::RateLimitQuota;
use crate::resilience::config::{CircuitBreakerConfig, RetryPolicy};

/// Error raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {name}: {message}")]
    Invalid { name: String, message: String },
}

impl ConfigError {
    fn invalid(name: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Top-level configuration for the resilience layer.
#[derive(Debug, Clone)]
pub struct BreakwaterConfig {
    /// Policy applied when a call-site does not supply one
    pub retry: RetryPolicy,
    /// Breaker settings applied to keys without an override
    pub breaker: CircuitBreakerConfig,
    /// Quota applied to endpoints without a dedicated quota
    pub rate_limit: RateLimitQuota,
}

impl Default for BreakwaterConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitQuota::api(),
        }
    }
}

impl BreakwaterConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for unset variables.
    ///
    /// Recognized variables: `BREAKWATER_MAX_ATTEMPTS`,
    /// `BREAKWATER_BASE_DELAY_MS`, `BREAKWATER_MAX_DELAY_MS`,
    /// `BREAKWATER_FAILURE_THRESHOLD`, `BREAKWATER_RECOVERY_WINDOW_SECS`,
    /// `BREAKWATER_RATE_LIMIT_MAX_REQUESTS`,
    /// `BREAKWATER_RATE_LIMIT_WINDOW_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(max_attempts) = read_var("BREAKWATER_MAX_ATTEMPTS")? {
            config.retry.max_attempts = max_attempts;
        }

        if let Some(base_delay_ms) = read_var("BREAKWATER_BASE_DELAY_MS")? {
            config.retry.base_delay = Duration::from_millis(base_delay_ms);
        }

        if let Some(max_delay_ms) = read_var("BREAKWATER_MAX_DELAY_MS")? {
            config.retry.max_delay = Duration::from_millis(max_delay_ms);
        }

        if let Some(failure_threshold) = read_var("BREAKWATER_FAILURE_THRESHOLD")? {
            config.breaker.failure_threshold = failure_threshold;
        }

        if let Some(recovery_secs) = read_var("BREAKWATER_RECOVERY_WINDOW_SECS")? {
            config.breaker.recovery_window = Duration::from_secs(recovery_secs);
        }

        if let Some(max_requests) = read_var("BREAKWATER_RATE_LIMIT_MAX_REQUESTS")? {
            config.rate_limit.max_requests = max_requests;
        }

        if let Some(window_secs) = read_var("BREAKWATER_RATE_LIMIT_WINDOW_SECS")? {
            config.rate_limit.window = Duration::from_secs(window_secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate all component configurations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry
            .validate()
            .map_err(|message| ConfigError::invalid("retry policy", message))?;
        self.breaker
            .validate()
            .map_err(|message| ConfigError::invalid("circuit breaker", message))?;
        self.rate_limit
            .validate()
            .map_err(|message| ConfigError::invalid("rate limit quota", message))?;
        Ok(())
    }
}

fn read_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|error| ConfigError::invalid(name, format!("{error}"))),
        Err(_) => Ok(None),
    }
}
