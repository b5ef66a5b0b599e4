//! # Resilience Configuration
//!
//! Immutable configuration values for the retry orchestrator and circuit
//! breakers, with validation and per-collaborator presets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Retry configuration supplied by the caller per call-site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempt budget, including the first call (>= 1)
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub base_delay: Duration,

    /// Cap applied to every computed delay
    pub max_delay: Duration,

    /// Exponential growth factor (> 1.0)
    pub backoff_multiplier: f64,

    /// Perturb each delay by up to ±25% to desynchronize concurrent
    /// retries
    pub jitter: bool,

    /// When set, only these kinds are retried; otherwise the error's own
    /// retryability verdict decides
    pub retryable_kinds: Option<Vec<ErrorKind>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
            retryable_kinds: Some(vec![
                ErrorKind::Network,
                ErrorKind::Timeout,
                ErrorKind::RateLimit,
            ]),
        }
    }
}

impl RetryPolicy {
    /// Single guarded call: no retries, no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Whether a classified error should be retried under this policy.
    ///
    /// The allow-list, when present, overrides the error's own verdict
    /// for kinds outside the list; an error that declares itself
    /// non-retryable is never retried.
    pub fn should_retry(&self, kind: ErrorKind, error_retryable: bool) -> bool {
        if !error_retryable {
            return false;
        }
        match &self.retryable_kinds {
            Some(kinds) => kinds.contains(&kind),
            None => true,
        }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }

        if self.max_attempts > 20 {
            return Err("max_attempts should not exceed 20".to_string());
        }

        if self.backoff_multiplier <= 1.0 {
            return Err("backoff_multiplier must be greater than 1.0".to_string());
        }

        if self.max_delay < self.base_delay {
            return Err("max_delay must be at least base_delay".to_string());
        }

        Ok(())
    }
}

/// Configuration for a single circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// Time to wait in the open state before allowing a trial call
    pub recovery_window: Duration,
}

impl CircuitBreakerConfig {
    /// Preset for external HTTP APIs (CRM, email, video).
    pub fn for_external_api() -> Self {
        Self {
            failure_threshold: 5,
            recovery_window: Duration::from_secs(60),
        }
    }

    /// Preset for the relational store.
    pub fn for_database() -> Self {
        Self {
            failure_threshold: 5,
            recovery_window: Duration::from_secs(30),
        }
    }

    /// Preset for model-inference providers, which recover faster but
    /// fail in bursts.
    pub fn for_ai_service() -> Self {
        Self {
            failure_threshold: 3,
            recovery_window: Duration::from_secs(45),
        }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.recovery_window.is_zero() {
            return Err("recovery_window must be greater than 0".to_string());
        }

        if self.recovery_window > Duration::from_secs(300) {
            return Err("recovery_window should not exceed 300 seconds".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_window: Duration::from_secs(60),
        }
    }
}
