//! # Circuit Breaker Registry
//!
//! Holds the per-key breakers for a process. The registry is an
//! explicitly constructed object handed to callers (or cloned — clones
//! share the same underlying map), never a module-level singleton, so
//! tests can build isolated instances per case.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitState};
use crate::resilience::config::CircuitBreakerConfig;

/// Build the conventional `service:operation` breaker key.
pub fn breaker_key(service: &str, operation: &str) -> String {
    format!("{service}:{operation}")
}

/// Registry of circuit breakers keyed by `service:operation`.
#[derive(Debug)]
pub struct CircuitBreakerManager {
    breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,
    default_config: CircuitBreakerConfig,
    /// Per-key config overrides, applied when the breaker is first created
    overrides: HashMap<String, CircuitBreakerConfig>,
    /// Soft cap; exceeding it logs a warning but still creates the breaker
    max_breakers: usize,
}

impl CircuitBreakerManager {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: Arc::new(RwLock::new(HashMap::new())),
            default_config,
            overrides: HashMap::new(),
            max_breakers: 100,
        }
    }

    /// Registry with the default external-API configuration.
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Register a per-key configuration override. Applies to breakers
    /// created after this call; existing instances keep their config.
    pub fn with_override(mut self, key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(key.into(), config);
        self
    }

    pub fn with_max_breakers(mut self, max_breakers: usize) -> Self {
        self.max_breakers = max_breakers;
        self
    }

    /// Get or create the breaker for a key.
    pub async fn get_breaker(&self, key: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().await;
            if let Some(breaker) = breakers.get(key) {
                return Arc::clone(breaker);
            }
        }

        let mut breakers = self.breakers.write().await;

        // Another task may have created it between the locks.
        if let Some(breaker) = breakers.get(key) {
            return Arc::clone(breaker);
        }

        if breakers.len() >= self.max_breakers {
            warn!(
                breaker = key,
                current_count = breakers.len(),
                max_allowed = self.max_breakers,
                "circuit breaker count exceeds configured maximum"
            );
        }

        let config = self
            .overrides
            .get(key)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone());
        let breaker = Arc::new(CircuitBreaker::new(key.to_string(), config));
        breakers.insert(key.to_string(), Arc::clone(&breaker));

        info!(
            breaker = key,
            total_breakers = breakers.len(),
            "created circuit breaker"
        );

        breaker
    }

    /// All breaker keys currently registered.
    pub async fn list_keys(&self) -> Vec<String> {
        self.breakers.read().await.keys().cloned().collect()
    }

    /// Stats snapshot for one key, if a breaker exists for it.
    pub async fn stats_for(&self, key: &str) -> Option<CircuitBreakerStats> {
        let breakers = self.breakers.read().await;
        breakers.get(key).map(|breaker| breaker.stats())
    }

    /// Count of breakers per state.
    pub async fn state_summary(&self) -> HashMap<CircuitState, usize> {
        let breakers = self.breakers.read().await;
        let mut summary = HashMap::new();
        for breaker in breakers.values() {
            *summary.entry(breaker.state()).or_insert(0) += 1;
        }
        summary
    }

    /// Fraction of breakers currently closed, 1.0 when none exist.
    pub async fn health_score(&self) -> f64 {
        let breakers = self.breakers.read().await;
        if breakers.is_empty() {
            return 1.0;
        }

        let closed = breakers
            .values()
            .filter(|breaker| breaker.state() == CircuitState::Closed)
            .count();
        closed as f64 / breakers.len() as f64
    }

    /// Force every breaker open (emergency stop).
    pub async fn force_open_all(&self) {
        warn!("forcing all circuit breakers open");
        let breakers = self.breakers.read().await;
        for breaker in breakers.values() {
            breaker.force_open();
        }
    }

    /// Force every breaker closed (emergency recovery).
    pub async fn force_close_all(&self) {
        warn!("forcing all circuit breakers closed");
        let breakers = self.breakers.read().await;
        for breaker in breakers.values() {
            breaker.force_closed();
        }
    }

    /// Drop the breaker for a key. Returns whether one existed.
    pub async fn remove(&self, key: &str) -> bool {
        let mut breakers = self.breakers.write().await;
        breakers.remove(key).is_some()
    }
}

impl Clone for CircuitBreakerManager {
    fn clone(&self) -> Self {
        Self {
            breakers: Arc::clone(&self.breakers),
            default_config: self.default_config.clone(),
            overrides: self.overrides.clone(),
            max_breakers: self.max_breakers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_breaker_key_format() {
        assert_eq!(breaker_key("email", "send"), "email:send");
    }

    #[tokio::test]
    async fn test_get_or_create_returns_shared_instance() {
        let manager = CircuitBreakerManager::with_defaults();

        let first = manager.get_breaker("email:send").await;
        let second = manager.get_breaker("email:send").await;
        assert!(Arc::ptr_eq(&first, &second));

        let keys = manager.list_keys().await;
        assert_eq!(keys, vec!["email:send".to_string()]);
    }

    #[tokio::test]
    async fn test_override_applies_on_creation() {
        let manager = CircuitBreakerManager::with_defaults().with_override(
            "ai-service:chat",
            CircuitBreakerConfig {
                failure_threshold: 1,
                recovery_window: Duration::from_secs(5),
            },
        );

        let breaker = manager.get_breaker("ai-service:chat").await;
        breaker.on_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // Other keys keep the default threshold.
        let other = manager.get_breaker("crm:sync").await;
        other.on_failure();
        assert_eq!(other.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_state_summary_and_health_score() {
        let manager = CircuitBreakerManager::with_defaults();
        assert_eq!(manager.health_score().await, 1.0);

        let healthy = manager.get_breaker("storage:get").await;
        let failing = manager.get_breaker("video:upload").await;
        healthy.on_success();
        failing.force_open();

        let summary = manager.state_summary().await;
        assert_eq!(summary.get(&CircuitState::Closed), Some(&1));
        assert_eq!(summary.get(&CircuitState::Open), Some(&1));
        assert_eq!(manager.health_score().await, 0.5);
    }

    #[tokio::test]
    async fn test_clone_shares_breakers() {
        let manager = CircuitBreakerManager::with_defaults();
        let clone = manager.clone();

        let from_original = manager.get_breaker("email:send").await;
        let from_clone = clone.get_breaker("email:send").await;
        assert!(Arc::ptr_eq(&from_original, &from_clone));
    }

    #[tokio::test]
    async fn test_force_all_and_remove() {
        let manager = CircuitBreakerManager::with_defaults();
        let _ = manager.get_breaker("a:op").await;
        let _ = manager.get_breaker("b:op").await;

        manager.force_open_all().await;
        let summary = manager.state_summary().await;
        assert_eq!(summary.get(&CircuitState::Open), Some(&2));

        manager.force_close_all().await;
        assert_eq!(manager.health_score().await, 1.0);

        assert!(manager.remove("a:op").await);
        assert!(!manager.remove("a:op").await);
        assert_eq!(manager.list_keys().await.len(), 1);
    }
}
