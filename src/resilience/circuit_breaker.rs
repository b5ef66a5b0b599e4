//! # Circuit Breaker
//!
//! Per-key fault isolation: after a run of consecutive failures the
//! circuit opens and calls fail fast without touching the dependency,
//! until a recovery window elapses and a trial call is allowed through.
//!
//! State lives entirely in atomics so success/failure recording never
//! contends on a lock. Each process observes dependency health on its
//! own; there is no cross-process coordination.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::resilience::config::CircuitBreakerConfig;

/// Current epoch nanos from SystemTime.
#[inline]
fn epoch_nanos_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos() as u64
}

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed = 0,
    /// Failing fast, calls are rejected
    Open = 1,
    /// Recovery window elapsed, a trial call is allowed
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            // Unknown values land in the safest state.
            _ => CircuitState::Open,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => f.write_str("closed"),
            CircuitState::Open => f.write_str("open"),
            CircuitState::HalfOpen => f.write_str("half-open"),
        }
    }
}

/// Read-only snapshot of a breaker's state, for diagnostics and tests.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u64,
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// When the circuit last opened, if it is currently open
    pub opened_at: Option<SystemTime>,
    /// When the next trial call becomes permissible
    pub next_attempt_at: Option<SystemTime>,
}

/// A single circuit breaker, keyed by `service:operation` in the
/// [`CircuitBreakerManager`](crate::resilience::manager::CircuitBreakerManager).
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    /// Epoch nanos when the circuit opened (0 = not open)
    opened_at_epoch_nanos: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        debug!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            recovery_window_secs = config.recovery_window.as_secs(),
            "circuit breaker initialized"
        );

        Self {
            name,
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU64::new(0),
            total_calls: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            opened_at_epoch_nanos: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Whether a call may proceed right now.
    ///
    /// In the open state this checks the recovery window and, once it has
    /// elapsed, transitions to half-open as a side effect. Half-open
    /// always admits the call: the single-trial allowance is best-effort,
    /// and two racing callers both probing a recovering dependency is an
    /// accepted trade-off against extra locking.
    pub fn can_execute(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_nanos = self.opened_at_epoch_nanos.load(Ordering::Acquire);
                if opened_nanos == 0 {
                    warn!(breaker = %self.name, "circuit open without an opened-at timestamp");
                    return true;
                }

                let elapsed_nanos = epoch_nanos_now().saturating_sub(opened_nanos);
                if elapsed_nanos >= self.config.recovery_window.as_nanos() as u64 {
                    self.transition_to_half_open();
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    /// Record a successful call: failures reset, circuit closes.
    pub fn on_success(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);

        match self.state() {
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                // A success while open can only come from a caller that
                // was admitted before the circuit tripped; treat it as
                // recovery either way.
                self.transition_to_closed();
            }
        }
    }

    /// Record a failed call, opening the circuit once the consecutive
    /// failure threshold is reached. A failure during a half-open trial
    /// re-opens immediately and restarts the recovery window.
    pub fn on_failure(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

        match self.state() {
            CircuitState::Closed => {
                if failures >= u64::from(self.config.failure_threshold) {
                    self.transition_to_open(failures);
                }
            }
            CircuitState::HalfOpen => {
                self.transition_to_open(failures);
            }
            CircuitState::Open => {}
        }
    }

    /// Read-only snapshot for diagnostics.
    pub fn stats(&self) -> CircuitBreakerStats {
        let opened_nanos = self.opened_at_epoch_nanos.load(Ordering::Acquire);
        let opened_at = (opened_nanos > 0)
            .then(|| UNIX_EPOCH + Duration::from_nanos(opened_nanos));
        let next_attempt_at = opened_at.map(|at| at + self.config.recovery_window);

        CircuitBreakerStats {
            state: self.state(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            opened_at,
            next_attempt_at,
        }
    }

    /// Force the circuit open (emergency load-shedding).
    pub fn force_open(&self) {
        warn!(breaker = %self.name, "circuit breaker forced open");
        self.transition_to_open(self.consecutive_failures.load(Ordering::Relaxed));
    }

    /// Force the circuit closed (emergency recovery).
    pub fn force_closed(&self) {
        warn!(breaker = %self.name, "circuit breaker forced closed");
        self.transition_to_closed();
    }

    fn transition_to_closed(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.opened_at_epoch_nanos.store(0, Ordering::Release);
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);

        info!(breaker = %self.name, "circuit breaker closed (recovered)");
    }

    fn transition_to_open(&self, failures: u64) {
        self.opened_at_epoch_nanos
            .store(epoch_nanos_now(), Ordering::Release);
        self.state.store(CircuitState::Open as u8, Ordering::Release);

        warn!(
            breaker = %self.name,
            consecutive_failures = failures,
            failure_threshold = self.config.failure_threshold,
            recovery_window_secs = self.config.recovery_window.as_secs(),
            "circuit breaker opened (failing fast)"
        );
    }

    /// Open → half-open. Counters and the opened-at timestamp are left
    /// untouched until the trial call resolves one way or the other.
    fn transition_to_half_open(&self) {
        self.state
            .store(CircuitState::HalfOpen as u8, Ordering::Release);

        info!(breaker = %self.name, "circuit breaker half-open (testing recovery)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn breaker(threshold: u32, window: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test:op".to_string(),
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_window: window,
            },
        )
    }

    #[test]
    fn test_starts_closed_and_allows_calls() {
        let circuit = breaker(3, Duration::from_secs(60));
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert!(circuit.can_execute());
    }

    #[test]
    fn test_opens_after_exactly_threshold_failures() {
        let circuit = breaker(3, Duration::from_secs(60));

        circuit.on_failure();
        circuit.on_failure();
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert!(circuit.can_execute());

        circuit.on_failure();
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.can_execute());

        let stats = circuit.stats();
        assert_eq!(stats.consecutive_failures, 3);
        assert!(stats.opened_at.is_some());
        assert!(stats.next_attempt_at.is_some());
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let circuit = breaker(3, Duration::from_secs(60));

        circuit.on_failure();
        circuit.on_failure();
        circuit.on_success();
        circuit.on_failure();
        circuit.on_failure();

        // The run was broken by a success, so the circuit stays closed.
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.stats().consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_recovery_window_transitions_to_half_open() {
        let circuit = breaker(1, Duration::from_millis(50));

        circuit.on_failure();
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.can_execute());

        sleep(Duration::from_millis(60)).await;

        // The permission check itself moves the state forward.
        assert!(circuit.can_execute());
        assert_eq!(circuit.state(), CircuitState::HalfOpen);

        // Half-open keeps the failure count until the trial resolves.
        assert_eq!(circuit.stats().consecutive_failures, 1);

        circuit.on_success();
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.stats().consecutive_failures, 0);
        assert!(circuit.stats().opened_at.is_none());
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let circuit = breaker(1, Duration::from_millis(40));

        circuit.on_failure();
        sleep(Duration::from_millis(50)).await;
        assert!(circuit.can_execute());
        assert_eq!(circuit.state(), CircuitState::HalfOpen);

        circuit.on_failure();
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.can_execute());
    }

    #[test]
    fn test_force_operations() {
        let circuit = breaker(5, Duration::from_secs(60));

        circuit.force_open();
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.can_execute());

        circuit.force_closed();
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert!(circuit.can_execute());
    }

    #[test]
    fn test_stats_counters() {
        let circuit = breaker(10, Duration::from_secs(60));

        circuit.on_success();
        circuit.on_failure();
        circuit.on_success();

        let stats = circuit.stats();
        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.consecutive_failures, 0);
    }
}
