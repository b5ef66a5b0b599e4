//! # Resilience Module
//!
//! Fault tolerance for calls to unreliable collaborators: bounded retries
//! with exponential backoff, and per-key circuit breakers that stop
//! hammering a dependency observed to be down.
//!
//! ## Architecture
//!
//! - **Backoff**: pure delay computation (exponential, capped, jittered)
//! - **Circuit breakers**: atomic per-key state machines behind an
//!   explicitly constructed registry
//! - **Retry orchestrator**: composes the classifier, backoff, and
//!   breakers around an arbitrary async operation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use breakwater::classifier::ErrorClassifier;
//! use breakwater::resilience::{CircuitBreakerManager, RetryExecutor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = RetryExecutor::new(
//!     Arc::new(ErrorClassifier::with_tracing_sink()),
//!     CircuitBreakerManager::with_defaults(),
//! );
//!
//! let answer = executor
//!     .execute("ai-service", "chat", || async {
//!         // Remote call here
//!         Ok::<_, std::io::Error>("pong")
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod retry;

pub use backoff::{delay_for_attempt, retry_after_hint};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitState};
pub use config::{CircuitBreakerConfig, RetryPolicy};
pub use manager::{breaker_key, CircuitBreakerManager};
pub use retry::{with_resilience, RetryExecutor};
