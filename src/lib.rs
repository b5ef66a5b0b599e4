#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Breakwater
//!
//! Resilience and traffic-control layer for services that call unreliable
//! external dependencies (model-inference providers, storage, email,
//! video, CRM, vector search) and need to protect their own endpoints
//! from abusive call volume.
//!
//! ## Architecture
//!
//! Calls to a dependency flow through the [`resilience`] side of the
//! crate: each attempt first consults a per-key circuit breaker, failures
//! are classified into a typed [`ServiceError`], and retryable ones are
//! re-attempted after an exponential, jittered backoff. Inbound requests
//! flow through the [`rate_limit`] side: a persisted per-identity counter
//! is consulted and consumed before the request reaches a handler.
//!
//! ## Module Organization
//!
//! - [`error`] - Typed error taxonomy and the structured [`ServiceError`]
//! - [`classifier`] - Ordered rule chain mapping raw failures to kinds
//! - [`resilience`] - Backoff, circuit breakers, and the retry
//!   orchestrator
//! - [`rate_limit`] - Persisted sliding-window request counting
//! - [`observability`] - Monitoring sink trait and per-kind error
//!   counters
//! - [`health`] - Collaborator health probes
//! - [`config`] - Environment-driven configuration
//! - [`logging`] - Tracing bootstrap for embedding binaries
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use breakwater::classifier::ErrorClassifier;
//! use breakwater::resilience::{CircuitBreakerManager, RetryExecutor, RetryPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = Arc::new(RetryExecutor::new(
//!     Arc::new(ErrorClassifier::with_tracing_sink()),
//!     CircuitBreakerManager::with_defaults(),
//! ));
//!
//! let policy = RetryPolicy::default();
//! let reply = executor
//!     .execute_with_policy("ai-service", "chat", &policy, || async {
//!         // Call the provider here
//!         Ok::<_, std::io::Error>("pong")
//!     })
//!     .await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! The retry orchestrator is stateless per call; the only long-lived
//! shared mutable state is the breaker registry, which is atomics-backed
//! and safe under concurrent callers. Backoff waits use non-blocking
//! timers and observe cancellation tokens.

pub mod classifier;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod observability;
pub mod rate_limit;
pub mod resilience;

pub use classifier::{Classification, ClassificationRule, ErrorClassifier};
pub use config::{BreakwaterConfig, ConfigError};
pub use error::{ErrorKind, RawError, Result, ServiceError, StatusError};
pub use health::{perform_health_check, HealthCheckResult, HealthStatus};
pub use observability::{
    ErrorKindCounters, EventRecord, NullSink, ObservabilitySink, Severity, TracingSink,
};
pub use rate_limit::{
    client_identifier, InMemoryRateLimitStore, PgRateLimitStore, RateLimitCounter,
    RateLimitDecision, RateLimitQuota, RateLimiter, RateLimitStore,
};
pub use resilience::{
    breaker_key, with_resilience, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager,
    CircuitBreakerStats, CircuitState, RetryExecutor, RetryPolicy,
};
