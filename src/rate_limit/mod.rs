//! # Rate Limiting Module
//!
//! Protects the system's own endpoints from abusive call volume with a
//! window-aligned request counter per `(client identity, endpoint)`,
//! persisted in a shared store so every process enforces the same budget.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use breakwater::rate_limit::{
//!     client_identifier, InMemoryRateLimitStore, RateLimiter, RateLimitQuota,
//! };
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(Arc::new(InMemoryRateLimitStore::new()));
//! let identity = client_identifier(None, None, &[("x-forwarded-for", "203.0.113.7")]);
//!
//! let decision = limiter
//!     .check_and_consume(&identity, "/api/contact", &RateLimitQuota::contact_form())
//!     .await;
//! if !decision.allowed {
//!     // Reject with 429, Retry-After: decision.retry_after(chrono::Utc::now())
//! }
//! # }
//! ```

pub mod identity;
pub mod limiter;
pub mod store;

pub use identity::{client_identifier, forwarded_address, UNKNOWN_IDENTIFIER};
pub use limiter::{RateLimitDecision, RateLimitQuota, RateLimiter};
pub use store::{
    InMemoryRateLimitStore, PgRateLimitStore, RateLimitCounter, RateLimitStore,
    RateLimitStoreError,
};
