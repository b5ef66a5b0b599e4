//! # Sliding-Window Rate Limiter
//!
//! Bounds request volume per `(client identity, endpoint)` pair using a
//! window-aligned persisted counter. Designed to run in front of request
//! handlers: consult [`RateLimiter::check_and_consume`] and reject with a
//! 429-shaped response when the decision is not allowed.
//!
//! The counter read-then-write sequence is deliberately not a single
//! transaction: under a heavy concurrent burst from one identifier a few
//! requests may slip past the limit. That minor overcounting is an
//! accepted trade-off for keeping the store interaction simple; do not
//! "fix" it with heavier locking unless a concrete abuse scenario
//! demands it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::rate_limit::store::{RateLimitCounter, RateLimitStore, RateLimitStoreError};

/// Request budget for one endpoint class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitQuota {
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window length
    pub window: Duration,
}

impl RateLimitQuota {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// General API endpoints: 100 requests per 15 minutes.
    pub fn api() -> Self {
        Self::new(100, Duration::from_secs(15 * 60))
    }

    /// Authentication attempts: 5 per 15 minutes.
    pub fn auth() -> Self {
        Self::new(5, Duration::from_secs(15 * 60))
    }

    /// Contact form submissions: 3 per hour.
    pub fn contact_form() -> Self {
        Self::new(3, Duration::from_secs(60 * 60))
    }

    /// Newsletter signups: 5 per hour.
    pub fn newsletter() -> Self {
        Self::new(5, Duration::from_secs(60 * 60))
    }

    /// Model-inference chat requests: 10 per minute.
    pub fn ai_chat() -> Self {
        Self::new(10, Duration::from_secs(60))
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_requests == 0 {
            return Err("max_requests must be greater than 0".to_string());
        }

        if self.window.is_zero() {
            return Err("window must be greater than 0".to_string());
        }

        Ok(())
    }

    fn chrono_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.window).unwrap_or_else(|_| chrono::Duration::seconds(60))
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window after this one
    pub remaining: u32,
    /// When the current window ends and the budget refills
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Retry-after hint for a 429 response, measured from `now`.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        self.reset_at
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Sliding-window request counter backed by a shared persistent store.
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Check the budget for `(identifier, endpoint)` and consume one
    /// request from it if allowed.
    ///
    /// Fails open: when the store is unreachable the request is allowed
    /// and the outage is logged, so legitimate traffic is never blocked
    /// on an infrastructure incident.
    pub async fn check_and_consume(
        &self,
        identifier: &str,
        endpoint: &str,
        quota: &RateLimitQuota,
    ) -> RateLimitDecision {
        let now = Utc::now();
        match self.check_inner(identifier, endpoint, quota, now).await {
            Ok(decision) => decision,
            Err(error) => {
                warn!(
                    identifier = identifier,
                    endpoint = endpoint,
                    error = %error,
                    "rate limit store unavailable, failing open"
                );
                RateLimitDecision {
                    allowed: true,
                    remaining: quota.max_requests.saturating_sub(1),
                    reset_at: now + quota.chrono_window(),
                }
            }
        }
    }

    async fn check_inner(
        &self,
        identifier: &str,
        endpoint: &str,
        quota: &RateLimitQuota,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        let window = quota.chrono_window();
        let stale_before = now - window;

        // Opportunistic housekeeping; correctness does not depend on it
        // since stale counters are re-validated below.
        match self.store.delete_older_than(stale_before).await {
            Ok(removed) if removed > 0 => {
                debug!(removed = removed, "garbage-collected stale rate limit rows");
            }
            Ok(_) => {}
            Err(error) => {
                debug!(error = %error, "rate limit garbage collection failed");
            }
        }

        let existing = self.store.find(identifier, endpoint).await?;

        let counter = match existing {
            None => {
                let counter = RateLimitCounter {
                    identifier: identifier.to_string(),
                    endpoint: endpoint.to_string(),
                    request_count: 1,
                    window_start: now,
                };
                self.store.create(counter).await?;
                return Ok(RateLimitDecision {
                    allowed: true,
                    remaining: quota.max_requests.saturating_sub(1),
                    reset_at: now + window,
                });
            }
            Some(counter) => counter,
        };

        // A counter from a previous window is stale; reset it before
        // trusting it.
        if now.signed_duration_since(counter.window_start) >= window {
            let reset = RateLimitCounter {
                request_count: 1,
                window_start: now,
                ..counter
            };
            self.store.update(&reset).await?;
            return Ok(RateLimitDecision {
                allowed: true,
                remaining: quota.max_requests.saturating_sub(1),
                reset_at: now + window,
            });
        }

        let reset_at = counter.window_start + window;

        if counter.request_count >= quota.max_requests as i32 {
            // Denied requests do not consume budget.
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at,
            });
        }

        let consumed = RateLimitCounter {
            request_count: counter.request_count + 1,
            ..counter
        };
        self.store.update(&consumed).await?;

        Ok(RateLimitDecision {
            allowed: true,
            remaining: quota.max_requests.saturating_sub(consumed.request_count as u32),
            reset_at,
        })
    }

    /// Clear the counter for one key (e.g. after a successful login to
    /// forgive failed attempts).
    pub async fn reset(&self, identifier: &str, endpoint: &str) {
        if let Err(error) = self.store.delete(identifier, endpoint).await {
            warn!(
                identifier = identifier,
                endpoint = endpoint,
                error = %error,
                "failed to reset rate limit counter"
            );
        }
    }
}
