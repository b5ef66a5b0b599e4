//! # Health Checks
//!
//! Lightweight probing of collaborators, for readiness endpoints and
//! dashboards. A probe is any async closure; the result records status
//! and response time without ever propagating the probe's error.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Collaborator health as seen by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Responding, but a guard (e.g. an open circuit breaker) indicates
    /// trouble. Set by callers combining probe results with breaker
    /// state.
    Degraded,
    Unhealthy,
}

/// Outcome of one health probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub service: String,
    pub status: HealthStatus,
    pub response_time: Duration,
    pub error: Option<String>,
}

impl HealthCheckResult {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Run a probe against a collaborator and time it.
pub async fn perform_health_check<T, E, F, Fut>(service: &str, check: F) -> HealthCheckResult
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let started = Instant::now();
    match check().await {
        Ok(_) => HealthCheckResult {
            service: service.to_string(),
            status: HealthStatus::Healthy,
            response_time: started.elapsed(),
            error: None,
        },
        Err(error) => HealthCheckResult {
            service: service.to_string(),
            status: HealthStatus::Unhealthy,
            response_time: started.elapsed(),
            error: Some(error.to_string()),
        },
    }
}
