//! # Retry Orchestrator
//!
//! Runs an arbitrary asynchronous operation with bounded retries,
//! composing the error classifier, the backoff policy, and the circuit
//! breaker registry. The orchestrator is stateless per call: many calls
//! may run concurrently, sharing only the breaker map. Retries of one
//! logical call are strictly sequential; the only suspension point is the
//! non-blocking backoff sleep between attempts.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::classifier::ErrorClassifier;
use crate::error::{RawError, Result, ServiceError};
use crate::resilience::backoff::{delay_for_attempt, retry_after_hint};
use crate::resilience::config::RetryPolicy;
use crate::resilience::manager::{breaker_key, CircuitBreakerManager};

/// Executes operations against unreliable collaborators with retries,
/// backoff, and circuit breaking.
///
/// Construct one per process (sharing the classifier and breaker
/// registry) and hand it to callers via `Arc`.
pub struct RetryExecutor {
    classifier: Arc<ErrorClassifier>,
    breakers: CircuitBreakerManager,
    default_policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(classifier: Arc<ErrorClassifier>, breakers: CircuitBreakerManager) -> Self {
        Self {
            classifier,
            breakers,
            default_policy: RetryPolicy::default(),
        }
    }

    /// Replace the policy used when a call-site does not supply one.
    pub fn with_default_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn classifier(&self) -> &Arc<ErrorClassifier> {
        &self.classifier
    }

    pub fn breakers(&self) -> &CircuitBreakerManager {
        &self.breakers
    }

    pub fn default_policy(&self) -> &RetryPolicy {
        &self.default_policy
    }

    /// Guarded call with the default policy and a `service:operation`
    /// breaker key.
    pub async fn execute<T, E, F, Fut>(&self, service: &str, operation: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<RawError>,
    {
        let policy = self.default_policy.clone();
        let key = breaker_key(service, operation);
        self.run(service, operation, &policy, Some(&key), None, op)
            .await
    }

    /// Guarded call with an explicit policy.
    pub async fn execute_with_policy<T, E, F, Fut>(
        &self,
        service: &str,
        operation: &str,
        policy: &RetryPolicy,
        op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<RawError>,
    {
        let key = breaker_key(service, operation);
        self.run(service, operation, policy, Some(&key), None, op)
            .await
    }

    /// Retry without consulting any circuit breaker.
    pub async fn execute_without_breaker<T, E, F, Fut>(
        &self,
        service: &str,
        operation: &str,
        policy: &RetryPolicy,
        op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<RawError>,
    {
        self.run(service, operation, policy, None, None, op).await
    }

    /// Guarded call that observes a cancellation token before every
    /// attempt and during backoff waits.
    pub async fn execute_with_cancellation<T, E, F, Fut>(
        &self,
        service: &str,
        operation: &str,
        policy: &RetryPolicy,
        cancellation: &CancellationToken,
        op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<RawError>,
    {
        let key = breaker_key(service, operation);
        self.run(service, operation, policy, Some(&key), Some(cancellation), op)
            .await
    }

    async fn run<T, E, F, Fut>(
        &self,
        service: &str,
        operation: &str,
        policy: &RetryPolicy,
        breaker: Option<&str>,
        cancellation: Option<&CancellationToken>,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<RawError>,
    {
        let started = Instant::now();
        let mut attempt: u32 = 1;

        loop {
            if let Some(key) = breaker {
                let circuit = self.breakers.get_breaker(key).await;
                if !circuit.can_execute() {
                    // Fail fast without invoking the operation. Routed
                    // through the classifier so the short-circuit shows up
                    // in counters and the observability sink.
                    let error = ServiceError::circuit_open(service, operation, key);
                    return Err(self.classifier.classify(Box::new(error), service, operation));
                }
            }

            if let Some(token) = cancellation {
                if token.is_cancelled() {
                    return Err(ServiceError::cancelled(service, operation));
                }
            }

            match op().await {
                Ok(value) => {
                    if let Some(key) = breaker {
                        self.breakers.get_breaker(key).await.on_success();
                    }
                    if attempt > 1 {
                        debug!(
                            service = service,
                            operation = operation,
                            attempts = attempt,
                            "operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(raw) => {
                    let classified = self.classifier.classify(raw.into(), service, operation);

                    if let Some(key) = breaker {
                        self.breakers.get_breaker(key).await.on_failure();
                    }

                    let out_of_budget = attempt >= policy.max_attempts;
                    let retryable =
                        policy.should_retry(classified.kind(), classified.retryable());

                    if out_of_budget || !retryable {
                        if out_of_budget && retryable {
                            warn!(
                                service = service,
                                operation = operation,
                                attempts = attempt,
                                "retry budget exhausted"
                            );
                        }
                        let elapsed_ms = started.elapsed().as_millis() as u64;
                        return Err(classified.annotate_attempts(attempt, elapsed_ms));
                    }

                    let delay = retry_after_hint(&classified, policy)
                        .unwrap_or_else(|| delay_for_attempt(attempt, policy));

                    warn!(
                        service = service,
                        operation = operation,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        kind = classified.kind().as_str(),
                        "attempt failed, backing off"
                    );

                    match cancellation {
                        Some(token) => {
                            tokio::select! {
                                () = tokio::time::sleep(delay) => {}
                                () = token.cancelled() => {
                                    return Err(ServiceError::cancelled(service, operation));
                                }
                            }
                        }
                        None => tokio::time::sleep(delay).await,
                    }

                    attempt += 1;
                }
            }
        }
    }
}

/// Wrap a zero-argument async operation into a retry-guarded,
/// circuit-broken version with the same signature.
///
/// The breaker key is `service:operation`; `policy` falls back to the
/// executor's default when `None`. Each invocation of the returned
/// closure runs a full guarded call.
pub fn with_resilience<T, E, F, Fut>(
    executor: Arc<RetryExecutor>,
    service: impl Into<String>,
    operation: impl Into<String>,
    policy: Option<RetryPolicy>,
    op: F,
) -> impl Fn() -> BoxFuture<'static, Result<T>>
where
    T: Send + 'static,
    E: Into<RawError> + Send + 'static,
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
{
    let service = service.into();
    let operation = operation.into();

    move || {
        let executor = Arc::clone(&executor);
        let service = service.clone();
        let operation = operation.clone();
        let policy = policy.clone();
        let op = op.clone();

        async move {
            let policy = policy.unwrap_or_else(|| executor.default_policy().clone());
            executor
                .execute_with_policy(&service, &operation, &policy, op)
                .await
        }
        .boxed()
    }
}
