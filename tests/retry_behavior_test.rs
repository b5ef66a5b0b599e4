//! Integration tests for the retry orchestrator composed with the
//! classifier and circuit breaker registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use breakwater::classifier::ErrorClassifier;
use breakwater::observability::NullSink;
use breakwater::resilience::{
    breaker_key, CircuitBreakerConfig, CircuitBreakerManager, CircuitState, RetryExecutor,
    RetryPolicy,
};
use breakwater::{ErrorKind, StatusError};
use tokio_test::assert_ok;

fn executor() -> RetryExecutor {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    RetryExecutor::new(
        Arc::new(ErrorClassifier::new(Arc::new(NullSink))),
        CircuitBreakerManager::with_defaults(),
    )
}

fn network_error() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset")
}

#[tokio::test]
async fn test_two_failures_then_success_within_expected_time() {
    let executor = executor();
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_secs(1),
        backoff_multiplier: 2.0,
        jitter: false,
        retryable_kinds: None,
    };

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_op = Arc::clone(&calls);

    let started = Instant::now();
    let result = executor
        .execute_with_policy("ai-service", "chat", &policy, move || {
            let calls = Arc::clone(&calls_in_op);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(network_error())
                } else {
                    Ok("recovered")
                }
            }
        })
        .await;
    let elapsed = started.elapsed();

    assert_eq!(assert_ok!(result), "recovered");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Two backoffs: 10ms + 20ms, plus scheduling slack.
    assert!(elapsed >= Duration::from_millis(30), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(300), "elapsed {elapsed:?}");

    let stats = executor
        .breakers()
        .stats_for(&breaker_key("ai-service", "chat"))
        .await
        .expect("breaker should exist after use");
    assert_eq!(stats.consecutive_failures, 0);
    assert_eq!(stats.state, CircuitState::Closed);
}

#[tokio::test]
async fn test_exhausted_budget_reports_last_error_with_attempt_metadata() {
    let executor = executor();
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
        retryable_kinds: None,
    };

    let result: breakwater::Result<()> = executor
        .execute_with_policy("vector-db", "query", &policy, || async {
            Err::<(), _>(StatusError::new(503, "shard unavailable"))
        })
        .await;

    let error = result.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ExternalService);
    assert_eq!(error.status_code(), Some(503));
    assert_eq!(error.metadata()["attempts"], 3);
    assert!(error.metadata().contains_key("elapsed_ms"));
    assert!(error.message().contains("shard unavailable"));
}

#[tokio::test]
async fn test_breaker_opens_through_the_executor_and_blocks_calls() {
    let breakers = CircuitBreakerManager::new(CircuitBreakerConfig {
        failure_threshold: 2,
        recovery_window: Duration::from_millis(100),
    });
    let executor = RetryExecutor::new(
        Arc::new(ErrorClassifier::new(Arc::new(NullSink))),
        breakers,
    );
    let policy = RetryPolicy {
        max_attempts: 1,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
        retryable_kinds: None,
    };

    // Two failing calls trip the breaker.
    for _ in 0..2 {
        let _: breakwater::Result<()> = executor
            .execute_with_policy("crm", "sync", &policy, || async {
                Err::<(), _>(network_error())
            })
            .await;
    }

    // The next call is short-circuited before the operation runs.
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_op = Arc::clone(&calls);
    let result: breakwater::Result<()> = executor
        .execute_with_policy("crm", "sync", &policy, move || {
            let calls = Arc::clone(&calls_in_op);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<(), std::io::Error>(())
            }
        })
        .await;

    let error = result.unwrap_err();
    assert!(error.is_circuit_open());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // After the recovery window, a successful trial closes the circuit.
    tokio::time::sleep(Duration::from_millis(120)).await;
    let result = executor
        .execute_with_policy("crm", "sync", &policy, || async {
            Ok::<_, std::io::Error>("back")
        })
        .await;
    assert_eq!(result.unwrap(), "back");

    let stats = executor
        .breakers()
        .stats_for(&breaker_key("crm", "sync"))
        .await
        .unwrap();
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.consecutive_failures, 0);
}

#[tokio::test]
async fn test_classifier_counters_visible_through_executor() {
    let executor = executor();
    let policy = RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        backoff_multiplier: 2.0,
        jitter: false,
        retryable_kinds: None,
    };

    let _: breakwater::Result<()> = executor
        .execute_with_policy("email", "send", &policy, || async {
            Err::<(), _>(network_error())
        })
        .await;

    // Both attempts were classified.
    assert_eq!(
        executor.classifier().counters().count(ErrorKind::Network),
        2
    );
}

#[tokio::test]
async fn test_concurrent_calls_share_one_breaker() {
    let executor = Arc::new(executor());
    let policy = RetryPolicy {
        max_attempts: 1,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        backoff_multiplier: 2.0,
        jitter: false,
        retryable_kinds: None,
    };

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let executor = Arc::clone(&executor);
            let policy = policy.clone();
            tokio::spawn(async move {
                let _: breakwater::Result<()> = executor
                    .execute_with_policy("storage", "put", &policy, || async {
                        Err::<(), _>(network_error())
                    })
                    .await;
            })
        })
        .collect();
    for outcome in futures::future::join_all(handles).await {
        outcome.unwrap();
    }

    let stats = executor
        .breakers()
        .stats_for(&breaker_key("storage", "put"))
        .await
        .unwrap();
    // Every failure was recorded against the same breaker.
    assert_eq!(stats.failure_count, 8);
    assert_eq!(stats.state, CircuitState::Open);
}
