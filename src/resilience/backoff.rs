//! # Backoff Calculation
//!
//! Pure delay computation for the retry orchestrator: exponential growth
//! capped at the policy maximum, with optional ±25% jitter. Also handles
//! server-requested backoff, where a collaborator's `Retry-After` value
//! (seconds or an HTTP-date) overrides the computed delay.
//!
//! Multiplicative backoff spreads retry pressure over time as failures
//! persist; jitter desynchronizes concurrent callers hitting the same
//! dependency.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{ServiceError, RETRY_AFTER_METADATA_KEY};
use crate::resilience::config::RetryPolicy;

/// Fraction of the computed delay the jitter may add or remove.
const JITTER_FACTOR: f64 = 0.25;

/// Delay to wait before the next attempt, for a 1-indexed `attempt`.
///
/// `delay_for_attempt(1, ..)` is the wait after the first failure:
/// `base_delay * multiplier^0`, so the base delay itself. The result is
/// capped at `max_delay` before jitter is applied and clamped at zero
/// after.
pub fn delay_for_attempt(attempt: u32, policy: &RetryPolicy) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let uncapped =
        policy.base_delay.as_secs_f64() * policy.backoff_multiplier.powi(exponent as i32);
    let capped = uncapped.min(policy.max_delay.as_secs_f64());

    let delayed_secs = if policy.jitter {
        apply_jitter(capped)
    } else {
        capped
    };

    Duration::from_secs_f64(delayed_secs.max(0.0))
}

/// Perturb a delay by `uniform(-0.25 * d, +0.25 * d)`.
fn apply_jitter(delay_secs: f64) -> f64 {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let jitter: f64 = rng.gen_range(-JITTER_FACTOR..=JITTER_FACTOR);
    delay_secs + delay_secs * jitter
}

/// Server-requested delay carried on a classified error, if any.
///
/// Reads the [`RETRY_AFTER_METADATA_KEY`] metadata entry and accepts the
/// two formats collaborators see on the wire: integer seconds, or an
/// RFC 2822 HTTP-date. The result is capped at the policy's `max_delay`;
/// a date in the past yields `None`.
pub fn retry_after_hint(error: &ServiceError, policy: &RetryPolicy) -> Option<Duration> {
    let value = error.metadata().get(RETRY_AFTER_METADATA_KEY)?;

    let seconds = match value {
        serde_json::Value::Number(number) => number.as_u64(),
        serde_json::Value::String(text) => parse_retry_after_text(text),
        _ => None,
    }?;

    Some(Duration::from_secs(seconds).min(policy.max_delay))
}

fn parse_retry_after_text(text: &str) -> Option<u64> {
    if let Ok(seconds) = text.trim().parse::<u64>() {
        return Some(seconds);
    }

    let date = DateTime::parse_from_rfc2822(text.trim()).ok()?;
    let remaining = date.signed_duration_since(Utc::now()).num_seconds();
    if remaining > 0 {
        Some(remaining as u64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    fn policy_without_jitter() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: false,
            retryable_kinds: None,
        }
    }

    #[test]
    fn test_exponential_growth_and_cap() {
        let policy = policy_without_jitter();

        assert_eq!(delay_for_attempt(1, &policy), Duration::from_millis(100));
        assert_eq!(delay_for_attempt(2, &policy), Duration::from_millis(200));
        assert_eq!(delay_for_attempt(3, &policy), Duration::from_millis(400));
        assert_eq!(delay_for_attempt(4, &policy), Duration::from_millis(800));
        assert_eq!(delay_for_attempt(5, &policy), Duration::from_millis(1600));
        // Capped from 3200ms.
        assert_eq!(delay_for_attempt(6, &policy), Duration::from_secs(2));
        assert_eq!(delay_for_attempt(12, &policy), Duration::from_secs(2));
    }

    #[test]
    fn test_monotonic_without_jitter() {
        let policy = policy_without_jitter();
        let mut previous = Duration::ZERO;
        for attempt in 1..=10 {
            let delay = delay_for_attempt(attempt, &policy);
            assert!(delay >= previous, "attempt {attempt} regressed");
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_stays_within_quarter_band() {
        let policy = RetryPolicy {
            jitter: true,
            ..policy_without_jitter()
        };
        let base = Duration::from_millis(400); // attempt 3 without jitter
        let lower = base.mul_f64(0.75);
        let upper = base.mul_f64(1.25);

        for _ in 0..1000 {
            let delay = delay_for_attempt(3, &policy);
            assert!(
                delay >= lower && delay <= upper,
                "jittered delay {delay:?} outside [{lower:?}, {upper:?}]"
            );
        }
    }

    proptest! {
        #[test]
        fn prop_delay_never_exceeds_cap(attempt in 1u32..32) {
            let policy = RetryPolicy { jitter: true, ..policy_without_jitter() };
            let delay = delay_for_attempt(attempt, &policy);
            // Jitter may push a capped delay up by 25% at most.
            prop_assert!(delay <= policy.max_delay.mul_f64(1.0 + 0.25));
        }
    }

    #[test]
    fn test_retry_after_integer_seconds() {
        let policy = policy_without_jitter();
        let error = ServiceError::new(ErrorKind::RateLimit, "ai-service", "chat", "slow down")
            .with_metadata(RETRY_AFTER_METADATA_KEY, 1);
        assert_eq!(
            retry_after_hint(&error, &policy),
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_retry_after_string_seconds_capped() {
        let policy = policy_without_jitter();
        let error = ServiceError::new(ErrorKind::RateLimit, "ai-service", "chat", "slow down")
            .with_metadata(RETRY_AFTER_METADATA_KEY, "120");
        // 120s capped at the 2s max_delay.
        assert_eq!(
            retry_after_hint(&error, &policy),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_retry_after_http_date() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(600),
            ..policy_without_jitter()
        };
        let future = (Utc::now() + chrono::Duration::seconds(90)).to_rfc2822();
        let error = ServiceError::new(ErrorKind::RateLimit, "crm", "sync", "slow down")
            .with_metadata(RETRY_AFTER_METADATA_KEY, future);
        let hint = retry_after_hint(&error, &policy).expect("hint expected");
        assert!(hint >= Duration::from_secs(85) && hint <= Duration::from_secs(90));
    }

    #[test]
    fn test_retry_after_absent_or_stale() {
        let policy = policy_without_jitter();

        let plain = ServiceError::new(ErrorKind::RateLimit, "crm", "sync", "slow down");
        assert_eq!(retry_after_hint(&plain, &policy), None);

        let past = (Utc::now() - chrono::Duration::seconds(30)).to_rfc2822();
        let stale = ServiceError::new(ErrorKind::RateLimit, "crm", "sync", "slow down")
            .with_metadata(RETRY_AFTER_METADATA_KEY, past);
        assert_eq!(retry_after_hint(&stale, &policy), None);
    }
}
