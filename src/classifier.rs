//! # Error Classifier
//!
//! Maps raw failures from collaborator calls into typed [`ServiceError`]s
//! through an ordered chain of classification rules. Each rule is a typed
//! predicate over the concrete error (downcast, not property probing);
//! the first rule that recognizes the failure wins. Callers can prepend
//! their own rules to cover collaborator-specific error types.
//!
//! Classification always has two side effects, neither of which can fail
//! from the caller's perspective: a structured tracing record, and a
//! forward to the configured [`ObservabilitySink`].

use std::error::Error as StdError;
use std::sync::Arc;

use crate::error::{ErrorKind, RawError, ServiceError, StatusError};
use crate::observability::{
    record_safely, ErrorKindCounters, EventRecord, ObservabilitySink, Severity, TracingSink,
};

/// Verdict produced by a single rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub status_code: Option<u16>,
}

impl Classification {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            retryable: kind.default_retryable(),
            status_code: None,
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

/// A single typed predicate→classification rule.
///
/// Returns `None` when the rule does not recognize the failure, letting
/// the chain fall through to the next rule.
pub trait ClassificationRule: Send + Sync {
    fn classify(&self, raw: &(dyn StdError + Send + Sync + 'static)) -> Option<Classification>;
}

/// Connection-level and timeout conditions surfaced as `std::io::Error`.
struct IoErrorRule;

impl ClassificationRule for IoErrorRule {
    fn classify(&self, raw: &(dyn StdError + Send + Sync + 'static)) -> Option<Classification> {
        let io_error = raw.downcast_ref::<std::io::Error>()?;
        use std::io::ErrorKind as IoKind;
        match io_error.kind() {
            IoKind::ConnectionRefused
            | IoKind::ConnectionReset
            | IoKind::ConnectionAborted
            | IoKind::NotConnected
            | IoKind::BrokenPipe
            | IoKind::AddrNotAvailable => Some(Classification::new(ErrorKind::Network)),
            IoKind::TimedOut | IoKind::WouldBlock => Some(Classification::new(ErrorKind::Timeout)),
            _ => None,
        }
    }
}

/// Transport status codes carried by a [`StatusError`].
struct StatusCodeRule;

impl StatusCodeRule {
    fn map_status(status: u16) -> Option<Classification> {
        match status {
            401 => Some(Classification::new(ErrorKind::Authentication).with_status_code(401)),
            403 => Some(Classification::new(ErrorKind::Authorization).with_status_code(403)),
            408 => Some(Classification::new(ErrorKind::Timeout).with_status_code(408)),
            429 => Some(Classification::new(ErrorKind::RateLimit).with_status_code(429)),
            status if status >= 500 => {
                Some(Classification::new(ErrorKind::ExternalService).with_status_code(status))
            }
            _ => None,
        }
    }
}

impl ClassificationRule for StatusCodeRule {
    fn classify(&self, raw: &(dyn StdError + Send + Sync + 'static)) -> Option<Classification> {
        let status_error = raw.downcast_ref::<StatusError>()?;
        Self::map_status(status_error.status)
    }
}

/// Last-resort message inspection for failures with no typed shape.
struct MessageHeuristicRule;

impl ClassificationRule for MessageHeuristicRule {
    fn classify(&self, raw: &(dyn StdError + Send + Sync + 'static)) -> Option<Classification> {
        let message = raw.to_string().to_lowercase();
        if message.contains("timeout") {
            Some(Classification::new(ErrorKind::Timeout))
        } else if message.contains("rate limit") {
            Some(Classification::new(ErrorKind::RateLimit))
        } else if message.contains("network") || message.contains("connection") {
            Some(Classification::new(ErrorKind::Network))
        } else {
            None
        }
    }
}

/// The classifier: an ordered rule chain plus the observability wiring.
///
/// Construct one per process (or per test) and share it via `Arc`; it is
/// internally synchronized.
pub struct ErrorClassifier {
    rules: Vec<Box<dyn ClassificationRule>>,
    sink: Arc<dyn ObservabilitySink>,
    counters: ErrorKindCounters,
}

impl ErrorClassifier {
    /// Classifier with the default rule chain, reporting to the given
    /// sink.
    pub fn new(sink: Arc<dyn ObservabilitySink>) -> Self {
        Self {
            rules: vec![
                Box::new(IoErrorRule),
                Box::new(StatusCodeRule),
                Box::new(MessageHeuristicRule),
            ],
            sink,
            counters: ErrorKindCounters::new(),
        }
    }

    /// Classifier reporting through tracing only.
    pub fn with_tracing_sink() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    /// Prepend a caller-supplied rule. Custom rules run before the
    /// built-in chain so collaborator-specific types win over heuristics.
    pub fn with_rule(mut self, rule: Box<dyn ClassificationRule>) -> Self {
        self.rules.insert(0, rule);
        self
    }

    /// Map a raw failure into a [`ServiceError`].
    ///
    /// A failure that already is a `ServiceError` passes through
    /// unchanged (apart from the logging side effects). Everything else
    /// walks the rule chain and defaults to a non-retryable `Unknown`.
    pub fn classify(&self, raw: RawError, service: &str, operation: &str) -> ServiceError {
        let error = match raw.downcast::<ServiceError>() {
            Ok(already_classified) => *already_classified,
            Err(raw) => self.classify_raw(raw, service, operation),
        };
        self.report(&error);
        error
    }

    fn classify_raw(&self, raw: RawError, service: &str, operation: &str) -> ServiceError {
        let message = raw.to_string();
        let classification = self
            .rules
            .iter()
            .find_map(|rule| rule.classify(raw.as_ref()))
            .unwrap_or_else(|| Classification::new(ErrorKind::Unknown));

        let mut error = ServiceError::new(classification.kind, service, operation, message)
            .with_retryable(classification.retryable)
            .with_cause(raw);
        if let Some(status) = classification.status_code {
            error = error.with_status_code(status);
        }
        error
    }

    fn report(&self, error: &ServiceError) {
        self.counters.increment(error.kind());

        tracing::error!(
            kind = error.kind().as_str(),
            service = error.service(),
            operation = error.operation(),
            status_code = error.status_code(),
            retryable = error.retryable(),
            message = error.message(),
            "classified service error"
        );

        record_safely(
            self.sink.as_ref(),
            EventRecord::from_error(error, Severity::Error),
        );
    }

    /// Aggregate per-kind counts of everything classified so far.
    pub fn counters(&self) -> &ErrorKindCounters {
        &self.counters
    }
}
