//! # Observability Sink
//!
//! Interface between this layer and whatever monitoring backend the host
//! application uses. The crate never depends on a specific backend: it
//! emits structured [`EventRecord`]s through the [`ObservabilitySink`]
//! trait and keeps in-process per-kind error counters for dashboards and
//! tests. A sink that is down must never affect call outcomes.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ServiceError};

/// Severity attached to a forwarded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Structured record forwarded to the monitoring backend.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    /// Classified kind, when the event concerns a failure
    pub kind: Option<ErrorKind>,
    /// Collaborator that was being called
    pub service: String,
    /// Operation that was in flight
    pub operation: String,
    pub message: String,
    pub status_code: Option<u16>,
    pub retryable: Option<bool>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub severity: Severity,
}

impl EventRecord {
    /// Build a record from a classified error.
    pub fn from_error(error: &ServiceError, severity: Severity) -> Self {
        Self {
            kind: Some(error.kind()),
            service: error.service().to_string(),
            operation: error.operation().to_string(),
            message: error.message().to_string(),
            status_code: error.status_code(),
            retryable: Some(error.retryable()),
            metadata: error.metadata().clone(),
            severity,
        }
    }
}

/// Collaborator accepting structured error/event records for logging and
/// alerting.
///
/// Implementations must not panic: a failing backend is the exact
/// situation this layer exists to survive, so `record` is infallible at
/// the call site and the caller additionally isolates panics.
pub trait ObservabilitySink: Send + Sync {
    fn record(&self, event: EventRecord);
}

/// Default sink: emits the record as a structured tracing event.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn record(&self, event: EventRecord) {
        let kind = event.kind.map(|kind| kind.as_str()).unwrap_or("none");
        match event.severity {
            Severity::Error => tracing::error!(
                kind = kind,
                service = %event.service,
                operation = %event.operation,
                status_code = event.status_code,
                retryable = event.retryable,
                message = %event.message,
                "service event"
            ),
            Severity::Warning => tracing::warn!(
                kind = kind,
                service = %event.service,
                operation = %event.operation,
                status_code = event.status_code,
                retryable = event.retryable,
                message = %event.message,
                "service event"
            ),
            Severity::Info => tracing::info!(
                kind = kind,
                service = %event.service,
                operation = %event.operation,
                message = %event.message,
                "service event"
            ),
            Severity::Debug => tracing::debug!(
                kind = kind,
                service = %event.service,
                operation = %event.operation,
                message = %event.message,
                "service event"
            ),
        }
    }
}

/// Sink that drops everything. Useful in tests asserting on outcomes
/// rather than telemetry.
#[derive(Debug, Default)]
pub struct NullSink;

impl ObservabilitySink for NullSink {
    fn record(&self, _event: EventRecord) {}
}

/// Forward a record to a sink, isolating the caller from a misbehaving
/// implementation. A panicking sink is logged and otherwise ignored.
pub(crate) fn record_safely(sink: &dyn ObservabilitySink, event: EventRecord) {
    let outcome = catch_unwind(AssertUnwindSafe(|| sink.record(event)));
    if outcome.is_err() {
        tracing::debug!("observability sink panicked; event dropped");
    }
}

/// Aggregate counts of classified errors by kind.
///
/// Cheap enough to update on every classification; read by dashboards and
/// tests through [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct ErrorKindCounters {
    counts: RwLock<HashMap<ErrorKind, u64>>,
}

impl ErrorKindCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, kind: ErrorKind) {
        let mut counts = self.counts.write();
        *counts.entry(kind).or_insert(0) += 1;
    }

    /// Count for a single kind.
    pub fn count(&self, kind: ErrorKind) -> u64 {
        self.counts.read().get(&kind).copied().unwrap_or(0)
    }

    /// Copy of all non-zero counters.
    pub fn snapshot(&self) -> HashMap<ErrorKind, u64> {
        self.counts.read().clone()
    }

    /// Total classified errors across all kinds.
    pub fn total(&self) -> u64 {
        self.counts.read().values().sum()
    }
}
