//! # Structured Error Model
//!
//! Typed failure values for calls to external collaborators. Every raw
//! failure that crosses this layer is converted into a [`ServiceError`]
//! carrying an [`ErrorKind`], the origin (`service` + `operation`), a
//! retryability verdict, and an open metadata bag for diagnostics.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Boxed raw failure as produced by arbitrary collaborators.
pub type RawError = Box<dyn StdError + Send + Sync + 'static>;

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Closed taxonomy of failure kinds.
///
/// The transport-level variants are what the classifier produces on its
/// own; the domain variants are attached by collaborator clients that
/// construct a [`ServiceError`] directly. Each kind declares its default
/// retryability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Remote side asked us to slow down (HTTP 429 or equivalent)
    RateLimit,
    /// Credentials missing or rejected (HTTP 401)
    Authentication,
    /// Credentials valid but operation forbidden (HTTP 403)
    Authorization,
    /// Connection-level failure (refused, reset, host unreachable)
    Network,
    /// Operation did not complete within its deadline
    Timeout,
    /// Request cannot succeed regardless of attempts
    Validation,
    /// Remote dependency failed (HTTP 5xx or circuit open)
    ExternalService,
    /// Relational store failure
    Database,
    /// Object/file storage failure
    FileStorage,
    /// Email delivery failure
    Email,
    /// LLM or other model-inference provider failure
    AiService,
    /// CRM integration failure
    Crm,
    /// Anything we could not classify
    Unknown,
}

impl ErrorKind {
    /// Default retryability verdict for this kind.
    ///
    /// Transient transport conditions retry; request-shaped failures
    /// (auth, validation) never do. Callers may override per error via
    /// [`ServiceError::with_retryable`].
    pub fn default_retryable(self) -> bool {
        match self {
            ErrorKind::RateLimit
            | ErrorKind::Network
            | ErrorKind::Timeout
            | ErrorKind::ExternalService
            | ErrorKind::Database => true,
            ErrorKind::Authentication
            | ErrorKind::Authorization
            | ErrorKind::Validation
            | ErrorKind::FileStorage
            | ErrorKind::Email
            | ErrorKind::AiService
            | ErrorKind::Crm
            | ErrorKind::Unknown => false,
        }
    }

    /// Stable lowercase label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Validation => "validation",
            ErrorKind::ExternalService => "external_service",
            ErrorKind::Database => "database",
            ErrorKind::FileStorage => "file_storage",
            ErrorKind::Email => "email",
            ErrorKind::AiService => "ai_service",
            ErrorKind::Crm => "crm",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata key the orchestrator reads to honor server-requested backoff.
///
/// Callers that saw a `Retry-After` header store its raw value here
/// (integer seconds or an RFC 2822 HTTP-date) before handing the error
/// back to the retry loop.
pub const RETRY_AFTER_METADATA_KEY: &str = "retry_after";

/// Metadata marker distinguishing a circuit-breaker short-circuit from an
/// ordinary failure of the same kind.
pub const CIRCUIT_OPEN_METADATA_KEY: &str = "circuit_open";

/// Metadata marker set when a call was aborted by cancellation.
pub const CANCELLED_METADATA_KEY: &str = "cancelled";

/// Structured failure value produced by the classifier (or constructed
/// directly by a collaborator client).
///
/// Constructed once at the point a raw failure is classified and treated
/// as immutable afterward: the builder methods consume `self` and are
/// meant for construction time only.
#[derive(Debug)]
pub struct ServiceError {
    kind: ErrorKind,
    service: String,
    operation: String,
    message: String,
    status_code: Option<u16>,
    retryable: bool,
    metadata: HashMap<String, serde_json::Value>,
    cause: Option<RawError>,
}

impl ServiceError {
    /// Create a new error with the kind's default retryability.
    pub fn new(
        kind: ErrorKind,
        service: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            service: service.into(),
            operation: operation.into(),
            message: message.into(),
            status_code: None,
            retryable: kind.default_retryable(),
            metadata: HashMap::new(),
            cause: None,
        }
    }

    /// Error raised when a circuit breaker short-circuits a call.
    ///
    /// Always non-retryable and tagged with [`CIRCUIT_OPEN_METADATA_KEY`]
    /// so callers can distinguish "dependency is down" from "this call
    /// failed".
    pub fn circuit_open(
        service: impl Into<String>,
        operation: impl Into<String>,
        key: &str,
    ) -> Self {
        Self::new(
            ErrorKind::ExternalService,
            service,
            operation,
            format!("circuit breaker is open for {key}"),
        )
        .with_retryable(false)
        .with_metadata(CIRCUIT_OPEN_METADATA_KEY, true)
        .with_metadata("breaker_key", key)
    }

    /// Error raised when the caller's cancellation token fired.
    pub fn cancelled(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Timeout,
            service,
            operation,
            "operation cancelled before completion",
        )
        .with_retryable(false)
        .with_metadata(CANCELLED_METADATA_KEY, true)
    }

    /// Attach a transport-level status code.
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Override the kind's default retryability verdict.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Attach a diagnostic metadata entry.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Preserve the original underlying failure for logging and tracing.
    pub fn with_cause(mut self, cause: RawError) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn retryable(&self) -> bool {
        self.retryable
    }

    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Whether this error is a circuit-breaker short-circuit.
    pub fn is_circuit_open(&self) -> bool {
        self.metadata
            .get(CIRCUIT_OPEN_METADATA_KEY)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether this error was produced by cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.metadata
            .get(CANCELLED_METADATA_KEY)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Record how many attempts were made and how long the retry sequence
    /// took. Called by the orchestrator on the final error so operators
    /// can tell "failed once, not retryable" from "failed after N
    /// attempts".
    pub(crate) fn annotate_attempts(mut self, attempts: u32, elapsed_ms: u64) -> Self {
        self.metadata
            .insert("attempts".to_string(), attempts.into());
        self.metadata
            .insert("elapsed_ms".to_string(), elapsed_ms.into());
        self
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed during {}: {} (kind: {}",
            self.service, self.operation, self.message, self.kind
        )?;
        if let Some(status) = self.status_code {
            write!(f, ", status: {status}")?;
        }
        write!(f, ")")
    }
}

impl StdError for ServiceError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause.as_ref() as &(dyn StdError + 'static))
    }
}

/// Typed carrier for a transport status code.
///
/// Collaborator clients wrap an HTTP-level failure in this type so the
/// classifier can map the status without probing loosely-typed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    pub status: u16,
    pub message: String,
}

impl StatusError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}: {}", self.status, self.message)
    }
}

impl StdError for StatusError {}
