//! # Structured Logging Bootstrap
//!
//! Environment-aware tracing initialization for binaries embedding this
//! layer. Library code only ever emits `tracing` events; calling
//! [`init_structured_logging`] is optional and idempotent, so embedding
//! applications that configure their own subscriber are unaffected.

use std::sync::OnceLock;

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize a console tracing subscriber with an environment-derived
/// filter. Safe to call multiple times; later calls are no-ops, and an
/// already-installed global subscriber is left in place.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_env("BREAKWATER_LOG")
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        // Production gets machine-parseable JSON; everything else stays
        // human-readable.
        let already_set = if environment == "production" {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true)
                        .with_filter(filter),
                )
                .try_init()
                .is_err()
        } else {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_filter(filter),
                )
                .try_init()
                .is_err()
        };

        if already_set {
            tracing::debug!("global tracing subscriber already initialized");
        }

        tracing::info!(environment = %environment, "structured logging initialized");
    });
}

/// Current environment from environment variables.
fn get_environment() -> String {
    std::env::var("BREAKWATER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Default log level for an environment.
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}
