//! # Rate Limit Counter Store
//!
//! Persistence seam for the rate limiter. Any durable keyed store works;
//! this crate ships a PostgreSQL implementation (the shared store the
//! limiter is normally deployed with) and an in-memory implementation for
//! tests and single-process fallback use.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Persisted request counter for one `(identifier, endpoint)` pair within
/// the current window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RateLimitCounter {
    pub identifier: String,
    pub endpoint: String,
    pub request_count: i32,
    pub window_start: DateTime<Utc>,
}

/// Errors surfaced by a counter store.
///
/// The limiter never propagates these to callers: a failing store makes
/// the limiter fail open.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable keyed store for [`RateLimitCounter`] rows.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Look up the counter for a key, if one exists.
    async fn find(
        &self,
        identifier: &str,
        endpoint: &str,
    ) -> Result<Option<RateLimitCounter>, RateLimitStoreError>;

    /// Insert a fresh counter row.
    async fn create(&self, counter: RateLimitCounter) -> Result<(), RateLimitStoreError>;

    /// Overwrite the counter row for `counter`'s key.
    async fn update(&self, counter: &RateLimitCounter) -> Result<(), RateLimitStoreError>;

    /// Remove the counter for a key. Missing rows are not an error.
    async fn delete(&self, identifier: &str, endpoint: &str) -> Result<(), RateLimitStoreError>;

    /// Garbage-collect rows whose window started before `cutoff`.
    /// Returns the number of rows removed.
    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RateLimitStoreError>;
}

/// PostgreSQL-backed store.
///
/// Uses runtime-checked queries so the crate builds without a live
/// database. Expected schema (see [`ensure_schema`](Self::ensure_schema)):
///
/// ```sql
/// CREATE TABLE breakwater_rate_limits (
///     identifier     TEXT        NOT NULL,
///     endpoint       TEXT        NOT NULL,
///     request_count  INTEGER     NOT NULL,
///     window_start   TIMESTAMPTZ NOT NULL,
///     PRIMARY KEY (identifier, endpoint)
/// );
/// ```
#[derive(Debug, Clone)]
pub struct PgRateLimitStore {
    pool: PgPool,
}

impl PgRateLimitStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the counter table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), RateLimitStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS breakwater_rate_limits (
                identifier     TEXT        NOT NULL,
                endpoint       TEXT        NOT NULL,
                request_count  INTEGER     NOT NULL,
                window_start   TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (identifier, endpoint)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RateLimitStore for PgRateLimitStore {
    async fn find(
        &self,
        identifier: &str,
        endpoint: &str,
    ) -> Result<Option<RateLimitCounter>, RateLimitStoreError> {
        let counter = sqlx::query_as::<_, RateLimitCounter>(
            r#"
            SELECT identifier, endpoint, request_count, window_start
            FROM breakwater_rate_limits
            WHERE identifier = $1 AND endpoint = $2
            "#,
        )
        .bind(identifier)
        .bind(endpoint)
        .fetch_optional(&self.pool)
        .await?;

        Ok(counter)
    }

    async fn create(&self, counter: RateLimitCounter) -> Result<(), RateLimitStoreError> {
        sqlx::query(
            r#"
            INSERT INTO breakwater_rate_limits (identifier, endpoint, request_count, window_start)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&counter.identifier)
        .bind(&counter.endpoint)
        .bind(counter.request_count)
        .bind(counter.window_start)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, counter: &RateLimitCounter) -> Result<(), RateLimitStoreError> {
        sqlx::query(
            r#"
            UPDATE breakwater_rate_limits
            SET request_count = $3, window_start = $4
            WHERE identifier = $1 AND endpoint = $2
            "#,
        )
        .bind(&counter.identifier)
        .bind(&counter.endpoint)
        .bind(counter.request_count)
        .bind(counter.window_start)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, identifier: &str, endpoint: &str) -> Result<(), RateLimitStoreError> {
        sqlx::query(
            r#"
            DELETE FROM breakwater_rate_limits
            WHERE identifier = $1 AND endpoint = $2
            "#,
        )
        .bind(identifier)
        .bind(endpoint)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RateLimitStoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM breakwater_rate_limits
            WHERE window_start < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// In-memory store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    entries: Mutex<HashMap<(String, String), RateLimitCounter>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live counter rows, for tests.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn find(
        &self,
        identifier: &str,
        endpoint: &str,
    ) -> Result<Option<RateLimitCounter>, RateLimitStoreError> {
        let entries = self.entries.lock();
        Ok(entries
            .get(&(identifier.to_string(), endpoint.to_string()))
            .cloned())
    }

    async fn create(&self, counter: RateLimitCounter) -> Result<(), RateLimitStoreError> {
        let mut entries = self.entries.lock();
        entries.insert(
            (counter.identifier.clone(), counter.endpoint.clone()),
            counter,
        );
        Ok(())
    }

    async fn update(&self, counter: &RateLimitCounter) -> Result<(), RateLimitStoreError> {
        let mut entries = self.entries.lock();
        entries.insert(
            (counter.identifier.clone(), counter.endpoint.clone()),
            counter.clone(),
        );
        Ok(())
    }

    async fn delete(&self, identifier: &str, endpoint: &str) -> Result<(), RateLimitStoreError> {
        let mut entries = self.entries.lock();
        entries.remove(&(identifier.to_string(), endpoint.to_string()));
        Ok(())
    }

    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RateLimitStoreError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, counter| counter.window_start >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}
