//! Postgres-backed cache store.
//!
//! Flow Overview:
//! 1) Plain entries live in `trust_cache_entries` with an absolute expiry.
//! 2) Sliding-window hits live in `trust_rate_windows`, one row per key holding
//!    the hit timestamps as a `BIGINT[]`.
//! 3) A window update is a single upsert. The conflicting row is locked and
//!    rewritten from its latest committed version, so concurrent instances
//!    never interleave the purge/count/insert sequence.
//!
//! Scaling: every instance shares the same tables; expired rows are removed
//! lazily on access and in bulk by [`PgCacheStore::purge_expired`].

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{Instrument, debug};

use super::{CacheStore, window_millis};
use crate::error::StoreError;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/cache.sql"));

/// Sliding-window hit in one statement. An expired row starts over;
/// otherwise hits at or before the window start (`$3`) are dropped and
/// `now_ms` (`$2`) is appended. Returns the number of hits seen before.
const RECORD_HIT_SQL: &str = r"
    INSERT INTO trust_rate_windows (key, hits, expires_at)
    VALUES ($1, ARRAY[$2::BIGINT], NOW() + make_interval(secs => $4))
    ON CONFLICT (key) DO UPDATE SET
        hits = ARRAY(
            SELECT hit
            FROM unnest(trust_rate_windows.hits) AS hit
            WHERE hit > $3 AND trust_rate_windows.expires_at > NOW()
            ORDER BY hit
        ) || $2::BIGINT,
        expires_at = EXCLUDED.expires_at
    RETURNING cardinality(hits) - 1 AS previous
";

#[derive(Debug, Clone)]
pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the cache tables if they do not exist yet.
    ///
    /// # Errors
    /// Returns an error if the DDL cannot be executed.
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Removes expired entries and rate windows. Returns the number of rows deleted.
    ///
    /// # Errors
    /// Returns an error if either delete fails.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let span = db_span("DELETE");
        let entries = sqlx::query("DELETE FROM trust_cache_entries WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .instrument(span.clone())
            .await?
            .rows_affected();
        let windows = sqlx::query("DELETE FROM trust_rate_windows WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .instrument(span)
            .await?
            .rows_affected();
        debug!("Purged {entries} cache entries and {windows} rate windows");
        Ok(entries + windows)
    }
}

fn db_span(operation: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation
    )
}

/// Translate a `*` glob into a `LIKE` pattern, escaping `LIKE` metacharacters.
fn glob_to_like(pattern: &str) -> String {
    let mut like = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        match ch {
            '\\' | '%' | '_' => {
                like.push('\\');
                like.push(ch);
            }
            '*' => like.push('%'),
            other => like.push(other),
        }
    }
    like
}

fn seconds(ttl: Duration) -> f64 {
    ttl.as_secs_f64()
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let query = "SELECT value FROM trust_cache_entries WHERE key = $1 AND expires_at > NOW()";
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT"))
            .await?;
        Ok(row.map(|row| row.get("value")))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO trust_cache_entries (key, value, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (key)
            DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
        ";
        sqlx::query(query)
            .bind(key)
            .bind(value)
            .bind(seconds(ttl))
            .execute(&self.pool)
            .instrument(db_span("INSERT"))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM trust_cache_entries WHERE key = $1")
            .bind(key)
            .execute(&mut *tx)
            .instrument(db_span("DELETE"))
            .await?;
        sqlx::query("DELETE FROM trust_rate_windows WHERE key = $1")
            .bind(key)
            .execute(&mut *tx)
            .instrument(db_span("DELETE"))
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
        let like = glob_to_like(pattern);
        let mut tx = self.pool.begin().await?;
        let entries = sqlx::query("DELETE FROM trust_cache_entries WHERE key LIKE $1 ESCAPE '\\'")
            .bind(&like)
            .execute(&mut *tx)
            .instrument(db_span("DELETE"))
            .await?
            .rows_affected();
        let windows = sqlx::query("DELETE FROM trust_rate_windows WHERE key LIKE $1 ESCAPE '\\'")
            .bind(&like)
            .execute(&mut *tx)
            .instrument(db_span("DELETE"))
            .await?
            .rows_affected();
        tx.commit().await?;

        Ok(entries + windows)
    }

    async fn record_window_hit(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
    ) -> Result<u64, StoreError> {
        let window_start = now_ms.saturating_sub(window_millis(window));

        let row = sqlx::query(RECORD_HIT_SQL)
            .bind(key)
            .bind(now_ms)
            .bind(window_start)
            .bind(seconds(window))
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT"))
            .await?;
        let previous: i32 = row.get("previous");

        Ok(u64::try_from(previous).unwrap_or(0))
    }
}
