//! Postgres history store over the identity backend's `sessions` and
//! `login_attempts` tables (see `sql/history.sql`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::HistoryStore;
use crate::error::StoreError;
use crate::risk::{Location, LoginAttempt};
use crate::trust::Session;

const SESSION_COLUMNS: &str = "id, user_id, device_fingerprint, ip_address, location, \
     trust_score, is_trusted, last_activity_at, expires_at, revoked_at, created_at";

#[derive(Debug, Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn session_from_row(row: &PgRow) -> Result<Session, sqlx::Error> {
    let trust_score: i16 = row.try_get("trust_score")?;
    let mut session = Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        device_fingerprint: row.try_get("device_fingerprint")?,
        ip_address: row.try_get("ip_address")?,
        location: row.try_get("location")?,
        trust_score: 0,
        is_trusted: row.try_get("is_trusted")?,
        last_activity_at: row.try_get("last_activity_at")?,
        expires_at: row.try_get("expires_at")?,
        revoked_at: row.try_get("revoked_at")?,
        created_at: row.try_get("created_at")?,
    };
    session.set_trust_score(i32::from(trust_score));
    Ok(session)
}

fn attempt_from_row(row: &PgRow) -> Result<LoginAttempt, sqlx::Error> {
    let label: Option<String> = row.try_get("location")?;
    let latitude: Option<f64> = row.try_get("latitude")?;
    let longitude: Option<f64> = row.try_get("longitude")?;
    let location = label.map(|label| {
        let location = Location::named(label);
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => location.with_coordinates(lat, lon),
            _ => location,
        }
    });

    Ok(LoginAttempt {
        user_id: row.try_get("user_id")?,
        ip_address: row.try_get("ip_address")?,
        location,
        device_fingerprint: row.try_get("device_fingerprint")?,
        timestamp: row.try_get("attempted_at")?,
        success: row.try_get("success")?,
    })
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn sessions_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, StoreError> {
        let query =
            format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = $1 ORDER BY created_at DESC");
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        Ok(rows
            .iter()
            .map(session_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        Ok(row.as_ref().map(session_from_row).transpose()?)
    }

    async fn login_attempts_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<LoginAttempt>, StoreError> {
        let query = "SELECT user_id, ip_address, location, latitude, longitude, \
                     device_fingerprint, success, attempted_at \
                     FROM login_attempts WHERE user_id = $1 AND attempted_at >= $2 \
                     ORDER BY attempted_at";
        let rows = sqlx::query(query)
            .bind(user_id)
            .bind(since)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(rows
            .iter()
            .map(attempt_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn update_session_trust(
        &self,
        session_id: Uuid,
        trust_score: u8,
        is_trusted: bool,
    ) -> Result<bool, StoreError> {
        let query = "UPDATE sessions SET trust_score = $2, is_trusted = $3 WHERE id = $1";
        let result = sqlx::query(query)
            .bind(session_id)
            .bind(i16::from(trust_score))
            .bind(is_trusted)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_session(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let query = "UPDATE sessions SET last_activity_at = GREATEST(last_activity_at, $2) WHERE id = $1";
        let result = sqlx::query(query)
            .bind(session_id)
            .bind(at)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
