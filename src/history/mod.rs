//! Session and login-attempt history owned by the identity store.
//!
//! The decision core reads this history to score logins and sessions. The
//! only writes it performs are the trust score and the activity timestamp of
//! a session.

mod memory;
mod postgres;

pub use memory::MemoryHistoryStore;
pub use postgres::PgHistoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::risk::LoginAttempt;
use crate::trust::Session;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// All sessions of the user, newest first.
    async fn sessions_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, StoreError>;

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Attempts at or after `since`, oldest first.
    async fn login_attempts_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<LoginAttempt>, StoreError>;

    /// Returns `false` if the session does not exist.
    async fn update_session_trust(
        &self,
        session_id: Uuid,
        trust_score: u8,
        is_trusted: bool,
    ) -> Result<bool, StoreError>;

    /// Returns `false` if the session does not exist.
    async fn touch_session(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;
}
