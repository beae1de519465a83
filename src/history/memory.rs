use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::HistoryStore;
use crate::error::StoreError;
use crate::risk::LoginAttempt;
use crate::trust::Session;

#[derive(Debug, Default)]
struct State {
    sessions: HashMap<Uuid, Session>,
    attempts: Vec<LoginAttempt>,
}

/// In-process history for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    state: RwLock<State>,
}

impl MemoryHistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_session(&self, session: Session) {
        self.state.write().await.sessions.insert(session.id, session);
    }

    pub async fn record_attempt(&self, attempt: LoginAttempt) {
        self.state.write().await.attempts.push(attempt);
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn sessions_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, StoreError> {
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|session| session.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.state.read().await.sessions.get(&session_id).cloned())
    }

    async fn login_attempts_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<LoginAttempt>, StoreError> {
        let state = self.state.read().await;
        let mut attempts: Vec<LoginAttempt> = state
            .attempts
            .iter()
            .filter(|attempt| attempt.user_id == user_id && attempt.timestamp >= since)
            .cloned()
            .collect();
        attempts.sort_by_key(|attempt| attempt.timestamp);
        Ok(attempts)
    }

    async fn update_session_trust(
        &self,
        session_id: Uuid,
        trust_score: u8,
        is_trusted: bool,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(session) = state.sessions.get_mut(&session_id) else {
            return Ok(false);
        };
        session.set_trust_score(i32::from(trust_score));
        session.is_trusted = is_trusted;
        Ok(true)
    }

    async fn touch_session(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(session) = state.sessions.get_mut(&session_id) else {
            return Ok(false);
        };
        session.touch(at);
        Ok(true)
    }
}
