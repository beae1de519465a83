//! In-process cache store.
//!
//! Suitable for tests and single-instance deployments only: state is not
//! shared between processes.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{CacheStore, glob_matches, window_millis};
use crate::error::StoreError;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Window {
    hits: VecDeque<i64>,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    windows: HashMap<String, Window>,
}

impl State {
    /// Drops expired entries and windows whose hits have all aged out.
    fn prune(&mut self, now: Instant) {
        self.entries.retain(|_, entry| entry.expires_at > now);
        self.windows
            .retain(|_, window| window.expires_at.is_none_or(|at| at > now));
    }
}

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    state: Mutex<State>,
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys, windows included.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        let now = Instant::now();
        let entries = state
            .entries
            .values()
            .filter(|entry| entry.expires_at > now)
            .count();
        let windows = state
            .windows
            .values()
            .filter(|window| window.expires_at.is_none_or(|at| at > now))
            .count();
        entries + windows
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut state = self.state.lock().await;
        let expired = match state.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            state.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.prune(now);
        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.entries.remove(key);
        state.windows.remove(key);
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.entries.len() + state.windows.len();
        state.entries.retain(|key, _| !glob_matches(pattern, key));
        state.windows.retain(|key, _| !glob_matches(pattern, key));
        let after = state.entries.len() + state.windows.len();
        Ok(u64::try_from(before - after).unwrap_or(u64::MAX))
    }

    async fn record_window_hit(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let window_start = now_ms.saturating_sub(window_millis(window));
        let now = Instant::now();
        state.prune(now);

        let entry = state.windows.entry(key.to_string()).or_default();

        entry.hits.retain(|&hit| hit > window_start);
        let count = entry.hits.len();

        // Keep entries time-ordered even if callers pass an older timestamp.
        let position = entry.hits.partition_point(|&hit| hit <= now_ms);
        entry.hits.insert(position, now_ms);
        entry.expires_at = Some(now + window);

        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}
