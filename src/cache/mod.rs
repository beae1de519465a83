//! Shared time-ordered cache used for permission caching and rate-limit windows.
//!
//! The cache is an external collaborator: every instance of the service talks
//! to the same store, so nothing here may rely on in-process state for
//! correctness. Two implementations ship with the crate:
//!
//! - [`PgCacheStore`] keeps entries in Postgres and applies each sliding-window
//!   update as one row-locked upsert per key.
//! - [`MemoryCacheStore`] is a single-process store for tests and embedded use.

mod memory;
mod postgres;

pub use memory::MemoryCacheStore;
pub use postgres::PgCacheStore;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Deletes every key matching a glob pattern where `*` matches any run of
    /// characters. Returns the number of keys removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, StoreError>;

    /// Atomic sliding-window hit.
    ///
    /// In one atomic step: drop entries at or before `now_ms - window`, count
    /// what remains, record an entry for `now_ms`, and push the key's expiry
    /// to `window` from now. Returns the count observed before the insert.
    async fn record_window_hit(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
    ) -> Result<u64, StoreError>;
}

/// Glob match supporting `*` as "any sequence of characters".
pub(crate) fn glob_matches(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };

    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        // No wildcard at all: exact match.
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(index) => rest = &rest[index + part.len()..],
            None => return false,
        }
    }

    rest.ends_with(last)
}

pub(crate) fn window_millis(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::glob_matches;

    #[test]
    fn glob_exact_match() {
        assert!(glob_matches("permissions:user:1", "permissions:user:1"));
        assert!(!glob_matches("permissions:user:1", "permissions:user:12"));
    }

    #[test]
    fn glob_trailing_wildcard() {
        assert!(glob_matches("permissions:user:*", "permissions:user:abc"));
        assert!(glob_matches("permissions:user:*", "permissions:user:"));
        assert!(!glob_matches("permissions:user:*", "rate_limit:login:1"));
    }

    #[test]
    fn glob_inner_wildcards() {
        assert!(glob_matches("rate_limit:*:10.0.0.1", "rate_limit:login:10.0.0.1"));
        assert!(glob_matches("*:login:*", "rate_limit:login:10.0.0.1"));
        assert!(!glob_matches("rate_limit:*:10.0.0.1", "rate_limit:login:10.0.0.2"));
    }

    #[test]
    fn glob_star_matches_everything() {
        assert!(glob_matches("*", ""));
        assert!(glob_matches("*", "anything"));
    }
}
