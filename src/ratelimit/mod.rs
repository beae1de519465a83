//! Adaptive sliding-window rate limiting.
//!
//! Flow Overview:
//! 1) Resolve `(max_requests, window)` for the endpoint, else the fallback.
//! 2) Relax the maximum for trusted sessions: trust >= 80 allows 1.5x,
//!    trust >= 50 allows 1.2x (floored).
//! 3) Record the hit in the shared cache with one atomic window update and
//!    compare the count seen before the insert with the adjusted maximum.
//! 4) If the cache is unreachable, allow the request.

mod config;

pub use config::{DEFAULT_ENDPOINT, RateLimitConfig, RateLimitTable};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::error::Result;

pub const HIGH_TRUST_THRESHOLD: u8 = 80;
pub const MEDIUM_TRUST_THRESHOLD: u8 = 50;

const DEFAULT_KEY_PREFIX: &str = "rate_limit:";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Seconds to wait; set only when the request was denied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Maximum requests after the trust adjustment.
#[must_use]
pub fn adjusted_max_requests(max_requests: u32, trust_score: u8) -> u32 {
    let max = u64::from(max_requests);
    let adjusted = if trust_score >= HIGH_TRUST_THRESHOLD {
        max * 3 / 2
    } else if trust_score >= MEDIUM_TRUST_THRESHOLD {
        max * 6 / 5
    } else {
        max
    };
    u32::try_from(adjusted).unwrap_or(u32::MAX)
}

pub struct AdaptiveRateLimiter {
    cache: Arc<dyn CacheStore>,
    table: RateLimitTable,
    key_prefix: String,
}

impl AdaptiveRateLimiter {
    pub fn new(cache: Arc<dyn CacheStore>, table: RateLimitTable) -> Self {
        Self {
            cache,
            table,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn table(&self) -> &RateLimitTable {
        &self.table
    }

    #[must_use]
    pub fn window_key(&self, identifier: &str, endpoint: &str) -> String {
        format!("{}{endpoint}:{identifier}", self.key_prefix)
    }

    /// Counts this request against the window. Never fails: a cache outage
    /// admits the request.
    pub async fn check_rate_limit(
        &self,
        identifier: &str,
        endpoint: &str,
        trust_score: u8,
    ) -> RateLimitResult {
        self.check_rate_limit_at(identifier, endpoint, trust_score, Utc::now())
            .await
    }

    pub async fn check_rate_limit_at(
        &self,
        identifier: &str,
        endpoint: &str,
        trust_score: u8,
        now: DateTime<Utc>,
    ) -> RateLimitResult {
        let config = self.table.config_for(endpoint);
        let max_requests = adjusted_max_requests(config.max_requests, trust_score);
        let reset_at = now + ChronoDuration::milliseconds(config.window_ms());
        let key = self.window_key(identifier, endpoint);

        let count = match self
            .cache
            .record_window_hit(&key, now.timestamp_millis(), config.window)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                warn!(
                    endpoint,
                    identifier, "Rate limit store unavailable, allowing request: {err}"
                );
                return RateLimitResult {
                    allowed: true,
                    remaining: max_requests,
                    reset_at,
                    retry_after: None,
                };
            }
        };

        let allowed = count < u64::from(max_requests);
        let remaining = u64::from(max_requests)
            .saturating_sub(count)
            .saturating_sub(1);
        let remaining = u32::try_from(remaining).unwrap_or(u32::MAX);

        if !allowed {
            debug!(endpoint, identifier, count, max_requests, "Rate limit exceeded");
        }

        RateLimitResult {
            allowed,
            remaining,
            reset_at,
            retry_after: (!allowed).then(|| config.retry_after_seconds()),
        }
    }

    /// Clears the window for `identifier` on `endpoint`.
    ///
    /// # Errors
    /// Returns an error if the cache cannot be reached.
    pub async fn reset_rate_limit(&self, identifier: &str, endpoint: &str) -> Result<()> {
        let key = self.window_key(identifier, endpoint);
        self.cache.delete(&key).await?;
        debug!(endpoint, identifier, "Rate limit reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::error::StoreError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::time::Duration;

    struct UnavailableCache;

    #[async_trait]
    impl CacheStore for UnavailableCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("cache down".into()))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("cache down".into()))
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("cache down".into()))
        }

        async fn delete_pattern(&self, _pattern: &str) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("cache down".into()))
        }

        async fn record_window_hit(
            &self,
            _key: &str,
            _now_ms: i64,
            _window: Duration,
        ) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("cache down".into()))
        }
    }

    fn limiter() -> AdaptiveRateLimiter {
        AdaptiveRateLimiter::new(Arc::new(MemoryCacheStore::new()), RateLimitTable::default())
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
    }

    async fn admitted(limiter: &AdaptiveRateLimiter, trust_score: u8, calls: usize) -> usize {
        let mut admitted = 0;
        for i in 0..calls {
            let now = start() + ChronoDuration::milliseconds(i64::try_from(i).unwrap());
            if limiter
                .check_rate_limit_at("198.51.100.7", "login", trust_score, now)
                .await
                .allowed
            {
                admitted += 1;
            }
        }
        admitted
    }

    #[test]
    fn trust_multipliers_floor() {
        assert_eq!(adjusted_max_requests(10, 0), 10);
        assert_eq!(adjusted_max_requests(10, 49), 10);
        assert_eq!(adjusted_max_requests(10, 50), 12);
        assert_eq!(adjusted_max_requests(10, 79), 12);
        assert_eq!(adjusted_max_requests(10, 80), 15);
        assert_eq!(adjusted_max_requests(3, 85), 4);
        assert_eq!(adjusted_max_requests(1, 100), 1);
        assert_eq!(adjusted_max_requests(u32::MAX, 100), u32::MAX);
    }

    #[tokio::test]
    async fn first_max_requests_pass_then_deny() {
        let limiter = limiter();
        let mut previous_remaining = u32::MAX;

        for i in 0..15 {
            let now = start() + ChronoDuration::seconds(i);
            let result = limiter
                .check_rate_limit_at("198.51.100.7", "login", 0, now)
                .await;

            assert_eq!(result.allowed, i < 10, "call {i}");
            assert!(result.remaining <= previous_remaining);
            assert_eq!(result.retry_after.is_some(), !result.allowed);
            previous_remaining = result.remaining;
        }
        assert_eq!(previous_remaining, 0);
    }

    #[tokio::test]
    async fn remaining_counts_down_to_zero() {
        let limiter = limiter();
        let first = limiter
            .check_rate_limit_at("user-1", "password-reset", 0, start())
            .await;
        assert_eq!(first.remaining, 4);
        assert_eq!(first.reset_at, start() + ChronoDuration::seconds(60));
        assert_eq!(first.retry_after, None);
    }

    #[tokio::test]
    async fn trusted_sessions_get_more_requests() {
        assert_eq!(admitted(&limiter(), 0, 30).await, 10);
        assert_eq!(admitted(&limiter(), 60, 30).await, 12);
        assert_eq!(admitted(&limiter(), 85, 30).await, 15);
    }

    #[tokio::test]
    async fn denied_request_carries_retry_after() {
        let limiter = limiter();
        let first = limiter
            .check_rate_limit_at("user-1", "mfa-verify", 0, start())
            .await;
        assert!(first.allowed);

        let second = limiter
            .check_rate_limit_at("user-1", "mfa-verify", 0, start() + ChronoDuration::seconds(1))
            .await;
        assert!(!second.allowed);
        assert_eq!(second.remaining, 0);
        assert_eq!(second.retry_after, Some(10));
    }

    #[tokio::test]
    async fn window_slides() {
        let limiter = limiter();
        assert!(limiter.check_rate_limit_at("u", "mfa-verify", 0, start()).await.allowed);
        assert!(
            !limiter
                .check_rate_limit_at("u", "mfa-verify", 0, start() + ChronoDuration::seconds(9))
                .await
                .allowed
        );
        assert!(
            limiter
                .check_rate_limit_at("u", "mfa-verify", 0, start() + ChronoDuration::seconds(20))
                .await
                .allowed
        );
    }

    #[tokio::test]
    async fn identifiers_and_endpoints_are_isolated() {
        let limiter = limiter();
        assert!(limiter.check_rate_limit_at("a", "mfa-verify", 0, start()).await.allowed);
        assert!(limiter.check_rate_limit_at("b", "mfa-verify", 0, start()).await.allowed);
        assert!(limiter.check_rate_limit_at("a", "login", 0, start()).await.allowed);
    }

    #[tokio::test]
    async fn unknown_endpoint_uses_fallback_limit() {
        let limiter = limiter();
        let result = limiter
            .check_rate_limit_at("u", "profile-update", 0, start())
            .await;
        assert_eq!(result.remaining, 99);
    }

    #[tokio::test]
    async fn reset_clears_the_window() {
        let limiter = limiter();
        assert!(limiter.check_rate_limit_at("u", "mfa-verify", 0, start()).await.allowed);
        limiter.reset_rate_limit("u", "mfa-verify").await.unwrap();
        assert!(limiter.check_rate_limit_at("u", "mfa-verify", 0, start()).await.allowed);
    }

    #[tokio::test]
    async fn cache_outage_fails_open() {
        let limiter = AdaptiveRateLimiter::new(Arc::new(UnavailableCache), RateLimitTable::default());
        for trust_score in [0, 50, 90] {
            for _ in 0..20 {
                let result = limiter.check_rate_limit("u", "mfa-verify", trust_score).await;
                assert!(result.allowed);
                assert_eq!(result.remaining, adjusted_max_requests(1, trust_score));
                assert_eq!(result.retry_after, None);
            }
        }
        assert!(limiter.reset_rate_limit("u", "mfa-verify").await.is_err());
    }

    #[test]
    fn window_key_layout() {
        let limiter = limiter();
        assert_eq!(limiter.window_key("10.0.0.1", "login"), "rate_limit:login:10.0.0.1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_window() {
        let limiter = Arc::new(limiter());

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.check_rate_limit("198.51.100.7", "login", 0).await
                })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap().allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 10);
    }
}
