use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "default";

/// Limit for one endpoint class: at most `max_requests` per sliding `window`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    #[serde(with = "window_ms")]
    pub window: Duration,
}

impl RateLimitConfig {
    #[must_use]
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    #[must_use]
    pub fn window_ms(&self) -> i64 {
        crate::cache::window_millis(self.window)
    }

    /// Seconds a denied caller should wait, rounded up.
    #[must_use]
    pub fn retry_after_seconds(&self) -> u64 {
        let millis = u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX);
        millis.div_ceil(1000)
    }
}

mod window_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(window: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(window.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Per-endpoint limits with a fallback for unlisted endpoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitTable {
    endpoints: HashMap<String, RateLimitConfig>,
    fallback: RateLimitConfig,
}

impl Default for RateLimitTable {
    fn default() -> Self {
        let endpoints = [
            ("login", RateLimitConfig::new(10, Duration::from_secs(60))),
            ("registration", RateLimitConfig::new(3, Duration::from_secs(300))),
            ("password-reset", RateLimitConfig::new(5, Duration::from_secs(60))),
            ("mfa-verify", RateLimitConfig::new(1, Duration::from_secs(10))),
        ]
        .into_iter()
        .map(|(name, config)| (name.to_string(), config))
        .collect();

        Self {
            endpoints,
            fallback: RateLimitConfig::new(100, Duration::from_secs(60)),
        }
    }
}

impl RateLimitTable {
    /// Adds or replaces an endpoint entry. `default` replaces the fallback.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>, config: RateLimitConfig) -> Self {
        let endpoint = endpoint.into();
        if endpoint == DEFAULT_ENDPOINT {
            self.fallback = config;
        } else {
            self.endpoints.insert(endpoint, config);
        }
        self
    }

    #[must_use]
    pub fn config_for(&self, endpoint: &str) -> RateLimitConfig {
        self.endpoints
            .get(endpoint)
            .copied()
            .unwrap_or(self.fallback)
    }

    #[must_use]
    pub fn fallback(&self) -> RateLimitConfig {
        self.fallback
    }

    /// Entries sorted by endpoint name, fallback last.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, RateLimitConfig)> {
        let mut entries: Vec<_> = self
            .endpoints
            .iter()
            .map(|(name, config)| (name.clone(), *config))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.push((DEFAULT_ENDPOINT.to_string(), self.fallback));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_matches_published_limits() {
        let table = RateLimitTable::default();
        let expected = [
            ("login", 10, 60),
            ("registration", 3, 300),
            ("password-reset", 5, 60),
            ("mfa-verify", 1, 10),
            ("default", 100, 60),
        ];
        for (endpoint, max, seconds) in expected {
            assert_eq!(
                table.config_for(endpoint),
                RateLimitConfig::new(max, Duration::from_secs(seconds)),
                "{endpoint}"
            );
        }
    }

    #[test]
    fn unknown_endpoint_uses_fallback() {
        let table = RateLimitTable::default();
        assert_eq!(table.config_for("profile-update"), table.fallback());
    }

    #[test]
    fn with_endpoint_overrides_and_replaces_fallback() {
        let table = RateLimitTable::default()
            .with_endpoint("login", RateLimitConfig::new(20, Duration::from_secs(30)))
            .with_endpoint(DEFAULT_ENDPOINT, RateLimitConfig::new(50, Duration::from_secs(60)));
        assert_eq!(table.config_for("login").max_requests, 20);
        assert_eq!(table.config_for("anything").max_requests, 50);
        assert_eq!(table.entries().last().map(|(name, _)| name.as_str()), Some("default"));
    }

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(
            RateLimitConfig::new(1, Duration::from_millis(1_500)).retry_after_seconds(),
            2
        );
        assert_eq!(
            RateLimitConfig::new(1, Duration::from_secs(60)).retry_after_seconds(),
            60
        );
    }

    #[test]
    fn config_serializes_window_in_millis() {
        let json = serde_json::to_string(&RateLimitConfig::new(10, Duration::from_secs(60))).unwrap();
        assert_eq!(json, r#"{"max_requests":10,"window":60000}"#);
    }
}
