//! IP reputation lookups.
//!
//! A provider returns a score in `[0, 1]`, where 0 is clean and 1 is known
//! hostile. The engine always wraps lookups in a timeout and substitutes a
//! conservative score when a provider fails, so providers are free to error.

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;
use url::Url;

pub const PRIVATE_RANGE_SCORE: f64 = 0.0;
pub const KNOWN_BAD_SCORE: f64 = 0.8;
pub const DEFAULT_SCORE: f64 = 0.1;

#[derive(Debug, Error)]
pub enum ReputationError {
    #[error("Reputation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid reputation response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait IpReputation: Send + Sync {
    async fn score(&self, ip: IpAddr) -> Result<f64, ReputationError>;
}

/// Loopback, private, link-local, unspecified and unique-local addresses.
#[must_use]
pub fn is_internal(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (first & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (first & 0xffc0) == 0xfe80
                || v6.to_ipv4_mapped().is_some_and(|v4| is_internal(IpAddr::V4(v4)))
        }
    }
}

/// Reputation from a static list of known-bad networks.
#[derive(Clone, Debug)]
pub struct StaticIpReputation {
    bad_networks: Vec<IpNetwork>,
    bad_score: f64,
    default_score: f64,
}

impl Default for StaticIpReputation {
    fn default() -> Self {
        Self {
            bad_networks: Vec::new(),
            bad_score: KNOWN_BAD_SCORE,
            default_score: DEFAULT_SCORE,
        }
    }
}

impl StaticIpReputation {
    #[must_use]
    pub fn new(bad_networks: Vec<IpNetwork>) -> Self {
        Self {
            bad_networks,
            ..Self::default()
        }
    }

    /// Parses CIDR strings such as `203.0.113.0/24`.
    ///
    /// # Errors
    /// Returns the offending entry if any range fails to parse.
    pub fn from_cidrs<I, S>(cidrs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let networks = cidrs
            .into_iter()
            .map(|cidr| {
                let cidr = cidr.as_ref().trim();
                cidr.parse::<IpNetwork>()
                    .map_err(|err| format!("invalid CIDR '{cidr}': {err}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(networks))
    }

    #[must_use]
    pub fn with_bad_score(mut self, score: f64) -> Self {
        self.bad_score = score.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_default_score(mut self, score: f64) -> Self {
        self.default_score = score.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn lookup(&self, ip: IpAddr) -> f64 {
        if is_internal(ip) {
            PRIVATE_RANGE_SCORE
        } else if self.bad_networks.iter().any(|network| network.contains(ip)) {
            self.bad_score
        } else {
            self.default_score
        }
    }
}

#[async_trait]
impl IpReputation for StaticIpReputation {
    async fn score(&self, ip: IpAddr) -> Result<f64, ReputationError> {
        Ok(self.lookup(ip))
    }
}

#[derive(Debug, Deserialize)]
struct ReputationResponse {
    score: f64,
}

/// Remote reputation service answering `GET <base>/<ip>` with `{"score": <0..1>}`.
#[derive(Clone, Debug)]
pub struct HttpIpReputation {
    client: Client,
    base_url: Url,
}

impl HttpIpReputation {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ReputationError> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, base_url })
    }

    fn lookup_url(&self, ip: IpAddr) -> String {
        format!("{}/{ip}", self.base_url.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl IpReputation for HttpIpReputation {
    #[instrument(skip(self))]
    async fn score(&self, ip: IpAddr) -> Result<f64, ReputationError> {
        let response = self.client.get(self.lookup_url(ip)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReputationError::InvalidResponse(format!(
                "unexpected status {status}"
            )));
        }

        let body: ReputationResponse = response.json().await?;
        if !body.score.is_finite() {
            return Err(ReputationError::InvalidResponse(
                "score is not a finite number".to_string(),
            ));
        }

        Ok(body.score.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(value: &str) -> IpAddr {
        value.parse().unwrap()
    }

    #[test]
    fn internal_ranges_score_zero() {
        let reputation = StaticIpReputation::default();
        for addr in ["127.0.0.1", "10.1.2.3", "192.168.0.10", "172.16.4.4", "::1", "fd00::1", "fe80::1"] {
            assert!(
                reputation.lookup(ip(addr)).abs() < f64::EPSILON,
                "{addr} should be internal"
            );
        }
    }

    #[test]
    fn known_bad_ranges_score_high() {
        let reputation = StaticIpReputation::from_cidrs(["203.0.113.0/24"]).unwrap();
        assert!((reputation.lookup(ip("203.0.113.50")) - KNOWN_BAD_SCORE).abs() < f64::EPSILON);
        assert!((reputation.lookup(ip("198.51.100.1")) - DEFAULT_SCORE).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_cidr_is_reported() {
        let err = StaticIpReputation::from_cidrs(["not-a-network"]).unwrap_err();
        assert!(err.contains("not-a-network"));
    }

    #[test]
    fn scores_are_clamped() {
        let reputation = StaticIpReputation::default()
            .with_bad_score(3.0)
            .with_default_score(-1.0);
        assert!(reputation.lookup(ip("198.51.100.1")).abs() < f64::EPSILON);
        assert!((reputation.bad_score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn http_lookup_url_joins_base_and_ip() {
        let base = Url::parse("https://reputation.example.com/v1/ip/").unwrap();
        let provider = HttpIpReputation::new(base, Duration::from_millis(200)).unwrap();
        assert_eq!(
            provider.lookup_url(ip("198.51.100.1")),
            "https://reputation.example.com/v1/ip/198.51.100.1"
        );
    }

    #[test]
    fn ipv4_mapped_internal_addresses_are_internal() {
        assert!(is_internal(ip("::ffff:10.0.0.1")));
        assert!(!is_internal(ip("::ffff:198.51.100.1")));
    }
}
