//! # Permesi Trust (session trust, login risk, access decisions)
//!
//! `permesi-trust` is the decision core used by the identity backend on every
//! login and every authenticated request. It answers four questions:
//!
//! - **How much do we trust this session?** [`trust::SessionTrustCalculator`]
//!   scores a session from device/location recognition and recent activity.
//! - **Does this login look anomalous?** [`risk::RiskAssessmentEngine`] combines
//!   failed attempts, location changes (including impossible travel), device
//!   novelty, IP reputation and velocity into a composite score and a step-up
//!   decision.
//! - **May this user do this?** [`authz::PermissionAuthorizer`] resolves the
//!   union of role permissions, evaluates wildcard matches and caches the result.
//! - **Is the request rate acceptable?** [`ratelimit::AdaptiveRateLimiter`]
//!   runs a sliding window per endpoint and relaxes limits for trusted sessions.
//!
//! ## Shared state
//!
//! None of the components keep mutable state in process memory. Permission
//! caches and rate-limit windows live in a [`cache::CacheStore`] so several
//! instances can run side by side; the Postgres implementation applies each
//! sliding-window update as a single row-locked statement per key.
//!
//! ## Failure policy
//!
//! Advisory subsystems (cache, IP reputation, alert dispatch) degrade and log.
//! Authoritative subsystems (role assignment, history lookups) surface errors.
//! The rate limiter fails open; permission checks never fail because of the cache.

pub mod authz;
pub mod cache;
pub mod cli;
pub mod engine;
pub mod error;
pub mod history;
pub mod ratelimit;
pub mod risk;
pub mod trust;

pub use engine::{AccessDecision, AccessRequest, LoginDecision, TrustEngine};
pub use error::{StoreError, TrustError};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
