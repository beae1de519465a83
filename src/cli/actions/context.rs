//! Shared wiring for actions: database pool and the engine built on it.

use anyhow::{Context, Result, anyhow};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::TrustEngine;
use crate::authz::{AuthorizerConfig, PermissionAuthorizer, PgRoleStore};
use crate::cache::PgCacheStore;
use crate::history::PgHistoryStore;
use crate::ratelimit::{AdaptiveRateLimiter, RateLimitTable};
use crate::risk::{
    HttpIpReputation, IpReputation, RiskAssessmentEngine, RiskConfig, StaticIpReputation,
    TracingAlertSink,
};

#[derive(Debug, Clone)]
pub struct EngineArgs {
    pub dsn: SecretString,
    pub permission_cache_ttl: Duration,
    pub reputation_url: Option<Url>,
    pub reputation_timeout: Duration,
    pub bad_ip_ranges: Vec<String>,
    pub velocity_max_per_minute: u32,
    pub velocity_max_per_hour: u32,
}

/// Connect to Postgres.
///
/// # Errors
/// Returns an error if the database cannot be reached.
pub async fn connect(args: &EngineArgs) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(args.dsn.expose_secret())
        .await
        .context("Failed to connect to database")
}

/// Build the risk engine from the CLI settings.
///
/// # Errors
/// Returns an error for an invalid CIDR range or HTTP client setup failure.
pub fn risk_engine(args: &EngineArgs) -> Result<RiskAssessmentEngine> {
    let reputation: Arc<dyn IpReputation> = match &args.reputation_url {
        Some(url) => {
            debug!(%url, "Using HTTP IP reputation");
            Arc::new(
                HttpIpReputation::new(url.clone(), args.reputation_timeout)
                    .context("Failed to build IP reputation client")?,
            )
        }
        None => Arc::new(
            StaticIpReputation::from_cidrs(&args.bad_ip_ranges).map_err(|err| anyhow!(err))?,
        ),
    };

    let config = RiskConfig::default()
        .with_reputation_timeout(args.reputation_timeout)
        .with_velocity_max_per_minute(args.velocity_max_per_minute)
        .with_velocity_max_per_hour(args.velocity_max_per_hour);

    Ok(RiskAssessmentEngine::new(
        config,
        reputation,
        Arc::new(TracingAlertSink),
    ))
}

/// Build the engine over Postgres-backed stores.
///
/// # Errors
/// Returns an error if the risk engine cannot be configured.
pub fn engine(args: &EngineArgs, pool: &PgPool) -> Result<TrustEngine> {
    let cache = Arc::new(PgCacheStore::new(pool.clone()));
    let authorizer = PermissionAuthorizer::new(
        Arc::new(PgRoleStore::new(pool.clone())),
        cache.clone(),
        AuthorizerConfig::default().with_cache_ttl(args.permission_cache_ttl),
    );
    let rate_limiter = AdaptiveRateLimiter::new(cache, RateLimitTable::default());

    Ok(TrustEngine::new(
        Arc::new(PgHistoryStore::new(pool.clone())),
        risk_engine(args)?,
        authorizer,
        rate_limiter,
    ))
}

/// Connect and build the engine in one step.
///
/// # Errors
/// Returns an error if the database is unreachable or the configuration is invalid.
pub async fn connect_engine(args: &EngineArgs) -> Result<TrustEngine> {
    let pool = connect(args).await?;
    engine(args, &pool)
}

/// Print a value as pretty JSON on stdout.
///
/// # Errors
/// Returns an error if the value cannot be serialized.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> EngineArgs {
        EngineArgs {
            dsn: SecretString::from("postgres://localhost/permesi".to_string()),
            permission_cache_ttl: Duration::from_secs(300),
            reputation_url: None,
            reputation_timeout: Duration::from_millis(300),
            bad_ip_ranges: vec!["203.0.113.0/24".to_string()],
            velocity_max_per_minute: 5,
            velocity_max_per_hour: 20,
        }
    }

    #[test]
    fn risk_engine_uses_cli_settings() {
        let mut args = args();
        args.reputation_timeout = Duration::from_millis(120);
        let engine = risk_engine(&args).unwrap();
        assert_eq!(engine.config().reputation_timeout(), Duration::from_millis(120));
    }

    #[test]
    fn invalid_cidr_is_rejected() {
        let mut args = args();
        args.bad_ip_ranges = vec!["203.0.113.0/99".to_string()];
        let err = risk_engine(&args).err().map(|err| err.to_string());
        assert!(err.is_some_and(|msg| msg.contains("203.0.113.0/99")));
    }

    #[test]
    fn http_reputation_is_used_when_configured() {
        let mut args = args();
        args.reputation_url = Url::parse("https://reputation.permesi.localhost/v1/ip").ok();
        assert!(risk_engine(&args).is_ok());
    }
}
