//! Login and request decisions wired from the four components.
//!
//! Flow Overview:
//! 1) Login: fetch the user's recent attempts and sessions, assess the login
//!    risk and run the short-window anomaly detector.
//! 2) Session creation: score the new session against the user's other
//!    sessions and persist the score.
//! 3) Request: reject invalid sessions, gate on the trust-adjusted rate limit,
//!    then check the permission. Activity is recorded best-effort.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::authz::PermissionAuthorizer;
use crate::error::{Result, TrustError};
use crate::history::HistoryStore;
use crate::ratelimit::{AdaptiveRateLimiter, RateLimitResult};
use crate::risk::{LoginContext, LoginHistory, RiskAssessment, RiskAssessmentEngine};
use crate::trust::{Session, SessionTrustCalculator};

/// How far back login attempts are loaded. Known locations and devices come
/// from this range.
const DEFAULT_HISTORY_LOOKBACK_DAYS: i64 = 90;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoginDecision {
    pub assessment: RiskAssessment,
    /// Short-window brute-force signal, independent of the risk score.
    pub anomalous: bool,
}

impl LoginDecision {
    #[must_use]
    pub fn requires_step_up(&self) -> bool {
        self.assessment.requires_step_up
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub session_id: Uuid,
    /// Rate-limit subject. Defaults to the session's user id.
    pub identifier: Option<String>,
    pub endpoint: String,
    pub resource: String,
    pub action: String,
}

impl AccessRequest {
    pub fn new(
        session_id: Uuid,
        endpoint: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            identifier: None,
            endpoint: endpoint.into(),
            resource: resource.into(),
            action: action.into(),
        }
    }

    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    InvalidSession,
    MissingPermission,
    /// The role store failed; access is refused rather than guessed.
    AuthorizationUnavailable,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AccessDecision {
    Allowed { rate_limit: RateLimitResult },
    Denied { reason: DenialReason },
    RateLimited { rate_limit: RateLimitResult },
}

impl AccessDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

pub struct TrustEngine {
    history: Arc<dyn HistoryStore>,
    calculator: SessionTrustCalculator,
    risk: RiskAssessmentEngine,
    authorizer: PermissionAuthorizer,
    rate_limiter: AdaptiveRateLimiter,
    history_lookback: Duration,
}

impl TrustEngine {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        risk: RiskAssessmentEngine,
        authorizer: PermissionAuthorizer,
        rate_limiter: AdaptiveRateLimiter,
    ) -> Self {
        Self {
            history,
            calculator: SessionTrustCalculator::new(),
            risk,
            authorizer,
            rate_limiter,
            history_lookback: Duration::days(DEFAULT_HISTORY_LOOKBACK_DAYS),
        }
    }

    #[must_use]
    pub fn with_history_lookback(mut self, lookback: Duration) -> Self {
        self.history_lookback = lookback;
        self
    }

    #[must_use]
    pub fn risk(&self) -> &RiskAssessmentEngine {
        &self.risk
    }

    #[must_use]
    pub fn authorizer(&self) -> &PermissionAuthorizer {
        &self.authorizer
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &AdaptiveRateLimiter {
        &self.rate_limiter
    }

    #[must_use]
    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// # Errors
    /// Validation errors for malformed input, or a history store failure.
    pub async fn evaluate_login(&self, context: &LoginContext) -> Result<LoginDecision> {
        self.evaluate_login_at(context, Utc::now()).await
    }

    /// # Errors
    /// Validation errors for malformed input, or a history store failure.
    #[instrument(skip(self, context), fields(user_id = %context.user_id))]
    pub async fn evaluate_login_at(
        &self,
        context: &LoginContext,
        now: DateTime<Utc>,
    ) -> Result<LoginDecision> {
        let since = now - self.history_lookback;
        let attempts = self
            .history
            .login_attempts_for_user(context.user_id, since)
            .await?;
        let sessions = self.history.sessions_for_user(context.user_id).await?;

        let assessment = self
            .risk
            .assess_login_risk_at(context, LoginHistory::new(&attempts, &sessions), now)
            .await?;
        let anomalous = self
            .risk
            .detect_anomalous_pattern(context.user_id, &attempts, now);
        if anomalous {
            warn!(user_id = %context.user_id, "Anomalous login pattern detected");
        }

        Ok(LoginDecision {
            assessment,
            anomalous,
        })
    }

    /// Scores a session against the user's other sessions and persists it.
    ///
    /// # Errors
    /// `TrustError::NotFound` for an unknown session, or a history store failure.
    pub async fn establish_session_trust(&self, session_id: Uuid) -> Result<Session> {
        self.establish_session_trust_at(session_id, Utc::now()).await
    }

    /// # Errors
    /// `TrustError::NotFound` for an unknown session, or a history store failure.
    #[instrument(skip(self))]
    pub async fn establish_session_trust_at(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let mut session = self
            .history
            .find_session(session_id)
            .await?
            .ok_or_else(|| TrustError::session_not_found(session_id))?;
        let prior = self.history.sessions_for_user(session.user_id).await?;

        let score = self
            .calculator
            .calculate_trust_score_at(&mut session, &prior, now);
        if !self
            .history
            .update_session_trust(session_id, score, session.is_trusted)
            .await?
        {
            return Err(TrustError::session_not_found(session_id));
        }
        debug!(trust_score = score, "Session trust established");
        Ok(session)
    }

    /// # Errors
    /// Returns an error only when the session lookup fails.
    pub async fn authorize_request(&self, request: &AccessRequest) -> Result<AccessDecision> {
        self.authorize_request_at(request, Utc::now()).await
    }

    /// # Errors
    /// Returns an error only when the session lookup fails.
    #[instrument(skip(self, request), fields(session_id = %request.session_id, endpoint = %request.endpoint))]
    pub async fn authorize_request_at(
        &self,
        request: &AccessRequest,
        now: DateTime<Utc>,
    ) -> Result<AccessDecision> {
        let Some(session) = self.history.find_session(request.session_id).await? else {
            return Ok(AccessDecision::Denied {
                reason: DenialReason::InvalidSession,
            });
        };
        if !session.is_valid_at(now) {
            return Ok(AccessDecision::Denied {
                reason: DenialReason::InvalidSession,
            });
        }

        let identifier = request
            .identifier
            .clone()
            .unwrap_or_else(|| session.user_id.to_string());
        let rate_limit = self
            .rate_limiter
            .check_rate_limit_at(&identifier, &request.endpoint, session.trust_score(), now)
            .await;
        if !rate_limit.allowed {
            return Ok(AccessDecision::RateLimited { rate_limit });
        }

        match self
            .authorizer
            .check_permission(session.user_id, &request.resource, &request.action)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                return Ok(AccessDecision::Denied {
                    reason: DenialReason::MissingPermission,
                });
            }
            Err(err) => {
                warn!(user_id = %session.user_id, "Permission check failed, denying: {err}");
                return Ok(AccessDecision::Denied {
                    reason: DenialReason::AuthorizationUnavailable,
                });
            }
        }

        if let Err(err) = self.history.touch_session(session.id, now).await {
            warn!("Failed to record session activity: {err}");
        }

        Ok(AccessDecision::Allowed { rate_limit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::{AuthorizerConfig, MemoryRoleStore, Permission, Role};
    use crate::cache::MemoryCacheStore;
    use crate::history::MemoryHistoryStore;
    use crate::ratelimit::RateLimitTable;
    use crate::risk::LoginAttempt;

    struct Harness {
        engine: TrustEngine,
        history: Arc<MemoryHistoryStore>,
        viewer: Role,
    }

    async fn harness() -> Harness {
        let viewer = Role::new("viewer");
        let roles = MemoryRoleStore::new()
            .with_role(viewer.clone(), vec![Permission::new("users", "read")])
            .await;
        let cache = Arc::new(MemoryCacheStore::new());
        let history = Arc::new(MemoryHistoryStore::new());
        let engine = TrustEngine::new(
            history.clone(),
            RiskAssessmentEngine::default(),
            PermissionAuthorizer::new(Arc::new(roles), cache.clone(), AuthorizerConfig::default()),
            AdaptiveRateLimiter::new(cache, RateLimitTable::default()),
        );
        Harness {
            engine,
            history,
            viewer,
        }
    }

    fn session(user_id: Uuid) -> Session {
        Session::new(user_id, "device-laptop-01", "198.51.100.7", Duration::hours(12))
    }

    #[tokio::test]
    async fn unknown_session_is_denied() {
        let h = harness().await;
        let decision = h
            .engine
            .authorize_request(&AccessRequest::new(Uuid::new_v4(), "default", "users", "read"))
            .await
            .unwrap();
        assert_eq!(
            decision,
            AccessDecision::Denied {
                reason: DenialReason::InvalidSession
            }
        );
    }

    #[tokio::test]
    async fn revoked_session_is_denied() {
        let h = harness().await;
        let mut revoked = session(Uuid::new_v4());
        revoked.revoked_at = Some(Utc::now());
        let id = revoked.id;
        h.history.insert_session(revoked).await;

        let decision = h
            .engine
            .authorize_request(&AccessRequest::new(id, "default", "users", "read"))
            .await
            .unwrap();
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn permitted_request_is_allowed_and_touches_session() {
        let h = harness().await;
        let user_id = Uuid::new_v4();
        let s = session(user_id);
        let id = s.id;
        h.history.insert_session(s).await;
        h.engine
            .authorizer()
            .assign_role(user_id, h.viewer.id, None)
            .await
            .unwrap();

        let now = Utc::now() + Duration::minutes(5);
        let decision = h
            .engine
            .authorize_request_at(&AccessRequest::new(id, "default", "users", "read"), now)
            .await
            .unwrap();
        assert!(decision.is_allowed());
        let stored = h.history.find_session(id).await.unwrap().unwrap();
        assert_eq!(stored.last_activity_at, now);

        let decision = h
            .engine
            .authorize_request_at(&AccessRequest::new(id, "default", "users", "delete"), now)
            .await
            .unwrap();
        assert_eq!(
            decision,
            AccessDecision::Denied {
                reason: DenialReason::MissingPermission
            }
        );
    }

    #[tokio::test]
    async fn rate_limit_runs_before_permission_check() {
        let h = harness().await;
        let s = session(Uuid::new_v4());
        let id = s.id;
        h.history.insert_session(s).await;
        let request = AccessRequest::new(id, "mfa-verify", "mfa", "verify").with_identifier("203.0.113.9");

        let first = h.engine.authorize_request(&request).await.unwrap();
        assert_eq!(
            first,
            AccessDecision::Denied {
                reason: DenialReason::MissingPermission
            }
        );
        let second = h.engine.authorize_request(&request).await.unwrap();
        assert!(matches!(second, AccessDecision::RateLimited { .. }));
    }

    #[tokio::test]
    async fn session_trust_is_persisted() {
        let h = harness().await;
        let user_id = Uuid::new_v4();
        let earlier = session(user_id).with_location("Berlin, DE");
        let current = session(user_id).with_location("Berlin, DE");
        let id = current.id;
        h.history.insert_session(earlier).await;
        h.history.insert_session(current).await;

        let scored = h.engine.establish_session_trust(id).await.unwrap();
        // 50 + 15 (device) + 20 (location) + 10 (recent activity)
        assert_eq!(scored.trust_score(), 95);
        let stored = h.history.find_session(id).await.unwrap().unwrap();
        assert_eq!(stored.trust_score(), 95);
    }

    #[tokio::test]
    async fn establish_trust_for_unknown_session_is_not_found() {
        let h = harness().await;
        let err = h
            .engine
            .establish_session_trust(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, TrustError::NotFound { entity: "Session", .. }));
    }

    #[tokio::test]
    async fn login_evaluation_flags_brute_force() {
        let h = harness().await;
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        for minutes in [1, 3, 5] {
            h.history
                .record_attempt(LoginAttempt {
                    user_id,
                    ip_address: "203.0.113.9".to_string(),
                    location: None,
                    device_fingerprint: Some("device-attacker-9".to_string()),
                    timestamp: now - Duration::minutes(minutes),
                    success: false,
                })
                .await;
        }

        let decision = h
            .engine
            .evaluate_login_at(
                &LoginContext {
                    user_id,
                    ip_address: "203.0.113.9".to_string(),
                    location: None,
                    device_fingerprint: "device-attacker-9".to_string(),
                },
                now,
            )
            .await
            .unwrap();
        assert!(decision.anomalous);
        assert_eq!(decision.assessment.signals.failed_attempts, 3);
    }
}
