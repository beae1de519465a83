//! Login risk assessment.
//!
//! Flow Overview:
//! 1) Reject malformed IP addresses and device fingerprints up front.
//! 2) Score independent signals from the user's prior attempts: recent
//!    failures, unknown or impossible locations, unknown devices, IP reputation
//!    and attempt velocity.
//! 3) Sum the points, clamp to `[0, 100]`, derive the risk level and whether
//!    step-up verification is required.
//! 4) For high-risk outcomes, attach security alerts and hand them to the
//!    configured sink without waiting on delivery.
//!
//! | Signal | Points |
//! |---|---|
//! | failed attempts (recent) | `min(failed * 10, 30)` |
//! | unknown location | 10 |
//! | impossible travel (> 900 km/h) | 40 |
//! | unknown device | 15 |
//! | IP reputation `[0, 1]` | `score * 20` |
//! | velocity `[0, 1]` | `velocity * 15` |

mod alerts;
pub mod geo;
mod models;
pub mod reputation;
mod utils;

pub use alerts::{AlertSink, TracingAlertSink};
pub use models::{
    AlertSeverity, AlertType, Location, LoginAttempt, LoginContext, LoginHistory, RiskAssessment,
    RiskLevel, RiskSignals, SecurityAlert,
};
pub use reputation::{HttpIpReputation, IpReputation, ReputationError, StaticIpReputation};
pub use utils::valid_device_fingerprint;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::Result;
use alerts::{AlertInput, build_alerts, dispatch_detached};

pub const FAILED_ATTEMPT_POINTS: u32 = 10;
pub const FAILED_ATTEMPT_CAP: u32 = 30;
pub const NEW_LOCATION_POINTS: f64 = 10.0;
pub const IMPOSSIBLE_TRAVEL_POINTS: f64 = 40.0;
pub const NEW_DEVICE_POINTS: f64 = 15.0;
pub const IP_REPUTATION_WEIGHT: f64 = 20.0;
pub const VELOCITY_WEIGHT: f64 = 15.0;

const DEFAULT_FAILURE_WINDOW_SECONDS: i64 = 60 * 60;
const DEFAULT_VELOCITY_MAX_PER_MINUTE: u32 = 5;
const DEFAULT_VELOCITY_MAX_PER_HOUR: u32 = 20;
const DEFAULT_IMPOSSIBLE_TRAVEL_KMH: f64 = 900.0;
const DEFAULT_ANOMALOUS_WINDOW_SECONDS: i64 = 15 * 60;
const DEFAULT_ANOMALOUS_THRESHOLD: usize = 3;
const DEFAULT_STEP_UP_THRESHOLD: u8 = 60;
const DEFAULT_REPUTATION_TIMEOUT_MS: u64 = 300;
const DEFAULT_UNRESOLVED_DISTANCE_KM: f64 = 100.0;

#[derive(Clone, Debug)]
pub struct RiskConfig {
    failure_window: ChronoDuration,
    velocity_max_per_minute: u32,
    velocity_max_per_hour: u32,
    impossible_travel_kmh: f64,
    anomalous_window: ChronoDuration,
    anomalous_threshold: usize,
    step_up_threshold: u8,
    reputation_timeout: Duration,
    reputation_fallback_score: f64,
    unresolved_distance_km: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            failure_window: ChronoDuration::seconds(DEFAULT_FAILURE_WINDOW_SECONDS),
            velocity_max_per_minute: DEFAULT_VELOCITY_MAX_PER_MINUTE,
            velocity_max_per_hour: DEFAULT_VELOCITY_MAX_PER_HOUR,
            impossible_travel_kmh: DEFAULT_IMPOSSIBLE_TRAVEL_KMH,
            anomalous_window: ChronoDuration::seconds(DEFAULT_ANOMALOUS_WINDOW_SECONDS),
            anomalous_threshold: DEFAULT_ANOMALOUS_THRESHOLD,
            step_up_threshold: DEFAULT_STEP_UP_THRESHOLD,
            reputation_timeout: Duration::from_millis(DEFAULT_REPUTATION_TIMEOUT_MS),
            reputation_fallback_score: reputation::DEFAULT_SCORE,
            unresolved_distance_km: DEFAULT_UNRESOLVED_DISTANCE_KM,
        }
    }
}

impl RiskConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_failure_window(mut self, window: ChronoDuration) -> Self {
        self.failure_window = window;
        self
    }

    /// Zero disables the per-minute velocity ratio.
    #[must_use]
    pub fn with_velocity_max_per_minute(mut self, max: u32) -> Self {
        self.velocity_max_per_minute = max;
        self
    }

    /// Zero disables the per-hour velocity ratio.
    #[must_use]
    pub fn with_velocity_max_per_hour(mut self, max: u32) -> Self {
        self.velocity_max_per_hour = max;
        self
    }

    #[must_use]
    pub fn with_impossible_travel_kmh(mut self, speed: f64) -> Self {
        self.impossible_travel_kmh = speed;
        self
    }

    #[must_use]
    pub fn with_anomalous_window(mut self, window: ChronoDuration) -> Self {
        self.anomalous_window = window;
        self
    }

    #[must_use]
    pub fn with_anomalous_threshold(mut self, threshold: usize) -> Self {
        self.anomalous_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_reputation_timeout(mut self, timeout: Duration) -> Self {
        self.reputation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reputation_fallback_score(mut self, score: f64) -> Self {
        self.reputation_fallback_score = score.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_unresolved_distance_km(mut self, km: f64) -> Self {
        self.unresolved_distance_km = km;
        self
    }

    #[must_use]
    pub fn step_up_threshold(&self) -> u8 {
        self.step_up_threshold
    }

    #[must_use]
    pub fn reputation_timeout(&self) -> Duration {
        self.reputation_timeout
    }

    #[must_use]
    pub fn failure_window(&self) -> ChronoDuration {
        self.failure_window
    }
}

/// `true` when `fingerprint` is one of `known`.
#[must_use]
pub fn is_known_device<S: AsRef<str>>(fingerprint: &str, known: &[S]) -> bool {
    known.iter().any(|candidate| candidate.as_ref() == fingerprint)
}

pub struct RiskAssessmentEngine {
    config: RiskConfig,
    reputation: Arc<dyn IpReputation>,
    alert_sink: Arc<dyn AlertSink>,
}

impl Default for RiskAssessmentEngine {
    fn default() -> Self {
        Self::new(
            RiskConfig::default(),
            Arc::new(StaticIpReputation::default()),
            Arc::new(TracingAlertSink),
        )
    }
}

impl RiskAssessmentEngine {
    pub fn new(
        config: RiskConfig,
        reputation: Arc<dyn IpReputation>,
        alert_sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            config,
            reputation,
            alert_sink,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Scores a login attempt against the user's history.
    ///
    /// # Errors
    /// Returns `TrustError::Validation` for a malformed IP address or device
    /// fingerprint. Reputation and alerting failures never surface here.
    pub async fn assess_login_risk(
        &self,
        context: &LoginContext,
        history: LoginHistory<'_>,
    ) -> Result<RiskAssessment> {
        self.assess_login_risk_at(context, history, Utc::now()).await
    }

    /// Same as [`Self::assess_login_risk`] with an explicit clock.
    ///
    /// # Errors
    /// Returns `TrustError::Validation` for malformed input.
    #[instrument(skip(self, context, history), fields(user_id = %context.user_id))]
    pub async fn assess_login_risk_at(
        &self,
        context: &LoginContext,
        history: LoginHistory<'_>,
        now: DateTime<Utc>,
    ) -> Result<RiskAssessment> {
        let ip = utils::parse_ip(&context.ip_address)?;
        utils::validate_fingerprint(&context.device_fingerprint)?;

        let attempts: Vec<&LoginAttempt> = history
            .attempts
            .iter()
            .filter(|attempt| attempt.user_id == context.user_id && attempt.timestamp <= now)
            .collect();

        let mut signals = RiskSignals::default();
        let mut factors = Vec::new();
        let mut points = 0.0;

        points += self.assess_failed_attempts(&attempts, now, &mut signals, &mut factors);
        points += self.assess_location(context, &attempts, now, &mut signals, &mut factors);
        points += self.assess_device(context, &history, &mut signals, &mut factors);
        points += self.assess_ip_reputation(ip, &mut signals, &mut factors).await;
        points += self.assess_velocity(&attempts, now, &mut signals, &mut factors);

        let risk_score = composite_score(points);
        let risk_level = RiskLevel::from_score(risk_score);
        let requires_step_up = risk_score >= self.config.step_up_threshold;

        let alerts = if requires_step_up {
            let alerts = build_alerts(&AlertInput {
                context,
                score: risk_score,
                level: risk_level,
                factors: &factors,
                signals: &signals,
                now,
            });
            dispatch_detached(&self.alert_sink, &alerts);
            alerts
        } else {
            Vec::new()
        };

        debug!(
            risk_score,
            risk_level = %risk_level,
            requires_step_up,
            factors = ?factors,
            "Assessed login risk"
        );

        Ok(RiskAssessment {
            risk_score,
            risk_level,
            factors,
            requires_step_up,
            signals,
            alerts,
        })
    }

    /// Short-window brute-force detector, independent of the composite score:
    /// `true` when the user has at least the configured number of failures
    /// (3 by default) in the trailing window (15 minutes by default).
    #[must_use]
    pub fn detect_anomalous_pattern(
        &self,
        user_id: Uuid,
        attempts: &[LoginAttempt],
        now: DateTime<Utc>,
    ) -> bool {
        let since = now - self.config.anomalous_window;
        let failures = attempts
            .iter()
            .filter(|attempt| {
                attempt.user_id == user_id
                    && !attempt.success
                    && attempt.timestamp >= since
                    && attempt.timestamp <= now
            })
            .count();
        failures >= self.config.anomalous_threshold
    }

    fn assess_failed_attempts(
        &self,
        attempts: &[&LoginAttempt],
        now: DateTime<Utc>,
        signals: &mut RiskSignals,
        factors: &mut Vec<String>,
    ) -> f64 {
        let since = now - self.config.failure_window;
        let failed = attempts
            .iter()
            .filter(|attempt| !attempt.success && attempt.timestamp >= since)
            .count();
        let failed = u32::try_from(failed).unwrap_or(u32::MAX);
        signals.failed_attempts = failed;

        if failed == 0 {
            return 0.0;
        }
        factors.push(format!("failed_attempts:{failed}"));
        f64::from(failed.saturating_mul(FAILED_ATTEMPT_POINTS).min(FAILED_ATTEMPT_CAP))
    }

    fn assess_location(
        &self,
        context: &LoginContext,
        attempts: &[&LoginAttempt],
        now: DateTime<Utc>,
        signals: &mut RiskSignals,
        factors: &mut Vec<String>,
    ) -> f64 {
        let Some(current) = context.location.as_ref() else {
            return 0.0;
        };

        let mut points = 0.0;

        let known = attempts.iter().any(|attempt| {
            attempt.success
                && attempt
                    .location
                    .as_ref()
                    .is_some_and(|location| location.same_place(current))
        });
        if !known {
            signals.is_new_location = true;
            factors.push("new_location".to_string());
            points += NEW_LOCATION_POINTS;
        }

        let previous = attempts
            .iter()
            .filter(|attempt| attempt.location.is_some())
            .max_by_key(|attempt| attempt.timestamp);

        if let Some((previous, previous_location)) =
            previous.and_then(|attempt| attempt.location.as_ref().map(|loc| (attempt, loc)))
        {
            let distance =
                geo::distance_km(previous_location, current, self.config.unresolved_distance_km);
            let elapsed_ms = (now - previous.timestamp).num_milliseconds();
            #[allow(clippy::cast_precision_loss)]
            let elapsed_hours = elapsed_ms as f64 / 3_600_000.0;
            let speed = geo::required_speed_kmh(distance, elapsed_hours);

            if speed > self.config.impossible_travel_kmh {
                signals.is_impossible_travel = true;
                factors.push("impossible_travel".to_string());
                points += IMPOSSIBLE_TRAVEL_POINTS;
                debug!(
                    from = %previous_location.label,
                    to = %current.label,
                    distance_km = distance,
                    speed_kmh = speed,
                    "Impossible travel detected"
                );
            }
        }

        points
    }

    fn assess_device(
        &self,
        context: &LoginContext,
        history: &LoginHistory<'_>,
        signals: &mut RiskSignals,
        factors: &mut Vec<String>,
    ) -> f64 {
        let known = history.known_fingerprints();
        if is_known_device(&context.device_fingerprint, &known) {
            return 0.0;
        }
        signals.is_new_device = true;
        factors.push("new_device".to_string());
        NEW_DEVICE_POINTS
    }

    async fn assess_ip_reputation(
        &self,
        ip: IpAddr,
        signals: &mut RiskSignals,
        factors: &mut Vec<String>,
    ) -> f64 {
        let fallback = self.config.reputation_fallback_score;
        let score =
            match tokio::time::timeout(self.config.reputation_timeout, self.reputation.score(ip))
                .await
            {
                Ok(Ok(score)) if score.is_finite() => score.clamp(0.0, 1.0),
                Ok(Ok(score)) => {
                    warn!(%ip, "IP reputation returned non-finite score {score}, using fallback");
                    fallback
                }
                Ok(Err(err)) => {
                    warn!(%ip, "IP reputation lookup failed, using fallback: {err}");
                    fallback
                }
                Err(_) => {
                    warn!(
                        %ip,
                        timeout = ?self.config.reputation_timeout,
                        "IP reputation lookup timed out, using fallback"
                    );
                    fallback
                }
            };

        signals.ip_reputation_score = score;
        if score > 0.0 {
            factors.push(format!("ip_reputation:{score:.2}"));
        }
        score * IP_REPUTATION_WEIGHT
    }

    fn assess_velocity(
        &self,
        attempts: &[&LoginAttempt],
        now: DateTime<Utc>,
        signals: &mut RiskSignals,
        factors: &mut Vec<String>,
    ) -> f64 {
        let minute_ago = now - ChronoDuration::minutes(1);
        let hour_ago = now - ChronoDuration::hours(1);

        let last_minute = attempts
            .iter()
            .filter(|attempt| attempt.timestamp > minute_ago)
            .count();
        let last_hour = attempts
            .iter()
            .filter(|attempt| attempt.timestamp > hour_ago)
            .count();

        let velocity = velocity_ratio(last_minute, self.config.velocity_max_per_minute)
            .max(velocity_ratio(last_hour, self.config.velocity_max_per_hour))
            .min(1.0);

        signals.velocity_score = velocity;
        if velocity > 0.0 {
            factors.push(format!("velocity:{velocity:.2}"));
        }
        velocity * VELOCITY_WEIGHT
    }
}

#[allow(clippy::cast_precision_loss)]
fn velocity_ratio(observed: usize, max: u32) -> f64 {
    if max == 0 {
        return 0.0;
    }
    observed as f64 / f64::from(max)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn composite_score(points: f64) -> u8 {
    if !points.is_finite() {
        return 100;
    }
    points.round().clamp(0.0, 100.0) as u8
}
