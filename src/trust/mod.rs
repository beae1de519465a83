//! Session trust scoring.
//!
//! Scores start at a neutral 50 and move with what we recognise about the
//! session: a trusted device, a fingerprint seen before, a familiar location
//! and recent activity from the same device. Unknown locations cost points.
//! The result is always clamped to `[0, 100]`.

mod session;

pub use session::{INACTIVITY_THRESHOLD_DAYS, MAX_TRUST_SCORE, MIN_TRUST_SCORE, Session};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use session::clamp_score;

pub const BASE_SCORE: i32 = 50;
pub const TRUSTED_BONUS: i32 = 30;
pub const KNOWN_DEVICE_BONUS: i32 = 15;
pub const KNOWN_LOCATION_BONUS: i32 = 20;
pub const NEW_LOCATION_PENALTY: i32 = 20;
pub const RECENT_ACTIVITY_BONUS: i32 = 10;

/// Window in which prior activity on the same device earns the recency bonus.
pub const RECENT_ACTIVITY_WINDOW_HOURS: i64 = 24;

/// Pure trust scorer. Holds no state and performs no I/O.
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionTrustCalculator;

impl SessionTrustCalculator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Scores `session` against the user's other sessions and writes the
    /// result back onto it.
    pub fn calculate_trust_score(&self, session: &mut Session, prior_sessions: &[Session]) -> u8 {
        self.calculate_trust_score_at(session, prior_sessions, Utc::now())
    }

    pub fn calculate_trust_score_at(
        &self,
        session: &mut Session,
        prior_sessions: &[Session],
        now: DateTime<Utc>,
    ) -> u8 {
        let score = self.score_at(session, prior_sessions, now);
        session.set_trust_score(i32::from(score));
        score
    }

    /// Computes the score without touching the session.
    #[must_use]
    pub fn score_at(&self, session: &Session, prior_sessions: &[Session], now: DateTime<Utc>) -> u8 {
        let others: Vec<&Session> = prior_sessions
            .iter()
            .filter(|prior| prior.id != session.id)
            .collect();

        let mut score = BASE_SCORE;

        if session.is_trusted {
            score += TRUSTED_BONUS;
        }

        let same_device: Vec<&Session> = others
            .iter()
            .copied()
            .filter(|prior| prior.device_fingerprint == session.device_fingerprint)
            .collect();

        if !same_device.is_empty() {
            score += KNOWN_DEVICE_BONUS;
        }

        if let Some(location) = session.location.as_deref() {
            let seen = others
                .iter()
                .any(|prior| prior.location.as_deref() == Some(location));
            if seen {
                score += KNOWN_LOCATION_BONUS;
            } else {
                score -= NEW_LOCATION_PENALTY;
            }
        }

        let recent_cutoff = now - Duration::hours(RECENT_ACTIVITY_WINDOW_HOURS);
        if same_device
            .iter()
            .any(|prior| prior.last_activity_at >= recent_cutoff)
        {
            score += RECENT_ACTIVITY_BONUS;
        }

        let score = clamp_score(score);
        debug!(
            session_id = %session.id,
            user_id = %session.user_id,
            score,
            "Calculated session trust score"
        );
        score
    }
}
