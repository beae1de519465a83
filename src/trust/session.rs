//! Session model as seen by the decision core.
//!
//! Sessions are owned by the identity store. This crate only reads them and
//! updates the trust score and activity timestamp.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const MIN_TRUST_SCORE: i32 = 0;
pub const MAX_TRUST_SCORE: i32 = 100;

/// Sessions idle for longer than this are considered inactive.
pub const INACTIVITY_THRESHOLD_DAYS: i64 = 30;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_fingerprint: String,
    pub ip_address: String,
    pub location: Option<String>,
    #[serde(deserialize_with = "deserialize_trust_score")]
    pub(crate) trust_score: u8,
    pub is_trusted: bool,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Builds a fresh, untrusted session with a neutral score.
    #[must_use]
    pub fn new(
        user_id: Uuid,
        device_fingerprint: impl Into<String>,
        ip_address: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            device_fingerprint: device_fingerprint.into(),
            ip_address: ip_address.into(),
            location: None,
            trust_score: 50,
            is_trusted: false,
            last_activity_at: now,
            expires_at: now + ttl,
            revoked_at: None,
            created_at: now,
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_trust_score(mut self, score: i32) -> Self {
        self.set_trust_score(score);
        self
    }

    #[must_use]
    pub fn trust_score(&self) -> u8 {
        self.trust_score
    }

    /// Stores `score` clamped to `[0, 100]`.
    pub fn set_trust_score(&mut self, score: i32) {
        self.trust_score = clamp_score(score);
    }

    /// Flags the session as trusted and adds the trusted-device bonus.
    pub fn mark_as_trusted(&mut self) {
        self.is_trusted = true;
        self.set_trust_score(i32::from(self.trust_score) + super::TRUSTED_BONUS);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired_at(now) && !self.is_revoked()
    }

    #[must_use]
    pub fn is_inactive(&self) -> bool {
        self.is_inactive_at(Utc::now())
    }

    #[must_use]
    pub fn is_inactive_at(&self, now: DateTime<Utc>) -> bool {
        now - self.last_activity_at > Duration::days(INACTIVITY_THRESHOLD_DAYS)
    }
}

pub(crate) fn clamp_score(score: i32) -> u8 {
    // Lossless after the clamp.
    u8::try_from(score.clamp(MIN_TRUST_SCORE, MAX_TRUST_SCORE)).unwrap_or(0)
}

/// Out-of-range scores from serialized input are clamped like any other write.
fn deserialize_trust_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let score = i64::deserialize(deserializer)?;
    let score = score.clamp(i64::from(MIN_TRUST_SCORE), i64::from(MAX_TRUST_SCORE));
    Ok(clamp_score(i32::try_from(score).unwrap_or(MIN_TRUST_SCORE)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(Uuid::new_v4(), "device-abc123", "198.51.100.7", Duration::hours(12))
    }

    #[test]
    fn new_session_is_valid_and_neutral() {
        let session = session();
        assert_eq!(session.trust_score(), 50);
        assert!(!session.is_trusted);
        assert!(session.is_valid());
        assert!(!session.is_inactive());
    }

    #[test]
    fn trust_score_is_clamped() {
        let mut session = session();
        session.set_trust_score(250);
        assert_eq!(session.trust_score(), 100);
        session.set_trust_score(-40);
        assert_eq!(session.trust_score(), 0);
    }

    #[test]
    fn mark_as_trusted_adds_bonus_and_clamps() {
        let mut session = session().with_trust_score(60);
        session.mark_as_trusted();
        assert!(session.is_trusted);
        assert_eq!(session.trust_score(), 90);

        session.mark_as_trusted();
        assert_eq!(session.trust_score(), 100);
    }

    #[test]
    fn expiry_is_inclusive_of_the_deadline() {
        let session = session();
        assert!(!session.is_expired_at(session.expires_at));
        assert!(session.is_expired_at(session.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn revoked_session_is_invalid() {
        let mut session = session();
        session.revoked_at = Some(Utc::now());
        assert!(session.is_revoked());
        assert!(!session.is_valid());
    }

    #[test]
    fn inactivity_after_thirty_days() {
        let session = session();
        let now = session.last_activity_at;
        assert!(!session.is_inactive_at(now + Duration::days(30)));
        assert!(session.is_inactive_at(now + Duration::days(30) + Duration::seconds(1)));
    }

    #[test]
    fn deserialized_trust_score_is_clamped() {
        let mut value = serde_json::to_value(session()).unwrap();
        value["trust_score"] = serde_json::json!(250);
        let high: Session = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(high.trust_score(), 100);

        value["trust_score"] = serde_json::json!(-40);
        let low: Session = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(low.trust_score(), 0);

        value["trust_score"] = serde_json::json!(72);
        let stored: Session = serde_json::from_value(value).unwrap();
        assert_eq!(stored.trust_score(), 72);
    }
}
