use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::trust::Session;

/// A place a login came from. Coordinates are optional; without them the
/// label is the only thing we can compare.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub label: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Location {
    #[must_use]
    pub fn named(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            latitude: None,
            longitude: None,
        }
    }

    #[must_use]
    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }

    /// Same place by label, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn same_place(&self, other: &Self) -> bool {
        self.label.trim().eq_ignore_ascii_case(other.label.trim())
    }
}

/// Immutable record of one login attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub user_id: Uuid,
    pub ip_address: String,
    pub location: Option<Location>,
    pub device_fingerprint: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

/// The login being assessed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoginContext {
    pub user_id: Uuid,
    pub ip_address: String,
    pub location: Option<Location>,
    pub device_fingerprint: String,
}

/// Prior activity the assessment is scored against.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoginHistory<'a> {
    pub attempts: &'a [LoginAttempt],
    pub sessions: &'a [Session],
}

impl<'a> LoginHistory<'a> {
    #[must_use]
    pub fn new(attempts: &'a [LoginAttempt], sessions: &'a [Session]) -> Self {
        Self { attempts, sessions }
    }

    #[must_use]
    pub fn attempts_only(attempts: &'a [LoginAttempt]) -> Self {
        Self {
            attempts,
            sessions: &[],
        }
    }

    /// Fingerprints of devices that completed a login or hold a session.
    #[must_use]
    pub fn known_fingerprints(&self) -> Vec<&'a str> {
        let mut known: Vec<&'a str> = self
            .attempts
            .iter()
            .filter(|attempt| attempt.success)
            .filter_map(|attempt| attempt.device_fingerprint.as_deref())
            .chain(
                self.sessions
                    .iter()
                    .map(|session| session.device_fingerprint.as_str()),
            )
            .collect();
        known.sort_unstable();
        known.dedup();
        known
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            80.. => Self::Critical,
            70..=79 => Self::High,
            40..=69 => Self::Medium,
            _ => Self::Low,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Individual signals behind a composite score.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskSignals {
    pub failed_attempts: u32,
    pub is_new_location: bool,
    pub is_impossible_travel: bool,
    pub is_new_device: bool,
    pub ip_reputation_score: f64,
    pub velocity_score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub factors: Vec<String>,
    pub requires_step_up: bool,
    pub signals: RiskSignals,
    pub alerts: Vec<SecurityAlert>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    HighRiskLogin,
    ImpossibleTravel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl From<RiskLevel> for AlertSeverity {
    fn from(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Low => Self::Low,
            RiskLevel::Medium => Self::Medium,
            RiskLevel::High => Self::High,
            RiskLevel::Critical => Self::Critical,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn risk_level_boundaries() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(39), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(40), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(69), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(70), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(79), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(80), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }

    #[test]
    fn known_fingerprints_skip_failed_attempts() {
        let user_id = Uuid::new_v4();
        let attempt = |device: &str, success: bool| LoginAttempt {
            user_id,
            ip_address: "198.51.100.7".to_string(),
            location: None,
            device_fingerprint: Some(device.to_string()),
            timestamp: Utc::now(),
            success,
        };
        let attempts = vec![
            attempt("device-good", true),
            attempt("device-bad", false),
            attempt("device-good", true),
        ];
        let session = Session::new(user_id, "device-session", "198.51.100.7", Duration::hours(1));
        let sessions = vec![session];

        let history = LoginHistory::new(&attempts, &sessions);
        assert_eq!(
            history.known_fingerprints(),
            vec!["device-good", "device-session"]
        );
    }

    #[test]
    fn location_labels_compare_loosely() {
        let a = Location::named("Berlin, DE");
        let b = Location::named(" berlin, de ");
        assert!(a.same_place(&b));
        assert!(!a.same_place(&Location::named("Paris, FR")));
    }

    #[test]
    fn alert_serializes_type_field() {
        let alert = SecurityAlert {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            alert_type: AlertType::ImpossibleTravel,
            severity: AlertSeverity::High,
            message: "test".to_string(),
            metadata: Value::Null,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "impossible_travel");
        assert_eq!(json["severity"], "high");
    }
}
