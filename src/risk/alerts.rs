//! Security alert construction and dispatch.
//!
//! Alerts are a side effect of a high-risk assessment. Building or dispatching
//! one must never fail the assessment itself, so every error here is logged and
//! swallowed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use super::models::{
    AlertSeverity, AlertType, LoginContext, RiskLevel, RiskSignals, SecurityAlert,
};

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn dispatch(&self, alert: &SecurityAlert) -> anyhow::Result<()>;
}

/// Writes alerts to the log. Used when no delivery channel is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn dispatch(&self, alert: &SecurityAlert) -> anyhow::Result<()> {
        warn!(
            alert_id = %alert.id,
            user_id = %alert.user_id,
            alert_type = ?alert.alert_type,
            severity = ?alert.severity,
            metadata = %alert.metadata,
            "{}",
            alert.message
        );
        Ok(())
    }
}

pub(super) struct AlertInput<'a> {
    pub context: &'a LoginContext,
    pub score: u8,
    pub level: RiskLevel,
    pub factors: &'a [String],
    pub signals: &'a RiskSignals,
    pub now: DateTime<Utc>,
}

/// Builds the alerts for a high-risk outcome. Returns an empty list when the
/// context cannot be serialized.
pub(super) fn build_alerts(input: &AlertInput<'_>) -> Vec<SecurityAlert> {
    let signals = match serde_json::to_value(input.signals) {
        Ok(value) => value,
        Err(err) => {
            error!("Failed to serialize risk signals for alert: {err}");
            return Vec::new();
        }
    };
    let location = match input.context.location.as_ref().map(serde_json::to_value).transpose() {
        Ok(value) => value,
        Err(err) => {
            error!("Failed to serialize login location for alert: {err}");
            return Vec::new();
        }
    };

    let metadata = json!({
        "risk_score": input.score,
        "risk_level": input.level,
        "factors": input.factors,
        "signals": signals,
        "ip_address": input.context.ip_address,
        "device_fingerprint": input.context.device_fingerprint,
        "location": location,
    });
    let severity = AlertSeverity::from(input.level);

    let mut alerts = vec![SecurityAlert {
        id: Uuid::new_v4(),
        user_id: input.context.user_id,
        alert_type: AlertType::HighRiskLogin,
        severity,
        message: format!(
            "High-risk login detected (score {}, level {})",
            input.score, input.level
        ),
        metadata: metadata.clone(),
        timestamp: input.now,
    }];

    if input.signals.is_impossible_travel {
        alerts.push(SecurityAlert {
            id: Uuid::new_v4(),
            user_id: input.context.user_id,
            alert_type: AlertType::ImpossibleTravel,
            severity: severity.max(AlertSeverity::High),
            message: "Login implies physically impossible travel".to_string(),
            metadata,
            timestamp: input.now,
        });
    }

    alerts
}

/// Hands alerts to the sink on a detached task.
pub(super) fn dispatch_detached(sink: &Arc<dyn AlertSink>, alerts: &[SecurityAlert]) {
    for alert in alerts {
        let sink = Arc::clone(sink);
        let alert = alert.clone();
        tokio::spawn(async move {
            if let Err(err) = sink.dispatch(&alert).await {
                error!(alert_id = %alert.id, "Failed to dispatch security alert: {err}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::models::Location;

    fn context() -> LoginContext {
        LoginContext {
            user_id: Uuid::new_v4(),
            ip_address: "203.0.113.9".to_string(),
            location: Some(Location::named("Lagos, NG")),
            device_fingerprint: "device-new-0001".to_string(),
        }
    }

    #[test]
    fn high_risk_alert_carries_context() {
        let context = context();
        let signals = RiskSignals {
            failed_attempts: 4,
            ..RiskSignals::default()
        };
        let factors = vec!["failed_attempts:4".to_string()];
        let alerts = build_alerts(&AlertInput {
            context: &context,
            score: 74,
            level: RiskLevel::High,
            factors: &factors,
            signals: &signals,
            now: Utc::now(),
        });

        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.alert_type, AlertType::HighRiskLogin);
        assert_eq!(alert.severity, AlertSeverity::High);
        assert_eq!(alert.user_id, context.user_id);
        assert_eq!(alert.metadata["risk_score"], 74);
        assert_eq!(alert.metadata["ip_address"], "203.0.113.9");
        assert_eq!(alert.metadata["signals"]["failed_attempts"], 4);
    }

    #[test]
    fn impossible_travel_adds_second_alert() {
        let context = context();
        let signals = RiskSignals {
            is_impossible_travel: true,
            ..RiskSignals::default()
        };
        let alerts = build_alerts(&AlertInput {
            context: &context,
            score: 62,
            level: RiskLevel::Medium,
            factors: &[],
            signals: &signals,
            now: Utc::now(),
        });

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[1].alert_type, AlertType::ImpossibleTravel);
        assert_eq!(alerts[1].severity, AlertSeverity::High);
    }

    struct FailingSink;

    #[async_trait]
    impl AlertSink for FailingSink {
        async fn dispatch(&self, _alert: &SecurityAlert) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("smtp relay down"))
        }
    }

    #[tokio::test]
    async fn sink_failures_are_swallowed() {
        let context = context();
        let signals = RiskSignals::default();
        let alerts = build_alerts(&AlertInput {
            context: &context,
            score: 90,
            level: RiskLevel::Critical,
            factors: &[],
            signals: &signals,
            now: Utc::now(),
        });
        let sink: Arc<dyn AlertSink> = Arc::new(FailingSink);
        dispatch_detached(&sink, &alerts);
        tokio::task::yield_now().await;
    }
}
