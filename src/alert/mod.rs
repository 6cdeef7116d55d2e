//! Alert types and notification sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::detect::Severity;

/// Closed set of alert categories produced by the engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    PolicyViolation,
    SecurityRisk,
    UnidentifiedPerson,
    BehavioralRisk,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::PolicyViolation => "policy_violation",
            AlertKind::SecurityRisk => "security_risk",
            AlertKind::UnidentifiedPerson => "unidentified_person",
            AlertKind::BehavioralRisk => "behavioral_risk",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "policy_violation" => Some(AlertKind::PolicyViolation),
            "security_risk" => Some(AlertKind::SecurityRisk),
            "unidentified_person" => Some(AlertKind::UnidentifiedPerson),
            "behavioral_risk" => Some(AlertKind::BehavioralRisk),
            _ => None,
        }
    }
}

/// Produced once, never mutated; consumed by a notification sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub requires_action: bool,
}

impl Alert {
    pub fn new(
        kind: AlertKind,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
        requires_action: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            title: title.into(),
            description: description.into(),
            timestamp,
            requires_action,
        }
    }
}

/// Fire-and-forget delivery. A failing sink is logged by the caller and never
/// blocks analysis.
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// Default sink: route alerts into the tracing stream at a level matching
/// their severity.
pub struct TracingSink;

#[async_trait::async_trait]
impl AlertSink for TracingSink {
    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        match alert.severity {
            Severity::Critical => {
                error!(kind = %alert.kind.as_str(), title = %alert.title, "ALERT: {}", alert.description)
            }
            Severity::High => {
                warn!(kind = %alert.kind.as_str(), title = %alert.title, "ALERT: {}", alert.description)
            }
            _ => {
                info!(kind = %alert.kind.as_str(), title = %alert.title, "alert: {}", alert.description)
            }
        }
        Ok(())
    }
}
