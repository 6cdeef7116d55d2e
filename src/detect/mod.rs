//! Anomaly detection, risk aggregation, and action guidance.

pub mod recommend;
pub mod risk;
pub mod rules;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity levels for detected anomalies and alerts.
///
/// The ordinal (low < medium < high < critical) is fixed; every aggregator
/// relies on the derived ordering, so variant order is load-bearing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of behavioral anomaly rules. Each variant maps to exactly one
/// check in [`rules::AnomalyDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    UnusualHourPresence,
    ExcessiveLocationDwell,
    UnusualLocationSequence,
    LargeDetectionGap,
    HighDetectionFrequency,
    RestrictedAreaAccess,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::UnusualHourPresence => "unusual_hour_presence",
            AnomalyKind::ExcessiveLocationDwell => "excessive_location_dwell",
            AnomalyKind::UnusualLocationSequence => "unusual_location_sequence",
            AnomalyKind::LargeDetectionGap => "large_detection_gap",
            AnomalyKind::HighDetectionFrequency => "high_detection_frequency",
            AnomalyKind::RestrictedAreaAccess => "restricted_area_access",
        }
    }
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule-triggered deviation event. Transient per analysis call; optionally
/// appended to the audit log as a side effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub description: String,
    pub subject_id: Option<String>,
    pub location: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub evidence: serde_json::Value,
}
