//! Cross-signal correlation -- input signal types and report structures.
//!
//! One detection event yields independent per-signal analyzer outputs
//! (identity, attire, badge, schedule); the engine in [`engine`] checks them
//! against each other.

pub mod engine;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::alert::Alert;
use crate::analysis::schedule::{
    ComplianceStatus, ExpectedStatus, ScheduleAnomaly, ScheduleEvaluation,
};
use crate::detect::Severity;

/// Latest per-signal analyzer outputs for one event. Absent signals degrade
/// the checks that need them; they never abort correlation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalBundle {
    pub identity: Option<IdentitySignal>,
    pub attire: Option<AttireSignal>,
    pub badge: Option<BadgeSignal>,
    pub schedule: Option<ScheduleSignal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySignal {
    pub person_detected: bool,
    /// Recognized subject name, if the identity matcher found one.
    pub matched_name: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttireSignal {
    /// Dress formality in [0, 1].
    pub formality_score: f64,
    pub dress_code_compliant: bool,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeSignal {
    pub has_valid_badge: bool,
    pub badge_visible: bool,
    /// Name read off the badge by OCR, if legible.
    pub ocr_name: Option<String>,
    /// Badge-policy compliance in [0, 1].
    pub compliance_score: f64,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSignal {
    pub expected_status: ExpectedStatus,
    pub compliance: ComplianceStatus,
    pub anomalies: Vec<ScheduleAnomaly>,
    #[serde(default)]
    pub confidence: f64,
}

impl From<ScheduleEvaluation> for ScheduleSignal {
    fn from(eval: ScheduleEvaluation) -> Self {
        Self {
            expected_status: eval.expected_status,
            compliance: eval.compliance,
            anomalies: eval.anomalies,
            confidence: eval.confidence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    Mismatch,
    Partial,
    Unidentified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConsistency {
    pub face_badge_match: bool,
    pub similarity: f64,
    pub verification_status: VerificationStatus,
    pub discrepancies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehavioralConsistency {
    pub indicators: Vec<String>,
    pub anomaly_score: f64,
}

/// Closed set of policy violations the correlation engine enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    NoValidBadge,
    ScheduleViolation,
    DressCodeViolation,
    UnidentifiedPerson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub description: String,
    pub policy: String,
}

/// Weighted-count risk view: 3x security + 2x operational + 1x compliance.
/// Intentionally a separate scale from the 0-10 behavioral risk score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskIndicators {
    pub security_risks: Vec<String>,
    pub operational_risks: Vec<String>,
    pub compliance_risks: Vec<String>,
    pub level: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Normal,
    Warning,
    Alert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallAssessment {
    pub status: OverallStatus,
    pub priority: Severity,
    pub action_required: bool,
    /// Non-normalized sum of consistency heuristics; higher is better.
    pub confidence: f64,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationReport {
    pub identity_consistency: IdentityConsistency,
    pub behavioral_consistency: BehavioralConsistency,
    pub policy_violations: Vec<PolicyViolation>,
    pub risk_indicators: RiskIndicators,
    pub overall: OverallAssessment,
    /// Per-signal confidence plus a weighted "overall" entry.
    pub confidence_scores: BTreeMap<String, f64>,
    pub alerts: Vec<Alert>,
}
