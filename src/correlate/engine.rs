//! Correlation engine -- consistency checks, policy violations, the
//! weighted-count risk view, and alert emission for one event.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::alert::{Alert, AlertKind};
use crate::analysis::schedule::ComplianceStatus;
use crate::correlate::*;
use crate::detect::Severity;

/// Similarity must strictly exceed this for a verified identity.
const VERIFIED_SIMILARITY: f64 = 0.8;
/// Formality below this while expected present reads as inconsistent.
const FORMALITY_FLOOR: f64 = 0.6;
/// Badge compliance below this is a compliance risk.
const BADGE_COMPLIANCE_FLOOR: f64 = 0.7;

const SECURITY_RISK_WEIGHT: usize = 3;
const OPERATIONAL_RISK_WEIGHT: usize = 2;
const COMPLIANCE_RISK_WEIGHT: usize = 1;

/// Cross-check the per-signal outputs for one event.
pub fn correlate(bundle: &SignalBundle, at: DateTime<Utc>) -> CorrelationReport {
    let identity_consistency = check_identity_consistency(bundle);
    let behavioral_consistency = check_behavioral_consistency(bundle);
    let policy_violations = identify_policy_violations(bundle);
    let risk_indicators = identify_risk_indicators(bundle);
    let overall = overall_assessment(
        &identity_consistency,
        &behavioral_consistency,
        &policy_violations,
        &risk_indicators,
    );
    let alerts = build_alerts(bundle, &policy_violations, &risk_indicators, at);

    CorrelationReport {
        identity_consistency,
        behavioral_consistency,
        policy_violations,
        risk_indicators,
        overall,
        confidence_scores: confidence_scores(bundle),
        alerts,
    }
}

/// Name similarity: exact match 1.0, substring containment 0.8, shared-word
/// overlap 0.6, otherwise 0.0.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 0.8;
    }

    let words_a: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let words_b: std::collections::HashSet<&str> = b.split_whitespace().collect();
    if words_a.intersection(&words_b).next().is_some() {
        return 0.6;
    }

    0.0
}

fn check_identity_consistency(bundle: &SignalBundle) -> IdentityConsistency {
    let recognized = bundle
        .identity
        .as_ref()
        .and_then(|i| i.matched_name.as_deref())
        .filter(|name| !name.is_empty());
    let badge_name = bundle
        .badge
        .as_ref()
        .and_then(|b| b.ocr_name.as_deref())
        .filter(|name| !name.is_empty());

    match (recognized, badge_name) {
        (Some(recognized), Some(badge_name)) => {
            let similarity = name_similarity(recognized, badge_name);
            // Strictly greater: a bare substring match is not verification.
            if similarity > VERIFIED_SIMILARITY {
                IdentityConsistency {
                    face_badge_match: true,
                    similarity,
                    verification_status: VerificationStatus::Verified,
                    discrepancies: Vec::new(),
                }
            } else {
                IdentityConsistency {
                    face_badge_match: false,
                    similarity,
                    verification_status: VerificationStatus::Mismatch,
                    discrepancies: vec![format!(
                        "Recognized name ({recognized}) does not match badge ({badge_name})"
                    )],
                }
            }
        }
        (Some(_), None) => IdentityConsistency {
            face_badge_match: false,
            similarity: 0.0,
            verification_status: VerificationStatus::Partial,
            discrepancies: vec!["Known subject but badge not readable".to_string()],
        },
        (None, Some(_)) => IdentityConsistency {
            face_badge_match: false,
            similarity: 0.0,
            verification_status: VerificationStatus::Partial,
            discrepancies: vec!["Badge readable but subject not recognized".to_string()],
        },
        (None, None) => IdentityConsistency {
            face_badge_match: false,
            similarity: 0.0,
            verification_status: VerificationStatus::Unidentified,
            discrepancies: vec!["Neither identity nor badge identified".to_string()],
        },
    }
}

fn check_behavioral_consistency(bundle: &SignalBundle) -> BehavioralConsistency {
    let mut indicators = Vec::new();
    let mut anomaly_score = 0.0;

    if let (Some(attire), Some(schedule)) = (&bundle.attire, &bundle.schedule) {
        let expected_present = schedule.expected_status
            == crate::analysis::schedule::ExpectedStatus::ShouldBePresent;
        if expected_present && attire.formality_score < FORMALITY_FLOOR {
            indicators.push("Informal attire during scheduled work hours".to_string());
            anomaly_score += 1.0;
        }
    }

    if let Some(schedule) = &bundle.schedule {
        anomaly_score += schedule.anomalies.len() as f64 * 0.5;
    }

    BehavioralConsistency {
        indicators,
        anomaly_score,
    }
}

fn identify_policy_violations(bundle: &SignalBundle) -> Vec<PolicyViolation> {
    let mut violations = Vec::new();

    let has_valid_badge = bundle
        .badge
        .as_ref()
        .map(|b| b.has_valid_badge)
        .unwrap_or(false);
    if !has_valid_badge {
        violations.push(PolicyViolation {
            kind: ViolationKind::NoValidBadge,
            severity: Severity::High,
            description: "No valid badge presented".to_string(),
            policy: "Mandatory badge use".to_string(),
        });
    }

    if let Some(schedule) = &bundle.schedule {
        if schedule.compliance == ComplianceStatus::Violation {
            violations.push(PolicyViolation {
                kind: ViolationKind::ScheduleViolation,
                severity: Severity::Medium,
                description: "Presence outside authorized hours".to_string(),
                policy: "Time-based access control".to_string(),
            });
        }
    }

    if let Some(attire) = &bundle.attire {
        if !attire.dress_code_compliant {
            violations.push(PolicyViolation {
                kind: ViolationKind::DressCodeViolation,
                severity: Severity::Low,
                description: "Dress code non-compliance".to_string(),
                policy: "Corporate dress code".to_string(),
            });
        }
    }

    if person_unmatched(bundle) {
        violations.push(PolicyViolation {
            kind: ViolationKind::UnidentifiedPerson,
            severity: Severity::High,
            description: "Person not identified in the system".to_string(),
            policy: "Access restricted to authorized subjects".to_string(),
        });
    }

    violations
}

fn person_unmatched(bundle: &SignalBundle) -> bool {
    bundle
        .identity
        .as_ref()
        .map(|i| i.person_detected && i.matched_name.is_none())
        .unwrap_or(false)
}

fn identify_risk_indicators(bundle: &SignalBundle) -> RiskIndicators {
    let mut security_risks = Vec::new();
    let mut operational_risks = Vec::new();
    let mut compliance_risks = Vec::new();

    if person_unmatched(bundle) {
        security_risks.push("Unmatched person detected".to_string());
    }

    if let Some(schedule) = &bundle.schedule {
        for anomaly in &schedule.anomalies {
            if anomaly.severity >= Severity::High {
                operational_risks.push(anomaly.description.clone());
            }
        }
    }

    if let Some(badge) = &bundle.badge {
        if badge.compliance_score < BADGE_COMPLIANCE_FLOOR {
            compliance_risks.push("Low badge policy compliance".to_string());
        }
    }

    let weight = security_risks.len() * SECURITY_RISK_WEIGHT
        + operational_risks.len() * OPERATIONAL_RISK_WEIGHT
        + compliance_risks.len() * COMPLIANCE_RISK_WEIGHT;

    let level = if weight >= 6 {
        Severity::Critical
    } else if weight >= 4 {
        Severity::High
    } else if weight >= 2 {
        Severity::Medium
    } else {
        Severity::Low
    };

    RiskIndicators {
        security_risks,
        operational_risks,
        compliance_risks,
        level,
    }
}

fn overall_assessment(
    identity: &IdentityConsistency,
    behavioral: &BehavioralConsistency,
    violations: &[PolicyViolation],
    risk: &RiskIndicators,
) -> OverallAssessment {
    let high_violations = violations.iter().any(|v| v.severity >= Severity::High);

    let (status, priority, action_required, summary) = if high_violations
        || risk.level >= Severity::High
    {
        (
            OverallStatus::Alert,
            Severity::High,
            true,
            "Situation requires immediate attention".to_string(),
        )
    } else if !violations.is_empty() || risk.level == Severity::Medium {
        (
            OverallStatus::Warning,
            Severity::Medium,
            true,
            "Situation requires monitoring".to_string(),
        )
    } else {
        (
            OverallStatus::Normal,
            Severity::Low,
            false,
            "Situation within normal bounds".to_string(),
        )
    };

    let mut confidence = 0.0;
    confidence += match identity.verification_status {
        VerificationStatus::Verified => 0.4,
        VerificationStatus::Partial => 0.2,
        _ => 0.0,
    };
    confidence += (0.3 - behavioral.anomaly_score * 0.1).max(0.0);
    if violations.is_empty() {
        confidence += 0.3;
    }

    OverallAssessment {
        status,
        priority,
        action_required,
        confidence,
        summary,
    }
}

fn confidence_scores(bundle: &SignalBundle) -> BTreeMap<String, f64> {
    let mut scores = BTreeMap::new();
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    let mut add = |name: &str, weight: f64, confidence: Option<f64>| {
        if let Some(confidence) = confidence {
            scores.insert(name.to_string(), confidence);
            weighted_sum += confidence * weight;
            total_weight += weight;
        }
    };

    add("identity", 0.3, bundle.identity.as_ref().map(|s| s.confidence));
    add("badge", 0.25, bundle.badge.as_ref().map(|s| s.confidence));
    add("attire", 0.2, bundle.attire.as_ref().map(|s| s.confidence));
    add("schedule", 0.25, bundle.schedule.as_ref().map(|s| s.confidence));

    let overall = if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        0.0
    };
    scores.insert("overall".to_string(), overall);
    scores
}

fn build_alerts(
    bundle: &SignalBundle,
    violations: &[PolicyViolation],
    risk: &RiskIndicators,
    at: DateTime<Utc>,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    for violation in violations {
        if violation.severity >= Severity::High {
            alerts.push(Alert::new(
                AlertKind::PolicyViolation,
                violation.severity,
                format!("Violation: {}", violation.description),
                format!("Policy: {}", violation.policy),
                at,
                true,
            ));
        }
    }

    for risk_description in &risk.security_risks {
        alerts.push(Alert::new(
            AlertKind::SecurityRisk,
            Severity::High,
            "Security risk",
            risk_description.clone(),
            at,
            true,
        ));
    }

    if person_unmatched(bundle) {
        alerts.push(Alert::new(
            AlertKind::UnidentifiedPerson,
            Severity::Critical,
            "Unidentified person",
            "Person detected but not recognized in the system",
            at,
            true,
        ));
    }

    alerts
}
