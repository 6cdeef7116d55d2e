//! Action guidance -- a deterministic rule table over the risk level and the
//! anomaly/change mix. Output is additive and de-duplicated.

use crate::analysis::change::BehavioralChange;
use crate::detect::{Anomaly, AnomalyKind, Severity};
use crate::detect::risk::RiskAssessment;

fn push_unique(recommendations: &mut Vec<String>, text: &str) {
    if !recommendations.iter().any(|r| r == text) {
        recommendations.push(text.to_string());
    }
}

/// Build the guidance list for one analysis result.
pub fn recommend(
    assessment: &RiskAssessment,
    anomalies: &[Anomaly],
    changes: &[BehavioralChange],
) -> Vec<String> {
    let mut recommendations: Vec<String> = Vec::new();

    if assessment.level >= Severity::High {
        push_unique(&mut recommendations, "Increase monitoring frequency");
        push_unique(&mut recommendations, "Review access permissions");
    }

    if anomalies
        .iter()
        .any(|a| a.kind == AnomalyKind::RestrictedAreaAccess)
    {
        push_unique(&mut recommendations, "Verify authorization for restricted areas");
        push_unique(&mut recommendations, "Require additional authentication");
    }

    if anomalies
        .iter()
        .any(|a| a.kind == AnomalyKind::UnusualHourPresence)
    {
        push_unique(
            &mut recommendations,
            "Investigate reason for out-of-hours presence",
        );
        push_unique(&mut recommendations, "Review access-control schedule");
    }

    if !changes.is_empty() {
        push_unique(&mut recommendations, "Check for role or project changes");
    }

    if recommendations.is_empty() {
        push_unique(&mut recommendations, "Maintain routine monitoring");
        push_unique(&mut recommendations, "Continue pattern analysis");
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn anomaly(kind: AnomalyKind, severity: Severity) -> Anomaly {
        Anomaly {
            kind,
            severity,
            description: String::new(),
            subject_id: None,
            location: None,
            timestamp: None,
            evidence: json!({}),
        }
    }

    fn assessment(level: Severity) -> RiskAssessment {
        RiskAssessment {
            score: 0.0,
            level,
            risk_factors: Vec::new(),
            protective_factors: Vec::new(),
        }
    }

    #[test]
    fn test_quiet_result_falls_back_to_routine() {
        let recs = recommend(&assessment(Severity::Low), &[], &[]);
        assert_eq!(
            recs,
            vec!["Maintain routine monitoring", "Continue pattern analysis"]
        );
    }

    #[test]
    fn test_high_risk_plus_restricted_access() {
        let anomalies = vec![anomaly(AnomalyKind::RestrictedAreaAccess, Severity::High)];
        let recs = recommend(&assessment(Severity::Critical), &anomalies, &[]);
        assert_eq!(
            recs,
            vec![
                "Increase monitoring frequency",
                "Review access permissions",
                "Verify authorization for restricted areas",
                "Require additional authentication",
            ]
        );
    }

    #[test]
    fn test_no_duplicates_for_repeated_anomalies() {
        let anomalies = vec![
            anomaly(AnomalyKind::UnusualHourPresence, Severity::High),
            anomaly(AnomalyKind::UnusualHourPresence, Severity::Medium),
        ];
        let recs = recommend(&assessment(Severity::Low), &anomalies, &[]);
        assert_eq!(
            recs,
            vec![
                "Investigate reason for out-of-hours presence",
                "Review access-control schedule",
            ]
        );
    }

    #[test]
    fn test_change_guidance() {
        let changes = vec![BehavioralChange::ArrivalTimeShift {
            severity: Severity::Medium,
            description: String::new(),
            recent_average: "10:00".to_string(),
            historical_average: "09:00".to_string(),
            difference_minutes: 60,
        }];
        let recs = recommend(&assessment(Severity::Low), &[], &changes);
        assert_eq!(recs, vec!["Check for role or project changes"]);
    }
}
