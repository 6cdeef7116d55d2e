//! Behavioral risk aggregation -- the 0-10 score over anomalies and changes.
//!
//! This scale is distinct from the correlation engine's weighted-count risk;
//! the two are never interchangeable.

use serde::{Deserialize, Serialize};

use crate::analysis::change::BehavioralChange;
use crate::detect::{Anomaly, AnomalyKind, Severity};

/// Each behavioral change contributes this much to the score.
const CHANGE_WEIGHT: f64 = 1.5;
/// Restricted-area anomalies carry an explicit bonus on top of their base
/// severity weight. The double count is deliberate escalation policy.
const RESTRICTED_ACCESS_BONUS: f64 = 4.0;
const SCORE_CAP: f64 = 10.0;

const CRITICAL_THRESHOLD: f64 = 7.0;
const HIGH_THRESHOLD: f64 = 5.0;
const MEDIUM_THRESHOLD: f64 = 2.0;

/// Ordinal classification of the accumulated 0-10 score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub level: Severity,
    pub risk_factors: Vec<String>,
    pub protective_factors: Vec<String>,
}

impl Default for RiskAssessment {
    fn default() -> Self {
        Self {
            score: 0.0,
            level: Severity::Low,
            risk_factors: Vec::new(),
            protective_factors: Vec::new(),
        }
    }
}

fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Low => 1.0,
        Severity::Medium => 2.0,
        Severity::High | Severity::Critical => 3.0,
    }
}

fn level_for(score: f64) -> Severity {
    if score >= CRITICAL_THRESHOLD {
        Severity::Critical
    } else if score >= HIGH_THRESHOLD {
        Severity::High
    } else if score >= MEDIUM_THRESHOLD {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Aggregate anomalies and behavioral changes into one scored assessment.
pub fn assess(
    anomalies: &[Anomaly],
    changes: &[BehavioralChange],
    social_score: f64,
    has_arrival_pattern: bool,
) -> RiskAssessment {
    let restricted_accesses = anomalies
        .iter()
        .filter(|a| a.kind == AnomalyKind::RestrictedAreaAccess)
        .count();

    let mut score: f64 = anomalies.iter().map(|a| severity_weight(a.severity)).sum();
    score += changes.len() as f64 * CHANGE_WEIGHT;
    score += restricted_accesses as f64 * RESTRICTED_ACCESS_BONUS;
    score = score.min(SCORE_CAP);

    let mut risk_factors = Vec::new();
    if !anomalies.is_empty() {
        risk_factors.push(format!("{} anomalies detected", anomalies.len()));
    }
    if !changes.is_empty() {
        risk_factors.push(format!("{} behavioral changes", changes.len()));
    }
    if restricted_accesses > 0 {
        risk_factors.push(format!("{restricted_accesses} restricted-area accesses"));
    }

    let mut protective_factors = Vec::new();
    if social_score > 0.7 {
        protective_factors.push("high social interaction".to_string());
    }
    if has_arrival_pattern {
        protective_factors.push("consistent arrival pattern".to_string());
    }

    RiskAssessment {
        score,
        level: level_for(score),
        risk_factors,
        protective_factors,
    }
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

    fn change() -> BehavioralChange {
        BehavioralChange::ArrivalTimeShift {
            severity: Severity::Medium,
            description: String::new(),
            recent_average: "10:00".to_string(),
            historical_average: "09:00".to_string(),
            difference_minutes: 60,
        }
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(level_for(7.5), Severity::Critical);
        assert_eq!(level_for(7.0), Severity::Critical);
        assert_eq!(level_for(5.0), Severity::High);
        assert_eq!(level_for(2.0), Severity::Medium);
        assert_eq!(level_for(0.0), Severity::Low);
    }

    #[test]
    fn test_restricted_access_counts_twice() {
        // One restricted-area anomaly alone: 3 (severity) + 4 (bonus) = 7.
        let anomalies = vec![anomaly(
            AnomalyKind::RestrictedAreaAccess,
            Severity::High,
        )];
        let assessment = assess(&anomalies, &[], 0.0, false);
        assert_eq!(assessment.score, 7.0);
        assert_eq!(assessment.level, Severity::Critical);
    }

    #[test]
    fn test_score_is_capped() {
        let anomalies: Vec<Anomaly> = (0..5)
            .map(|_| anomaly(AnomalyKind::RestrictedAreaAccess, Severity::High))
            .collect();
        let assessment = assess(&anomalies, &[], 0.0, false);
        assert_eq!(assessment.score, 10.0);
        assert_eq!(assessment.level, Severity::Critical);
    }

    #[test]
    fn test_changes_weighted() {
        let changes = vec![change(), change()];
        let assessment = assess(&[], &changes, 0.0, false);
        assert_eq!(assessment.score, 3.0);
        assert_eq!(assessment.level, Severity::Medium);
        assert_eq!(assessment.risk_factors, vec!["2 behavioral changes"]);
    }

    #[test]
    fn test_protective_factors() {
        let assessment = assess(&[], &[], 0.8, true);
        assert_eq!(assessment.level, Severity::Low);
        assert_eq!(
            assessment.protective_factors,
            vec!["high social interaction", "consistent arrival pattern"]
        );

        let assessment = assess(&[], &[], 0.7, false);
        assert!(assessment.protective_factors.is_empty());
    }

    #[test]
    fn test_mixed_severities_sum() {
        let anomalies = vec![
            anomaly(AnomalyKind::UnusualHourPresence, Severity::High),
            anomaly(AnomalyKind::ExcessiveLocationDwell, Severity::Medium),
            anomaly(AnomalyKind::LargeDetectionGap, Severity::Low),
        ];
        // 3 + 2 + 1 = 6 -> high.
        let assessment = assess(&anomalies, &[], 0.0, false);
        assert_eq!(assessment.score, 6.0);
        assert_eq!(assessment.level, Severity::High);
        assert_eq!(assessment.risk_factors, vec!["3 anomalies detected"]);
    }
}
