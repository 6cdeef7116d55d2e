//! Social pattern analysis -- isolation periods and common-area interaction
//! score.

use serde::{Deserialize, Serialize};

use crate::detect::Severity;
use crate::storage::DetectionRecord;

/// Gaps longer than this read as possible isolation.
const ISOLATION_GAP_MINUTES: f64 = 120.0;
/// Beyond this the isolation period escalates to medium.
const ISOLATION_ESCALATION_MINUTES: f64 = 240.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationPeriod {
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialPatterns {
    pub isolation_periods: Vec<IsolationPeriod>,
    /// Share of detections seen in configured common areas, in [0, 1].
    pub social_score: f64,
}

impl SocialPatterns {
    pub fn is_empty(&self) -> bool {
        self.social_score == 0.0 && self.isolation_periods.is_empty()
    }
}

/// Mine social patterns from a detection window.
pub fn mine(records: &[DetectionRecord], common_area_keywords: &[String]) -> SocialPatterns {
    let mut sorted: Vec<&DetectionRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.timestamp);

    SocialPatterns {
        isolation_periods: detect_isolation_periods(&sorted),
        social_score: social_score(&sorted, common_area_keywords),
    }
}

fn detect_isolation_periods(sorted: &[&DetectionRecord]) -> Vec<IsolationPeriod> {
    let mut periods = Vec::new();

    for pair in sorted.windows(2) {
        let gap_minutes = (pair[1].timestamp - pair[0].timestamp).num_seconds() as f64 / 60.0;
        if gap_minutes > ISOLATION_GAP_MINUTES {
            periods.push(IsolationPeriod {
                start_time: pair[0].timestamp.to_rfc3339(),
                end_time: pair[1].timestamp.to_rfc3339(),
                duration_minutes: gap_minutes,
                severity: if gap_minutes > ISOLATION_ESCALATION_MINUTES {
                    Severity::Medium
                } else {
                    Severity::Low
                },
            });
        }
    }

    periods
}

/// Share of detections whose location names a configured common area,
/// clipped to [0, 1].
fn social_score(sorted: &[&DetectionRecord], keywords: &[String]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let common = sorted
        .iter()
        .filter(|record| {
            let location = record.location.to_lowercase();
            keywords
                .iter()
                .any(|keyword| location.contains(&keyword.to_lowercase()))
        })
        .count();

    (common as f64 / sorted.len() as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn det(h: u32, mi: u32, location: &str) -> DetectionRecord {
        DetectionRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, h, mi, 0).unwrap(),
            subject_id: Some("emp-1".to_string()),
            location: location.to_string(),
            confidence: 0.9,
            attribute_snapshot: serde_json::Value::Null,
            identity_snapshot: serde_json::Value::Null,
            badge_snapshot: serde_json::Value::Null,
        }
    }

    fn keywords() -> Vec<String> {
        vec!["cafe".to_string(), "meeting".to_string()]
    }

    #[test]
    fn test_social_score_fraction() {
        let mut records = Vec::new();
        for i in 0..7 {
            records.push(det(9, i, "office"));
        }
        records.push(det(10, 0, "Cafeteria"));
        records.push(det(10, 5, "meeting_room_2"));
        records.push(det(10, 10, "cafe_east"));

        let patterns = mine(&records, &keywords());
        assert!((patterns.social_score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_isolation_severity_split() {
        let records = vec![
            det(8, 0, "office"),
            det(11, 0, "office"),  // 180 min gap -> low
            det(16, 30, "office"), // 330 min gap -> medium
        ];
        let patterns = mine(&records, &keywords());
        assert_eq!(patterns.isolation_periods.len(), 2);
        assert_eq!(patterns.isolation_periods[0].severity, Severity::Low);
        assert_eq!(patterns.isolation_periods[1].severity, Severity::Medium);
    }

    #[test]
    fn test_empty_window_scores_zero() {
        let patterns = mine(&[], &keywords());
        assert_eq!(patterns.social_score, 0.0);
        assert!(patterns.isolation_periods.is_empty());
    }
}
