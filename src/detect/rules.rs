//! Rule-based anomaly checks. Each check is independent and composable;
//! the detector concatenates whatever fires.

use chrono::Timelike;
use serde_json::json;
use std::collections::BTreeMap;

use crate::config::AnalysisConfig;
use crate::detect::{Anomaly, AnomalyKind, Severity};
use crate::storage::DetectionRecord;

/// Presence before this hour is unusual.
const UNUSUAL_HOUR_START: u32 = 6;
/// Presence after this hour is unusual.
const UNUSUAL_HOUR_END: u32 = 22;
/// A max inter-detection gap beyond this many minutes is a coverage anomaly.
const LARGE_GAP_MINUTES: f64 = 180.0;
/// A min inter-detection gap under this many minutes is a frequency anomaly.
const HIGH_FREQUENCY_MINUTES: f64 = 1.0;

pub struct AnomalyDetector<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> AnomalyDetector<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Run every rule over a chronologically sorted window.
    /// `dwell_minutes` comes from the spatial miner.
    pub fn detect(
        &self,
        subject_id: Option<&str>,
        records: &[DetectionRecord],
        dwell_minutes: &BTreeMap<String, f64>,
    ) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        anomalies.extend(self.unusual_hours(subject_id, records));
        anomalies.extend(self.excessive_dwell(subject_id, dwell_minutes));
        anomalies.extend(self.unusual_sequences(subject_id, records));
        anomalies.extend(self.frequency_anomaly(subject_id, records));
        anomalies.extend(self.restricted_access(subject_id, records));
        anomalies
    }

    /// Presence before 06:00 or after 22:00. Hour 23 scores medium, the
    /// small hours high.
    fn unusual_hours(
        &self,
        subject_id: Option<&str>,
        records: &[DetectionRecord],
    ) -> Vec<Anomaly> {
        records
            .iter()
            .filter(|r| {
                let hour = r.timestamp.hour();
                hour < UNUSUAL_HOUR_START || hour > UNUSUAL_HOUR_END
            })
            .map(|r| {
                let hour = r.timestamp.hour();
                Anomaly {
                    kind: AnomalyKind::UnusualHourPresence,
                    severity: if hour == 23 {
                        Severity::Medium
                    } else {
                        Severity::High
                    },
                    description: format!("Presence at unusual hour: {hour:02}h"),
                    subject_id: subject_id.map(str::to_string),
                    location: Some(r.location.clone()),
                    timestamp: Some(r.timestamp),
                    evidence: json!({ "hour": hour }),
                }
            })
            .collect()
    }

    /// Average dwell beyond the configured threshold in any one location.
    fn excessive_dwell(
        &self,
        subject_id: Option<&str>,
        dwell_minutes: &BTreeMap<String, f64>,
    ) -> Vec<Anomaly> {
        let threshold_minutes = self.config.dwell_hour_threshold * 60.0;
        dwell_minutes
            .iter()
            .filter(|(_, minutes)| **minutes > threshold_minutes)
            .map(|(location, minutes)| Anomaly {
                kind: AnomalyKind::ExcessiveLocationDwell,
                severity: Severity::Medium,
                description: format!("Excessive time in {location}: {minutes:.0} minutes"),
                subject_id: subject_id.map(str::to_string),
                location: Some(location.clone()),
                timestamp: None,
                evidence: json!({
                    "duration_minutes": minutes,
                    "threshold_hours": self.config.dwell_hour_threshold,
                }),
            })
            .collect()
    }

    /// Restricted access without passing a checkpoint: for a consecutive
    /// triple (A, B, C), C is restricted, A is not, and neither A nor B
    /// mentions a reception or entrance.
    fn unusual_sequences(
        &self,
        subject_id: Option<&str>,
        records: &[DetectionRecord],
    ) -> Vec<Anomaly> {
        let restricted = &self.config.restricted_areas;
        let is_checkpoint = |location: &str| {
            let lower = location.to_lowercase();
            lower.contains("reception") || lower.contains("entrance")
        };

        records
            .windows(3)
            .filter(|triple| {
                let (a, b, c) = (&triple[0].location, &triple[1].location, &triple[2].location);
                restricted.contains(c)
                    && !restricted.contains(a)
                    && !is_checkpoint(a)
                    && !is_checkpoint(b)
            })
            .map(|triple| {
                let sequence = format!(
                    "{} -> {} -> {}",
                    triple[0].location, triple[1].location, triple[2].location
                );
                Anomaly {
                    kind: AnomalyKind::UnusualLocationSequence,
                    severity: Severity::Low,
                    description: format!("Unusual location sequence: {sequence}"),
                    subject_id: subject_id.map(str::to_string),
                    location: Some(triple[2].location.clone()),
                    timestamp: Some(triple[0].timestamp),
                    evidence: json!({ "sequence": sequence }),
                }
            })
            .collect()
    }

    /// Coverage check over inter-detection gaps. The large-gap condition wins
    /// over the high-frequency one; at most one anomaly comes back.
    fn frequency_anomaly(
        &self,
        subject_id: Option<&str>,
        records: &[DetectionRecord],
    ) -> Option<Anomaly> {
        if records.len() < 2 {
            return None;
        }

        let gaps: Vec<f64> = records
            .windows(2)
            .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_seconds() as f64 / 60.0)
            .collect();

        let avg = gaps.iter().sum::<f64>() / gaps.len() as f64;
        let max = gaps.iter().cloned().fold(f64::MIN, f64::max);
        let min = gaps.iter().cloned().fold(f64::MAX, f64::min);

        if max > LARGE_GAP_MINUTES {
            Some(Anomaly {
                kind: AnomalyKind::LargeDetectionGap,
                severity: Severity::Low,
                description: format!("Large gap between detections: {max:.0} minutes"),
                subject_id: subject_id.map(str::to_string),
                location: None,
                timestamp: None,
                evidence: json!({
                    "max_interval_minutes": max,
                    "average_interval_minutes": avg,
                }),
            })
        } else if min < HIGH_FREQUENCY_MINUTES {
            Some(Anomaly {
                kind: AnomalyKind::HighDetectionFrequency,
                severity: Severity::Low,
                description: format!("Very frequent detections: {min:.1} minutes apart"),
                subject_id: subject_id.map(str::to_string),
                location: None,
                timestamp: None,
                evidence: json!({
                    "min_interval_minutes": min,
                    "average_interval_minutes": avg,
                }),
            })
        } else {
            None
        }
    }

    /// Every detection inside a restricted area fires individually, on top of
    /// whatever the sequence check reports for the same events.
    fn restricted_access(
        &self,
        subject_id: Option<&str>,
        records: &[DetectionRecord],
    ) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        for record in records {
            let location = record.location.to_lowercase();
            for area in &self.config.restricted_areas {
                if location.contains(&area.to_lowercase()) {
                    anomalies.push(Anomaly {
                        kind: AnomalyKind::RestrictedAreaAccess,
                        severity: Severity::High,
                        description: format!("Restricted area access: {}", record.location),
                        subject_id: subject_id.map(str::to_string),
                        location: Some(record.location.clone()),
                        timestamp: Some(record.timestamp),
                        evidence: json!({
                            "restricted_area": area,
                            "confidence": record.confidence,
                        }),
                    });
                    break;
                }
            }
        }
        anomalies
    }
}
