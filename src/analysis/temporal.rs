//! Temporal pattern mining -- per-day arrival/departure, lunch-break
//! inference, hourly activity, peak hours.

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::storage::DetectionRecord;

/// An inferred midday break: the single largest intra-day gap between 30
/// minutes and 3 hours (both bounds strict).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LunchBreak {
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: i64,
}

/// Mined temporal routine for one subject over one window.
///
/// Maps are ordered so repeated runs over the same data serialize
/// byte-identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalPatterns {
    /// One "HH:MM" entry per day with at least two detections, day order.
    pub arrival_times: Vec<String>,
    pub departure_times: Vec<String>,
    pub lunch_times: Vec<LunchBreak>,
    /// Hours whose aggregate activity exceeds 1.5x the mean, ascending.
    pub peak_activity_hours: Vec<u32>,
    /// Date -> hours between first and last detection.
    pub presence_duration: BTreeMap<String, f64>,
    /// Date -> hour-of-day -> detection count.
    pub daily_patterns: BTreeMap<String, BTreeMap<u32, u32>>,
}

impl TemporalPatterns {
    pub fn is_empty(&self) -> bool {
        self.daily_patterns.is_empty()
    }
}

/// Mine temporal patterns from a detection window. Input order does not
/// matter; records are grouped by calendar day and sorted internally.
pub fn mine(records: &[DetectionRecord]) -> TemporalPatterns {
    let mut patterns = TemporalPatterns::default();
    if records.is_empty() {
        return patterns;
    }

    // Group by calendar day; BTreeMap keeps day iteration stable.
    let mut daily: BTreeMap<String, Vec<&DetectionRecord>> = BTreeMap::new();
    for record in records {
        daily
            .entry(record.timestamp.date_naive().to_string())
            .or_default()
            .push(record);
    }

    for (day, day_records) in &mut daily {
        day_records.sort_by_key(|r| r.timestamp);

        if day_records.len() >= 2 {
            let first = day_records[0];
            let last = day_records[day_records.len() - 1];

            patterns.arrival_times.push(fmt_hhmm(first.timestamp));
            patterns.departure_times.push(fmt_hhmm(last.timestamp));

            let duration =
                (last.timestamp - first.timestamp).num_seconds() as f64 / 3600.0;
            patterns.presence_duration.insert(day.clone(), duration);
        }

        if let Some(lunch) = detect_lunch_break(day_records) {
            patterns.lunch_times.push(lunch);
        }

        let mut hourly: BTreeMap<u32, u32> = BTreeMap::new();
        for record in day_records.iter() {
            *hourly.entry(record.timestamp.hour()).or_insert(0) += 1;
        }
        patterns.daily_patterns.insert(day.clone(), hourly);
    }

    patterns.peak_activity_hours = identify_peak_hours(&patterns.daily_patterns);
    patterns
}

fn fmt_hhmm(ts: chrono::DateTime<chrono::Utc>) -> String {
    format!("{:02}:{:02}", ts.hour(), ts.minute())
}

/// Largest gap strictly between 30 minutes and 3 hours. Multi-break days
/// collapse to the single best candidate.
fn detect_lunch_break(day_records: &[&DetectionRecord]) -> Option<LunchBreak> {
    if day_records.len() < 2 {
        return None;
    }

    let mut best_gap_secs = 0_i64;
    let mut best: Option<(usize, usize)> = None;

    for i in 0..day_records.len() - 1 {
        let gap = day_records[i + 1].timestamp - day_records[i].timestamp;
        let gap_secs = gap.num_seconds();
        // Strict bounds: exactly 30 minutes or exactly 3 hours do not count.
        if gap_secs > 30 * 60 && gap_secs < 3 * 3600 && gap_secs > best_gap_secs {
            best_gap_secs = gap_secs;
            best = Some((i, i + 1));
        }
    }

    best.map(|(start, end)| LunchBreak {
        start_time: fmt_hhmm(day_records[start].timestamp),
        end_time: fmt_hhmm(day_records[end].timestamp),
        duration_minutes: best_gap_secs / 60,
    })
}

/// Hours whose total activity across all days exceeds 1.5x the mean over
/// hours with any activity.
fn identify_peak_hours(daily_patterns: &BTreeMap<String, BTreeMap<u32, u32>>) -> Vec<u32> {
    let mut totals: BTreeMap<u32, u32> = BTreeMap::new();
    for day in daily_patterns.values() {
        for (hour, count) in day {
            *totals.entry(*hour).or_insert(0) += count;
        }
    }
    if totals.is_empty() {
        return Vec::new();
    }

    let mean = totals.values().sum::<u32>() as f64 / totals.len() as f64;
    totals
        .iter()
        .filter(|(_, count)| **count as f64 > mean * 1.5)
        .map(|(hour, _)| *hour)
        .collect()
}
