//! Behavioral change detection -- recent mined patterns compared against the
//! subject's persisted baseline summaries.

use serde::{Deserialize, Serialize};

use crate::analysis::spatial::SpatialPatterns;
use crate::analysis::temporal::TemporalPatterns;
use crate::detect::Severity;

/// Location-frequency shifts larger than this many percentage points are
/// significant.
const LOCATION_SHIFT_THRESHOLD_PCT: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftDirection {
    Increase,
    Decrease,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationShift {
    pub location: String,
    pub direction: ShiftDirection,
    pub difference_pct: f64,
    pub recent_pct: f64,
    pub historical_pct: f64,
}

/// A statistically notable drift between recent and historical patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BehavioralChange {
    ArrivalTimeShift {
        severity: Severity,
        description: String,
        recent_average: String,
        historical_average: String,
        difference_minutes: i64,
    },
    LunchTimeShift {
        severity: Severity,
        description: String,
        recent_average: String,
        historical_average: String,
        difference_minutes: i64,
        recent_avg_duration_minutes: i64,
        historical_avg_duration_minutes: i64,
        duration_change_minutes: i64,
    },
    LocationDistributionShift {
        severity: Severity,
        description: String,
        shifts: Vec<LocationShift>,
    },
}

impl BehavioralChange {
    pub fn severity(&self) -> Severity {
        match self {
            BehavioralChange::ArrivalTimeShift { severity, .. } => *severity,
            BehavioralChange::LunchTimeShift { severity, .. } => *severity,
            BehavioralChange::LocationDistributionShift { severity, .. } => *severity,
        }
    }
}

/// Compare recent patterns against the persisted baseline. No baseline, or an
/// empty recent set, yields no change records; that is not an error.
pub fn detect_changes(
    recent_temporal: &TemporalPatterns,
    recent_spatial: &SpatialPatterns,
    baseline_temporal: Option<&TemporalPatterns>,
    baseline_spatial: Option<&SpatialPatterns>,
    threshold_minutes: f64,
) -> Vec<BehavioralChange> {
    let mut changes = Vec::new();

    if let Some(baseline) = baseline_temporal {
        if let Some(change) = detect_time_shift(
            &recent_temporal.arrival_times,
            &baseline.arrival_times,
            threshold_minutes,
            "arrival",
        ) {
            changes.push(change);
        }

        if let Some(change) = detect_lunch_shift(recent_temporal, baseline, threshold_minutes) {
            changes.push(change);
        }
    }

    if let Some(baseline) = baseline_spatial {
        if let Some(change) = detect_location_shift(recent_spatial, baseline) {
            changes.push(change);
        }
    }

    changes
}

fn parse_hhmm(raw: &str) -> Option<f64> {
    let (h, m) = raw.split_once(':')?;
    let hours: f64 = h.parse().ok()?;
    let minutes: f64 = m.parse().ok()?;
    Some(hours * 60.0 + minutes)
}

fn fmt_minutes(total: f64) -> String {
    let total = total.round() as i64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

fn mean_minutes(times: &[String]) -> Option<f64> {
    let parsed: Vec<f64> = times.iter().filter_map(|t| parse_hhmm(t)).collect();
    if parsed.is_empty() {
        return None;
    }
    Some(parsed.iter().sum::<f64>() / parsed.len() as f64)
}

/// Shared time-of-day comparison: mean shift beyond the threshold is medium,
/// beyond twice the threshold high.
fn detect_time_shift(
    recent_times: &[String],
    historical_times: &[String],
    threshold_minutes: f64,
    label: &str,
) -> Option<BehavioralChange> {
    let recent_avg = mean_minutes(recent_times)?;
    let historical_avg = mean_minutes(historical_times)?;

    let diff = (recent_avg - historical_avg).abs();
    if diff <= threshold_minutes {
        return None;
    }

    let severity = if diff < threshold_minutes * 2.0 {
        Severity::Medium
    } else {
        Severity::High
    };

    Some(BehavioralChange::ArrivalTimeShift {
        severity,
        description: format!("Significant change in {label} time"),
        recent_average: fmt_minutes(recent_avg),
        historical_average: fmt_minutes(historical_avg),
        difference_minutes: diff.round() as i64,
    })
}

fn detect_lunch_shift(
    recent: &TemporalPatterns,
    baseline: &TemporalPatterns,
    threshold_minutes: f64,
) -> Option<BehavioralChange> {
    let recent_starts: Vec<String> = recent
        .lunch_times
        .iter()
        .map(|l| l.start_time.clone())
        .collect();
    let historical_starts: Vec<String> = baseline
        .lunch_times
        .iter()
        .map(|l| l.start_time.clone())
        .collect();

    let shift = detect_time_shift(&recent_starts, &historical_starts, threshold_minutes, "lunch")?;
    let BehavioralChange::ArrivalTimeShift {
        severity,
        description,
        recent_average,
        historical_average,
        difference_minutes,
    } = shift
    else {
        return None;
    };

    let recent_duration = recent
        .lunch_times
        .iter()
        .map(|l| l.duration_minutes as f64)
        .sum::<f64>()
        / recent.lunch_times.len() as f64;
    let historical_duration = baseline
        .lunch_times
        .iter()
        .map(|l| l.duration_minutes as f64)
        .sum::<f64>()
        / baseline.lunch_times.len() as f64;

    Some(BehavioralChange::LunchTimeShift {
        severity,
        description,
        recent_average,
        historical_average,
        difference_minutes,
        recent_avg_duration_minutes: recent_duration.round() as i64,
        historical_avg_duration_minutes: historical_duration.round() as i64,
        duration_change_minutes: (recent_duration - historical_duration).abs().round() as i64,
    })
}

/// Normalize both location tallies to percentages and bundle every shift
/// beyond 20 percentage points into one medium-severity change.
fn detect_location_shift(
    recent: &SpatialPatterns,
    baseline: &SpatialPatterns,
) -> Option<BehavioralChange> {
    if recent.frequent_locations.is_empty() || baseline.frequent_locations.is_empty() {
        return None;
    }

    let recent_total: u32 = recent.frequent_locations.values().sum();
    let historical_total: u32 = baseline.frequent_locations.values().sum();

    let mut locations: Vec<&String> = recent
        .frequent_locations
        .keys()
        .chain(baseline.frequent_locations.keys())
        .collect();
    locations.sort();
    locations.dedup();

    let mut shifts = Vec::new();
    for location in locations {
        let recent_pct = *recent.frequent_locations.get(location).unwrap_or(&0) as f64
            / recent_total as f64
            * 100.0;
        let historical_pct = *baseline.frequent_locations.get(location).unwrap_or(&0) as f64
            / historical_total as f64
            * 100.0;

        let diff = (recent_pct - historical_pct).abs();
        if diff > LOCATION_SHIFT_THRESHOLD_PCT {
            shifts.push(LocationShift {
                location: location.clone(),
                direction: if recent_pct > historical_pct {
                    ShiftDirection::Increase
                } else {
                    ShiftDirection::Decrease
                },
                difference_pct: diff,
                recent_pct,
                historical_pct,
            });
        }
    }

    if shifts.is_empty() {
        return None;
    }

    Some(BehavioralChange::LocationDistributionShift {
        severity: Severity::Medium,
        description: "Significant change in frequented locations".to_string(),
        shifts,
    })
}
