//! Spatial pattern mining -- location frequency, transitions, dwell time,
//! and repeated multi-stop routes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::storage::DetectionRecord;

/// Records closer together than this belong to the same route candidate.
const ROUTE_SPLIT_GAP_SECS: i64 = 3600;
/// A sub-sequence needs at least this many stops to be a route candidate.
const ROUTE_MIN_STOPS: usize = 3;
/// A route string must repeat at least this often to be typical.
const ROUTE_MIN_FREQUENCY: u32 = 2;
const ROUTE_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub route: String,
    pub frequency: u32,
    pub locations: Vec<String>,
}

/// Mined spatial routine for one subject over one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialPatterns {
    pub frequent_locations: BTreeMap<String, u32>,
    /// "A -> B" keys; only distinct consecutive locations count.
    pub location_transitions: BTreeMap<String, u32>,
    /// Location -> average minutes per visit.
    pub time_spent_per_location: BTreeMap<String, f64>,
    /// Top repeated routes, most frequent first.
    pub typical_routes: Vec<Route>,
}

impl SpatialPatterns {
    pub fn is_empty(&self) -> bool {
        self.frequent_locations.is_empty()
    }
}

/// Mine spatial patterns from a detection window. Records are sorted by
/// timestamp internally.
pub fn mine(records: &[DetectionRecord]) -> SpatialPatterns {
    let mut patterns = SpatialPatterns::default();
    if records.is_empty() {
        return patterns;
    }

    let mut sorted: Vec<&DetectionRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.timestamp);

    for record in &sorted {
        *patterns
            .frequent_locations
            .entry(record.location.clone())
            .or_insert(0) += 1;
    }

    for pair in sorted.windows(2) {
        if pair[0].location != pair[1].location {
            let key = format!("{} -> {}", pair[0].location, pair[1].location);
            *patterns.location_transitions.entry(key).or_insert(0) += 1;
        }
    }

    patterns.time_spent_per_location = dwell_minutes(&sorted);
    patterns.typical_routes = identify_routes(&sorted);
    patterns
}

/// Average minutes per visit: walk chronologically and accrue elapsed time
/// whenever the location changes. The final open-ended visit has no known
/// end and is not counted.
pub fn dwell_minutes(sorted: &[&DetectionRecord]) -> BTreeMap<String, f64> {
    let mut visits: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    let mut current: Option<(&str, chrono::DateTime<chrono::Utc>)> = None;
    for record in sorted {
        match current {
            Some((location, entered_at)) if location != record.location => {
                let minutes = (record.timestamp - entered_at).num_seconds() as f64 / 60.0;
                visits.entry(location.to_string()).or_default().push(minutes);
                current = Some((&record.location, record.timestamp));
            }
            None => current = Some((&record.location, record.timestamp)),
            _ => {}
        }
    }

    visits
        .into_iter()
        .map(|(location, durations)| {
            let avg = durations.iter().sum::<f64>() / durations.len() as f64;
            (location, avg)
        })
        .collect()
}

/// Split the chronological sequence wherever the inter-record gap reaches one
/// hour; sub-sequences of three or more stops become route candidates.
fn identify_routes(sorted: &[&DetectionRecord]) -> Vec<Route> {
    let mut sequences: Vec<Vec<&DetectionRecord>> = Vec::new();
    let mut current: Vec<&DetectionRecord> = Vec::new();

    for record in sorted {
        let same_sequence = current
            .last()
            .map(|prev| (record.timestamp - prev.timestamp).num_seconds() < ROUTE_SPLIT_GAP_SECS)
            .unwrap_or(true);

        if same_sequence {
            current.push(record);
        } else {
            if current.len() >= ROUTE_MIN_STOPS {
                sequences.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            current.push(record);
        }
    }
    if current.len() >= ROUTE_MIN_STOPS {
        sequences.push(current);
    }

    let mut tally: BTreeMap<String, u32> = BTreeMap::new();
    for sequence in &sequences {
        let path: Vec<&str> = sequence.iter().map(|r| r.location.as_str()).collect();
        *tally.entry(path.join(" -> ")).or_insert(0) += 1;
    }

    let mut routes: Vec<Route> = tally
        .into_iter()
        .filter(|(_, frequency)| *frequency >= ROUTE_MIN_FREQUENCY)
        .map(|(route, frequency)| {
            let locations = route.split(" -> ").map(str::to_string).collect();
            Route {
                route,
                frequency,
                locations,
            }
        })
        .collect();

    // Frequency descending; route string breaks ties so output is stable.
    routes.sort_by(|a, b| b.frequency.cmp(&a.frequency).then(a.route.cmp(&b.route)));
    routes.truncate(ROUTE_LIMIT);
    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn det(h: u32, mi: u32, location: &str) -> DetectionRecord {
        det_day(4, h, mi, location)
    }

    fn det_day(d: u32, h: u32, mi: u32, location: &str) -> DetectionRecord {
        DetectionRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 3, d, h, mi, 0).unwrap(),
            subject_id: Some("emp-1".to_string()),
            location: location.to_string(),
            confidence: 0.9,
            attribute_snapshot: serde_json::Value::Null,
            identity_snapshot: serde_json::Value::Null,
            badge_snapshot: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_transitions_skip_repeats() {
        let records = vec![
            det(9, 0, "office"),
            det(9, 30, "office"),
            det(10, 0, "lab"),
            det(10, 30, "office"),
        ];
        let patterns = mine(&records);
        assert_eq!(patterns.location_transitions["office -> lab"], 1);
        assert_eq!(patterns.location_transitions["lab -> office"], 1);
        assert_eq!(patterns.location_transitions.len(), 2);
        assert_eq!(patterns.frequent_locations["office"], 3);
    }

    #[test]
    fn test_dwell_averages_closed_visits() {
        // office 09:00-10:00 (60 min), lab 10:00-10:30 (30 min), office open.
        let records = vec![
            det(9, 0, "office"),
            det(10, 0, "lab"),
            det(10, 30, "office"),
        ];
        let patterns = mine(&records);
        assert_eq!(patterns.time_spent_per_location["office"], 60.0);
        assert_eq!(patterns.time_spent_per_location["lab"], 30.0);
    }

    #[test]
    fn test_routes_require_repeat() {
        // The same 3-stop morning path on two days, split by the >= 1h gap.
        let records = vec![
            det_day(4, 9, 0, "entrance"),
            det_day(4, 9, 10, "office"),
            det_day(4, 9, 20, "lab"),
            det_day(4, 14, 0, "cafe"),
            det_day(5, 9, 0, "entrance"),
            det_day(5, 9, 10, "office"),
            det_day(5, 9, 20, "lab"),
        ];
        let patterns = mine(&records);
        assert_eq!(patterns.typical_routes.len(), 1);
        let route = &patterns.typical_routes[0];
        assert_eq!(route.route, "entrance -> office -> lab");
        assert_eq!(route.frequency, 2);
        assert_eq!(route.locations.len(), 3);
    }

    #[test]
    fn test_short_sequences_are_not_routes() {
        let records = vec![
            det(9, 0, "entrance"),
            det(9, 10, "office"),
            det(11, 0, "entrance"),
            det(11, 10, "office"),
        ];
        let patterns = mine(&records);
        assert!(patterns.typical_routes.is_empty());
    }
}
