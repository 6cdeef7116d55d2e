//! Schedule compliance signal -- expected-status computation against the
//! configured work-hours profile, plus early/late/weekend/holiday anomaly
//! checks. Consumed by the correlation engine.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{ConfigError, ScheduleConfig};
use crate::detect::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedStatus {
    ShouldBePresent,
    ShouldBeAbsent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    Violation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleAnomalyKind {
    EarlyArrival,
    LateDeparture,
    WeekendWork,
    HolidayWork,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleAnomaly {
    pub kind: ScheduleAnomalyKind,
    pub severity: Severity,
    pub description: String,
    pub details: serde_json::Value,
}

/// Outcome of evaluating one detection time against the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEvaluation {
    pub expected_status: ExpectedStatus,
    pub compliance: ComplianceStatus,
    pub anomalies: Vec<ScheduleAnomaly>,
    pub confidence: f64,
}

/// Parsed, validated work-hours profile. Built once at engine construction.
#[derive(Debug, Clone)]
pub struct ScheduleProfile {
    weekday: Option<(NaiveTime, NaiveTime)>,
    saturday: Option<(NaiveTime, NaiveTime)>,
    sunday: Option<(NaiveTime, NaiveTime)>,
    around_the_clock: bool,
    early_arrival_threshold: i64,
    late_departure_threshold: i64,
    weekend_work_alert: bool,
    holiday_work_alert: bool,
    holidays: Vec<NaiveDate>,
}

fn parse_window(
    start: &str,
    end: &str,
    label: &str,
) -> Result<Option<(NaiveTime, NaiveTime)>, ConfigError> {
    if start.is_empty() && end.is_empty() {
        return Ok(None);
    }
    let parse = |raw: &str| {
        NaiveTime::parse_from_str(raw, "%H:%M")
            .map_err(|e| ConfigError::Invalid(format!("bad {label} time '{raw}': {e}")))
    };
    Ok(Some((parse(start)?, parse(end)?)))
}

impl ScheduleProfile {
    pub fn from_config(config: &ScheduleConfig) -> Result<Self, ConfigError> {
        let holidays = config
            .holidays
            .iter()
            .map(|raw| {
                raw.parse::<NaiveDate>()
                    .map_err(|e| ConfigError::Invalid(format!("bad holiday date '{raw}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            weekday: parse_window(&config.weekday_start, &config.weekday_end, "weekday")?,
            saturday: parse_window(&config.saturday_start, &config.saturday_end, "saturday")?,
            sunday: parse_window(&config.sunday_start, &config.sunday_end, "sunday")?,
            around_the_clock: config.around_the_clock,
            early_arrival_threshold: config.early_arrival_threshold_minutes,
            late_departure_threshold: config.late_departure_threshold_minutes,
            weekend_work_alert: config.weekend_work_alert,
            holiday_work_alert: config.holiday_work_alert,
            holidays,
        })
    }

    fn window_for(&self, weekday: Weekday) -> Option<(NaiveTime, NaiveTime)> {
        match weekday {
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
            _ => self.weekday,
        }
    }

    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    /// Whether the subject is expected on site at `at`.
    pub fn expected_status(&self, at: DateTime<Utc>) -> ExpectedStatus {
        if self.around_the_clock {
            return ExpectedStatus::ShouldBePresent;
        }
        if self.is_holiday(at.date_naive()) {
            return ExpectedStatus::ShouldBeAbsent;
        }

        match self.window_for(at.weekday()) {
            Some((start, end)) => {
                let now = at.time();
                let inside = if start <= end {
                    start <= now && now <= end
                } else {
                    // Window crosses midnight.
                    now >= start || now <= end
                };
                if inside {
                    ExpectedStatus::ShouldBePresent
                } else {
                    ExpectedStatus::ShouldBeAbsent
                }
            }
            None => ExpectedStatus::ShouldBeAbsent,
        }
    }

    /// Evaluate one detection time: expected status, compliance of the
    /// observed presence, and schedule anomalies.
    pub fn evaluate(&self, at: DateTime<Utc>) -> ScheduleEvaluation {
        let expected_status = self.expected_status(at);
        let compliance = match expected_status {
            ExpectedStatus::ShouldBePresent => ComplianceStatus::Compliant,
            ExpectedStatus::ShouldBeAbsent => ComplianceStatus::Violation,
        };

        let mut anomalies = Vec::new();
        if !self.around_the_clock {
            if let Some(anomaly) = self.check_early_arrival(at) {
                anomalies.push(anomaly);
            }
            if let Some(anomaly) = self.check_late_departure(at) {
                anomalies.push(anomaly);
            }
            if let Some(anomaly) = self.check_weekend_work(at) {
                anomalies.push(anomaly);
            }
            if let Some(anomaly) = self.check_holiday_work(at) {
                anomalies.push(anomaly);
            }
        }

        // Tighter tolerances mean a sharper signal.
        let tolerance = self.early_arrival_threshold.max(self.late_departure_threshold) as f64;
        let confidence = 1.0 - tolerance / (24.0 * 60.0);

        ScheduleEvaluation {
            expected_status,
            compliance,
            anomalies,
            confidence,
        }
    }

    fn minutes_of_day(t: NaiveTime) -> i64 {
        t.hour() as i64 * 60 + t.minute() as i64
    }

    fn check_early_arrival(&self, at: DateTime<Utc>) -> Option<ScheduleAnomaly> {
        let (start, end) = self.window_for(at.weekday())?;
        if start > end {
            // Midnight-crossing windows have no meaningful "before start".
            return None;
        }

        let minutes_early = Self::minutes_of_day(start) - Self::minutes_of_day(at.time());
        if minutes_early <= self.early_arrival_threshold {
            return None;
        }

        Some(ScheduleAnomaly {
            kind: ScheduleAnomalyKind::EarlyArrival,
            severity: if minutes_early < self.early_arrival_threshold * 2 {
                Severity::Low
            } else {
                Severity::Medium
            },
            description: format!("Arrival {minutes_early} minutes before schedule"),
            details: json!({
                "minutes_early": minutes_early,
                "expected_time": start.format("%H:%M").to_string(),
                "actual_time": at.format("%H:%M").to_string(),
            }),
        })
    }

    fn check_late_departure(&self, at: DateTime<Utc>) -> Option<ScheduleAnomaly> {
        let (start, end) = self.window_for(at.weekday())?;
        if start > end {
            return None;
        }

        let minutes_late = Self::minutes_of_day(at.time()) - Self::minutes_of_day(end);
        if minutes_late <= self.late_departure_threshold {
            return None;
        }

        Some(ScheduleAnomaly {
            kind: ScheduleAnomalyKind::LateDeparture,
            severity: if minutes_late < self.late_departure_threshold * 2 {
                Severity::Low
            } else {
                Severity::Medium
            },
            description: format!("Departure {minutes_late} minutes after schedule"),
            details: json!({
                "minutes_late": minutes_late,
                "expected_time": end.format("%H:%M").to_string(),
                "actual_time": at.format("%H:%M").to_string(),
            }),
        })
    }

    fn check_weekend_work(&self, at: DateTime<Utc>) -> Option<ScheduleAnomaly> {
        if !self.weekend_work_alert {
            return None;
        }
        let weekday = at.weekday();
        if weekday != Weekday::Sat && weekday != Weekday::Sun {
            return None;
        }
        // A configured weekend window makes weekend presence expected.
        if self.window_for(weekday).is_some() {
            return None;
        }

        Some(ScheduleAnomaly {
            kind: ScheduleAnomalyKind::WeekendWork,
            severity: Severity::Medium,
            description: format!(
                "Work on {}",
                if weekday == Weekday::Sat { "Saturday" } else { "Sunday" }
            ),
            details: json!({ "time": at.format("%H:%M").to_string() }),
        })
    }

    fn check_holiday_work(&self, at: DateTime<Utc>) -> Option<ScheduleAnomaly> {
        if !self.holiday_work_alert {
            return None;
        }
        let date = at.date_naive();
        if !self.is_holiday(date) {
            return None;
        }

        Some(ScheduleAnomaly {
            kind: ScheduleAnomalyKind::HolidayWork,
            severity: Severity::High,
            description: format!("Work on holiday {date}"),
            details: json!({ "time": at.format("%H:%M").to_string() }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn profile() -> ScheduleProfile {
        ScheduleProfile::from_config(&ScheduleConfig::default()).unwrap()
    }

    // 2024-03-04 is a Monday, 2024-03-09 a Saturday.
    fn monday(h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, mi, 0).unwrap()
    }

    #[test]
    fn test_expected_status_window() {
        let profile = profile();
        assert_eq!(
            profile.expected_status(monday(10, 0)),
            ExpectedStatus::ShouldBePresent
        );
        assert_eq!(
            profile.expected_status(monday(20, 0)),
            ExpectedStatus::ShouldBeAbsent
        );
    }

    #[test]
    fn test_early_arrival_severities() {
        let profile = profile();

        // 07:15: 45 minutes early with a 30-minute threshold -> low.
        let eval = profile.evaluate(monday(7, 15));
        let anomaly = eval
            .anomalies
            .iter()
            .find(|a| a.kind == ScheduleAnomalyKind::EarlyArrival)
            .unwrap();
        assert_eq!(anomaly.severity, Severity::Low);

        // 06:30: 90 minutes early -> medium.
        let eval = profile.evaluate(monday(6, 30));
        let anomaly = eval
            .anomalies
            .iter()
            .find(|a| a.kind == ScheduleAnomalyKind::EarlyArrival)
            .unwrap();
        assert_eq!(anomaly.severity, Severity::Medium);

        // 07:45: inside tolerance, no anomaly.
        let eval = profile.evaluate(monday(7, 45));
        assert!(eval.anomalies.is_empty());
    }

    #[test]
    fn test_late_departure() {
        let profile = profile();
        let eval = profile.evaluate(monday(19, 30));
        let anomaly = eval
            .anomalies
            .iter()
            .find(|a| a.kind == ScheduleAnomalyKind::LateDeparture)
            .unwrap();
        assert_eq!(anomaly.severity, Severity::Medium);
        assert_eq!(eval.compliance, ComplianceStatus::Violation);
    }

    #[test]
    fn test_weekend_work_flagged_without_window() {
        let profile = profile();
        let saturday = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
        let eval = profile.evaluate(saturday);
        assert!(eval
            .anomalies
            .iter()
            .any(|a| a.kind == ScheduleAnomalyKind::WeekendWork));
        assert_eq!(eval.expected_status, ExpectedStatus::ShouldBeAbsent);
    }

    #[test]
    fn test_saturday_window_suppresses_weekend_alert() {
        let mut config = ScheduleConfig::default();
        config.saturday_start = "09:00".to_string();
        config.saturday_end = "13:00".to_string();
        let profile = ScheduleProfile::from_config(&config).unwrap();

        let saturday = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
        let eval = profile.evaluate(saturday);
        assert!(eval.anomalies.is_empty());
        assert_eq!(eval.expected_status, ExpectedStatus::ShouldBePresent);
    }

    #[test]
    fn test_holiday_work_is_high() {
        let mut config = ScheduleConfig::default();
        config.holidays = vec!["2024-03-04".to_string()];
        let profile = ScheduleProfile::from_config(&config).unwrap();

        let eval = profile.evaluate(monday(10, 0));
        let anomaly = eval
            .anomalies
            .iter()
            .find(|a| a.kind == ScheduleAnomalyKind::HolidayWork)
            .unwrap();
        assert_eq!(anomaly.severity, Severity::High);
        assert_eq!(eval.expected_status, ExpectedStatus::ShouldBeAbsent);
    }

    #[test]
    fn test_around_the_clock_always_present() {
        let mut config = ScheduleConfig::default();
        config.around_the_clock = true;
        let profile = ScheduleProfile::from_config(&config).unwrap();

        let eval = profile.evaluate(monday(3, 0));
        assert_eq!(eval.expected_status, ExpectedStatus::ShouldBePresent);
        assert!(eval.anomalies.is_empty());
    }
}
