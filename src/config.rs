//! TOML configuration for the PresenceWatch engine.
//!
//! Layered model: explicit path, `PRESENCEWATCH_CONFIG` environment override,
//! standard system location, compiled-in defaults. Thresholds are validated
//! once at construction; a bad config never fails per analysis call.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Root configuration for the engine process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub analysis: AnalysisConfig,
    pub schedule: ScheduleConfig,
    pub sweep: SweepConfig,
    pub retention: RetentionConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.validate()?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path specified by the `PRESENCEWATCH_CONFIG` environment variable.
    /// 2. `/etc/presencewatch/presencewatch.toml`.
    /// 3. Fall back to compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("PRESENCEWATCH_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "PRESENCEWATCH_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new("/etc/presencewatch/presencewatch.toml");
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Construction-time validation. Analysis never re-checks these.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analysis.validate()?;
        self.schedule.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Per-operation timeout for store calls, in seconds.
    pub op_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "data/presencewatch.db".to_string(),
            op_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Thresholds for the pattern miners, anomaly rules, and change detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Mean shift in arrival/lunch times considered a behavioral change.
    pub lunch_variance_threshold_minutes: f64,
    /// Average dwell beyond this many hours in one location is anomalous.
    pub dwell_hour_threshold: f64,
    /// Location names requiring controlled access.
    pub restricted_areas: Vec<String>,
    /// Location keywords counted toward the social score.
    pub common_area_keywords: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            lunch_variance_threshold_minutes: 30.0,
            dwell_hour_threshold: 4.0,
            restricted_areas: vec![
                "server_room".to_string(),
                "management".to_string(),
                "finance".to_string(),
            ],
            common_area_keywords: vec![
                "cafe".to_string(),
                "lunch".to_string(),
                "meeting".to_string(),
                "lounge".to_string(),
                "reception".to_string(),
            ],
        }
    }
}

impl AnalysisConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.lunch_variance_threshold_minutes <= 0.0 {
            return Err(ConfigError::Invalid(
                "lunch_variance_threshold_minutes must be positive".to_string(),
            ));
        }
        if self.dwell_hour_threshold <= 0.0 {
            return Err(ConfigError::Invalid(
                "dwell_hour_threshold must be positive".to_string(),
            ));
        }
        if self.common_area_keywords.is_empty() {
            return Err(ConfigError::Invalid(
                "common_area_keywords must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expected work-hours profile used by the schedule compliance signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// "HH:MM" start/end for weekdays. Empty strings disable the window.
    pub weekday_start: String,
    pub weekday_end: String,
    pub saturday_start: String,
    pub saturday_end: String,
    pub sunday_start: String,
    pub sunday_end: String,
    /// Site runs around the clock; windows above are ignored.
    pub around_the_clock: bool,
    pub early_arrival_threshold_minutes: i64,
    pub late_departure_threshold_minutes: i64,
    pub weekend_work_alert: bool,
    pub holiday_work_alert: bool,
    /// Holiday dates, "YYYY-MM-DD".
    pub holidays: Vec<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            weekday_start: "08:00".to_string(),
            weekday_end: "18:00".to_string(),
            saturday_start: String::new(),
            saturday_end: String::new(),
            sunday_start: String::new(),
            sunday_end: String::new(),
            around_the_clock: false,
            early_arrival_threshold_minutes: 30,
            late_departure_threshold_minutes: 30,
            weekend_work_alert: true,
            holiday_work_alert: true,
            holidays: Vec::new(),
        }
    }
}

impl ScheduleConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.early_arrival_threshold_minutes <= 0 || self.late_departure_threshold_minutes <= 0 {
            return Err(ConfigError::Invalid(
                "arrival/departure thresholds must be positive".to_string(),
            ));
        }
        for raw in [
            (&self.weekday_start, &self.weekday_end),
            (&self.saturday_start, &self.saturday_end),
            (&self.sunday_start, &self.sunday_end),
        ] {
            // Either both ends set, or both empty.
            if raw.0.is_empty() != raw.1.is_empty() {
                return Err(ConfigError::Invalid(
                    "schedule windows need both start and end".to_string(),
                ));
            }
        }
        for date in &self.holidays {
            if date.parse::<chrono::NaiveDate>().is_err() {
                return Err(ConfigError::Invalid(format!("bad holiday date '{date}'")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub enabled: bool,
    /// Seconds between background re-analysis passes.
    pub interval_secs: u64,
    /// Analysis window handed to each background pass.
    pub window_hours: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 600,
            window_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Detections older than this many days are eligible for purge.
    pub days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { days: 90 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let mut cfg = AppConfig::default();
        cfg.analysis.dwell_hour_threshold = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_half_open_window() {
        let mut cfg = AppConfig::default();
        cfg.schedule.saturday_start = "09:00".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_parses_full_toml() {
        let raw = r#"
            [storage]
            db_path = "/tmp/pw.db"

            [analysis]
            lunch_variance_threshold_minutes = 45.0
            restricted_areas = ["vault"]

            [schedule]
            weekday_start = "07:00"
            weekday_end = "19:00"
            holidays = ["2024-12-25"]
        "#;
        let cfg: AppConfig = toml::from_str(raw).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.storage.db_path, "/tmp/pw.db");
        assert_eq!(cfg.analysis.lunch_variance_threshold_minutes, 45.0);
        assert_eq!(cfg.analysis.restricted_areas, vec!["vault".to_string()]);
    }
}
