//! Pattern mining engine -- orchestrates the miners, baseline comparison,
//! anomaly rules, risk aggregation, and guidance for each analysis call.

pub mod change;
pub mod schedule;
pub mod social;
pub mod spatial;
pub mod temporal;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::alert::{Alert, AlertKind, AlertSink};
use crate::analysis::change::BehavioralChange;
use crate::analysis::schedule::ScheduleProfile;
use crate::analysis::social::SocialPatterns;
use crate::analysis::spatial::SpatialPatterns;
use crate::analysis::temporal::TemporalPatterns;
use crate::config::{AppConfig, AnalysisConfig, ConfigError};
use crate::correlate::{CorrelationReport, SignalBundle};
use crate::detect::risk::{self, RiskAssessment};
use crate::detect::rules::AnomalyDetector;
use crate::detect::{recommend, Anomaly, Severity};
use crate::storage::memory::MemoryStore;
use crate::storage::{
    DetectionRecord, DetectionStore, PatternKind, PatternSummary, StoreError,
};

/// Boundary rejection for malformed submissions. Never stored.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("missing timestamp")]
    MissingTimestamp,
    #[error("missing location")]
    MissingLocation,
    #[error("confidence {0} outside [0, 1]")]
    InvalidConfidence(f64),
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Raw submission from an upstream detector, validated at the boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionSubmission {
    pub timestamp: Option<DateTime<Utc>>,
    pub subject_id: Option<String>,
    pub location: Option<String>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub attribute_snapshot: serde_json::Value,
    #[serde(default)]
    pub identity_snapshot: serde_json::Value,
    #[serde(default)]
    pub badge_snapshot: serde_json::Value,
}

impl DetectionSubmission {
    pub fn validate(self) -> Result<DetectionRecord, InputError> {
        let timestamp = self.timestamp.ok_or(InputError::MissingTimestamp)?;
        let location = self
            .location
            .filter(|l| !l.trim().is_empty())
            .ok_or(InputError::MissingLocation)?;
        let confidence = self.confidence.unwrap_or(0.0);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(InputError::InvalidConfidence(confidence));
        }

        Ok(DetectionRecord {
            timestamp,
            subject_id: self.subject_id.filter(|s| !s.trim().is_empty()),
            location,
            confidence,
            attribute_snapshot: self.attribute_snapshot,
            identity_snapshot: self.identity_snapshot,
            badge_snapshot: self.badge_snapshot,
        })
    }
}

/// One analysis section: mined data, or an explicit no-data marker. Data
/// sparsity is a degraded section, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Section<T> {
    Ok(T),
    NoData,
}

impl<T> Section<T> {
    pub fn as_ok(&self) -> Option<&T> {
        match self {
            Section::Ok(data) => Some(data),
            Section::NoData => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternsDetected {
    pub temporal: Section<TemporalPatterns>,
    pub spatial: Section<SpatialPatterns>,
    pub social: Section<SocialPatterns>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Ok,
    NoData,
}

/// Always well-formed, possibly partial. Two calls over unchanged stored data
/// produce identical results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub subject_id: Option<String>,
    pub window_hours: u32,
    pub status: AnalysisStatus,
    /// True when the primary store was unavailable and the in-memory tail
    /// buffer answered instead.
    pub degraded: bool,
    pub patterns: PatternsDetected,
    pub anomalies: Vec<Anomaly>,
    pub behavioral_changes: Vec<BehavioralChange>,
    pub risk_assessment: RiskAssessment,
    pub recommendations: Vec<String>,
}

impl AnalysisResult {
    fn empty(subject_id: Option<&str>, window_hours: u32, degraded: bool) -> Self {
        let assessment = RiskAssessment::default();
        let recommendations = recommend::recommend(&assessment, &[], &[]);
        Self {
            subject_id: subject_id.map(str::to_string),
            window_hours,
            status: AnalysisStatus::NoData,
            degraded,
            patterns: PatternsDetected {
                temporal: Section::NoData,
                spatial: Section::NoData,
                social: Section::NoData,
            },
            anomalies: Vec::new(),
            behavioral_changes: Vec::new(),
            risk_assessment: assessment,
            recommendations,
        }
    }

    /// Compact human-readable summary lines for CLI output.
    pub fn summary(&self) -> Vec<String> {
        let mut lines = Vec::new();
        lines.push(format!(
            "Risk: {} (score {:.1})",
            self.risk_assessment.level, self.risk_assessment.score
        ));

        if self.anomalies.is_empty() {
            lines.push("No anomalies detected".to_string());
        } else {
            let high = self
                .anomalies
                .iter()
                .filter(|a| a.severity >= Severity::High)
                .count();
            lines.push(format!(
                "{} anomalies ({} high severity)",
                self.anomalies.len(),
                high
            ));
        }

        if self.behavioral_changes.is_empty() {
            lines.push("Behavior consistent with baseline".to_string());
        } else {
            lines.push(format!(
                "{} behavioral changes",
                self.behavioral_changes.len()
            ));
        }

        let mined = [
            self.patterns.temporal.as_ok().is_some(),
            self.patterns.spatial.as_ok().is_some(),
            self.patterns.social.as_ok().is_some(),
        ]
        .iter()
        .filter(|mined| **mined)
        .count();
        lines.push(format!("{mined} pattern types mined"));
        lines
    }
}

/// Running counters owned by one subject's analysis context. Only the
/// holder of that subject's lock may touch them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub location_tally: BTreeMap<String, u64>,
    pub hourly_tally: BTreeMap<u32, u64>,
    pub detection_count: u64,
}

#[derive(Default)]
struct SubjectContext {
    profile: SubjectProfile,
}

/// The engine. One instance serves every subject concurrently; per-subject
/// state is serialized through a keyed lock, cross-subject work does not
/// contend.
pub struct PatternEngine {
    store: Arc<dyn DetectionStore>,
    /// Write-through mirror of recent submissions; answers queries when the
    /// primary store is down.
    tail: MemoryStore,
    sink: Arc<dyn AlertSink>,
    analysis_config: AnalysisConfig,
    schedule_profile: ScheduleProfile,
    subjects: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<SubjectContext>>>>,
}

impl PatternEngine {
    /// Fails fast on invalid configuration; nothing is validated per call.
    pub fn new(
        store: Arc<dyn DetectionStore>,
        sink: Arc<dyn AlertSink>,
        config: &AppConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let schedule_profile = ScheduleProfile::from_config(&config.schedule)?;

        Ok(Self {
            store,
            tail: MemoryStore::new(),
            sink,
            analysis_config: config.analysis.clone(),
            schedule_profile,
            subjects: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    async fn subject_context(&self, subject_id: &str) -> Arc<tokio::sync::Mutex<SubjectContext>> {
        let mut subjects = self.subjects.lock().await;
        subjects
            .entry(subject_id.to_string())
            .or_default()
            .clone()
    }

    /// Ingest one detection. Invalid input is rejected at the boundary; a
    /// store outage surfaces as a retryable error.
    pub async fn submit_detection(
        &self,
        submission: DetectionSubmission,
    ) -> Result<i64, SubmitError> {
        let record = submission.validate()?;

        let id = self.store.append_detection(&record).await?;
        // Mirror into the tail buffer only after the primary accepted it, so
        // a retried submit does not double-count.
        let _ = self.tail.append_detection(&record).await;

        if let Some(subject_id) = record.subject_id.clone() {
            let context = self.subject_context(&subject_id).await;
            let mut context = context.lock().await;
            let profile = &mut context.profile;
            *profile
                .location_tally
                .entry(record.location.clone())
                .or_insert(0) += 1;
            *profile
                .hourly_tally
                .entry(record.timestamp.hour())
                .or_insert(0) += 1;
            profile.detection_count += 1;
        }

        debug!(
            subject = record.subject_id.as_deref().unwrap_or("unknown"),
            location = %record.location,
            "detection stored"
        );
        Ok(id)
    }

    /// Analyze one subject (or the whole site) over a bounded window ending
    /// now.
    pub async fn analyze(
        &self,
        subject_id: Option<&str>,
        window_hours: u32,
    ) -> Result<AnalysisResult, AnalyzeError> {
        self.analyze_at(subject_id, window_hours, Utc::now()).await
    }

    /// Same as [`analyze`](Self::analyze) with an explicit clock, which keeps
    /// results reproducible under test.
    pub async fn analyze_at(
        &self,
        subject_id: Option<&str>,
        window_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<AnalysisResult, AnalyzeError> {
        if window_hours == 0 {
            return Err(AnalyzeError::InvalidArgument(
                "window_hours must be positive".to_string(),
            ));
        }

        // Always an explicit cutoff; the store never scans all history.
        let cutoff = now - chrono::Duration::hours(window_hours as i64);
        let (records, degraded) = self.load_window(subject_id, cutoff).await?;

        if records.is_empty() {
            return Ok(AnalysisResult::empty(subject_id, window_hours, degraded));
        }

        let temporal = temporal::mine(&records);
        let spatial = spatial::mine(&records);
        let social = social::mine(&records, &self.analysis_config.common_area_keywords);

        // Baseline comparison and summary upsert serialize on the subject
        // lock; analyses of other subjects proceed untouched.
        let behavioral_changes = match subject_id {
            Some(subject) => {
                let context = self.subject_context(subject).await;
                let _guard = context.lock().await;
                let changes = self
                    .compare_with_baseline(subject, &temporal, &spatial)
                    .await;
                self.persist_summaries(subject, &temporal, &spatial, &social, &records, now)
                    .await;
                changes
            }
            None => Vec::new(),
        };

        let detector = AnomalyDetector::new(&self.analysis_config);
        let anomalies = detector.detect(subject_id, &records, &spatial.time_spent_per_location);

        let risk_assessment = risk::assess(
            &anomalies,
            &behavioral_changes,
            social.social_score,
            !temporal.arrival_times.is_empty(),
        );
        let recommendations =
            recommend::recommend(&risk_assessment, &anomalies, &behavioral_changes);

        self.audit_anomalies(subject_id, &anomalies).await;
        self.raise_risk_alert(subject_id, &risk_assessment, now)
            .await;

        Ok(AnalysisResult {
            subject_id: subject_id.map(str::to_string),
            window_hours,
            status: AnalysisStatus::Ok,
            degraded,
            patterns: PatternsDetected {
                temporal: if temporal.is_empty() {
                    Section::NoData
                } else {
                    Section::Ok(temporal)
                },
                spatial: if spatial.is_empty() {
                    Section::NoData
                } else {
                    Section::Ok(spatial)
                },
                social: Section::Ok(social),
            },
            anomalies,
            behavioral_changes,
            risk_assessment,
            recommendations,
        })
    }

    /// Correlate per-signal outputs for one event. A missing schedule signal
    /// is derived from the configured work-hours profile.
    pub async fn correlate_event(
        &self,
        mut bundle: SignalBundle,
        at: DateTime<Utc>,
    ) -> CorrelationReport {
        if bundle.schedule.is_none() {
            bundle.schedule = Some(self.schedule_profile.evaluate(at).into());
        }

        let report = crate::correlate::engine::correlate(&bundle, at);
        for alert in &report.alerts {
            self.dispatch_alert(alert).await;
        }
        report
    }

    /// Snapshot of a subject's running counters.
    pub async fn subject_profile(&self, subject_id: &str) -> Option<SubjectProfile> {
        let subjects = self.subjects.lock().await;
        match subjects.get(subject_id) {
            Some(context) => Some(context.lock().await.profile.clone()),
            None => None,
        }
    }

    /// Purge detections older than the retention horizon.
    pub async fn purge_older_than(&self, days: u32) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(days as i64);
        let removed = self.store.delete_before(cutoff).await?;
        let _ = self.tail.delete_before(cutoff).await;
        info!(days, removed, "retention purge complete");
        Ok(removed)
    }

    /// Subjects seen since `cutoff`; used by the background sweep.
    pub async fn active_subjects(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        match self.store.active_subjects(cutoff).await {
            Ok(subjects) => Ok(subjects),
            Err(err) if err.is_retryable() => {
                warn!(error = %err, "store unavailable, listing subjects from tail buffer");
                self.tail.active_subjects(cutoff).await
            }
            Err(err) => Err(err),
        }
    }

    async fn load_window(
        &self,
        subject_id: Option<&str>,
        cutoff: DateTime<Utc>,
    ) -> Result<(Vec<DetectionRecord>, bool), AnalyzeError> {
        match self.store.detections_since(subject_id, cutoff).await {
            Ok(records) => Ok((records, false)),
            Err(err) if err.is_retryable() => {
                warn!(error = %err, "store unavailable, analyzing from tail buffer");
                let records = self.tail.detections_since(subject_id, cutoff).await?;
                Ok((records, true))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn compare_with_baseline(
        &self,
        subject_id: &str,
        temporal: &TemporalPatterns,
        spatial: &SpatialPatterns,
    ) -> Vec<BehavioralChange> {
        let baseline_temporal = self
            .load_baseline::<TemporalPatterns>(subject_id, PatternKind::Temporal)
            .await;
        let baseline_spatial = self
            .load_baseline::<SpatialPatterns>(subject_id, PatternKind::Spatial)
            .await;

        change::detect_changes(
            temporal,
            spatial,
            baseline_temporal.as_ref(),
            baseline_spatial.as_ref(),
            self.analysis_config.lunch_variance_threshold_minutes,
        )
    }

    /// A stale or missing baseline softens change detection; it never fails
    /// the call.
    async fn load_baseline<T: serde::de::DeserializeOwned>(
        &self,
        subject_id: &str,
        kind: PatternKind,
    ) -> Option<T> {
        match self.store.latest_pattern_summary(subject_id, kind).await {
            Ok(Some(summary)) => match serde_json::from_value(summary.data) {
                Ok(data) => Some(data),
                Err(err) => {
                    warn!(subject = subject_id, %kind, error = %err, "unreadable baseline ignored");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(subject = subject_id, %kind, error = %err, "baseline load failed");
                None
            }
        }
    }

    async fn persist_summaries(
        &self,
        subject_id: &str,
        temporal: &TemporalPatterns,
        spatial: &SpatialPatterns,
        social: &SocialPatterns,
        records: &[DetectionRecord],
        now: DateTime<Utc>,
    ) {
        // More observations, more trustworthy baseline.
        let confidence = (records.len() as f64 / 100.0).min(1.0);
        let date = now.date_naive();

        let summaries = [
            (PatternKind::Temporal, serde_json::to_value(temporal)),
            (PatternKind::Spatial, serde_json::to_value(spatial)),
            (PatternKind::Social, serde_json::to_value(social)),
        ];

        for (kind, data) in summaries {
            let data = match data {
                Ok(data) => data,
                Err(err) => {
                    warn!(%kind, error = %err, "summary serialization failed");
                    continue;
                }
            };
            let summary = PatternSummary {
                subject_id: subject_id.to_string(),
                kind,
                date,
                data,
                confidence,
                updated_at: now,
            };
            if let Err(err) = self.store.upsert_pattern_summary(&summary).await {
                warn!(subject = subject_id, %kind, error = %err, "summary upsert failed");
            }
        }
    }

    async fn audit_anomalies(&self, subject_id: Option<&str>, anomalies: &[Anomaly]) {
        for anomaly in anomalies {
            if let Err(err) = self.store.append_anomaly(subject_id, anomaly).await {
                warn!(error = %err, "anomaly audit write failed");
            }
        }
    }

    async fn raise_risk_alert(
        &self,
        subject_id: Option<&str>,
        assessment: &RiskAssessment,
        now: DateTime<Utc>,
    ) {
        if assessment.level < Severity::High {
            return;
        }

        let alert = Alert::new(
            AlertKind::BehavioralRisk,
            assessment.level,
            "Elevated behavioral risk",
            format!(
                "Subject {}: score {:.1} ({})",
                subject_id.unwrap_or("unknown"),
                assessment.score,
                assessment.risk_factors.join(", ")
            ),
            now,
            true,
        );
        self.dispatch_alert(&alert).await;
    }

    /// Fire-and-forget: sink or audit failures are logged and swallowed.
    async fn dispatch_alert(&self, alert: &Alert) {
        if let Err(err) = self.sink.deliver(alert).await {
            warn!(alert = %alert.title, error = %err, "alert delivery failed");
        }
        if let Err(err) = self.store.append_alert(alert).await {
            warn!(alert = %alert.title, error = %err, "alert audit write failed");
        }
    }

    /// Recent alert audit rows, newest first.
    pub async fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        self.store.recent_alerts(limit).await
    }
}
