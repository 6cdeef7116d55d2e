//! Detection storage layer -- record types, store contract, SQLite pool.

pub mod memory;
pub mod schema;
pub mod sqlite;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::alert::Alert;
use crate::detect::Anomaly;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// One timestamped observation from an upstream recognition component.
///
/// Records are append-only and never re-ordered at write time; consumers
/// sort by timestamp before any windowed analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub timestamp: DateTime<Utc>,
    pub subject_id: Option<String>,
    pub location: String,
    pub confidence: f64,
    #[serde(default)]
    pub attribute_snapshot: serde_json::Value,
    #[serde(default)]
    pub identity_snapshot: serde_json::Value,
    #[serde(default)]
    pub badge_snapshot: serde_json::Value,
}

/// Which routine signal a persisted summary describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Temporal,
    Spatial,
    Social,
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternKind::Temporal => write!(f, "temporal"),
            PatternKind::Spatial => write!(f, "spatial"),
            PatternKind::Social => write!(f, "social"),
        }
    }
}

/// Derived, persisted description of a subject's recent routine for one
/// signal type. Keyed by (subject, kind, date); the latest row for a kind is
/// the baseline for future change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSummary {
    pub subject_id: String,
    pub kind: PatternKind,
    pub date: NaiveDate,
    pub data: serde_json::Value,
    pub confidence: f64,
    pub updated_at: DateTime<Utc>,
}

/// Storage failures are recoverable: callers retry or fall back to the
/// in-memory tail buffer, they never wedge the pipeline.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

/// Persistence contract for the mining core. One mining core, pluggable
/// backends selected at construction.
#[async_trait::async_trait]
pub trait DetectionStore: Send + Sync {
    /// Append a detection. Records are immutable once written.
    async fn append_detection(&self, record: &DetectionRecord) -> Result<i64, StoreError>;

    /// Time-ranged read: all detections at or after `cutoff`, optionally
    /// filtered by subject, ordered by timestamp ascending.
    async fn detections_since(
        &self,
        subject_id: Option<&str>,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DetectionRecord>, StoreError>;

    /// Upsert a pattern summary keyed by (subject, kind, date).
    async fn upsert_pattern_summary(&self, summary: &PatternSummary) -> Result<(), StoreError>;

    /// Latest persisted summary of the given kind for a subject, if any.
    async fn latest_pattern_summary(
        &self,
        subject_id: &str,
        kind: PatternKind,
    ) -> Result<Option<PatternSummary>, StoreError>;

    /// Subjects with at least one detection at or after `cutoff`.
    async fn active_subjects(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, StoreError>;

    /// Append an anomaly audit row. Best-effort; correctness of the current
    /// call never depends on it.
    async fn append_anomaly(
        &self,
        subject_id: Option<&str>,
        anomaly: &Anomaly,
    ) -> Result<(), StoreError>;

    /// Append an alert audit row.
    async fn append_alert(&self, alert: &Alert) -> Result<(), StoreError>;

    /// Recent alert audit rows, newest first.
    async fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError>;

    /// Retention: delete detections older than `cutoff`. Returns rows removed.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
