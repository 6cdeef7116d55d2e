//! SQLite-backed [`DetectionStore`] -- pooled connections, blocking work on
//! the tokio blocking pool, explicit per-operation timeout.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::time::Duration;
use uuid::Uuid;

use crate::alert::{Alert, AlertKind};
use crate::detect::{Anomaly, Severity};
use crate::storage::{
    DetectionRecord, DetectionStore, PatternKind, PatternSummary, Pool, StoreError,
};

const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    pool: Pool,
    op_timeout: Duration,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Run a blocking closure against a pooled connection, bounded by the
    /// store timeout. A slow or absent database yields a retryable error
    /// instead of stalling the caller.
    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        let task = tokio::task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            f(&conn)
        });

        match tokio::time::timeout(self.op_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(StoreError::Unavailable(join_err.to_string())),
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }
}

fn sql_err(e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{raw}': {e}")))
}

fn parse_json(raw: Option<String>) -> serde_json::Value {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

type RawDetectionRow = (
    String,
    Option<String>,
    String,
    f64,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawDetectionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn collect_records<P: rusqlite::Params>(
    stmt: &mut rusqlite::Statement<'_>,
    params: P,
) -> Result<Vec<DetectionRecord>, StoreError> {
    let rows = stmt.query_map(params, row_to_raw).map_err(sql_err)?;
    let mut out = Vec::new();
    for row in rows {
        let (ts, subject_id, location, confidence, attrs, identity, badge) =
            row.map_err(sql_err)?;
        out.push(DetectionRecord {
            timestamp: parse_timestamp(&ts)?,
            subject_id,
            location,
            confidence,
            attribute_snapshot: parse_json(attrs),
            identity_snapshot: parse_json(identity),
            badge_snapshot: parse_json(badge),
        });
    }
    Ok(out)
}

#[async_trait::async_trait]
impl DetectionStore for SqliteStore {
    async fn append_detection(&self, record: &DetectionRecord) -> Result<i64, StoreError> {
        let record = record.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO detections
                     (timestamp, subject_id, location, confidence,
                      attribute_json, identity_json, badge_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.timestamp.to_rfc3339(),
                    record.subject_id,
                    record.location,
                    record.confidence,
                    record.attribute_snapshot.to_string(),
                    record.identity_snapshot.to_string(),
                    record.badge_snapshot.to_string(),
                ],
            )
            .map_err(sql_err)?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn detections_since(
        &self,
        subject_id: Option<&str>,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DetectionRecord>, StoreError> {
        let subject = subject_id.map(|s| s.to_string());
        self.run(move |conn| {
            let cutoff_str = cutoff.to_rfc3339();
            let columns = "timestamp, subject_id, location, confidence,
                           attribute_json, identity_json, badge_json";

            // The store sorts by timestamp, so write order never leaks into
            // mined patterns.
            match &subject {
                Some(id) => {
                    let mut stmt = conn
                        .prepare(&format!(
                            "SELECT {columns} FROM detections
                             WHERE subject_id = ?1 AND timestamp >= ?2
                             ORDER BY timestamp ASC"
                        ))
                        .map_err(sql_err)?;
                    collect_records(&mut stmt, params![id, cutoff_str])
                }
                None => {
                    let mut stmt = conn
                        .prepare(&format!(
                            "SELECT {columns} FROM detections
                             WHERE timestamp >= ?1
                             ORDER BY timestamp ASC"
                        ))
                        .map_err(sql_err)?;
                    collect_records(&mut stmt, params![cutoff_str])
                }
            }
        })
        .await
    }

    async fn upsert_pattern_summary(&self, summary: &PatternSummary) -> Result<(), StoreError> {
        let summary = summary.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO pattern_summaries
                     (subject_id, kind, date, data_json, confidence, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (subject_id, kind, date) DO UPDATE SET
                     data_json = excluded.data_json,
                     confidence = excluded.confidence,
                     updated_at = excluded.updated_at",
                params![
                    summary.subject_id,
                    summary.kind.to_string(),
                    summary.date.to_string(),
                    summary.data.to_string(),
                    summary.confidence,
                    summary.updated_at.to_rfc3339(),
                ],
            )
            .map_err(sql_err)?;
            Ok(())
        })
        .await
    }

    async fn latest_pattern_summary(
        &self,
        subject_id: &str,
        kind: PatternKind,
    ) -> Result<Option<PatternSummary>, StoreError> {
        let subject = subject_id.to_string();
        self.run(move |conn| {
            let row = conn
                .query_row(
                    "SELECT subject_id, kind, date, data_json, confidence, updated_at
                     FROM pattern_summaries
                     WHERE subject_id = ?1 AND kind = ?2
                     ORDER BY date DESC, updated_at DESC
                     LIMIT 1",
                    params![subject, kind.to_string()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, f64>(4)?,
                            row.get::<_, String>(5)?,
                        ))
                    },
                )
                .optional()
                .map_err(sql_err)?;

            match row {
                None => Ok(None),
                Some((subject_id, date, data_json, confidence, updated_at)) => {
                    let date = date
                        .parse::<NaiveDate>()
                        .map_err(|e| StoreError::Corrupt(format!("bad date '{date}': {e}")))?;
                    let data = serde_json::from_str(&data_json)
                        .map_err(|e| StoreError::Corrupt(format!("bad summary payload: {e}")))?;
                    Ok(Some(PatternSummary {
                        subject_id,
                        kind,
                        date,
                        data,
                        confidence,
                        updated_at: parse_timestamp(&updated_at)?,
                    }))
                }
            }
        })
        .await
    }

    async fn active_subjects(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        self.run(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT DISTINCT subject_id FROM detections
                     WHERE subject_id IS NOT NULL AND timestamp >= ?1
                     ORDER BY subject_id",
                )
                .map_err(sql_err)?;
            let rows = stmt
                .query_map(params![cutoff.to_rfc3339()], |row| row.get::<_, String>(0))
                .map_err(sql_err)?;

            let mut subjects = Vec::new();
            for row in rows {
                subjects.push(row.map_err(sql_err)?);
            }
            Ok(subjects)
        })
        .await
    }

    async fn append_anomaly(
        &self,
        subject_id: Option<&str>,
        anomaly: &Anomaly,
    ) -> Result<(), StoreError> {
        let subject = subject_id.map(|s| s.to_string());
        let anomaly = anomaly.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO anomaly_audit
                     (subject_id, kind, severity, description, location, occurred_at, evidence_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    subject,
                    anomaly.kind.to_string(),
                    anomaly.severity.as_str(),
                    anomaly.description,
                    anomaly.location,
                    anomaly.timestamp.map(|t| t.to_rfc3339()),
                    anomaly.evidence.to_string(),
                ],
            )
            .map_err(sql_err)?;
            Ok(())
        })
        .await
    }

    async fn append_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let alert = alert.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO alert_audit
                     (id, kind, severity, title, description, requires_action, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    alert.id.to_string(),
                    alert.kind.as_str(),
                    alert.severity.as_str(),
                    alert.title,
                    alert.description,
                    alert.requires_action as i64,
                    alert.timestamp.to_rfc3339(),
                ],
            )
            .map_err(sql_err)?;
            Ok(())
        })
        .await
    }

    async fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        self.run(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, kind, severity, title, description, requires_action, timestamp
                     FROM alert_audit
                     ORDER BY created_at DESC
                     LIMIT ?1",
                )
                .map_err(sql_err)?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                })
                .map_err(sql_err)?;

            let mut alerts = Vec::new();
            for row in rows {
                let (id, kind, severity, title, description, requires_action, timestamp) =
                    row.map_err(sql_err)?;
                alerts.push(Alert {
                    id: Uuid::parse_str(&id)
                        .map_err(|e| StoreError::Corrupt(format!("bad alert id '{id}': {e}")))?,
                    kind: AlertKind::parse(&kind)
                        .ok_or_else(|| StoreError::Corrupt(format!("bad alert kind '{kind}'")))?,
                    severity: Severity::parse(&severity).ok_or_else(|| {
                        StoreError::Corrupt(format!("bad alert severity '{severity}'"))
                    })?,
                    title,
                    description,
                    requires_action: requires_action != 0,
                    timestamp: parse_timestamp(&timestamp)?,
                });
            }
            Ok(alerts)
        })
        .await
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.run(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM detections WHERE timestamp < ?1",
                    params![cutoff.to_rfc3339()],
                )
                .map_err(sql_err)?;
            Ok(removed as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::open_pool;
    use chrono::TimeZone;

    fn record(ts: DateTime<Utc>, subject: &str, location: &str) -> DetectionRecord {
        DetectionRecord {
            timestamp: ts,
            subject_id: Some(subject.to_string()),
            location: location.to_string(),
            confidence: 0.9,
            attribute_snapshot: serde_json::Value::Null,
            identity_snapshot: serde_json::Value::Null,
            badge_snapshot: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_append_and_windowed_read() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("store.db");
        let pool = open_pool(db_path.to_str().unwrap()).unwrap();
        let store = SqliteStore::new(pool);

        let base = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        // Insert out of order; reads must come back sorted.
        store
            .append_detection(&record(base + chrono::Duration::hours(2), "emp-1", "lab"))
            .await
            .unwrap();
        store
            .append_detection(&record(base, "emp-1", "office"))
            .await
            .unwrap();
        store
            .append_detection(&record(base + chrono::Duration::hours(1), "emp-2", "office"))
            .await
            .unwrap();

        let all = store
            .detections_since(Some("emp-1"), base - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].location, "office");
        assert_eq!(all[1].location, "lab");

        // Cutoff excludes the earliest record.
        let tail = store
            .detections_since(Some("emp-1"), base + chrono::Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(tail.len(), 1);

        let subjects = store
            .active_subjects(base - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(subjects, vec!["emp-1".to_string(), "emp-2".to_string()]);
    }

    #[tokio::test]
    async fn test_summary_upsert_keeps_key_unique() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("store.db");
        let pool = open_pool(db_path.to_str().unwrap()).unwrap();
        let store = SqliteStore::new(pool);

        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let mut summary = PatternSummary {
            subject_id: "emp-1".to_string(),
            kind: PatternKind::Temporal,
            date,
            data: serde_json::json!({"arrival_times": ["09:00"]}),
            confidence: 0.5,
            updated_at: Utc.with_ymd_and_hms(2024, 3, 4, 18, 0, 0).unwrap(),
        };
        store.upsert_pattern_summary(&summary).await.unwrap();

        summary.data = serde_json::json!({"arrival_times": ["09:00", "09:05"]});
        summary.confidence = 0.8;
        store.upsert_pattern_summary(&summary).await.unwrap();

        let latest = store
            .latest_pattern_summary("emp-1", PatternKind::Temporal)
            .await
            .unwrap()
            .expect("summary present");
        assert_eq!(latest.confidence, 0.8);
        assert_eq!(latest.data["arrival_times"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_retention_delete_before() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("store.db");
        let pool = open_pool(db_path.to_str().unwrap()).unwrap();
        let store = SqliteStore::new(pool);

        let base = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        store
            .append_detection(&record(base, "emp-1", "office"))
            .await
            .unwrap();
        store
            .append_detection(&record(base + chrono::Duration::days(2), "emp-1", "office"))
            .await
            .unwrap();

        let removed = store
            .delete_before(base + chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let left = store
            .detections_since(None, base - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(left.len(), 1);
    }
}
