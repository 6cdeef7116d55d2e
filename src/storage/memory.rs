//! In-memory tail buffer -- a bounded [`DetectionStore`] used as the
//! degraded-mode fallback when SQLite is unavailable, and as the store for
//! unit tests.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::RwLock;

use crate::alert::Alert;
use crate::detect::Anomaly;
use crate::storage::{DetectionRecord, DetectionStore, PatternKind, PatternSummary, StoreError};

const DEFAULT_CAPACITY: usize = 10_000;

pub struct MemoryStore {
    detections: RwLock<VecDeque<DetectionRecord>>,
    summaries: RwLock<Vec<PatternSummary>>,
    alerts: RwLock<Vec<Alert>>,
    capacity: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            detections: RwLock::new(VecDeque::new()),
            summaries: RwLock::new(Vec::new()),
            alerts: RwLock::new(Vec::new()),
            capacity,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DetectionStore for MemoryStore {
    async fn append_detection(&self, record: &DetectionRecord) -> Result<i64, StoreError> {
        let mut detections = self.detections.write().unwrap();
        if detections.len() >= self.capacity {
            detections.pop_front();
        }
        detections.push_back(record.clone());
        Ok(detections.len() as i64)
    }

    async fn detections_since(
        &self,
        subject_id: Option<&str>,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DetectionRecord>, StoreError> {
        let detections = self.detections.read().unwrap();
        let mut out: Vec<DetectionRecord> = detections
            .iter()
            .filter(|d| d.timestamp >= cutoff)
            .filter(|d| match subject_id {
                Some(id) => d.subject_id.as_deref() == Some(id),
                None => true,
            })
            .cloned()
            .collect();
        // Same contract as the SQLite store: sorted reads.
        out.sort_by_key(|d| d.timestamp);
        Ok(out)
    }

    async fn upsert_pattern_summary(&self, summary: &PatternSummary) -> Result<(), StoreError> {
        let mut summaries = self.summaries.write().unwrap();
        match summaries.iter_mut().find(|s| {
            s.subject_id == summary.subject_id && s.kind == summary.kind && s.date == summary.date
        }) {
            Some(existing) => {
                existing.data = summary.data.clone();
                existing.confidence = summary.confidence;
                existing.updated_at = summary.updated_at;
            }
            None => summaries.push(summary.clone()),
        }
        Ok(())
    }

    async fn latest_pattern_summary(
        &self,
        subject_id: &str,
        kind: PatternKind,
    ) -> Result<Option<PatternSummary>, StoreError> {
        let summaries = self.summaries.read().unwrap();
        Ok(summaries
            .iter()
            .filter(|s| s.subject_id == subject_id && s.kind == kind)
            .max_by_key(|s| (s.date, s.updated_at))
            .cloned())
    }

    async fn active_subjects(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        let detections = self.detections.read().unwrap();
        let mut subjects: Vec<String> = detections
            .iter()
            .filter(|d| d.timestamp >= cutoff)
            .filter_map(|d| d.subject_id.clone())
            .collect();
        subjects.sort();
        subjects.dedup();
        Ok(subjects)
    }

    async fn append_anomaly(
        &self,
        _subject_id: Option<&str>,
        _anomaly: &Anomaly,
    ) -> Result<(), StoreError> {
        // Audit rows are a persistence side effect; the tail buffer keeps none.
        Ok(())
    }

    async fn append_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        self.alerts.write().unwrap().push(alert.clone());
        Ok(())
    }

    async fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        let alerts = self.alerts.read().unwrap();
        Ok(alerts.iter().rev().take(limit).cloned().collect())
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut detections = self.detections.write().unwrap();
        let before = detections.len();
        detections.retain(|d| d.timestamp >= cutoff);
        Ok((before - detections.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let store = MemoryStore::with_capacity(2);
        let base = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        for i in 0..3 {
            store
                .append_detection(&DetectionRecord {
                    timestamp: base + chrono::Duration::minutes(i),
                    subject_id: Some("emp-1".to_string()),
                    location: format!("loc-{i}"),
                    confidence: 1.0,
                    attribute_snapshot: serde_json::Value::Null,
                    identity_snapshot: serde_json::Value::Null,
                    badge_snapshot: serde_json::Value::Null,
                })
                .await
                .unwrap();
        }

        let all = store
            .detections_since(None, base - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].location, "loc-1");
    }
}
