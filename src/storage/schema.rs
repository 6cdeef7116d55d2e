//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS detections (
            id INTEGER PRIMARY KEY,
            timestamp TEXT NOT NULL,
            subject_id TEXT,
            location TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 0.0,
            attribute_json TEXT,
            identity_json TEXT,
            badge_json TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS pattern_summaries (
            id INTEGER PRIMARY KEY,
            subject_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            date TEXT NOT NULL,
            data_json TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 0.0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (subject_id, kind, date)
        );

        CREATE TABLE IF NOT EXISTS anomaly_audit (
            id INTEGER PRIMARY KEY,
            subject_id TEXT,
            kind TEXT NOT NULL,
            severity TEXT NOT NULL,
            description TEXT NOT NULL,
            location TEXT,
            occurred_at TEXT,
            evidence_json TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS alert_audit (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            severity TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            requires_action INTEGER NOT NULL DEFAULT 0,
            timestamp TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_detections_timestamp ON detections(timestamp);
        CREATE INDEX IF NOT EXISTS idx_detections_subject ON detections(subject_id);
        CREATE INDEX IF NOT EXISTS idx_summaries_subject ON pattern_summaries(subject_id, kind);
        CREATE INDEX IF NOT EXISTS idx_anomaly_audit_created ON anomaly_audit(created_at);
        CREATE INDEX IF NOT EXISTS idx_alert_audit_created ON alert_audit(created_at);",
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        // Verify tables exist by querying them
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM detections", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM pattern_summaries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap(); // Should not error
    }
}
