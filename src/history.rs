//! Local analysis history, backed by SQLite.
//!
//! One row per completed analysis: identity, timestamp, severity summary,
//! the full report text, and an optional thumbnail of the analyzed photo.
//! Listing returns newest first. Nothing here ever leaves the device.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::SeverityLevel;
use crate::pipeline::AnalysisOutcome;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt history row: {0}")]
    Corrupt(String),
}

/// One stored analysis.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub severity_level: SeverityLevel,
    /// Probability of the top-ranked condition, when one was parsed.
    pub top_condition_probability: Option<u8>,
    /// Full formatted report text, verbatim.
    pub raw_text: String,
    /// JPEG thumbnail of the analyzed photo, when retained.
    pub thumbnail: Option<Vec<u8>>,
}

impl HistoryRecord {
    /// A new record stamped now with a fresh id.
    pub fn new(
        severity_level: SeverityLevel,
        top_condition_probability: Option<u8>,
        raw_text: impl Into<String>,
        thumbnail: Option<Vec<u8>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            severity_level,
            top_condition_probability,
            raw_text: raw_text.into(),
            thumbnail,
        }
    }

    /// Summarize a completed analysis into a record, with an optional
    /// thumbnail of the analyzed photo.
    pub fn from_outcome(outcome: &AnalysisOutcome, thumbnail: Option<Vec<u8>>) -> Self {
        Self::new(
            outcome.report.severity_level,
            outcome.report.top_condition_probability(),
            outcome.formatted_text.clone(),
            thumbnail,
        )
    }
}

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS analyses (
    id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    severity TEXT NOT NULL,
    top_probability INTEGER,
    raw_text TEXT NOT NULL,
    thumbnail BLOB
);
CREATE INDEX IF NOT EXISTS idx_analyses_created_at ON analyses(created_at);
";

/// Analysis history store. Single-connection, single-owner.
pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    /// Open (creating if needed) the history database at `path`.
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, HistoryError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, HistoryError> {
        conn.execute_batch(
            "PRAGMA journal_mode=DELETE;
             PRAGMA foreign_keys=ON;",
        )?;
        conn.execute_batch(SCHEMA)?;
        info!("History store ready");
        Ok(Self { conn })
    }

    /// Insert one record. The id must be unused.
    pub fn save(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        self.conn.execute(
            "INSERT INTO analyses (id, created_at, severity, top_probability, raw_text, thumbnail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id.to_string(),
                record.created_at.to_rfc3339(),
                record.severity_level.as_str(),
                record.top_condition_probability,
                record.raw_text,
                record.thumbnail,
            ],
        )?;
        debug!(id = %record.id, "Analysis saved to history");
        Ok(())
    }

    /// All records, newest first.
    pub fn list(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, created_at, severity, top_probability, raw_text, thumbnail
             FROM analyses ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(decode_record(row?)?);
        }
        Ok(records)
    }

    /// One record by id, or `None`.
    pub fn get(&self, id: Uuid) -> Result<Option<HistoryRecord>, HistoryError> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, created_at, severity, top_probability, raw_text, thumbnail
                 FROM analyses WHERE id = ?1",
                params![id.to_string()],
                row_to_record,
            )
            .optional()?;
        raw.map(decode_record).transpose()
    }

    /// Delete one record. Returns whether it existed.
    pub fn delete(&self, id: Uuid) -> Result<bool, HistoryError> {
        let n = self
            .conn
            .execute("DELETE FROM analyses WHERE id = ?1", params![id.to_string()])?;
        Ok(n > 0)
    }

    pub fn count(&self) -> Result<i64, HistoryError> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM analyses", [], |row| row.get(0))?;
        Ok(n)
    }
}

/// Raw column values for one row; decoded into a `HistoryRecord` outside the
/// rusqlite closure so decode failures surface as `Corrupt` not `Sqlite`.
struct RawRow {
    id: String,
    created_at: String,
    severity: String,
    top_probability: Option<i64>,
    raw_text: String,
    thumbnail: Option<Vec<u8>>,
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        created_at: row.get(1)?,
        severity: row.get(2)?,
        top_probability: row.get(3)?,
        raw_text: row.get(4)?,
        thumbnail: row.get(5)?,
    })
}

fn decode_record(raw: RawRow) -> Result<HistoryRecord, HistoryError> {
    let id = Uuid::parse_str(&raw.id)
        .map_err(|e| HistoryError::Corrupt(format!("bad id {:?}: {e}", raw.id)))?;
    let created_at = DateTime::parse_from_rfc3339(&raw.created_at)
        .map_err(|e| HistoryError::Corrupt(format!("bad timestamp {:?}: {e}", raw.created_at)))?
        .with_timezone(&Utc);
    let top_condition_probability = raw.top_probability.map(|p| p.clamp(0, 100) as u8);

    Ok(HistoryRecord {
        id,
        created_at,
        severity_level: SeverityLevel::from_stored(&raw.severity),
        top_condition_probability,
        raw_text: raw.raw_text,
        thumbnail: raw.thumbnail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(raw_text: &str) -> HistoryRecord {
        HistoryRecord::new(SeverityLevel::Moderate, Some(72), raw_text, None)
    }

    #[test]
    fn save_and_get_round_trip() {
        let store = HistoryStore::open_in_memory().unwrap();
        let rec = HistoryRecord::new(
            SeverityLevel::Severe,
            Some(88),
            "full report text",
            Some(vec![0xFF, 0xD8, 0xFF, 0xD9]),
        );
        store.save(&rec).unwrap();

        let got = store.get(rec.id).unwrap().unwrap();
        assert_eq!(got.id, rec.id);
        assert_eq!(got.severity_level, SeverityLevel::Severe);
        assert_eq!(got.top_condition_probability, Some(88));
        assert_eq!(got.raw_text, "full report text");
        assert_eq!(got.thumbnail, Some(vec![0xFF, 0xD8, 0xFF, 0xD9]));
        assert_eq!(got.created_at.timestamp(), rec.created_at.timestamp());
    }

    #[test]
    fn get_unknown_id_returns_none() {
        let store = HistoryStore::open_in_memory().unwrap();
        assert!(store.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn list_orders_newest_first() {
        let store = HistoryStore::open_in_memory().unwrap();
        let mut old = record("old");
        old.created_at = Utc::now() - Duration::days(2);
        let mut middle = record("middle");
        middle.created_at = Utc::now() - Duration::days(1);
        let new = record("new");

        // Insert out of order.
        store.save(&middle).unwrap();
        store.save(&new).unwrap();
        store.save(&old).unwrap();

        let listed = store.list().unwrap();
        let texts: Vec<&str> = listed.iter().map(|r| r.raw_text.as_str()).collect();
        assert_eq!(texts, vec!["new", "middle", "old"]);
    }

    #[test]
    fn delete_removes_row() {
        let store = HistoryStore::open_in_memory().unwrap();
        let rec = record("to delete");
        store.save(&rec).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        assert!(store.delete(rec.id).unwrap());
        assert_eq!(store.count().unwrap(), 0);
        assert!(!store.delete(rec.id).unwrap());
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let store = HistoryStore::open_in_memory().unwrap();
        let rec = record("first");
        store.save(&rec).unwrap();
        assert!(matches!(store.save(&rec), Err(HistoryError::Sqlite(_))));
    }

    #[test]
    fn missing_probability_round_trips_as_none() {
        let store = HistoryStore::open_in_memory().unwrap();
        let rec = HistoryRecord::new(SeverityLevel::Healthy, None, "text", None);
        store.save(&rec).unwrap();
        let got = store.get(rec.id).unwrap().unwrap();
        assert_eq!(got.top_condition_probability, None);
        assert_eq!(got.severity_level, SeverityLevel::Healthy);
    }

    #[test]
    fn from_outcome_summarizes_report() {
        let formatted = "SEVERITY: Moderate\nPOSSIBLE CONDITIONS\nAcne Vulgaris - 72%\n";
        let outcome = AnalysisOutcome {
            report: crate::pipeline::report::parse(formatted),
            formatted_text: formatted.to_string(),
            provider_used: crate::config::ProviderId::OpenRouter,
        };
        let rec = HistoryRecord::from_outcome(&outcome, None);
        assert_eq!(rec.severity_level, SeverityLevel::Moderate);
        assert_eq!(rec.top_condition_probability, Some(72));
        assert_eq!(rec.raw_text, formatted);

        let store = HistoryStore::open_in_memory().unwrap();
        store.save(&rec).unwrap();
        assert_eq!(store.list().unwrap()[0].id, rec.id);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");

        let rec = record("persisted");
        {
            let store = HistoryStore::open(&path).unwrap();
            store.save(&rec).unwrap();
        }
        let store = HistoryStore::open(&path).unwrap();
        let got = store.get(rec.id).unwrap().unwrap();
        assert_eq!(got.raw_text, "persisted");
    }
}
