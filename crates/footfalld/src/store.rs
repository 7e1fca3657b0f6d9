//! Append-only detection store on SQLite.
//!
//! Rows are created by non-duplicate submissions, read by the dedup window
//! scan and the stats/listing queries, and only ever deleted in bulk by the
//! administrative clear operation. Nothing mutates a row after insert.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use footfall_core::{Gender, StatsReport};
use serde::Serialize;
use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] tokio_rusqlite::Error),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS detections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    age INTEGER NOT NULL,
    gender TEXT NOT NULL,
    confidence REAL NOT NULL,
    face_descriptor TEXT,
    timestamp DATETIME NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_detections_timestamp ON detections(timestamp);
";

/// A detection accepted for insertion.
#[derive(Debug, Clone)]
pub struct NewDetection {
    pub age: u32,
    pub gender: Gender,
    pub confidence: f32,
    /// Descriptor payload serialized verbatim as submitted.
    pub descriptor_json: String,
}

/// One stored detection row.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionRow {
    pub id: i64,
    pub age: u32,
    pub gender: Gender,
    pub confidence: f32,
    #[serde(skip_serializing)]
    pub face_descriptor: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Attribute pre-filter for the geometric dedup path.
#[derive(Debug, Clone, Copy)]
pub struct AttributeFilter {
    pub gender: Gender,
    pub age: u32,
    pub tolerance: u32,
}

#[derive(Clone)]
pub struct DetectionStore {
    conn: Connection,
}

fn row_to_detection(row: &rusqlite::Row<'_>) -> Result<DetectionRow, rusqlite::Error> {
    let gender: String = row.get(2)?;
    Ok(DetectionRow {
        id: row.get(0)?,
        age: row.get(1)?,
        // Lenient parse: the store only ever wrote lowercase labels, but a
        // hand-edited database must not wedge every read.
        gender: Gender::from_str(&gender).unwrap_or(Gender::Unknown),
        confidence: row.get(3)?,
        face_descriptor: row.get(4)?,
        timestamp: row.get(5)?,
    })
}

impl DetectionStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path.to_path_buf()).await?;
        Self::init(conn).await
    }

    /// In-memory store for tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Insert one detection and return its row id.
    pub async fn insert(&self, detection: NewDetection) -> Result<i64, StoreError> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO detections (age, gender, confidence, face_descriptor, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        detection.age,
                        detection.gender.to_string(),
                        detection.confidence,
                        detection.descriptor_json,
                        Utc::now(),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// Detections newer than `cutoff`, newest first, optionally restricted
    /// to an attribute band (geometric dedup pre-filter).
    pub async fn recent_since(
        &self,
        cutoff: DateTime<Utc>,
        filter: Option<AttributeFilter>,
    ) -> Result<Vec<DetectionRow>, StoreError> {
        let rows = self
            .conn
            .call(move |conn| {
                let rows = match filter {
                    None => {
                        let mut stmt = conn.prepare(
                            "SELECT id, age, gender, confidence, face_descriptor, timestamp
                             FROM detections WHERE timestamp >= ?1
                             ORDER BY timestamp DESC",
                        )?;
                        let mapped = stmt.query_map(rusqlite::params![cutoff], row_to_detection)?;
                        mapped.collect::<Result<Vec<_>, _>>()?
                    }
                    Some(f) => {
                        let mut stmt = conn.prepare(
                            "SELECT id, age, gender, confidence, face_descriptor, timestamp
                             FROM detections
                             WHERE timestamp >= ?1 AND gender = ?2 AND age BETWEEN ?3 AND ?4
                             ORDER BY timestamp DESC",
                        )?;
                        let low = f.age.saturating_sub(f.tolerance);
                        let high = f.age + f.tolerance;
                        let mapped = stmt.query_map(
                            rusqlite::params![cutoff, f.gender.to_string(), low, high],
                            row_to_detection,
                        )?;
                        mapped.collect::<Result<Vec<_>, _>>()?
                    }
                };
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Most recent detections, newest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<DetectionRow>, StoreError> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, age, gender, confidence, face_descriptor, timestamp
                     FROM detections ORDER BY timestamp DESC LIMIT ?1",
                )?;
                let mapped = stmt.query_map(rusqlite::params![limit], row_to_detection)?;
                Ok(mapped.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;
        Ok(rows)
    }

    pub async fn stats(&self) -> Result<StatsReport, StoreError> {
        let stats = self
            .conn
            .call(|conn| {
                let total: i64 =
                    conn.query_row("SELECT COUNT(*) FROM detections", [], |r| r.get(0))?;
                let male: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM detections WHERE gender = 'male'",
                    [],
                    |r| r.get(0),
                )?;
                let female: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM detections WHERE gender = 'female'",
                    [],
                    |r| r.get(0),
                )?;
                let average_age: Option<f64> =
                    conn.query_row("SELECT AVG(age) FROM detections", [], |r| r.get(0))?;
                Ok(StatsReport {
                    total,
                    male,
                    female,
                    average_age: average_age.map(|a| a.round() as i64).unwrap_or(0),
                })
            })
            .await?;
        Ok(stats)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let n = self
            .conn
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM detections", [], |r| r.get(0))?))
            .await?;
        Ok(n)
    }

    /// Delete every stored detection; returns the number removed.
    pub async fn clear_all(&self) -> Result<usize, StoreError> {
        let deleted = self
            .conn
            .call(|conn| Ok(conn.execute("DELETE FROM detections", [])?))
            .await?;
        Ok(deleted)
    }
}
