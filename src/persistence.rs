//! Durable append-only log of accepted readings
//!
//! Every accepted sample is written synchronously, once, with a fresh
//! monotonically increasing id. Rows are never updated or deleted here.
//!
//! The ingestion path talks to the log through the [`ReadingSink`] trait so
//! that the store update and the durable write stay independent: a failed
//! append is reported to the caller, and the in-memory state keeps the
//! sample regardless.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE readings (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     node_id TEXT, ts REAL, temp REAL, vib REAL, sound REAL, anomaly_score REAL
//! )
//! ```

use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::PersistenceError;
use crate::types::{PersistedReading, Sample};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS readings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    node_id TEXT,
    ts REAL,
    temp REAL,
    vib REAL,
    sound REAL,
    anomaly_score REAL
)";

const SELECT_COLUMNS: &str = "SELECT id, node_id, ts, temp, vib, sound, anomaly_score FROM readings";

/// Destination for accepted readings
#[cfg_attr(test, mockall::automock)]
pub trait ReadingSink: Send + Sync {
    /// Durably store a reading and return its id
    fn append(&self, sample: &Sample) -> Result<i64, PersistenceError>;
}

/// SQLite-backed reading log
///
/// Appends from several threads are serialized on one connection; AUTOINCREMENT
/// ids are therefore strictly increasing in commit order.
pub struct SqliteReadingLog {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteReadingLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteReadingLog")
            .field("path", &self.path)
            .finish()
    }
}

impl SqliteReadingLog {
    /// Open (creating if needed) a log file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!("Reading log opened at {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a log that lives only as long as this value
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Backing file, `None` for in-memory logs
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of stored readings
    pub fn count(&self) -> Result<u64, PersistenceError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// All readings, ordered by id
    pub fn readings(&self) -> Result<Vec<PersistedReading>, PersistenceError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(&format!("{} ORDER BY id", SELECT_COLUMNS))?;
        let rows = stmt.query_map([], row_to_reading)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Readings of one node, ordered by id
    pub fn readings_for_node(
        &self,
        node_id: &str,
    ) -> Result<Vec<PersistedReading>, PersistenceError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(&format!(
            "{} WHERE node_id = ?1 ORDER BY id",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map([node_id], row_to_reading)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

impl ReadingSink for SqliteReadingLog {
    fn append(&self, sample: &Sample) -> Result<i64, PersistenceError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let readings = sample.readings();
        conn.execute(
            "INSERT INTO readings (node_id, ts, temp, vib, sound, anomaly_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                sample.node_id(),
                sample.timestamp(),
                readings.temp,
                readings.vib,
                readings.sound,
                sample.anomaly_score(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

/// Sink standing in for a reading log that failed to open
///
/// Ingestion keeps running and every append reports why nothing was stored.
#[derive(Debug, Clone)]
pub struct UnavailableSink {
    reason: String,
}

impl UnavailableSink {
    /// Refuse all writes with `reason`
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ReadingSink for UnavailableSink {
    fn append(&self, _sample: &Sample) -> Result<i64, PersistenceError> {
        Err(PersistenceError::Unavailable(self.reason.clone()))
    }
}

fn row_to_reading(row: &Row<'_>) -> rusqlite::Result<PersistedReading> {
    Ok(PersistedReading {
        id: row.get(0)?,
        node_id: row.get(1)?,
        ts: row.get(2)?,
        temp: row.get(3)?,
        vib: row.get(4)?,
        sound: row.get(5)?,
        anomaly_score: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorReadings;

    fn sample(node: &str, score: Option<f64>) -> Sample {
        Sample::new(node, Some(1.5), SensorReadings::new(40.0, 0.02, 50.0), score)
    }

    #[test]
    fn test_ids_increase() {
        let log = SqliteReadingLog::open_in_memory().unwrap();
        let a = log.append(&sample("a", None)).unwrap();
        let b = log.append(&sample("b", Some(0.1))).unwrap();
        let c = log.append(&sample("a", Some(0.2))).unwrap();
        assert!(a < b && b < c);
        assert_eq!(log.count().unwrap(), 3);
    }

    #[test]
    fn test_readings_round_trip_fields() {
        let log = SqliteReadingLog::open_in_memory().unwrap();
        log.append(&sample("a", None)).unwrap();
        log.append(&Sample::new("a", None, SensorReadings::new(1.0, 2.0, 3.0), Some(4.0)))
            .unwrap();
        log.append(&sample("b", Some(0.1))).unwrap();

        let rows = log.readings_for_node("a").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ts, Some(1.5));
        assert_eq!(rows[0].anomaly_score, None);
        assert_eq!(rows[1].ts, None);
        assert_eq!(rows[1].to_sample().anomaly_score(), Some(4.0));

        let all = log.readings().unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn test_unavailable_sink_refuses_every_write() {
        let sink = UnavailableSink::new("disk gone");
        for _ in 0..2 {
            let err = sink.append(&sample("a", None)).unwrap_err();
            assert!(matches!(err, PersistenceError::Unavailable(ref r) if r == "disk gone"));
        }
    }

    #[test]
    fn test_reopen_file_continues_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gateway_data.db");

        let first = {
            let log = SqliteReadingLog::open(&path).unwrap();
            log.append(&sample("a", None)).unwrap()
        };
        let log = SqliteReadingLog::open(&path).unwrap();
        let second = log.append(&sample("a", None)).unwrap();
        assert!(second > first);
        assert_eq!(log.count().unwrap(), 2);
        assert_eq!(log.path(), Some(path.as_path()));
    }
}
