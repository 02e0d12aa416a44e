//! Event Store - embedded SQLite log of one run
//!
//! Two tables: `runs` (metadata) and `events` (flat, append-only log with a
//! JSON payload column). The database runs in WAL mode, so a writer in the
//! producer process and readers in the query server can share the file.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, Row};
use tracing::{debug, info, warn};

use crate::types::{EventRecord, NewEvent, Run, RunSummary, Timestamp};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS runs (
    run_id TEXT PRIMARY KEY,
    start_time_us INTEGER NOT NULL,
    end_time_us INTEGER NOT NULL,
    config_hash TEXT NOT NULL,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL UNIQUE,
    run_id TEXT NOT NULL,
    ts_us INTEGER NOT NULL,
    kind TEXT NOT NULL,
    severity TEXT NOT NULL,
    category TEXT NOT NULL,
    payload TEXT NOT NULL,
    parent_event_id TEXT,
    validation_errors TEXT
);

CREATE INDEX IF NOT EXISTS idx_events_run_ts ON events(run_id, ts_us, seq);
CREATE INDEX IF NOT EXISTS idx_events_run_kind_ts ON events(run_id, kind, ts_us);
CREATE INDEX IF NOT EXISTS idx_events_parent ON events(parent_event_id);
"#;

/// Columns selected by every event read, in `read_event_row` order
pub(crate) const EVENT_COLUMNS: &str = "seq, event_id, run_id, ts_us, kind, severity, category, \
     payload, parent_event_id, validation_errors";

const INSERT_EVENT_SQL: &str = "INSERT OR IGNORE INTO events \
     (event_id, run_id, ts_us, kind, severity, category, payload, parent_event_id, validation_errors) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

/// Result type for EventStore operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in EventStore operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no store at {0}")]
    NotFound(PathBuf),
    #[error("store at {path} is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: String },
    #[error("previous store at {path} could not be removed: {reason}")]
    Cleanup { path: PathBuf, reason: String },
}

impl StoreError {
    /// Corruption is fatal to the run's query capability; everything else is transient
    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::Corrupted { .. })
    }
}

/// Map SQLite's "this is not a database" family of errors to `Corrupted`
fn classify(path: &Path, err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => StoreError::Corrupted {
            path: path.to_path_buf(),
            reason: err.to_string(),
        },
        _ => StoreError::Sqlite(err),
    }
}

/// The EventStore owns the single connection to one run's database file
pub struct EventStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl EventStore {
    /// Open (creating if needed) the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Self::open_with_flags(path, flags)
    }

    /// Open an existing store; a missing file is `NotFound`
    pub fn open_existing<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Self::open_with_flags(path, flags)
    }

    fn open_with_flags(path: &Path, flags: OpenFlags) -> StoreResult<Self> {
        let conn = Connection::open_with_flags(path, flags).map_err(|e| classify(path, e))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| classify(path, e))?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if !journal_mode.eq_ignore_ascii_case("wal") {
            warn!(path = %path.display(), journal_mode = %journal_mode, "WAL mode not active");
        }

        info!(path = %path.display(), "event store opened");
        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests and scratch use
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    /// Path of the main database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a run. Re-creating an existing run id is a no-op.
    pub fn create_run(&self, run: &Run) -> StoreResult<()> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO runs (run_id, start_time_us, end_time_us, config_hash, created_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.run_id,
                run.start_time.as_micros(),
                run.end_time.as_micros(),
                run.config_hash,
                run.created_at.as_micros(),
            ],
        )?;
        if inserted == 0 {
            debug!(run_id = %run.run_id, "run already recorded");
        }
        Ok(())
    }

    /// Append one event, returning its sequence id
    ///
    /// A duplicate event id is ignored and returns the existing sequence id.
    pub fn write_event(&self, event: &NewEvent) -> StoreResult<i64> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(INSERT_EVENT_SQL)?;
        insert_event(&mut stmt, event)?;
        let seq = conn.query_row(
            "SELECT seq FROM events WHERE event_id = ?1",
            params![event.event_id],
            |row| row.get(0),
        )?;
        Ok(seq)
    }

    /// Append a batch inside one transaction; all or nothing
    ///
    /// Returns how many events were new. Replaying a batch that already
    /// committed inserts nothing, so a retried batch never duplicates.
    pub fn write_batch(&self, events: &[NewEvent]) -> StoreResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(INSERT_EVENT_SQL)?;
            for event in events {
                inserted += insert_event(&mut stmt, event)?;
            }
        }
        tx.commit()?;

        if inserted < events.len() {
            warn!(
                duplicates = events.len() - inserted,
                "ignored events with already-recorded ids"
            );
        }
        debug!(inserted, "batch committed");
        Ok(inserted)
    }

    /// All runs with per-run event statistics, newest first
    pub fn list_runs(&self) -> StoreResult<Vec<RunSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT r.run_id, r.start_time_us, r.end_time_us, r.config_hash, r.created_at_us,
                    COUNT(e.seq), MIN(e.ts_us), MAX(e.ts_us)
             FROM runs r LEFT JOIN events e ON e.run_id = r.run_id
             GROUP BY r.run_id
             ORDER BY r.created_at_us DESC, r.run_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RunSummary {
                run: Run {
                    run_id: row.get(0)?,
                    start_time: Timestamp::from_micros(row.get(1)?),
                    end_time: Timestamp::from_micros(row.get(2)?),
                    config_hash: row.get(3)?,
                    created_at: Timestamp::from_micros(row.get(4)?),
                },
                event_count: row.get::<_, i64>(5)? as u64,
                first_event_at: row.get::<_, Option<i64>>(6)?.map(Timestamp::from_micros),
                last_event_at: row.get::<_, Option<i64>>(7)?.map(Timestamp::from_micros),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Total number of events in the store
    pub fn event_count(&self) -> StoreResult<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Run a read against the connection
    pub(crate) fn read<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn).map_err(|e| classify(&self.path, e))
    }

    /// Checkpoint and close the connection
    pub fn close(self) -> StoreResult<()> {
        let path = self.path;
        let conn = self.conn.into_inner();
        conn.close().map_err(|(_, e)| classify(&path, e))?;
        info!(path = %path.display(), "event store closed");
        Ok(())
    }
}

fn insert_event(stmt: &mut rusqlite::CachedStatement<'_>, event: &NewEvent) -> StoreResult<usize> {
    let payload = serde_json::to_string(&event.payload)?;
    let validation = if event.validation_errors.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&event.validation_errors)?)
    };
    Ok(stmt.execute(params![
        event.event_id,
        event.run_id,
        event.timestamp.as_micros(),
        event.kind.as_str(),
        event.severity.as_str(),
        event.category.as_str(),
        payload,
        event.parent_event_id,
        validation,
    ])?)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Decode a row selected with `EVENT_COLUMNS`
pub(crate) fn read_event_row(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    let kind: String = row.get(4)?;
    let severity: String = row.get(5)?;
    let category: String = row.get(6)?;
    let payload: String = row.get(7)?;
    let validation: Option<String> = row.get(9)?;

    Ok(EventRecord {
        sequence_id: row.get(0)?,
        event_id: row.get(1)?,
        run_id: row.get(2)?,
        timestamp: Timestamp::from_micros(row.get(3)?),
        kind: kind.parse().map_err(|e| conversion_error(4, e))?,
        severity: severity.parse().map_err(|e| conversion_error(5, e))?,
        category: category.parse().map_err(|e| conversion_error(6, e))?,
        payload: serde_json::from_str(&payload).map_err(|e| conversion_error(7, e))?,
        parent_event_id: row.get(8)?,
        validation_errors: match validation {
            Some(text) => serde_json::from_str(&text).map_err(|e| conversion_error(9, e))?,
            None => Vec::new(),
        },
    })
}
