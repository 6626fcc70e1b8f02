use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::info;

use super::types::{ProcessingRun, Verdict};
use crate::error::QcError;

/// SQLite store for completed run records.
/// All operations are synchronous (rusqlite is blocking).
/// Callers in async contexts should use `tokio::task::spawn_blocking`.
///
/// The connection is behind a mutex: the presentation layer may list runs
/// while the orchestrator appends, and concurrent appends must not be lost.
pub struct RunHistory {
    conn: Mutex<Connection>,
}

impl RunHistory {
    /// Default database location, e.g. `~/.local/share/qc-station/history.db`.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("qc-station")
            .join("history.db")
    }

    /// Create or open the history database.
    pub fn new(db_path: &Path) -> Result<Self, QcError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| QcError::History(format!("Failed to create data dir: {}", e)))?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| QcError::History(format!("Failed to open history db: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recorded_at TEXT NOT NULL DEFAULT (datetime('now')),
                run_date TEXT NOT NULL,
                run_time TEXT NOT NULL,
                verdict TEXT NOT NULL,
                duration_seconds REAL NOT NULL,
                frames_captured INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| QcError::History(format!("Failed to create runs table: {}", e)))?;

        info!("Opened run history database at {:?}", db_path);
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Append a completed run. Returns the row ID.
    pub fn append(&self, run: &ProcessingRun) -> Result<i64, QcError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO runs (run_date, run_time, verdict, duration_seconds, frames_captured)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.date,
                run.time,
                run.verdict.as_str(),
                run.duration_seconds,
                run.frames_captured as i64
            ],
        )
        .map_err(|e| QcError::History(format!("Failed to insert run: {}", e)))?;

        let id = conn.last_insert_rowid();
        info!("Recorded run {}: {} in {:.1}s", id, run.verdict, run.duration_seconds);
        Ok(id)
    }

    /// All recorded runs in insertion order.
    pub fn list(&self) -> Result<Vec<ProcessingRun>, QcError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT run_date, run_time, verdict, duration_seconds, frames_captured
                 FROM runs ORDER BY id ASC",
            )
            .map_err(|e| QcError::History(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(|e| QcError::History(format!("Failed to query runs: {}", e)))?;

        let mut runs = Vec::new();
        for row in rows {
            let (date, time, verdict, duration_seconds, frames) =
                row.map_err(|e| QcError::History(format!("Failed to read run row: {}", e)))?;
            let verdict = Verdict::parse(&verdict)
                .ok_or_else(|| QcError::History(format!("Unknown verdict '{}'", verdict)))?;
            runs.push(ProcessingRun {
                date,
                time,
                verdict,
                duration_seconds,
                frames_captured: frames as usize,
            });
        }
        Ok(runs)
    }
}
