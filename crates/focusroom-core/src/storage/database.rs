//! SQLite-based session storage and point ledger.
//!
//! Provides persistent storage for:
//! - Focus session records (running, completed, failed)
//! - Ledger entries and the running point balance
//! - Key-value table holding the balance

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::data_dir;
use crate::error::{DatabaseError, Result};
use crate::session::{NewSessionRecord, RecordId, SessionOutcome, SessionRecord, SessionStatus};
use crate::timer::DisciplineMode;

const BALANCE_KEY: &str = "ledger_balance";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Stats {
    pub completed_sessions: u64,
    pub failed_sessions: u64,
    pub completed_work_secs: u64,
    pub credits_earned: u64,
    pub balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    /// Applied change; debits record what was actually removed after clamping.
    pub delta: i64,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// SQLite database for session records and the ledger.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/focusroom/focusroom.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("focusroom.db");
        Self::open_at(&path)
    }

    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS focus_sessions (
                    id                TEXT PRIMARY KEY,
                    mode              TEXT NOT NULL,
                    kind              TEXT NOT NULL,
                    task_ref          TEXT,
                    planned_work_secs INTEGER NOT NULL,
                    started_at        TEXT NOT NULL,
                    ended_at          TEXT,
                    status            TEXT NOT NULL,
                    credits           INTEGER NOT NULL DEFAULT 0,
                    failure_reason    TEXT
                );

                CREATE TABLE IF NOT EXISTS ledger_entries (
                    id     INTEGER PRIMARY KEY AUTOINCREMENT,
                    delta  INTEGER NOT NULL,
                    reason TEXT NOT NULL,
                    at     TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_focus_sessions_started_at ON focus_sessions(started_at);
                CREATE INDEX IF NOT EXISTS idx_focus_sessions_status ON focus_sessions(status);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    // ── Sessions ─────────────────────────────────────────────────────

    /// Insert a `running` session row.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn insert_session(&self, id: &RecordId, new: &NewSessionRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO focus_sessions
                (id, mode, kind, task_ref, planned_work_secs, started_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.as_str(),
                new.mode.as_str(),
                new.kind,
                new.task_ref,
                new.planned_work_secs,
                new.started_at.to_rfc3339(),
                SessionStatus::Running.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Close a session row with its outcome.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or the update fails.
    pub fn finalize_session(
        &self,
        id: &RecordId,
        outcome: &SessionOutcome,
        ended_at: DateTime<Utc>,
    ) -> Result<SessionRecord> {
        let changed = self.conn.execute(
            "UPDATE focus_sessions
             SET status = ?2, credits = ?3, failure_reason = ?4, ended_at = ?5
             WHERE id = ?1",
            params![
                id.as_str(),
                outcome.status().as_str(),
                outcome.credits_earned,
                outcome.failure_reason,
                ended_at.to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::RecordNotFound(id.to_string()).into());
        }
        self.get_session(id)?
            .ok_or_else(|| DatabaseError::RecordNotFound(id.to_string()).into())
    }

    /// Remove a session row. Missing rows are not an error.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub fn delete_session(&self, id: &RecordId) -> Result<()> {
        self.conn
            .execute("DELETE FROM focus_sessions WHERE id = ?1", params![id.as_str()])?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the query fails or a row is malformed.
    pub fn get_session(&self, id: &RecordId) -> Result<Option<SessionRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, mode, kind, task_ref, planned_work_secs, started_at, ended_at,
                        status, credits, failure_reason
                 FROM focus_sessions WHERE id = ?1",
                params![id.as_str()],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Most recent sessions first.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row is malformed.
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, mode, kind, task_ref, planned_work_secs, started_at, ended_at,
                    status, credits, failure_reason
             FROM focus_sessions
             ORDER BY started_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Number of stored session rows, in any status.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn session_count(&self) -> Result<u64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM focus_sessions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// # Errors
    /// Returns an error if a query fails.
    pub fn stats(&self) -> Result<Stats> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*), COALESCE(SUM(planned_work_secs), 0), COALESCE(SUM(credits), 0)
             FROM focus_sessions
             GROUP BY status",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, u64>(2)?,
                row.get::<_, u64>(3)?,
            ))
        })?;

        let mut stats = Stats::default();
        for row in rows {
            let (status, count, work_secs, credits) = row?;
            match status.as_str() {
                "completed" => {
                    stats.completed_sessions += count;
                    stats.completed_work_secs += work_secs;
                    stats.credits_earned += credits;
                }
                "failed" => {
                    stats.failed_sessions += count;
                }
                _ => {}
            }
        }
        stats.balance = self.balance()?;
        Ok(stats)
    }

    // ── Ledger ───────────────────────────────────────────────────────

    /// # Errors
    /// Returns an error if the stored balance cannot be read.
    pub fn balance(&self) -> Result<u64> {
        match read_kv(&self.conn, BALANCE_KEY)? {
            Some(v) => v
                .parse::<u64>()
                .map_err(|e| DatabaseError::QueryFailed(format!("corrupt balance '{v}': {e}")).into()),
            None => Ok(0),
        }
    }

    /// Apply a signed change, clamping the balance at zero.
    /// Returns the new balance.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub fn apply_ledger_delta(&mut self, delta: i64, reason: &str) -> Result<u64> {
        let current = self.balance()?;
        let new_balance = if delta >= 0 {
            current.saturating_add(delta.unsigned_abs())
        } else {
            current.saturating_sub(delta.unsigned_abs())
        };
        let applied = new_balance as i128 - current as i128;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO ledger_entries (delta, reason, at) VALUES (?1, ?2, ?3)",
            params![applied as i64, reason, Utc::now().to_rfc3339()],
        )?;
        write_kv(&tx, BALANCE_KEY, &new_balance.to_string())?;
        tx.commit()?;
        Ok(new_balance)
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub fn ledger_entries(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, delta, reason, at FROM ledger_entries ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(LedgerEntry {
                id: row.get(0)?,
                delta: row.get(1)?,
                reason: row.get(2)?,
                at: parse_time(row, 3)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

fn read_kv(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
        row.get::<_, String>(0)
    })
    .optional()
}

fn write_kv(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let mode: String = row.get(1)?;
    let status: String = row.get(7)?;
    let ended_at = match row.get::<_, Option<String>>(6)? {
        Some(_) => Some(parse_time(row, 6)?),
        None => None,
    };
    Ok(SessionRecord {
        id: RecordId(row.get(0)?),
        mode: mode
            .parse::<DisciplineMode>()
            .map_err(|e| conversion_error(1, e))?,
        kind: row.get(2)?,
        task_ref: row.get(3)?,
        planned_work_secs: row.get(4)?,
        started_at: parse_time(row, 5)?,
        ended_at,
        status: status
            .parse::<SessionStatus>()
            .map_err(|e| conversion_error(7, e))?,
        credits: row.get(8)?,
        failure_reason: row.get(9)?,
    })
}
