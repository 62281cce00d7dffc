//! SQLite-backed ledger
//!
//! Lives in the `progress` table of the sink database, one row per key per
//! run id, upserted on every transition.

use super::{
    resume_point_from, stats_from, LedgerEntry, LedgerError, LedgerResult, LedgerStats,
    ProgressLedger, ResumePoint, UnitStatus,
};
use crate::model::WorkUnitKey;
use crate::storage::schema::{configure_connection, initialize_schema};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteLedger {
    conn: Mutex<Connection>,
    run_id: String,
}

impl SqliteLedger {
    /// Opens the ledger in the database at `path`
    pub fn open(path: &Path, run_id: &str, fresh: bool) -> LedgerResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        configure_connection(&conn)?;
        Self::with_connection(conn, run_id, fresh)
    }

    /// Creates an in-memory ledger (for testing)
    #[cfg(test)]
    pub fn new_in_memory(run_id: &str) -> LedgerResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, run_id, false)
    }

    fn with_connection(conn: Connection, run_id: &str, fresh: bool) -> LedgerResult<Self> {
        initialize_schema(&conn)?;
        if fresh {
            let removed = conn.execute("DELETE FROM progress WHERE run_id = ?1", params![run_id])?;
            tracing::info!("Discarded {} progress rows for run {}", removed, run_id);
        }
        Ok(Self {
            conn: Mutex::new(conn),
            run_id: run_id.to_string(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn upsert(
        &self,
        key: &WorkUnitKey,
        status: UnitStatus,
        record_count: usize,
        error: Option<&str>,
    ) -> LedgerResult<()> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        conn.execute(
            "INSERT INTO progress (run_id, unit_key, year, month, warehouse_id, status, record_count, error_message, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(run_id, unit_key) DO UPDATE SET
                status = excluded.status,
                record_count = excluded.record_count,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at",
            params![
                self.run_id,
                key.to_string(),
                key.period.year,
                key.period.month,
                key.warehouse_id,
                status.to_db_string(),
                record_count as i64,
                error,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn entries_where(&self, filter: &str) -> LedgerResult<Vec<LedgerEntry>> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        let sql = format!(
            "SELECT unit_key, status, record_count, error_message, updated_at
             FROM progress WHERE run_id = ?1 {}",
            filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![self.run_id], row_to_entry)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        key: row.get(0)?,
        status: UnitStatus::from_db_string(&row.get::<_, String>(1)?)
            .unwrap_or(UnitStatus::Pending),
        record_count: row.get::<_, i64>(2)? as usize,
        error: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

impl ProgressLedger for SqliteLedger {
    fn entry(&self, key: &WorkUnitKey) -> LedgerResult<Option<LedgerEntry>> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        let entry = conn
            .query_row(
                "SELECT unit_key, status, record_count, error_message, updated_at
                 FROM progress WHERE run_id = ?1 AND unit_key = ?2",
                params![self.run_id, key.to_string()],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn mark_in_progress(&self, key: &WorkUnitKey) -> LedgerResult<()> {
        self.upsert(key, UnitStatus::InProgress, 0, None)
    }

    fn mark_done(&self, key: &WorkUnitKey, record_count: usize) -> LedgerResult<()> {
        self.upsert(key, UnitStatus::Completed, record_count, None)
    }

    fn mark_failed(&self, key: &WorkUnitKey, reason: &str) -> LedgerResult<()> {
        self.upsert(key, UnitStatus::Failed, 0, Some(reason))
    }

    fn find_resume_point(&self) -> LedgerResult<Option<ResumePoint>> {
        let unfinished = self.entries_where("AND status IN ('in_progress', 'failed')")?;
        Ok(resume_point_from(&unfinished))
    }

    fn flush(&self) -> LedgerResult<()> {
        // Each upsert is its own committed transaction
        Ok(())
    }

    fn stats(&self) -> LedgerResult<LedgerStats> {
        Ok(stats_from(&self.entries_where("")?))
    }
}
