//! SQLite sink implementation
//!
//! Rows go to the `stock_records` table. A batch is written in one
//! transaction, and only if no rows exist yet for its exact key.

use crate::model::WorkUnitKey;
use crate::storage::schema::{configure_connection, initialize_schema};
use crate::storage::traits::{Sink, SinkError, SinkResult, WriteOutcome};
use crate::storage::RecordBatch;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// SQLite sink backend
pub struct SqliteSink {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteSink {
    /// Opens or creates the database and its schema
    pub fn new(path: &Path) -> SinkResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        configure_connection(&conn)?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> SinkResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Number of stored rows for an exact item-level key
    pub fn count_for_key(&self, key: &WorkUnitKey) -> SinkResult<usize> {
        let conn = self.conn.lock().map_err(|_| SinkError::Poisoned)?;
        count_rows(&conn, key)
    }

    /// Total rows in the table
    pub fn total_rows(&self) -> SinkResult<usize> {
        let conn = self.conn.lock().map_err(|_| SinkError::Poisoned)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM stock_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn count_rows(conn: &Connection, key: &WorkUnitKey) -> SinkResult<usize> {
    let (Some(upazila), Some(union), Some(item)) = (&key.subunit_id, &key.leaf_id, &key.item_code)
    else {
        return Ok(0);
    };
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM stock_records
         WHERE year = ?1 AND month = ?2 AND warehouse_id = ?3
           AND upazila_id = ?4 AND union_id = ?5 AND item_code = ?6",
        params![
            key.period.year,
            key.period.month,
            key.warehouse_id,
            upazila,
            union,
            item
        ],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

impl Sink for SqliteSink {
    fn write(&self, batch: &RecordBatch) -> SinkResult<WriteOutcome> {
        if !batch.key.is_item_level() {
            return Err(SinkError::InvalidBatch(
                batch.key.to_string(),
                "not an item-level key".to_string(),
            ));
        }

        let mut conn = self.conn.lock().map_err(|_| SinkError::Poisoned)?;
        let tx = conn.transaction()?;

        let existing = count_rows(&tx, &batch.key)?;
        if existing > 0 {
            tracing::debug!("{} already stored ({} rows), skipping", batch.key, existing);
            return Ok(WriteOutcome::AlreadyPresent(existing));
        }

        let m = &batch.metadata;
        let file_name = batch.relative_path().to_string_lossy().into_owned();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO stock_records (
                    year, month, warehouse_id, upazila_id, union_id, item_code, product,
                    serial, opening_balance, received_this_month, balance_this_month,
                    adjustment_plus, adjustment_minus, total_this_month,
                    distribution_this_month, closing_balance_this_month,
                    stock_out_reason_code, days_stock_out, eligible,
                    warehouse, district, upazila, union_name, sdp,
                    file_name, strategy, fetched_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                          ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)",
            )?;
            for record in &batch.records {
                stmt.execute(params![
                    m.year,
                    m.month,
                    m.warehouse_id,
                    m.upazila_id,
                    m.union_id,
                    m.item_code,
                    m.item_name,
                    record.serial,
                    record.opening_balance,
                    record.received,
                    record.total,
                    record.adj_plus,
                    record.adj_minus,
                    record.grand_total,
                    record.distribution,
                    record.closing_balance,
                    record.stock_out_reason,
                    record.stock_out_days,
                    record.eligible,
                    m.warehouse_name,
                    m.district,
                    m.upazila_name,
                    m.union_name,
                    record.facility,
                    file_name,
                    m.strategy,
                    m.fetched_at,
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!("Inserted {} rows for {}", batch.records.len(), batch.key);
        Ok(WriteOutcome::Written(batch.records.len()))
    }

    fn destination(&self) -> String {
        let absolute = std::fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
        format!("sqlite:{}", absolute.display())
    }
}
