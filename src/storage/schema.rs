//! Database schema definitions
//!
//! This module contains the SQL schema shared by the SQLite sink and the
//! SQLite progress ledger.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per facility per (period, warehouse, upazila, union, item)
CREATE TABLE IF NOT EXISTS stock_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    year TEXT NOT NULL,
    month TEXT NOT NULL,
    warehouse_id TEXT NOT NULL,
    upazila_id TEXT NOT NULL,
    union_id TEXT NOT NULL,
    item_code TEXT NOT NULL,
    product TEXT NOT NULL,
    serial TEXT,
    opening_balance TEXT,
    received_this_month TEXT,
    balance_this_month TEXT,
    adjustment_plus TEXT,
    adjustment_minus TEXT,
    total_this_month TEXT,
    distribution_this_month TEXT,
    closing_balance_this_month TEXT,
    stock_out_reason_code TEXT,
    days_stock_out TEXT,
    eligible INTEGER NOT NULL DEFAULT 0,
    warehouse TEXT,
    district TEXT,
    upazila TEXT,
    union_name TEXT,
    sdp TEXT,
    file_name TEXT,
    strategy TEXT,
    fetched_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_stock_records_key
    ON stock_records(year, month, warehouse_id, upazila_id, union_id, item_code);
CREATE INDEX IF NOT EXISTS idx_stock_records_period ON stock_records(year, month);

-- Progress ledger, one row per work-unit key per run
CREATE TABLE IF NOT EXISTS progress (
    run_id TEXT NOT NULL,
    unit_key TEXT NOT NULL,
    year TEXT NOT NULL,
    month TEXT NOT NULL,
    warehouse_id TEXT NOT NULL,
    status TEXT NOT NULL,
    record_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (run_id, unit_key)
);

CREATE INDEX IF NOT EXISTS idx_progress_status ON progress(run_id, status);
"#;

/// Initializes the database schema
///
/// Creates all tables and indexes if they don't already exist.
pub fn initialize_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

/// Applies the connection pragmas used for every database handle
pub fn configure_connection(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;
        PRAGMA busy_timeout = 5000;
    ",
    )
}
