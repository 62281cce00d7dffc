//! Storage module for persisting harvested records
//!
//! This module handles every write of stock rows, including:
//! - The JSON file tree (`root/{year}/{month}/{wh}/{upazila}/{union}/{item}.json`)
//! - The SQLite `stock_records` table
//! - Schema management shared with the SQLite progress ledger
//! - Deduplication by exact work-unit key

mod file_sink;
pub(crate) mod schema;
mod sqlite;
mod traits;

pub use file_sink::{BatchFile, FileSink};
pub use sqlite::SqliteSink;
pub use traits::{Sink, SinkError, SinkResult, WriteOutcome};

use crate::config::{Config, SinkKind};
use crate::model::{DataRecord, Item, Location, Period, WorkUnitKey};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Labels stored alongside every batch of records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMetadata {
    pub year: String,
    pub month: String,
    pub month_name: String,
    pub warehouse_id: String,
    pub warehouse_name: String,
    pub district: String,
    pub upazila_id: String,
    pub upazila_name: String,
    pub union_id: String,
    pub union_name: String,
    pub item_code: String,
    pub item_name: String,
    pub strategy: Option<String>,
    pub record_count: usize,
    pub fetched_at: String,
}

/// The records fetched for one work unit, with their labels
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub key: WorkUnitKey,
    pub metadata: BatchMetadata,
    pub records: Vec<DataRecord>,
}

impl RecordBatch {
    pub fn new(
        period: &Period,
        location: &Location,
        item: &Item,
        district: Option<String>,
        strategy: Option<&str>,
        records: Vec<DataRecord>,
    ) -> Self {
        let key = WorkUnitKey::item(
            period,
            &location.warehouse.id,
            &location.upazila.id,
            &location.union.id,
            &item.code,
        );
        let metadata = BatchMetadata {
            year: period.year.clone(),
            month: period.month.clone(),
            month_name: period.month_name().to_string(),
            warehouse_id: location.warehouse.id.clone(),
            warehouse_name: location.warehouse.name.clone(),
            district: district.unwrap_or_default(),
            upazila_id: location.upazila.id.clone(),
            upazila_name: location.upazila.name.clone(),
            union_id: location.union.id.clone(),
            union_name: location.union.name.clone(),
            item_code: item.code.clone(),
            item_name: item.name.clone(),
            strategy: strategy.map(str::to_string),
            record_count: records.len(),
            fetched_at: chrono::Utc::now().to_rfc3339(),
        };
        Self {
            key,
            metadata,
            records,
        }
    }

    /// Path of the batch relative to the file-tree root
    pub fn relative_path(&self) -> std::path::PathBuf {
        let m = &self.metadata;
        Path::new(&safe_component(&m.year))
            .join(safe_component(&m.month))
            .join(safe_component(&m.warehouse_id))
            .join(safe_component(&m.upazila_id))
            .join(safe_component(&m.union_id))
            .join(format!("{}.json", item_file_stem(&m.item_code)))
    }
}

/// File stem for an item code; `+` becomes `_plus_`
pub fn item_file_stem(code: &str) -> String {
    safe_component(&code.replace('+', "_plus_"))
}

/// Makes an identifier safe to use as a single path component
pub fn safe_component(id: &str) -> String {
    let cleaned: String = id
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Opens the sink selected by the configuration
pub fn open_sink(config: &Config) -> SinkResult<Arc<dyn Sink>> {
    match config.output.sink {
        SinkKind::File => Ok(Arc::new(FileSink::new(Path::new(&config.output.root))?)),
        SinkKind::Sqlite => Ok(Arc::new(SqliteSink::new(Path::new(
            &config.output.database_path,
        ))?)),
    }
}
