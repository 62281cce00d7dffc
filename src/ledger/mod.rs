//! Progress ledger
//!
//! Records the state of every unit of work so an interrupted run can resume
//! without refetching or duplicating data. Two backends exist: an append-only
//! JSON-lines file next to the file tree, and a `progress` table inside the
//! SQLite database.

mod jsonl;
mod sqlite;

pub use jsonl::JsonlLedger;
pub use sqlite::SqliteLedger;

use crate::config::{Config, SinkKind};
use crate::model::{Period, WorkUnitKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while reading or writing the ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid ledger key: {0}")]
    InvalidKey(String),

    #[error("Ledger lock poisoned")]
    Poisoned,
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// State of a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl UnitStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Statuses a resume should revisit
    pub fn is_unfinished(&self) -> bool {
        matches!(self, Self::InProgress | Self::Failed)
    }
}

/// Latest known state of a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub key: String,
    pub status: UnitStatus,
    #[serde(default)]
    pub record_count: usize,
    #[serde(default)]
    pub error: Option<String>,
    pub updated_at: String,
}

impl LedgerEntry {
    pub fn new(key: &WorkUnitKey, status: UnitStatus) -> Self {
        Self {
            key: key.to_string(),
            status,
            record_count: 0,
            error: None,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Where a run should pick up
///
/// Periods before `period` are skipped; within `period`, warehouses listed
/// before `warehouse_id` are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    pub period: Period,
    pub warehouse_id: Option<String>,
}

impl FromStr for ResumePoint {
    type Err = crate::model::PeriodParseError;

    /// Parses `YYYY-MM` or `YYYY-MM:WH-ID`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (period, warehouse) = match s.split_once(':') {
            Some((period, warehouse)) => (period, Some(warehouse.trim())),
            None => (s, None),
        };
        Ok(Self {
            period: period.parse()?,
            warehouse_id: warehouse.filter(|w| !w.is_empty()).map(str::to_string),
        })
    }
}

impl fmt::Display for ResumePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.warehouse_id {
            Some(wh) => write!(f, "{}:{}", self.period, wh),
            None => write!(f, "{}", self.period),
        }
    }
}

/// Counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub completed: usize,
    pub failed: usize,
    pub in_progress: usize,
    /// Item-level keys completed
    pub items_completed: usize,
    /// Records written across completed item keys
    pub records: usize,
}

/// Durable record of work-unit progress
///
/// Every transition is durable before the call returns.
pub trait ProgressLedger: Send + Sync {
    /// Latest entry for a key, if any
    fn entry(&self, key: &WorkUnitKey) -> LedgerResult<Option<LedgerEntry>>;

    fn status(&self, key: &WorkUnitKey) -> LedgerResult<UnitStatus> {
        Ok(self
            .entry(key)?
            .map(|e| e.status)
            .unwrap_or(UnitStatus::Pending))
    }

    fn is_done(&self, key: &WorkUnitKey) -> LedgerResult<bool> {
        Ok(self.status(key)? == UnitStatus::Completed)
    }

    fn mark_in_progress(&self, key: &WorkUnitKey) -> LedgerResult<()>;

    fn mark_done(&self, key: &WorkUnitKey, record_count: usize) -> LedgerResult<()>;

    fn mark_failed(&self, key: &WorkUnitKey, reason: &str) -> LedgerResult<()>;

    /// Earliest warehouse-level key left in progress or failed
    fn find_resume_point(&self) -> LedgerResult<Option<ResumePoint>>;

    fn flush(&self) -> LedgerResult<()>;

    fn stats(&self) -> LedgerResult<LedgerStats>;
}

/// Picks the resume point among the latest entries
///
/// Earliest period wins; within a period, the entry touched first.
pub(crate) fn resume_point_from<'a, I>(entries: I) -> Option<ResumePoint>
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    entries
        .into_iter()
        .filter(|e| e.status.is_unfinished())
        .filter_map(|e| {
            let key = e.key.parse::<WorkUnitKey>().ok()?;
            key.is_warehouse_level()
                .then(|| (key.period, e.updated_at.clone(), key.warehouse_id))
        })
        .min()
        .map(|(period, _, warehouse_id)| ResumePoint {
            period,
            warehouse_id: Some(warehouse_id),
        })
}

pub(crate) fn stats_from<'a, I>(entries: I) -> LedgerStats
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    let mut stats = LedgerStats::default();
    for entry in entries {
        match entry.status {
            UnitStatus::Completed => {
                stats.completed += 1;
                if entry
                    .key
                    .parse::<WorkUnitKey>()
                    .map(|k| k.is_item_level())
                    .unwrap_or(false)
                {
                    stats.items_completed += 1;
                    stats.records += entry.record_count;
                }
            }
            UnitStatus::Failed => stats.failed += 1,
            UnitStatus::InProgress => stats.in_progress += 1,
            UnitStatus::Pending => {}
        }
    }
    stats
}

/// Run identifier for a destination
///
/// An explicit id wins; otherwise the first 16 hex characters of the SHA-256
/// of the destination, so the same output location always maps to the same
/// ledger.
pub fn run_id_for(explicit: Option<&str>, destination: &str) -> String {
    if let Some(id) = explicit.filter(|id| !id.trim().is_empty()) {
        return id.trim().to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(destination.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Opens the ledger that belongs with the configured sink
///
/// `fresh` discards any previous progress for this run id.
pub fn open_ledger(
    config: &Config,
    destination: &str,
    fresh: bool,
) -> LedgerResult<Arc<dyn ProgressLedger>> {
    let run_id = run_id_for(config.output.run_id.as_deref(), destination);
    tracing::info!("Progress ledger run id: {}", run_id);

    match config.output.sink {
        SinkKind::File => {
            let path = Path::new(&config.output.root)
                .join(".progress")
                .join(format!("{}.jsonl", run_id));
            Ok(Arc::new(JsonlLedger::open(&path, fresh)?))
        }
        SinkKind::Sqlite => Ok(Arc::new(SqliteLedger::open(
            Path::new(&config.output.database_path),
            &run_id,
            fresh,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_status_roundtrip() {
        for status in [
            UnitStatus::Pending,
            UnitStatus::InProgress,
            UnitStatus::Completed,
            UnitStatus::Failed,
        ] {
            assert_eq!(UnitStatus::from_db_string(status.to_db_string()), Some(status));
        }
        assert_eq!(UnitStatus::from_db_string("bogus"), None);
    }

    #[test]
    fn test_resume_point_parse() {
        let point: ResumePoint = "2020-03:WH-007".parse().unwrap();
        assert_eq!(point.period.to_string(), "2020-03");
        assert_eq!(point.warehouse_id.as_deref(), Some("WH-007"));
        assert_eq!(point.to_string(), "2020-03:WH-007");

        let point: ResumePoint = "2020-03".parse().unwrap();
        assert_eq!(point.warehouse_id, None);

        assert!("WH-007".parse::<ResumePoint>().is_err());
    }

    #[test]
    fn test_run_id() {
        let a = run_id_for(None, "file:/data");
        let b = run_id_for(None, "file:/data");
        let c = run_id_for(None, "file:/other");
        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(run_id_for(Some("nightly"), "file:/data"), "nightly");
        assert_eq!(run_id_for(Some("  "), "file:/data"), a);
    }

    #[test]
    fn test_resume_point_prefers_earliest_period() {
        let entry = |key: &str, status, at: &str| LedgerEntry {
            key: key.to_string(),
            status,
            record_count: 0,
            error: None,
            updated_at: at.to_string(),
        };
        let entries = vec![
            entry("2023-02/WH-001/-/-/-", UnitStatus::Failed, "2024-01-01T00:00:03Z"),
            entry("2023-01/WH-009/-/-/-", UnitStatus::InProgress, "2024-01-01T00:00:02Z"),
            entry("2023-01/WH-002/-/-/-", UnitStatus::Completed, "2024-01-01T00:00:01Z"),
            entry("2022-12/WH-001/T1/1/CON002", UnitStatus::Failed, "2024-01-01T00:00:00Z"),
        ];

        let point = resume_point_from(&entries).unwrap();
        assert_eq!(point.period.to_string(), "2023-01");
        assert_eq!(point.warehouse_id.as_deref(), Some("WH-009"));
    }
}
