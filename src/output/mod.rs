//! Output module for reports and conversions of harvested data
//!
//! This module handles:
//! - The markdown run report written next to `run_summary.json`
//! - Converting the JSON file tree to CSV batches
//! - Auditing the file tree for missing months and items
//! - Printing ledger statistics for the `status` command

pub mod audit;
pub mod csv_export;
pub mod markdown;
pub mod stats;

pub use audit::{audit_tree, format_audit_report, write_audit_report, AuditReport, YearAudit};
pub use csv_export::{convert_tree, find_batch_files, ConversionSummary};
pub use markdown::{format_markdown_report, write_markdown_report};
pub use stats::{load_status, print_status, RunStatus};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),

    #[error("Input directory not found: {0}")]
    MissingInput(PathBuf),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Directories under the tree root that never hold record batches
const RESERVED_DIRS: [&str; 2] = ["logs", ".progress"];

fn is_reserved(root: &Path, dir: &Path) -> bool {
    dir.parent() == Some(root)
        && dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| RESERVED_DIRS.contains(&n))
            .unwrap_or(false)
}
