//! Sink trait and error types
//!
//! This module defines the write contract shared by the file tree and the
//! SQLite database.

use crate::storage::RecordBatch;
use thiserror::Error;

/// Errors that can occur while persisting records
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Batch for {0} is incomplete: {1}")]
    InvalidBatch(String, String),

    #[error("Sink lock poisoned")]
    Poisoned,
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// What a write did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Records were persisted
    Written(usize),
    /// Records for this exact key were already present; nothing was written
    AlreadyPresent(usize),
}

impl WriteOutcome {
    /// Number of records now stored under the key
    pub fn count(&self) -> usize {
        match self {
            Self::Written(n) | Self::AlreadyPresent(n) => *n,
        }
    }
}

/// Destination for harvested records
///
/// Writing the same work-unit key twice must not duplicate records.
/// Implementations are shared across worker tasks.
pub trait Sink: Send + Sync {
    /// Persists a batch unless records for its key already exist
    fn write(&self, batch: &RecordBatch) -> SinkResult<WriteOutcome>;

    /// Stable description of the destination (path), used to derive run ids
    fn destination(&self) -> String;
}
