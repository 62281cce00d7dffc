//! JSON file tree sink

use crate::model::DataRecord;
use crate::storage::traits::{Sink, SinkResult, WriteOutcome};
use crate::storage::{BatchMetadata, RecordBatch};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk shape of a batch file
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchFile {
    pub metadata: BatchMetadata,
    pub data: Vec<DataRecord>,
}

/// Writes one JSON file per work unit under a root directory
#[derive(Debug, Clone)]
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    /// Creates the sink, creating the root directory if needed
    pub fn new(root: &Path) -> SinkResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads a batch file back
    pub fn read(path: &Path) -> SinkResult<BatchFile> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Sink for FileSink {
    fn write(&self, batch: &RecordBatch) -> SinkResult<WriteOutcome> {
        let path = self.root.join(batch.relative_path());
        if path.exists() {
            let existing = Self::read(&path).map_err(|e| {
                tracing::warn!("Existing batch {} is unreadable: {}", path.display(), e);
                e
            })?;
            tracing::debug!("{} already written, skipping", path.display());
            return Ok(WriteOutcome::AlreadyPresent(existing.data.len()));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = BatchFile {
            metadata: batch.metadata.clone(),
            data: batch.records.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        // Write then rename so a crash never leaves a truncated batch behind
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        tracing::debug!("Wrote {} records to {}", batch.records.len(), path.display());
        Ok(WriteOutcome::Written(batch.records.len()))
    }

    fn destination(&self) -> String {
        let absolute = fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        format!("file:{}", absolute.display())
    }
}
