//! Append-only JSON-lines ledger

use super::{
    resume_point_from, stats_from, LedgerEntry, LedgerError, LedgerResult, LedgerStats,
    ProgressLedger, ResumePoint, UnitStatus,
};
use crate::model::WorkUnitKey;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

struct Inner {
    file: File,
    entries: HashMap<String, LedgerEntry>,
}

/// Ledger stored as one JSON object per line
///
/// The file is replayed on open; the last line for a key wins. Every
/// transition is appended and flushed before returning.
pub struct JsonlLedger {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl JsonlLedger {
    /// Opens (and replays) the ledger at `path`, creating it if missing
    pub fn open(path: &Path, fresh: bool) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entries = if fresh {
            if path.exists() {
                tracing::info!("Discarding previous progress in {}", path.display());
                fs::remove_file(path)?;
            }
            HashMap::new()
        } else {
            replay(path)?
        };
        if !entries.is_empty() {
            tracing::info!(
                "Replayed {} ledger entries from {}",
                entries.len(),
                path.display()
            );
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner { file, entries }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(&self, entry: LedgerEntry) -> LedgerResult<()> {
        let mut inner = self.inner.lock().map_err(|_| LedgerError::Poisoned)?;
        let line = serde_json::to_string(&entry)?;
        writeln!(inner.file, "{}", line)?;
        inner.file.flush()?;
        inner.entries.insert(entry.key.clone(), entry);
        Ok(())
    }
}

fn replay(path: &Path) -> LedgerResult<HashMap<String, LedgerEntry>> {
    let mut entries = HashMap::new();
    if !path.exists() {
        return Ok(entries);
    }

    let reader = BufReader::new(File::open(path)?);
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LedgerEntry>(&line) {
            Ok(entry) => {
                entries.insert(entry.key.clone(), entry);
            }
            // A crash can leave a torn final line
            Err(e) => tracing::warn!(
                "Skipping unreadable ledger line {} in {}: {}",
                number + 1,
                path.display(),
                e
            ),
        }
    }
    Ok(entries)
}

impl ProgressLedger for JsonlLedger {
    fn entry(&self, key: &WorkUnitKey) -> LedgerResult<Option<LedgerEntry>> {
        let inner = self.inner.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(inner.entries.get(&key.to_string()).cloned())
    }

    fn mark_in_progress(&self, key: &WorkUnitKey) -> LedgerResult<()> {
        self.record(LedgerEntry::new(key, UnitStatus::InProgress))
    }

    fn mark_done(&self, key: &WorkUnitKey, record_count: usize) -> LedgerResult<()> {
        let mut entry = LedgerEntry::new(key, UnitStatus::Completed);
        entry.record_count = record_count;
        self.record(entry)
    }

    fn mark_failed(&self, key: &WorkUnitKey, reason: &str) -> LedgerResult<()> {
        let mut entry = LedgerEntry::new(key, UnitStatus::Failed);
        entry.error = Some(reason.to_string());
        self.record(entry)
    }

    fn find_resume_point(&self) -> LedgerResult<Option<ResumePoint>> {
        let inner = self.inner.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(resume_point_from(inner.entries.values()))
    }

    fn flush(&self) -> LedgerResult<()> {
        let inner = self.inner.lock().map_err(|_| LedgerError::Poisoned)?;
        inner.file.sync_data()?;
        Ok(())
    }

    fn stats(&self) -> LedgerResult<LedgerStats> {
        let inner = self.inner.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(stats_from(inner.entries.values()))
    }
}
