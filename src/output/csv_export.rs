//! CSV conversion of the JSON file tree
//!
//! Every batch file becomes one CSV row per record, metadata columns first.
//! Files are grouped into `batch_K.csv` outputs of a fixed number of files,
//! and every row also lands in a merged `all_data.csv`.

use super::{is_reserved, OutputError, OutputResult};
use crate::model::DataRecord;
use crate::storage::{BatchFile, BatchMetadata};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Metadata columns, written before the record columns
const METADATA_COLUMNS: [&str; 13] = [
    "year",
    "month",
    "month_name",
    "warehouse_id",
    "warehouse_name",
    "district",
    "upazila_id",
    "upazila_name",
    "union_id",
    "union_name",
    "item_code",
    "item_name",
    "strategy",
];

pub const MERGED_FILE_NAME: &str = "all_data.csv";

/// What a conversion produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    pub files_found: usize,
    pub files_converted: usize,
    pub files_failed: usize,
    pub rows: usize,
    pub batches: Vec<PathBuf>,
    pub merged: Option<PathBuf>,
}

fn header() -> Vec<&'static str> {
    METADATA_COLUMNS
        .iter()
        .chain(DataRecord::TEXT_COLUMNS.iter())
        .copied()
        .chain(std::iter::once("eligible"))
        .collect()
}

fn row(metadata: &BatchMetadata, record: &DataRecord) -> Vec<String> {
    let mut row = vec![
        metadata.year.clone(),
        metadata.month.clone(),
        metadata.month_name.clone(),
        metadata.warehouse_id.clone(),
        metadata.warehouse_name.clone(),
        metadata.district.clone(),
        metadata.upazila_id.clone(),
        metadata.upazila_name.clone(),
        metadata.union_id.clone(),
        metadata.union_name.clone(),
        metadata.item_code.clone(),
        metadata.item_name.clone(),
        metadata.strategy.clone().unwrap_or_default(),
    ];
    let mut record = record.clone();
    row.extend(record.text_fields_mut().into_iter().map(std::mem::take));
    row.push(record.eligible.to_string());
    row
}

/// Finds every batch file under `root`, sorted by path
///
/// `logs/` and `.progress/` directly under the root are skipped, as are
/// leftover temporary files.
pub fn find_batch_files(root: &Path) -> OutputResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(OutputError::MissingInput(root.to_path_buf()));
    }
    let mut files = Vec::new();
    collect(root, root, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect(root: &Path, dir: &Path, files: &mut Vec<PathBuf>) -> OutputResult<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if !is_reserved(root, &path) {
                collect(root, &path, files)?;
            }
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    Ok(())
}

/// Converts the tree at `root` into CSV files under `out_dir`
pub fn convert_tree(root: &Path, out_dir: &Path, batch_size: usize) -> OutputResult<ConversionSummary> {
    let files = find_batch_files(root)?;
    let mut summary = ConversionSummary {
        files_found: files.len(),
        ..Default::default()
    };
    tracing::info!("Found {} JSON data files under {}", files.len(), root.display());
    if files.is_empty() {
        tracing::warn!("No JSON files found to convert");
        return Ok(summary);
    }

    fs::create_dir_all(out_dir)?;
    let columns = header();

    let merged_path = out_dir.join(MERGED_FILE_NAME);
    let mut merged = csv::Writer::from_writer(File::create(&merged_path)?);
    merged.write_record(&columns)?;

    for (index, chunk) in files.chunks(batch_size.max(1)).enumerate() {
        let batch_path = out_dir.join(format!("batch_{}.csv", index + 1));
        let mut writer = csv::Writer::from_writer(File::create(&batch_path)?);
        writer.write_record(&columns)?;

        let mut batch_rows = 0;
        for path in chunk {
            let batch = match read_batch(path) {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!("Error processing file {}: {}", path.display(), e);
                    summary.files_failed += 1;
                    continue;
                }
            };
            for record in &batch.data {
                let fields = row(&batch.metadata, record);
                writer.write_record(&fields)?;
                merged.write_record(&fields)?;
                batch_rows += 1;
            }
            summary.files_converted += 1;
        }

        writer.flush()?;
        tracing::info!(
            "Saved batch {} with {} records to {}",
            index + 1,
            batch_rows,
            batch_path.display()
        );
        summary.rows += batch_rows;
        summary.batches.push(batch_path);
    }

    merged.flush()?;
    summary.merged = Some(merged_path);
    tracing::info!(
        "Conversion complete: {} rows in {} batches",
        summary.rows,
        summary.batches.len()
    );
    Ok(summary)
}

fn read_batch(path: &Path) -> OutputResult<BatchFile> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
