//! Run summaries
//!
//! Summaries mirror the traversal tree and are built bottom-up. Partial
//! summaries are written to `root/logs/` at each level boundary so a crash
//! mid-run still leaves a record of what happened.

use crate::model::{Period, Region};
use crate::output::markdown::write_markdown_report;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One union and all its items
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeafSummary {
    pub name: String,
    pub id: String,
    pub item_count: usize,
    pub items_with_data: usize,
    /// Answered without rows; left failed for the next run
    pub items_empty: usize,
    pub items_skipped: usize,
    pub items_failed: usize,
    pub record_count: usize,
    pub skipped: bool,
    pub errors: Vec<String>,
}

impl LeafSummary {
    pub fn new(union: &Region) -> Self {
        Self {
            name: union.name.clone(),
            id: union.id.clone(),
            ..Default::default()
        }
    }

    /// Failed units beneath and including this node
    pub fn failures(&self) -> usize {
        let unfinished = self.items_failed + self.items_empty;
        unfinished + usize::from(unfinished == 0 && !self.errors.is_empty())
    }
}

/// One upazila and its unions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubunitSummary {
    pub name: String,
    pub id: String,
    pub union_count: usize,
    pub record_count: usize,
    pub failures: usize,
    pub skipped: bool,
    pub errors: Vec<String>,
    pub union_results: Vec<LeafSummary>,
}

impl SubunitSummary {
    pub fn new(upazila: &Region) -> Self {
        Self {
            name: upazila.name.clone(),
            id: upazila.id.clone(),
            ..Default::default()
        }
    }

    pub fn absorb(&mut self, leaf: LeafSummary) {
        self.record_count += leaf.record_count;
        self.failures += leaf.failures();
        self.union_results.push(leaf);
    }
}

/// One warehouse for one period
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarehouseSummary {
    pub name: String,
    pub id: String,
    pub district: String,
    pub upazila_count: usize,
    pub union_count: usize,
    pub record_count: usize,
    pub failures: usize,
    pub skipped: bool,
    pub errors: Vec<String>,
    pub upazila_results: Vec<SubunitSummary>,
}

impl WarehouseSummary {
    pub fn new(warehouse: &Region, district: Option<String>) -> Self {
        Self {
            name: warehouse.name.clone(),
            id: warehouse.id.clone(),
            district: district.unwrap_or_default(),
            ..Default::default()
        }
    }

    pub fn absorb(&mut self, subunit: SubunitSummary) {
        self.union_count += subunit.union_count;
        self.record_count += subunit.record_count;
        self.failures += subunit.failures + usize::from(!subunit.errors.is_empty());
        self.upazila_results.push(subunit);
    }

    /// True when every unit beneath finished without failure
    pub fn is_clean(&self) -> bool {
        self.failures == 0 && self.errors.is_empty()
    }
}

/// One period across warehouses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub year: String,
    pub month: String,
    pub month_name: String,
    pub warehouse_count: usize,
    pub record_count: usize,
    pub errors: Vec<String>,
    pub warehouse_results: Vec<WarehouseSummary>,
}

impl PeriodSummary {
    pub fn new(period: &Period) -> Self {
        Self {
            year: period.year.clone(),
            month: period.month.clone(),
            month_name: period.month_name().to_string(),
            ..Default::default()
        }
    }

    pub fn label(&self) -> String {
        format!("{}-{}", self.year, self.month)
    }

    /// Adds or replaces the summary for a warehouse
    pub fn upsert(&mut self, warehouse: WarehouseSummary) {
        match self
            .warehouse_results
            .iter_mut()
            .find(|w| w.id == warehouse.id)
        {
            Some(existing) => *existing = warehouse,
            None => self.warehouse_results.push(warehouse),
        }
        self.record_count = self.warehouse_results.iter().map(|w| w.record_count).sum();
    }
}

/// Totals across the whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub periods: usize,
    pub warehouses: usize,
    pub warehouses_skipped: usize,
    pub upazilas: usize,
    pub unions: usize,
    pub items_with_data: usize,
    pub items_empty: usize,
    pub items_skipped: usize,
    pub items_failed: usize,
    pub records: usize,
    pub errors: usize,
}

/// Report for a whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub destination: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub errors: Vec<String>,
    pub totals: RunTotals,
    pub periods: Vec<PeriodSummary>,
}

impl RunSummary {
    /// Recomputes totals from the period tree
    pub fn compute_totals(&mut self) {
        let mut totals = RunTotals {
            periods: self.periods.len(),
            errors: self.errors.len(),
            ..Default::default()
        };
        for period in &self.periods {
            totals.errors += period.errors.len();
            for warehouse in &period.warehouse_results {
                totals.warehouses += 1;
                totals.warehouses_skipped += usize::from(warehouse.skipped);
                totals.upazilas += warehouse.upazila_count;
                totals.unions += warehouse.union_count;
                totals.records += warehouse.record_count;
                totals.errors += warehouse.errors.len();
                for subunit in &warehouse.upazila_results {
                    totals.errors += subunit.errors.len();
                    for leaf in &subunit.union_results {
                        totals.items_with_data += leaf.items_with_data;
                        totals.items_empty += leaf.items_empty;
                        totals.items_skipped += leaf.items_skipped;
                        totals.items_failed += leaf.items_failed;
                        totals.errors += leaf.errors.len();
                    }
                }
            }
        }
        self.totals = totals;
    }

    /// Every error message in the tree, prefixed with its location
    pub fn all_errors(&self) -> Vec<String> {
        let mut out: Vec<String> = self.errors.clone();
        for period in &self.periods {
            let p = period.label();
            out.extend(period.errors.iter().map(|e| format!("{}: {}", p, e)));
            for wh in &period.warehouse_results {
                out.extend(wh.errors.iter().map(|e| format!("{} {}: {}", p, wh.id, e)));
                for upz in &wh.upazila_results {
                    out.extend(
                        upz.errors
                            .iter()
                            .map(|e| format!("{} {}/{}: {}", p, wh.id, upz.id, e)),
                    );
                    for leaf in &upz.union_results {
                        out.extend(leaf.errors.iter().map(|e| {
                            format!("{} {}/{}/{}: {}", p, wh.id, upz.id, leaf.id, e)
                        }));
                    }
                }
            }
        }
        out
    }
}

/// Writes summaries under `root/logs`
#[derive(Debug, Clone)]
pub struct SummaryWriter {
    logs_dir: PathBuf,
}

impl SummaryWriter {
    pub fn new(root: &Path) -> Self {
        Self {
            logs_dir: root.join("logs"),
        }
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn warehouse_log_path(&self, period: &Period, warehouse_id: &str) -> PathBuf {
        self.logs_dir.join(format!(
            "{}_{}_{}_log.json",
            period.year,
            period.month,
            crate::storage::safe_component(warehouse_id)
        ))
    }

    pub fn period_summary_path(&self, period: &Period) -> PathBuf {
        self.logs_dir
            .join(format!("{}_{}_summary.json", period.year, period.month))
    }

    pub fn run_summary_path(&self) -> PathBuf {
        self.logs_dir.join("run_summary.json")
    }

    /// Rewrites the (possibly partial) log for a warehouse
    pub fn write_warehouse_log(&self, period: &Period, summary: &WarehouseSummary) {
        self.write_json(&self.warehouse_log_path(period, &summary.id), summary);
    }

    /// Rewrites the (possibly partial) summary for a period
    pub fn write_period_summary(&self, period: &Period, summary: &PeriodSummary) {
        self.write_json(&self.period_summary_path(period), summary);
    }

    /// Writes `run_summary.json` and `run_summary.md`
    pub fn write_run_summary(&self, summary: &RunSummary) {
        self.write_json(&self.run_summary_path(), summary);
        let md_path = self.logs_dir.join("run_summary.md");
        if let Err(e) = write_markdown_report(summary, &md_path) {
            tracing::warn!("Could not write {}: {}", md_path.display(), e);
        }
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) {
        if let Err(e) = write_json_atomic(path, value) {
            tracing::warn!("Could not write summary {}: {}", path.display(), e);
        }
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RegionLevel;
    use tempfile::TempDir;

    fn leaf(records: usize, failed: usize) -> LeafSummary {
        LeafSummary {
            id: "1".to_string(),
            items_with_data: 1,
            items_failed: failed,
            record_count: records,
            errors: (0..failed).map(|i| format!("item {} failed", i)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_bottom_up_aggregation() {
        let upazila = Region::new(RegionLevel::Upazila, "T429", "Bhola Sadar");
        let mut subunit = SubunitSummary::new(&upazila);
        subunit.union_count = 2;
        subunit.absorb(leaf(3, 0));
        subunit.absorb(leaf(2, 1));
        assert_eq!(subunit.record_count, 5);
        assert_eq!(subunit.failures, 1);

        let mut warehouse = WarehouseSummary::new(&Region::warehouse("WH-001", "Bhola RWH"), None);
        warehouse.upazila_count = 1;
        warehouse.absorb(subunit);
        assert_eq!(warehouse.union_count, 2);
        assert_eq!(warehouse.record_count, 5);
        assert!(!warehouse.is_clean());

        let period: Period = "2023-01".parse().unwrap();
        let mut period_summary = PeriodSummary::new(&period);
        period_summary.upsert(warehouse.clone());
        period_summary.upsert(warehouse);
        assert_eq!(period_summary.warehouse_results.len(), 1);

        let mut run = RunSummary {
            periods: vec![period_summary],
            ..Default::default()
        };
        run.compute_totals();
        assert_eq!(run.totals.records, 5);
        assert_eq!(run.totals.items_failed, 1);
        assert_eq!(run.totals.errors, 1);
        assert_eq!(run.all_errors(), vec!["2023-01 WH-001/T429/1: item 0 failed".to_string()]);
    }

    #[test]
    fn test_leaf_error_without_item_failure_counts_once() {
        let mut summary = leaf(0, 0);
        summary.errors.push("union listing failed".to_string());
        assert_eq!(summary.failures(), 1);
    }

    #[test]
    fn test_items_without_data_keep_union_unfinished() {
        let mut summary = leaf(0, 0);
        summary.items_empty = 2;
        assert_eq!(summary.failures(), 2);

        let mut subunit = SubunitSummary::new(&Region::new(RegionLevel::Upazila, "T429", "Upazila"));
        subunit.absorb(summary);
        assert_eq!(subunit.failures, 2);
    }

    #[test]
    fn test_writer_paths() {
        let dir = TempDir::new().unwrap();
        let writer = SummaryWriter::new(dir.path());
        let period: Period = "2023-01".parse().unwrap();

        let summary = WarehouseSummary::new(&Region::warehouse("WH-001", "Bhola RWH"), None);
        writer.write_warehouse_log(&period, &summary);
        writer.write_period_summary(&period, &PeriodSummary::new(&period));

        assert!(dir.path().join("logs/2023_01_WH-001_log.json").exists());
        assert!(dir.path().join("logs/2023_01_summary.json").exists());
    }
}
