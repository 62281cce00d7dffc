//! Completeness audit of the JSON file tree
//!
//! Walks `root/{year}/{month}/{wh}/{upazila}/{union}/{item}.json` and reports
//! which months exist per year and which expected items each union lacks.

use super::OutputResult;
use crate::storage::item_file_stem;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Findings for one year
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct YearAudit {
    pub present: bool,
    pub months_present: Vec<String>,
    pub months_missing: Vec<String>,
    /// Warehouse directories found per month
    pub warehouses_by_month: BTreeMap<String, Vec<String>>,
    pub unions_checked: usize,
    /// `MM/WH/UPAZILA/UNION` to the item stems it lacks
    pub missing_items: BTreeMap<String, Vec<String>>,
}

/// Findings for a range of years
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub root: PathBuf,
    pub expected_items: Vec<String>,
    pub years: BTreeMap<String, YearAudit>,
}

impl AuditReport {
    /// True when no month or item is missing in any audited year
    pub fn is_complete(&self) -> bool {
        self.years.values().all(|y| {
            y.present && y.months_missing.is_empty() && y.missing_items.is_empty()
        })
    }
}

fn subdirs(dir: &Path) -> OutputResult<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                dirs.push((name.to_string(), path.clone()));
            }
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn item_stems(dir: &Path) -> OutputResult<BTreeSet<String>> {
    let mut stems = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.insert(stem.to_string());
            }
        }
    }
    Ok(stems)
}

/// Audits one year directory
pub fn audit_year(root: &Path, year: &str, expected: &BTreeSet<String>) -> OutputResult<YearAudit> {
    let year_path = root.join(year);
    let mut audit = YearAudit::default();
    if !year_path.is_dir() {
        audit.months_missing = (1..=12).map(|m| format!("{:02}", m)).collect();
        return Ok(audit);
    }
    audit.present = true;

    for month in (1..=12).map(|m| format!("{:02}", m)) {
        let month_path = year_path.join(&month);
        if !month_path.is_dir() {
            audit.months_missing.push(month);
            continue;
        }

        let mut warehouses = Vec::new();
        for (warehouse, wh_path) in subdirs(&month_path)? {
            for (upazila, upz_path) in subdirs(&wh_path)? {
                for (union, union_path) in subdirs(&upz_path)? {
                    audit.unions_checked += 1;
                    let found = item_stems(&union_path)?;
                    let missing: Vec<String> = expected.difference(&found).cloned().collect();
                    if !missing.is_empty() {
                        audit.missing_items.insert(
                            format!("{}/{}/{}/{}", month, warehouse, upazila, union),
                            missing,
                        );
                    }
                }
            }
            warehouses.push(warehouse);
        }
        audit.warehouses_by_month.insert(month.clone(), warehouses);
        audit.months_present.push(month);
    }
    Ok(audit)
}

/// Audits every year from `start_year` to `end_year`
///
/// `expected_items` are item codes; they are compared as file stems.
pub fn audit_tree(
    root: &Path,
    start_year: u32,
    end_year: u32,
    expected_items: &[String],
) -> OutputResult<AuditReport> {
    let expected: BTreeSet<String> = expected_items.iter().map(|c| item_file_stem(c)).collect();
    let mut report = AuditReport {
        root: root.to_path_buf(),
        expected_items: expected.iter().cloned().collect(),
        years: BTreeMap::new(),
    };
    for year in start_year..=end_year {
        let year = year.to_string();
        let audit = audit_year(root, &year, &expected)?;
        report.years.insert(year, audit);
    }
    Ok(report)
}

/// Human-readable form of an audit
pub fn format_audit_report(report: &AuditReport) -> String {
    let mut out = Vec::new();
    out.push("LMIS Form 2 Data Completeness Report".to_string());
    out.push("=".repeat(50));
    out.push(format!("Root: {}", report.root.display()));
    out.push(format!("Expected items: {}", report.expected_items.join(", ")));

    for (year, audit) in &report.years {
        out.push(String::new());
        out.push(format!("Year {}:", year));
        out.push("-".repeat(20));
        if !audit.present {
            out.push(format!("Year {} directory not found", year));
            continue;
        }
        out.push(format!("Months present: {}", audit.months_present.join(", ")));
        if !audit.months_missing.is_empty() {
            out.push(format!("Months missing: {}", audit.months_missing.join(", ")));
        }
        for (month, warehouses) in &audit.warehouses_by_month {
            out.push(format!("Month {} - Warehouses: {}", month, warehouses.len()));
        }
        out.push(format!("Unions checked: {}", audit.unions_checked));
        for (union, missing) in &audit.missing_items {
            out.push(format!("  Union {} - Missing items: {}", union, missing.join(", ")));
        }
    }
    out.push(String::new());
    out.join("\n")
}

/// Writes `audit_report.txt` and `audit_details.json` into `out_dir`
pub fn write_audit_report(report: &AuditReport, out_dir: &Path) -> OutputResult<(PathBuf, PathBuf)> {
    fs::create_dir_all(out_dir)?;
    let text_path = out_dir.join("audit_report.txt");
    let json_path = out_dir.join("audit_details.json");
    fs::write(&text_path, format_audit_report(report))?;
    fs::write(&json_path, serde_json::to_string_pretty(report)?)?;
    Ok((text_path, json_path))
}
