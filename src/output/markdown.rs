//! Markdown run report
//!
//! Human-readable companion to `run_summary.json`: totals, a per-period
//! table, per-warehouse rows and the error list.

use crate::harvest::RunSummary;
use crate::output::OutputResult;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Errors listed in full before the report truncates
const MAX_LISTED_ERRORS: usize = 50;

/// Writes the markdown report for a run
///
/// # Arguments
///
/// * `summary` - The finished run summary
/// * `output_path` - Path where the markdown file should be written
pub fn write_markdown_report(summary: &RunSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_report(summary);

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_report(summary: &RunSummary) -> String {
    let mut md = String::new();
    let totals = &summary.totals;

    md.push_str("# LMIS Form 2 Harvest Report\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", summary.run_id));
    md.push_str(&format!("- **Destination**: {}\n", summary.destination));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
        if let Some(seconds) = duration_seconds(&summary.started_at, finished) {
            md.push_str(&format!(
                "- **Duration**: {} seconds ({:.2} minutes)\n",
                seconds,
                seconds as f64 / 60.0
            ));
        }
    }
    md.push('\n');

    md.push_str("## Totals\n\n");
    md.push_str("| Measure | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Periods | {} |\n", totals.periods));
    md.push_str(&format!("| Warehouses | {} |\n", totals.warehouses));
    md.push_str(&format!(
        "| Warehouses skipped | {} |\n",
        totals.warehouses_skipped
    ));
    md.push_str(&format!("| Upazilas | {} |\n", totals.upazilas));
    md.push_str(&format!("| Unions | {} |\n", totals.unions));
    md.push_str(&format!("| Items with data | {} |\n", totals.items_with_data));
    md.push_str(&format!("| Items without data | {} |\n", totals.items_empty));
    md.push_str(&format!("| Items skipped | {} |\n", totals.items_skipped));
    md.push_str(&format!("| Items failed | {} |\n", totals.items_failed));
    md.push_str(&format!("| Records | {} |\n", totals.records));
    md.push_str(&format!("| Errors | {} |\n\n", totals.errors));

    if !summary.periods.is_empty() {
        md.push_str("## Periods\n\n");
        md.push_str("| Period | Month | Warehouses | Records | Errors |\n");
        md.push_str("|--------|-------|------------|---------|--------|\n");
        for period in &summary.periods {
            let errors: usize = period.errors.len()
                + period
                    .warehouse_results
                    .iter()
                    .map(|w| w.failures + w.errors.len())
                    .sum::<usize>();
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                period.label(),
                period.month_name,
                period.warehouse_count,
                period.record_count,
                errors
            ));
        }
        md.push('\n');

        for period in summary.periods.iter().filter(|p| !p.warehouse_results.is_empty()) {
            md.push_str(&format!("### {} {}\n\n", period.month_name, period.year));
            md.push_str("| Warehouse | District | Upazilas | Unions | Records | Failures | Status |\n");
            md.push_str("|-----------|----------|----------|--------|---------|----------|--------|\n");
            for wh in &period.warehouse_results {
                let status = if wh.skipped {
                    "skipped"
                } else if wh.is_clean() {
                    "complete"
                } else {
                    "incomplete"
                };
                md.push_str(&format!(
                    "| {} ({}) | {} | {} | {} | {} | {} | {} |\n",
                    wh.name,
                    wh.id,
                    wh.district,
                    wh.upazila_count,
                    wh.union_count,
                    wh.record_count,
                    wh.failures,
                    status
                ));
            }
            md.push('\n');
        }
    }

    let errors = summary.all_errors();
    if !errors.is_empty() {
        md.push_str("## Errors\n\n");
        for error in errors.iter().take(MAX_LISTED_ERRORS) {
            md.push_str(&format!("- {}\n", error));
        }
        if errors.len() > MAX_LISTED_ERRORS {
            md.push_str(&format!(
                "\n... and {} more\n",
                errors.len() - MAX_LISTED_ERRORS
            ));
        }
        md.push('\n');
    }

    md
}

fn duration_seconds(started: &str, finished: &str) -> Option<i64> {
    let started = chrono::DateTime::parse_from_rfc3339(started).ok()?;
    let finished = chrono::DateTime::parse_from_rfc3339(finished).ok()?;
    Some((finished - started).num_seconds())
}
