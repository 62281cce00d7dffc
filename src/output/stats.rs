//! Ledger statistics for the `status` command

use crate::ledger::{LedgerStats, ProgressLedger, ResumePoint};
use crate::output::OutputResult;

/// Snapshot of a run's progress
#[derive(Debug, Clone)]
pub struct RunStatus {
    pub run_id: String,
    pub destination: String,
    pub stats: LedgerStats,
    pub resume_point: Option<ResumePoint>,
}

impl RunStatus {
    /// Share of touched units that completed, in percent
    pub fn completion_rate(&self) -> f64 {
        let touched = self.stats.completed + self.stats.failed + self.stats.in_progress;
        if touched == 0 {
            0.0
        } else {
            self.stats.completed as f64 / touched as f64 * 100.0
        }
    }
}

/// Loads statistics from a ledger
pub fn load_status(
    ledger: &dyn ProgressLedger,
    run_id: &str,
    destination: &str,
) -> OutputResult<RunStatus> {
    Ok(RunStatus {
        run_id: run_id.to_string(),
        destination: destination.to_string(),
        stats: ledger.stats()?,
        resume_point: ledger.find_resume_point()?,
    })
}

/// Prints statistics to stdout
pub fn print_status(status: &RunStatus) {
    println!("=== Harvest Status ===\n");

    println!("Run:");
    println!("  Run id: {}", status.run_id);
    println!("  Destination: {}", status.destination);
    println!();

    let stats = &status.stats;
    println!("Units:");
    println!("  Completed: {}", stats.completed);
    println!("  Failed: {}", stats.failed);
    println!("  In progress: {}", stats.in_progress);
    println!();

    println!("Items:");
    println!("  Completed items: {}", stats.items_completed);
    println!("  Records written: {}", stats.records);
    println!();

    match &status.resume_point {
        Some(point) => println!("Resume point: {}", point),
        None => println!("Resume point: none (nothing left unfinished)"),
    }
    println!("Completion: {:.1}%", status.completion_rate());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::JsonlLedger;
    use crate::model::WorkUnitKey;
    use tempfile::TempDir;

    #[test]
    fn test_load_status() {
        let dir = TempDir::new().unwrap();
        let ledger = JsonlLedger::open(&dir.path().join("run.jsonl"), false).unwrap();
        let period = "2023-01".parse().unwrap();
        ledger
            .mark_done(&WorkUnitKey::item(&period, "WH-001", "T429", "1", "CON002"), 2)
            .unwrap();
        ledger
            .mark_failed(&WorkUnitKey::warehouse(&period, "WH-001"), "1 union failed")
            .unwrap();

        let status = load_status(&ledger, "abc", "file:/data").unwrap();
        assert_eq!(status.stats.records, 2);
        assert_eq!(status.stats.failed, 1);
        assert_eq!(status.resume_point.as_ref().unwrap().to_string(), "2023-01:WH-001");
        assert!((status.completion_rate() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_completion_rate_of_empty_ledger() {
        let status = RunStatus {
            run_id: String::new(),
            destination: String::new(),
            stats: LedgerStats::default(),
            resume_point: None,
        };
        assert_eq!(status.completion_rate(), 0.0);
    }
}
