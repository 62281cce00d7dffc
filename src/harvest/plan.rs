//! What a run covers: periods, warehouse filter, resume point

use crate::config::Config;
use crate::ledger::{ProgressLedger, ResumePoint};
use crate::model::{Period, Region};
use crate::{HarvestError, Result};

/// Scope of a single run
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    pub periods: Vec<Period>,
    pub warehouse_filter: Option<String>,
    pub resume: Option<ResumePoint>,
}

impl RunPlan {
    /// Builds the plan from configuration, consulting the ledger for a resume point
    ///
    /// An operator resume point always wins. The ledger's own resume point is
    /// only applied to sequential runs, where traversal order matches the
    /// order the ledger saw.
    pub fn from_config(config: &Config, ledger: &dyn ProgressLedger) -> Result<Self> {
        let start = config.harvest.start_period()?;
        let end = config.harvest.end_period()?;

        let operator = config
            .harvest
            .resume
            .as_deref()
            .map(str::parse::<ResumePoint>)
            .transpose()?;

        let resume = match operator {
            Some(point) => {
                tracing::info!("Resuming from operator point {}", point);
                Some(point)
            }
            None => {
                let found = ledger.find_resume_point()?;
                match (&found, config.harvest.workers) {
                    (Some(point), 1) => {
                        tracing::info!("Resuming from ledger point {}", point);
                        found
                    }
                    (Some(point), _) => {
                        tracing::info!(
                            "Ledger resume point {} not applied to a concurrent run; completed units are still skipped",
                            point
                        );
                        None
                    }
                    (None, _) => None,
                }
            }
        };

        Ok(Self {
            periods: Period::range(&start, &end),
            warehouse_filter: config.harvest.warehouse_filter.clone(),
            resume,
        })
    }

    /// Periods left after applying the resume point
    pub fn effective_periods(&self) -> Vec<Period> {
        match &self.resume {
            Some(point) => self
                .periods
                .iter()
                .filter(|p| **p >= point.period)
                .cloned()
                .collect(),
            None => self.periods.clone(),
        }
    }

    /// Drops warehouses listed before the resume warehouse in the resume period
    pub fn apply_resume(&self, period: &Period, warehouses: Vec<Region>) -> Vec<Region> {
        let Some(point) = &self.resume else {
            return warehouses;
        };
        if point.period != *period {
            return warehouses;
        }
        let Some(target) = &point.warehouse_id else {
            return warehouses;
        };
        match warehouses.iter().position(|w| &w.id == target) {
            Some(index) => {
                if index > 0 {
                    tracing::info!("Skipping {} warehouses before {} in {}", index, target, period);
                }
                warehouses.into_iter().skip(index).collect()
            }
            None => {
                tracing::warn!(
                    "Resume warehouse {} not listed for {}, processing all",
                    target,
                    period
                );
                warehouses
            }
        }
    }
}

/// Selects warehouses by filter
///
/// Exact id first, then partial id, then case-insensitive name substring;
/// the first stage with matches wins. No filter keeps everything.
pub fn filter_warehouses(warehouses: &[Region], filter: Option<&str>) -> Vec<Region> {
    let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) else {
        return warehouses.to_vec();
    };

    let exact: Vec<Region> = warehouses
        .iter()
        .filter(|w| w.id.eq_ignore_ascii_case(filter))
        .cloned()
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    let upper = filter.to_uppercase();
    let partial: Vec<Region> = warehouses
        .iter()
        .filter(|w| w.id.to_uppercase().contains(&upper))
        .cloned()
        .collect();
    if !partial.is_empty() {
        return partial;
    }

    let lower = filter.to_lowercase();
    warehouses
        .iter()
        .filter(|w| w.name.to_lowercase().contains(&lower))
        .cloned()
        .collect()
}

/// Like [`filter_warehouses`] but an empty match is an error
pub fn require_warehouses(warehouses: &[Region], filter: Option<&str>) -> Result<Vec<Region>> {
    let selected = filter_warehouses(warehouses, filter);
    if selected.is_empty() {
        return Err(HarvestError::WarehouseNotFound(
            filter.unwrap_or_default().to_string(),
        ));
    }
    Ok(selected)
}
