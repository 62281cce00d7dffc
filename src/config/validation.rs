use crate::config::types::{
    Config, HarvestConfig, ItemEntry, OutputConfig, PacingConfig, RemoteConfig, WarehouseEntry,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Maximum concurrent tasks at the parallel level
const MAX_WORKERS: usize = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_remote_config(&config.remote)?;
    validate_harvest_config(&config.harvest)?;
    validate_pacing(&config.pacing)?;
    validate_output_config(&config.output)?;
    validate_items(&config.items)?;
    validate_warehouses(&config.warehouses)?;
    Ok(())
}

fn validate_remote_config(config: &RemoteConfig) -> Result<(), ConfigError> {
    for (name, value) in [("base-url", &config.base_url), ("scip-url", &config.scip_url)] {
        let url = Url::parse(value)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "{} must use http or https, got '{}'",
                name, value
            )));
        }
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(
            "max-retries must be >= 1".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    let start = config
        .start_period()
        .map_err(|e| ConfigError::Validation(format!("start: {}", e)))?;
    let end = config
        .end_period()
        .map_err(|e| ConfigError::Validation(format!("end: {}", e)))?;
    if start > end {
        return Err(ConfigError::Validation(format!(
            "start {} is after end {}",
            start, end
        )));
    }

    if let Some(resume) = &config.resume {
        let period = resume.split(':').next().unwrap_or_default();
        period
            .parse::<crate::model::Period>()
            .map_err(|e| ConfigError::Validation(format!("resume: {}", e)))?;
    }

    Ok(())
}

/// Delays must escalate from item up to warehouse
fn validate_pacing(config: &PacingConfig) -> Result<(), ConfigError> {
    let levels = [
        ("item-delay-ms", config.item_delay_ms),
        ("union-delay-ms", config.union_delay_ms),
        ("upazila-delay-ms", config.upazila_delay_ms),
        ("warehouse-delay-ms", config.warehouse_delay_ms),
    ];
    for pair in levels.windows(2) {
        let (lower_name, lower) = pair[0];
        let (upper_name, upper) = pair[1];
        if lower > upper {
            return Err(ConfigError::Validation(format!(
                "{} ({}) must not exceed {} ({})",
                lower_name, lower, upper_name, upper
            )));
        }
    }
    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.root.is_empty() {
        return Err(ConfigError::Validation("root cannot be empty".to_string()));
    }

    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.batch_size == 0 {
        return Err(ConfigError::Validation(
            "batch-size must be >= 1".to_string(),
        ));
    }

    if let Some(run_id) = &config.run_id {
        if run_id.is_empty() || run_id.contains(['/', '\\']) {
            return Err(ConfigError::Validation(format!(
                "run-id '{}' must be a non-empty file name",
                run_id
            )));
        }
    }

    Ok(())
}

fn validate_items(items: &[ItemEntry]) -> Result<(), ConfigError> {
    if items.is_empty() {
        return Err(ConfigError::Validation(
            "at least one item is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for item in items {
        if item.code.trim().is_empty() {
            return Err(ConfigError::Validation(
                "item code cannot be empty".to_string(),
            ));
        }
        if !seen.insert(item.code.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate item code '{}'",
                item.code
            )));
        }
    }

    Ok(())
}

fn validate_warehouses(warehouses: &[WarehouseEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for warehouse in warehouses {
        if warehouse.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "warehouse id cannot be empty".to_string(),
            ));
        }
        if !seen.insert(warehouse.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate warehouse id '{}'",
                warehouse.id
            )));
        }
    }
    Ok(())
}
