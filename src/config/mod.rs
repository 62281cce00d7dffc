//! Configuration module for lmis-harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and applies the `LMIS_*` environment overrides.
//!
//! # Example
//!
//! ```no_run
//! use lmis_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvesting from: {}", config.remote.base_url);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, HarvestConfig, ItemEntry, OutputConfig, PacingConfig, ParallelLevel, RemoteConfig,
    SinkKind, WarehouseEntry,
};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_or_default,
    load_config_with_hash, ENV_BASE_URL, ENV_DATABASE_PATH, ENV_OUTPUT_ROOT, ENV_SCIP_URL,
};
pub use validation::validate;
