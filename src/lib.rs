//! lmis-harvest: a resumable harvester for the LMIS Form 2 stock report
//!
//! This crate walks the portal's region hierarchy (warehouse → upazila → union)
//! for every requested month, fetches the per-item stock table for each union
//! through a chain of fallback strategies, and persists the rows to a JSON file
//! tree or a SQLite database while keeping a durable progress ledger.

pub mod config;
pub mod discovery;
pub mod harvest;
pub mod leaf;
pub mod ledger;
pub mod markup;
pub mod model;
pub mod output;
pub mod storage;
pub mod transport;

use thiserror::Error;

/// Main error type for harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("Sink error: {0}")]
    Sink(#[from] storage::SinkError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger::LedgerError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Invalid period: {0}")]
    Period(#[from] model::PeriodParseError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("No warehouse matches '{0}'")]
    WarehouseNotFound(String),

    #[error("Initialization failed: {0}")]
    Init(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors raised when a remote payload has no recognizable shape
///
/// A well-formed empty payload is not a parse error.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unrecognized {what} payload: {snippet}")]
    Unrecognized { what: &'static str, snippet: String },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing field '{0}'")]
    MissingField(&'static str),
}

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use harvest::{Harvester, RunSummary};
pub use model::{DataRecord, Item, Period, Region, RegionLevel, WorkUnitKey};
