use crate::model::{default_items, default_warehouses, Item, Period};
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for lmis-harvest
///
/// Every section is optional; an empty file yields a working configuration
/// pointed at the public portal.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default = "default_item_entries")]
    pub items: Vec<ItemEntry>,
    #[serde(default = "default_warehouse_entries")]
    pub warehouses: Vec<WarehouseEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            harvest: HarvestConfig::default(),
            pacing: PacingConfig::default(),
            output: OutputConfig::default(),
            items: default_item_entries(),
            warehouses: default_warehouse_entries(),
        }
    }
}

impl Config {
    /// The static item catalog as domain items
    pub fn item_catalog(&self) -> Vec<Item> {
        self.items
            .iter()
            .map(|i| Item::new(i.code.clone(), i.name.clone()))
            .collect()
    }

    /// District for a warehouse from the configured table
    pub fn district_for(&self, warehouse_id: &str, warehouse_name: &str) -> Option<String> {
        self.warehouses
            .iter()
            .find(|w| w.id == warehouse_id)
            .or_else(|| {
                self.warehouses
                    .iter()
                    .find(|w| w.name.eq_ignore_ascii_case(warehouse_name.trim()))
            })
            .and_then(|w| w.district.clone())
    }
}

/// Remote portal connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the reports application (must end with `/`)
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// Base URL of the supply-chain portal, sent as `baseURL` with API requests
    #[serde(rename = "scip-url", default = "default_scip_url")]
    pub scip_url: String,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Attempts per request before giving up
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff unit in milliseconds
    #[serde(rename = "backoff-unit-ms", default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,

    /// Optional ceiling on a single backoff delay
    #[serde(rename = "max-backoff-secs", default)]
    pub max_backoff_secs: Option<u64>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            scip_url: default_scip_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_unit_ms: default_backoff_unit_ms(),
            max_backoff_secs: None,
        }
    }
}

/// Level of the hierarchy whose siblings are processed concurrently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParallelLevel {
    Period,
    Warehouse,
}

/// Traversal scope and behavior
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// First period, `YYYY-MM`
    #[serde(default = "default_start")]
    pub start: String,

    /// Last period, `YYYY-MM`; the current month when absent
    #[serde(default)]
    pub end: Option<String>,

    /// Concurrent tasks at the parallel level
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(rename = "parallel-level", default = "default_parallel_level")]
    pub parallel_level: ParallelLevel,

    /// Ask the portal for warehouses instead of using the seed list directly
    #[serde(rename = "discover-warehouses", default = "default_true")]
    pub discover_warehouses: bool,

    /// Check that the portal answers before starting
    #[serde(rename = "probe-on-start", default = "default_true")]
    pub probe_on_start: bool,

    /// Reuse a parent's children from an earlier period when the portal lists none
    #[serde(rename = "reuse-cached-children", default)]
    pub reuse_cached_children: bool,

    /// Image name in the last API cell that marks a facility as eligible
    #[serde(rename = "eligible-marker", default = "default_eligible_marker")]
    pub eligible_marker: String,

    /// Restrict the run to warehouses matching this id or name
    #[serde(rename = "warehouse-filter", default)]
    pub warehouse_filter: Option<String>,

    /// Operator resume point, `YYYY-MM` or `YYYY-MM:WH-ID`
    #[serde(default)]
    pub resume: Option<String>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            start: default_start(),
            end: None,
            workers: default_workers(),
            parallel_level: default_parallel_level(),
            discover_warehouses: true,
            probe_on_start: true,
            reuse_cached_children: false,
            eligible_marker: default_eligible_marker(),
            warehouse_filter: None,
            resume: None,
        }
    }
}

impl HarvestConfig {
    /// The configured end period, or the current month
    pub fn end_period(&self) -> Result<Period, crate::model::PeriodParseError> {
        match &self.end {
            Some(end) => end.parse(),
            None => {
                let today = chrono::Local::now().format("%Y-%m").to_string();
                today.parse()
            }
        }
    }

    pub fn start_period(&self) -> Result<Period, crate::model::PeriodParseError> {
        self.start.parse()
    }
}

/// Sibling delays per level of the hierarchy, in milliseconds
///
/// Must be non-decreasing from item to warehouse.
#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    #[serde(rename = "item-delay-ms", default = "default_item_delay")]
    pub item_delay_ms: u64,

    #[serde(rename = "union-delay-ms", default = "default_union_delay")]
    pub union_delay_ms: u64,

    #[serde(rename = "upazila-delay-ms", default = "default_upazila_delay")]
    pub upazila_delay_ms: u64,

    #[serde(rename = "warehouse-delay-ms", default = "default_warehouse_delay")]
    pub warehouse_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            item_delay_ms: default_item_delay(),
            union_delay_ms: default_union_delay(),
            upazila_delay_ms: default_upazila_delay(),
            warehouse_delay_ms: default_warehouse_delay(),
        }
    }
}

impl PacingConfig {
    /// No delays at all
    pub fn none() -> Self {
        Self {
            item_delay_ms: 0,
            union_delay_ms: 0,
            upazila_delay_ms: 0,
            warehouse_delay_ms: 0,
        }
    }

    pub fn item(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn union(&self) -> Duration {
        Duration::from_millis(self.union_delay_ms)
    }

    pub fn upazila(&self) -> Duration {
        Duration::from_millis(self.upazila_delay_ms)
    }

    /// Also used between periods
    pub fn warehouse(&self) -> Duration {
        Duration::from_millis(self.warehouse_delay_ms)
    }
}

/// Where harvested records go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    File,
    Sqlite,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_sink")]
    pub sink: SinkKind,

    /// Root of the JSON file tree, logs and the progress ledger
    #[serde(default = "default_root")]
    pub root: String,

    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    /// Explicit run identifier for the progress ledger
    #[serde(rename = "run-id", default)]
    pub run_id: Option<String>,

    /// Files per CSV batch in the converter
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sink: default_sink(),
            root: default_root(),
            database_path: default_database_path(),
            run_id: None,
            batch_size: default_batch_size(),
        }
    }
}

/// A commodity tab in the static catalog
#[derive(Debug, Clone, Deserialize)]
pub struct ItemEntry {
    pub code: String,
    pub name: String,
}

/// A warehouse in the seed list
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub district: Option<String>,
}

fn default_base_url() -> String {
    "https://elmis.dgfp.gov.bd/dgfplmis_reports/".to_string()
}

fn default_scip_url() -> String {
    "https://scmpbd.org/scip/".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

fn default_start() -> String {
    "2016-01".to_string()
}

fn default_workers() -> usize {
    1
}

fn default_parallel_level() -> ParallelLevel {
    ParallelLevel::Warehouse
}

fn default_true() -> bool {
    true
}

fn default_eligible_marker() -> String {
    "tick.png".to_string()
}

fn default_item_delay() -> u64 {
    500
}

fn default_union_delay() -> u64 {
    1000
}

fn default_upazila_delay() -> u64 {
    2000
}

fn default_warehouse_delay() -> u64 {
    5000
}

fn default_sink() -> SinkKind {
    SinkKind::File
}

fn default_root() -> String {
    "data".to_string()
}

fn default_database_path() -> String {
    "lmis_data.db".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_item_entries() -> Vec<ItemEntry> {
    default_items()
        .into_iter()
        .map(|i| ItemEntry {
            code: i.code,
            name: i.name,
        })
        .collect()
}

fn default_warehouse_entries() -> Vec<WarehouseEntry> {
    default_warehouses()
        .iter()
        .map(|w| WarehouseEntry {
            id: w.id.to_string(),
            name: w.name.to_string(),
            district: Some(w.district.to_string()),
        })
        .collect()
}
