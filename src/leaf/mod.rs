//! Leaf fetch-with-fallback engine
//!
//! A leaf is one union, one item, one period. The engine tries an ordered
//! chain of [`LeafStrategy`]s and keeps the first non-empty result. Every
//! failure is caught and recorded as an attempt; exhausting the chain is not
//! an error.

pub mod api;
pub mod export;
pub mod scrape;

use crate::config::RemoteConfig;
use crate::model::{DataRecord, Item, Location, Period};
use crate::transport::{Transport, TransportError};
use crate::ParseError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

pub use api::{parse_aa_data, ApiStrategy};
pub use export::ExportStrategy;
pub use scrape::{parse_table, ScrapeStrategy};

/// Errors a single strategy can raise
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Strategy unavailable: {0}")]
    Unavailable(String),
}

/// What to fetch
#[derive(Debug, Clone)]
pub struct LeafQuery {
    pub period: Period,
    pub location: Location,
    pub item: Item,
}

impl LeafQuery {
    /// Query parameters shared by the view, datasource and export endpoints
    pub fn view_params(&self) -> Vec<(String, String)> {
        vec![
            ("Year".to_string(), self.period.year.clone()),
            ("Month".to_string(), self.period.month.clone()),
            ("WHListAll".to_string(), self.location.warehouse.id.clone()),
            ("DistrictList".to_string(), "All".to_string()),
            ("UPNameList".to_string(), self.location.upazila.id.clone()),
            ("UnionList".to_string(), self.location.union.id.clone()),
            ("Item".to_string(), self.item.code.clone()),
        ]
    }
}

/// A way of obtaining the stock rows for a leaf
#[async_trait]
pub trait LeafStrategy: Send + Sync {
    /// Short identifier used in logs and attempt records
    fn id(&self) -> &'static str;

    /// Fetches and normalizes rows; an empty vector means "nothing here"
    async fn fetch(&self, query: &LeafQuery) -> Result<Vec<DataRecord>, StrategyError>;
}

/// Record of a single strategy attempt
#[derive(Debug, Clone)]
pub struct StrategyAttempt {
    pub strategy: &'static str,
    pub records: usize,
    pub error: Option<String>,
    pub duration: Duration,
}

/// Result of running the chain for one leaf
#[derive(Debug, Clone, Default)]
pub struct LeafOutcome {
    pub records: Vec<DataRecord>,
    /// Strategy that produced the records, if any did
    pub strategy: Option<&'static str>,
    pub attempts: Vec<StrategyAttempt>,
}

impl LeafOutcome {
    /// Error messages from failed attempts
    pub fn errors(&self) -> Vec<String> {
        self.attempts
            .iter()
            .filter_map(|a| a.error.as_ref().map(|e| format!("{}: {}", a.strategy, e)))
            .collect()
    }

    /// One line per attempt, e.g. `api: timeout; scrape: no rows`
    pub fn attempt_summary(&self) -> String {
        if self.attempts.is_empty() {
            return "no strategies attempted".to_string();
        }
        self.attempts
            .iter()
            .map(|a| match &a.error {
                Some(e) => format!("{}: {}", a.strategy, e),
                None if a.records == 0 => format!("{}: no rows", a.strategy),
                None => format!("{}: {} rows", a.strategy, a.records),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Ordered strategy chain
pub struct LeafEngine {
    strategies: Vec<Box<dyn LeafStrategy>>,
}

impl LeafEngine {
    pub fn new(strategies: Vec<Box<dyn LeafStrategy>>) -> Self {
        Self { strategies }
    }

    /// The production chain: API, then HTML scrape, then export download
    pub fn standard(transport: Arc<Transport>, remote: &RemoteConfig, eligible_marker: &str) -> Self {
        let base_url = remote.base_url.as_str();
        Self::new(vec![
            Box::new(ApiStrategy::new(
                transport.clone(),
                base_url,
                &remote.scip_url,
                eligible_marker,
            )),
            Box::new(ScrapeStrategy::new(transport.clone(), base_url)),
            Box::new(ExportStrategy::new(transport, base_url)),
        ])
    }

    /// Runs the chain until a strategy yields rows
    pub async fn fetch_leaf_data(&self, query: &LeafQuery) -> LeafOutcome {
        let mut outcome = LeafOutcome::default();

        for strategy in &self.strategies {
            let started = Instant::now();
            let result = strategy.fetch(query).await;
            let duration = started.elapsed();

            match result {
                Ok(records) if !records.is_empty() => {
                    tracing::debug!(
                        "{} returned {} rows for {} {}",
                        strategy.id(),
                        records.len(),
                        query.location.union.id,
                        query.item.code
                    );
                    outcome.attempts.push(StrategyAttempt {
                        strategy: strategy.id(),
                        records: records.len(),
                        error: None,
                        duration,
                    });
                    outcome.records = records;
                    outcome.strategy = Some(strategy.id());
                    return outcome;
                }
                Ok(_) => {
                    tracing::debug!("{} returned no rows", strategy.id());
                    outcome.attempts.push(StrategyAttempt {
                        strategy: strategy.id(),
                        records: 0,
                        error: None,
                        duration,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        "{} failed for {} {}: {}",
                        strategy.id(),
                        query.location.union.id,
                        query.item.code,
                        e
                    );
                    outcome.attempts.push(StrategyAttempt {
                        strategy: strategy.id(),
                        records: 0,
                        error: Some(e.to_string()),
                        duration,
                    });
                }
            }
        }

        outcome
    }
}
