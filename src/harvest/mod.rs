//! Harvest orchestration
//!
//! Walks period → warehouse → upazila → union → item, consulting the progress
//! ledger before every unit, pacing siblings at each level and writing
//! partial summaries as each level completes. Individual failures are
//! recorded and the traversal moves on; only initialization problems abort a
//! run.

pub mod plan;
pub mod summary;

pub use plan::{filter_warehouses, require_warehouses, RunPlan};
pub use summary::{
    LeafSummary, PeriodSummary, RunSummary, RunTotals, SubunitSummary, SummaryWriter,
    WarehouseSummary,
};

use crate::config::{Config, ParallelLevel};
use crate::discovery::{DiscoveryClient, DiscoveryError};
use crate::leaf::{LeafEngine, LeafOutcome, LeafQuery};
use crate::ledger::{run_id_for, LedgerResult, ProgressLedger};
use crate::model::{Item, Location, Period, Region, RegionLevel, WorkUnitKey};
use crate::storage::{RecordBatch, Sink, WriteOutcome};
use crate::transport::{Transport, TransportError};
use crate::{HarvestError, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Sleeps between siblings, never before the first one
#[derive(Debug)]
struct Pacer {
    delay: Duration,
    started: bool,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: false,
        }
    }

    async fn wait(&mut self) {
        if self.started && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.started = true;
    }
}

/// How a fetched item ends up in the ledger
///
/// Only rows complete an item. Anything else stays failed so the next run
/// fetches it again.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ItemDisposition {
    /// Rows to persist
    Data,
    /// Strategies answered but none returned rows
    NoData(String),
    /// Every strategy failed
    Failed(String),
}

fn disposition(outcome: &LeafOutcome) -> ItemDisposition {
    if !outcome.records.is_empty() {
        return ItemDisposition::Data;
    }
    let errors = outcome.errors();
    if !outcome.attempts.is_empty() && errors.len() == outcome.attempts.len() {
        ItemDisposition::Failed(errors.join("; "))
    } else {
        ItemDisposition::NoData(format!("no data found ({})", outcome.attempt_summary()))
    }
}

struct Inner {
    config: Config,
    transport: Arc<Transport>,
    discovery: DiscoveryClient,
    engine: LeafEngine,
    sink: Arc<dyn Sink>,
    ledger: Arc<dyn ProgressLedger>,
    catalog: Vec<Item>,
    writer: SummaryWriter,
    periods: Mutex<BTreeMap<Period, PeriodSummary>>,
    children: Mutex<HashMap<(RegionLevel, String), Vec<Region>>>,
    run_id: String,
    destination: String,
}

/// Drives a harvest run
///
/// Cheap to clone; clones share the sink, ledger and summaries.
#[derive(Clone)]
pub struct Harvester {
    inner: Arc<Inner>,
}

impl Harvester {
    /// Creates a harvester with the production strategy chain
    pub fn new(config: Config, sink: Arc<dyn Sink>, ledger: Arc<dyn ProgressLedger>) -> Result<Self> {
        let transport = Arc::new(Transport::new(&config.remote)?);
        let engine = LeafEngine::standard(
            transport.clone(),
            &config.remote,
            &config.harvest.eligible_marker,
        );
        Ok(Self::with_engine(config, transport, engine, sink, ledger))
    }

    /// Creates a harvester around an explicit strategy chain
    pub fn with_engine(
        config: Config,
        transport: Arc<Transport>,
        engine: LeafEngine,
        sink: Arc<dyn Sink>,
        ledger: Arc<dyn ProgressLedger>,
    ) -> Self {
        let fallback = config
            .warehouses
            .iter()
            .map(|w| Region::warehouse(w.id.clone(), w.name.clone()))
            .collect();
        let discovery = DiscoveryClient::new(transport.clone(), config.remote.base_url.clone(), fallback)
            .with_warehouse_discovery(config.harvest.discover_warehouses);

        let destination = sink.destination();
        let run_id = run_id_for(config.output.run_id.as_deref(), &destination);
        let catalog = config.item_catalog();
        let writer = SummaryWriter::new(Path::new(&config.output.root));

        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                discovery,
                engine,
                sink,
                ledger,
                catalog,
                writer,
                periods: Mutex::new(BTreeMap::new()),
                children: Mutex::new(HashMap::new()),
                run_id,
                destination,
            }),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn destination(&self) -> &str {
        &self.inner.destination
    }

    /// Runs the plan to completion
    ///
    /// Returns an error only when the run cannot start: the portal is
    /// unreachable or the warehouse filter matches nothing. Everything that
    /// goes wrong afterwards is recorded in the returned summary.
    pub async fn run(&self, plan: &RunPlan) -> Result<RunSummary> {
        let started_at = chrono::Utc::now().to_rfc3339();
        let config = &self.inner.config;

        if config.harvest.probe_on_start {
            self.probe().await?;
        }

        let periods = plan.effective_periods();
        if periods.is_empty() {
            tracing::warn!("No periods to harvest");
        }

        // Surface a bad filter before any work starts
        let mut prefetched = None;
        if let (Some(first), Some(filter)) = (periods.first(), plan.warehouse_filter.as_deref()) {
            let listed = self.inner.discovery.list_warehouses(first).await;
            let selected = require_warehouses(&listed, Some(filter))?;
            tracing::info!(
                "Warehouse filter '{}' selected {} of {} warehouses",
                filter,
                selected.len(),
                listed.len()
            );
            prefetched = Some(listed);
        }

        tracing::info!(
            "Starting harvest run {} over {} periods into {}",
            self.inner.run_id,
            periods.len(),
            self.inner.destination
        );

        let workers = config.harvest.workers.max(1);
        match config.harvest.parallel_level {
            ParallelLevel::Period if workers > 1 => {
                self.run_periods_concurrently(&periods, plan, prefetched, workers)
                    .await
            }
            _ => {
                let mut pacer = Pacer::new(config.pacing.warehouse());
                for (index, period) in periods.iter().enumerate() {
                    pacer.wait().await;
                    let listed = if index == 0 { prefetched.take() } else { None };
                    self.harvest_period(period, plan, listed, workers).await;
                }
            }
        }

        let mut summary = RunSummary {
            run_id: self.inner.run_id.clone(),
            destination: self.inner.destination.clone(),
            started_at,
            finished_at: Some(chrono::Utc::now().to_rfc3339()),
            errors: Vec::new(),
            totals: RunTotals::default(),
            periods: self.period_summaries(&periods),
        };
        summary.compute_totals();

        if let Err(e) = self.inner.ledger.flush() {
            tracing::error!("Could not flush progress ledger: {}", e);
            summary.errors.push(format!("ledger flush failed: {}", e));
            summary.compute_totals();
        }
        self.inner.writer.write_run_summary(&summary);

        tracing::info!(
            "Harvest complete: {} records, {} items skipped, {} errors",
            summary.totals.records,
            summary.totals.items_skipped,
            summary.totals.errors
        );
        Ok(summary)
    }

    async fn probe(&self) -> Result<()> {
        let url = &self.inner.config.remote.base_url;
        match self.inner.transport.probe(url).await {
            Ok(status) => {
                tracing::info!("Portal reachable at {} (HTTP {})", url, status);
                Ok(())
            }
            Err(e @ (TransportError::Timeout | TransportError::Connect(_))) => {
                tracing::error!("Portal unreachable at {}: {}", url, e);
                Err(HarvestError::Transport(e))
            }
            Err(e) => {
                tracing::warn!("Portal probe inconclusive at {}: {}", url, e);
                Ok(())
            }
        }
    }

    async fn run_periods_concurrently(
        &self,
        periods: &[Period],
        plan: &RunPlan,
        mut prefetched: Option<Vec<Region>>,
        workers: usize,
    ) {
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();

        for (index, period) in periods.iter().enumerate() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let harvester = self.clone();
            let period = period.clone();
            let plan = plan.clone();
            let listed = if index == 0 { prefetched.take() } else { None };
            tasks.spawn(async move {
                let _permit = permit;
                harvester.harvest_period(&period, &plan, listed, 1).await;
                period
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(period) => tracing::debug!("Period task {} finished", period),
                Err(e) => {
                    tracing::error!("Period task failed: {}", e);
                    self.record_run_error(format!("period task failed: {}", e));
                }
            }
        }
    }

    /// Harvests every selected warehouse of one period
    ///
    /// With `workers > 1` warehouses run as concurrent tasks; results are put
    /// back in listing order afterwards.
    async fn harvest_period(
        &self,
        period: &Period,
        plan: &RunPlan,
        listed: Option<Vec<Region>>,
        workers: usize,
    ) {
        let listed = match listed {
            Some(listed) => listed,
            None => self.inner.discovery.list_warehouses(period).await,
        };
        let selected = filter_warehouses(&listed, plan.warehouse_filter.as_deref());
        if selected.is_empty() {
            tracing::warn!("No warehouses selected for {}", period);
        }
        let warehouses = plan.apply_resume(period, selected);
        let order: Vec<String> = warehouses.iter().map(|w| w.id.clone()).collect();

        self.with_period(period, |summary| summary.warehouse_count = warehouses.len());
        tracing::info!(
            "Period {} ({}): {} warehouses",
            period,
            period.month_name(),
            warehouses.len()
        );

        if workers > 1 {
            let semaphore = Arc::new(Semaphore::new(workers));
            let mut tasks = JoinSet::new();
            for warehouse in warehouses {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let harvester = self.clone();
                let period = period.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    harvester.harvest_warehouse(&period, &warehouse).await
                });
            }
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(summary) => self.record_warehouse(period, summary),
                    Err(e) => {
                        tracing::error!("Warehouse task failed in {}: {}", period, e);
                        self.with_period(period, |summary| {
                            summary.errors.push(format!("warehouse task failed: {}", e))
                        });
                    }
                }
            }
        } else {
            let mut pacer = Pacer::new(self.inner.config.pacing.warehouse());
            for warehouse in &warehouses {
                // Completed warehouses are skipped without waiting
                if !self.is_done(&WorkUnitKey::warehouse(period, &warehouse.id)) {
                    pacer.wait().await;
                }
                let summary = self.harvest_warehouse(period, warehouse).await;
                self.record_warehouse(period, summary);
            }
        }

        self.with_period(period, |summary| {
            summary
                .warehouse_results
                .sort_by_key(|w| order.iter().position(|id| id == &w.id).unwrap_or(usize::MAX));
        });
        self.write_period(period);
    }

    async fn harvest_warehouse(&self, period: &Period, warehouse: &Region) -> WarehouseSummary {
        let district = self
            .inner
            .config
            .district_for(&warehouse.id, &warehouse.name);
        let mut summary = WarehouseSummary::new(warehouse, district.clone());
        let key = WorkUnitKey::warehouse(period, &warehouse.id);

        if self.is_done(&key) {
            tracing::info!("Skipping completed warehouse {} for {}", warehouse.id, period);
            summary.skipped = true;
            return summary;
        }
        self.note(&key, self.inner.ledger.mark_in_progress(&key));
        tracing::info!("Warehouse {} ({}) for {}", warehouse.name, warehouse.id, period);

        let upazilas = match self.children(warehouse, period).await {
            Ok(upazilas) => upazilas,
            Err(e) => {
                tracing::warn!("Upazila listing failed for {}: {}", warehouse.id, e);
                summary.errors.push(format!("upazila listing failed: {}", e));
                self.finish_aggregate(&key, false, &summary.errors);
                self.inner.writer.write_warehouse_log(period, &summary);
                return summary;
            }
        };
        summary.upazila_count = upazilas.len();
        if upazilas.is_empty() {
            tracing::info!("No upazilas listed for {} in {}", warehouse.id, period);
        }

        let mut pacer = Pacer::new(self.inner.config.pacing.upazila());
        for upazila in &upazilas {
            if self.is_done(&WorkUnitKey::subunit(period, &warehouse.id, &upazila.id)) {
                let mut skipped = SubunitSummary::new(upazila);
                skipped.skipped = true;
                summary.absorb(skipped);
                continue;
            }
            pacer.wait().await;
            let subunit = self
                .harvest_upazila(period, warehouse, upazila, district.as_deref())
                .await;
            summary.absorb(subunit);
            self.inner.writer.write_warehouse_log(period, &summary);
        }

        self.finish_aggregate(&key, summary.is_clean(), &summary.errors);
        self.inner.writer.write_warehouse_log(period, &summary);
        tracing::info!(
            "Warehouse {} done for {}: {} records, {} failures",
            warehouse.id,
            period,
            summary.record_count,
            summary.failures
        );
        summary
    }

    async fn harvest_upazila(
        &self,
        period: &Period,
        warehouse: &Region,
        upazila: &Region,
        district: Option<&str>,
    ) -> SubunitSummary {
        let mut summary = SubunitSummary::new(upazila);
        let key = WorkUnitKey::subunit(period, &warehouse.id, &upazila.id);
        self.note(&key, self.inner.ledger.mark_in_progress(&key));

        let unions = match self.children(upazila, period).await {
            Ok(unions) => unions,
            Err(e) => {
                tracing::warn!("Union listing failed for {}: {}", upazila.id, e);
                summary.errors.push(format!("union listing failed: {}", e));
                self.finish_aggregate(&key, false, &summary.errors);
                return summary;
            }
        };
        summary.union_count = unions.len();
        tracing::debug!("Upazila {} has {} unions", upazila.id, unions.len());

        let mut pacer = Pacer::new(self.inner.config.pacing.union());
        for union in &unions {
            let location = Location {
                warehouse: warehouse.clone(),
                upazila: upazila.clone(),
                union: union.clone(),
            };
            if self.is_done(&WorkUnitKey::leaf(period, &warehouse.id, &upazila.id, &union.id)) {
                let mut skipped = LeafSummary::new(union);
                skipped.skipped = true;
                summary.absorb(skipped);
                continue;
            }
            pacer.wait().await;
            let leaf = self.harvest_union(period, &location, district).await;
            summary.absorb(leaf);
        }

        self.finish_aggregate(&key, summary.failures == 0 && summary.errors.is_empty(), &summary.errors);
        summary
    }

    async fn harvest_union(
        &self,
        period: &Period,
        location: &Location,
        district: Option<&str>,
    ) -> LeafSummary {
        let mut summary = LeafSummary::new(&location.union);
        let key = WorkUnitKey::leaf(
            period,
            &location.warehouse.id,
            &location.upazila.id,
            &location.union.id,
        );
        self.note(&key, self.inner.ledger.mark_in_progress(&key));

        let items = self.items_for(location, period).await;
        summary.item_count = items.len();

        let mut pacer = Pacer::new(self.inner.config.pacing.item());
        for item in items {
            let item_key = WorkUnitKey::item(
                period,
                &location.warehouse.id,
                &location.upazila.id,
                &location.union.id,
                &item.code,
            );
            if self.is_done(&item_key) {
                summary.items_skipped += 1;
                continue;
            }
            pacer.wait().await;
            self.note(&item_key, self.inner.ledger.mark_in_progress(&item_key));

            let query = LeafQuery {
                period: period.clone(),
                location: location.clone(),
                item,
            };
            let outcome = self.inner.engine.fetch_leaf_data(&query).await;
            self.record_item(&item_key, &query, district, outcome, &mut summary);
        }

        self.finish_aggregate(&key, summary.failures() == 0, &summary.errors);
        summary
    }

    fn record_item(
        &self,
        key: &WorkUnitKey,
        query: &LeafQuery,
        district: Option<&str>,
        outcome: LeafOutcome,
        summary: &mut LeafSummary,
    ) {
        match disposition(&outcome) {
            ItemDisposition::Data => {
                let batch = RecordBatch::new(
                    &query.period,
                    &query.location,
                    &query.item,
                    district.map(str::to_string),
                    outcome.strategy,
                    outcome.records,
                );
                match self.inner.sink.write(&batch) {
                    Ok(WriteOutcome::Written(count)) => {
                        self.note(key, self.inner.ledger.mark_done(key, count));
                        summary.items_with_data += 1;
                        summary.record_count += count;
                    }
                    Ok(WriteOutcome::AlreadyPresent(count)) => {
                        tracing::debug!("{} already stored ({} rows)", key, count);
                        self.note(key, self.inner.ledger.mark_done(key, count));
                        summary.items_skipped += 1;
                    }
                    Err(e) => {
                        tracing::error!("Could not store {}: {}", key, e);
                        let reason = format!("{}: sink write failed: {}", query.item.code, e);
                        self.note(key, self.inner.ledger.mark_failed(key, &reason));
                        summary.items_failed += 1;
                        summary.errors.push(reason);
                    }
                }
            }
            ItemDisposition::NoData(reason) => {
                tracing::info!("No data for {}: {}", key, reason);
                self.note(key, self.inner.ledger.mark_failed(key, &reason));
                summary.items_empty += 1;
            }
            ItemDisposition::Failed(reason) => {
                tracing::warn!("All strategies failed for {}: {}", key, reason);
                let reason = format!("{}: {}", query.item.code, reason);
                self.note(key, self.inner.ledger.mark_failed(key, &reason));
                summary.items_failed += 1;
                summary.errors.push(reason);
            }
        }
    }

    /// Children of a region, falling back to an earlier period's listing when allowed
    async fn children(&self, parent: &Region, period: &Period) -> std::result::Result<Vec<Region>, DiscoveryError> {
        let result = self.inner.discovery.list_children(parent, period).await;
        let cache_key = (parent.level, parent.id.clone());

        if let Ok(children) = &result {
            if !children.is_empty() {
                if let Ok(mut cache) = self.inner.children.lock() {
                    cache.insert(cache_key, children.clone());
                }
                return result;
            }
        }

        if self.inner.config.harvest.reuse_cached_children {
            let cached = self
                .inner
                .children
                .lock()
                .ok()
                .and_then(|cache| cache.get(&cache_key).cloned());
            if let Some(cached) = cached {
                tracing::info!(
                    "Reusing {} cached children of {} {} for {}",
                    cached.len(),
                    parent.level,
                    parent.id,
                    period
                );
                return Ok(cached);
            }
        }
        result
    }

    /// Item tabs for a union, or the static catalog when the portal lists none
    async fn items_for(&self, location: &Location, period: &Period) -> Vec<Item> {
        match self
            .inner
            .discovery
            .list_available_items(location, period)
            .await
        {
            Ok(items) if !items.is_empty() => items,
            Ok(_) => {
                tracing::debug!(
                    "No item tabs for union {}, using catalog",
                    location.union.id
                );
                self.inner.catalog.clone()
            }
            Err(e) => {
                tracing::warn!(
                    "Item discovery failed for union {} ({}), using catalog",
                    location.union.id,
                    e
                );
                self.inner.catalog.clone()
            }
        }
    }

    fn is_done(&self, key: &WorkUnitKey) -> bool {
        match self.inner.ledger.is_done(key) {
            Ok(done) => done,
            Err(e) => {
                tracing::error!("Ledger lookup failed for {}: {}", key, e);
                false
            }
        }
    }

    fn note(&self, key: &WorkUnitKey, result: LedgerResult<()>) {
        if let Err(e) = result {
            tracing::error!("Ledger update failed for {}: {}", key, e);
        }
    }

    /// Marks an aggregate key done only when everything beneath it succeeded
    fn finish_aggregate(&self, key: &WorkUnitKey, clean: bool, errors: &[String]) {
        let result = if clean {
            self.inner.ledger.mark_done(key, 0)
        } else {
            let reason = match errors.first() {
                Some(first) => first.clone(),
                None => "one or more units beneath failed".to_string(),
            };
            self.inner.ledger.mark_failed(key, &reason)
        };
        self.note(key, result);
    }

    fn with_period<F>(&self, period: &Period, f: F)
    where
        F: FnOnce(&mut PeriodSummary),
    {
        match self.inner.periods.lock() {
            Ok(mut periods) => f(periods
                .entry(period.clone())
                .or_insert_with(|| PeriodSummary::new(period))),
            Err(_) => tracing::error!("Period summaries lock poisoned"),
        }
    }

    fn record_warehouse(&self, period: &Period, summary: WarehouseSummary) {
        self.with_period(period, |p| p.upsert(summary));
        self.write_period(period);
    }

    fn write_period(&self, period: &Period) {
        let snapshot = self
            .inner
            .periods
            .lock()
            .ok()
            .and_then(|periods| periods.get(period).cloned());
        if let Some(snapshot) = snapshot {
            self.inner.writer.write_period_summary(period, &snapshot);
        }
    }

    fn record_run_error(&self, message: String) {
        if let Some(first) = self
            .inner
            .periods
            .lock()
            .ok()
            .and_then(|periods| periods.keys().next().cloned())
        {
            self.with_period(&first, |summary| summary.errors.push(message));
        } else {
            tracing::error!("{}", message);
        }
    }

    fn period_summaries(&self, periods: &[Period]) -> Vec<PeriodSummary> {
        let Ok(map) = self.inner.periods.lock() else {
            return Vec::new();
        };
        periods
            .iter()
            .map(|p| map.get(p).cloned().unwrap_or_else(|| PeriodSummary::new(p)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::StrategyAttempt;
    use crate::model::DataRecord;

    fn attempt(strategy: &'static str, error: Option<&str>) -> StrategyAttempt {
        StrategyAttempt {
            strategy,
            records: 0,
            error: error.map(str::to_string),
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_disposition_with_rows() {
        let outcome = LeafOutcome {
            records: vec![DataRecord::default()],
            strategy: Some("api"),
            attempts: vec![attempt("api", None)],
        };
        assert_eq!(disposition(&outcome), ItemDisposition::Data);
    }

    #[test]
    fn test_disposition_empty_answer_is_no_data() {
        let outcome = LeafOutcome {
            records: Vec::new(),
            strategy: None,
            attempts: vec![
                attempt("api", Some("timeout")),
                attempt("scrape", None),
                attempt("export", None),
            ],
        };
        match disposition(&outcome) {
            ItemDisposition::NoData(reason) => {
                assert!(reason.starts_with("no data found"));
                assert!(reason.contains("api: timeout"));
                assert!(reason.contains("scrape: no rows"));
            }
            other => panic!("unexpected disposition {:?}", other),
        }
    }

    #[test]
    fn test_disposition_all_errors_is_a_failure() {
        let outcome = LeafOutcome {
            records: Vec::new(),
            strategy: None,
            attempts: vec![attempt("api", Some("timeout")), attempt("scrape", Some("503"))],
        };
        match disposition(&outcome) {
            ItemDisposition::Failed(reason) => {
                assert!(reason.contains("api: timeout"));
                assert!(reason.contains("scrape: 503"));
            }
            other => panic!("unexpected disposition {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pacer_skips_first_wait() {
        let mut pacer = Pacer::new(Duration::from_millis(200));
        let start = std::time::Instant::now();
        pacer.wait().await;
        assert!(start.elapsed() < Duration::from_millis(200));
        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
