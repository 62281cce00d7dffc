//! Region and item discovery
//!
//! Asks the portal which warehouses, upazilas, unions and item tabs exist for
//! a period, and normalizes whatever shape comes back into [`Region`]s and
//! [`Item`]s.

pub mod shapes;

use crate::model::{Item, Location, Period, Region, RegionLevel};
use crate::transport::{endpoint, paths, Request, Transport, TransportError};
use crate::ParseError;
use shapes::{normalize_listing, parse_item_buttons, ListingShape};
use std::sync::Arc;
use thiserror::Error;

/// Errors from a discovery request
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Client for the portal's listing endpoints
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    transport: Arc<Transport>,
    base_url: String,
    fallback_warehouses: Vec<Region>,
    discover_warehouses: bool,
}

impl DiscoveryClient {
    pub fn new(
        transport: Arc<Transport>,
        base_url: impl Into<String>,
        fallback_warehouses: Vec<Region>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            fallback_warehouses,
            discover_warehouses: true,
        }
    }

    /// Skip the remote warehouse listing and use the seed list directly
    pub fn with_warehouse_discovery(mut self, enabled: bool) -> Self {
        self.discover_warehouses = enabled;
        self
    }

    pub fn fallback_warehouses(&self) -> &[Region] {
        &self.fallback_warehouses
    }

    /// Lists the warehouses for a period
    ///
    /// Falls back to the seed list when the request fails, the payload is
    /// unrecognized or the listing is empty.
    pub async fn list_warehouses(&self, period: &Period) -> Vec<Region> {
        if !self.discover_warehouses {
            return self.fallback_warehouses.clone();
        }

        let request = match endpoint(&self.base_url, paths::SDP_LIST) {
            Ok(url) => Request::post(url)
                .param("operation", "getWHList")
                .param("Year", period.year.as_str())
                .param("Month", period.month.as_str()),
            Err(e) => {
                tracing::warn!("Warehouse listing unavailable: {}", e);
                return self.fallback_warehouses.clone();
            }
        };

        match self.fetch_listing(&request, RegionLevel::Warehouse, None).await {
            Ok(regions) if !regions.is_empty() => {
                tracing::info!("Discovered {} warehouses for {}", regions.len(), period);
                regions
            }
            Ok(_) => {
                tracing::info!(
                    "No warehouses listed for {}, using {} seed warehouses",
                    period,
                    self.fallback_warehouses.len()
                );
                self.fallback_warehouses.clone()
            }
            Err(e) => {
                tracing::warn!(
                    "Warehouse discovery failed for {} ({}), using seed list",
                    period,
                    e
                );
                self.fallback_warehouses.clone()
            }
        }
    }

    /// Lists the children of a region for a period
    ///
    /// Unions have no children. An empty list is a normal answer; the caller
    /// decides whether to skip or reuse cached children.
    pub async fn list_children(
        &self,
        parent: &Region,
        period: &Period,
    ) -> Result<Vec<Region>, DiscoveryError> {
        let request = match parent.level {
            RegionLevel::Warehouse => Request::post(endpoint(&self.base_url, paths::SDP_LIST)?)
                .param("operation", "getSDPUPList")
                .param("Year", period.year.as_str())
                .param("Month", period.month.as_str())
                .param("gWRHId", parent.id.as_str())
                .param("gDistId", "All"),
            RegionLevel::Upazila => Request::post(endpoint(&self.base_url, paths::DATASOURCE)?)
                .param("operation", "getUnionList")
                .param("Year", period.year.as_str())
                .param("Month", period.month.as_str())
                .param("upcode", parent.id.as_str()),
            RegionLevel::Union => return Ok(Vec::new()),
        };

        let Some(level) = parent.level.child() else {
            return Ok(Vec::new());
        };
        self.fetch_listing(&request, level, Some(&parent.id)).await
    }

    /// Lists the item tabs available for a union
    ///
    /// An empty list is normal; the caller falls back to the static catalog.
    pub async fn list_available_items(
        &self,
        location: &Location,
        period: &Period,
    ) -> Result<Vec<Item>, DiscoveryError> {
        let request = Request::post(endpoint(&self.base_url, paths::DATASOURCE)?)
            .param("operation", "getItemTab")
            .param("Year", period.year.as_str())
            .param("Month", period.month.as_str())
            .param("UPNameList", location.upazila.id.as_str())
            .param("WHListAll", location.warehouse.id.as_str())
            .param("DistrictList", "All")
            .param("UnionList", location.union.id.as_str())
            .param("itemCode", "");

        let response = self.transport.execute(&request).await?;
        let items = parse_item_buttons(&response.text());
        tracing::debug!(
            "{} item tabs for union {} in {}",
            items.len(),
            location.union.id,
            period
        );
        Ok(items)
    }

    async fn fetch_listing(
        &self,
        request: &Request,
        level: RegionLevel,
        parent_id: Option<&str>,
    ) -> Result<Vec<Region>, DiscoveryError> {
        let response = self.transport.execute(request).await?;
        let body = response.text();

        let (listings, shape) = normalize_listing(&body).map_err(|e| {
            tracing::warn!("Could not parse {} listing: {}", level, e);
            e
        })?;
        if shape == ListingShape::RegexFallback {
            tracing::debug!("{} listing recovered by regex fallback", level);
        }

        Ok(listings
            .into_iter()
            .map(|l| {
                let region = Region::new(level, l.id, l.name);
                match parent_id {
                    Some(parent) => region.with_parent(parent),
                    None => region,
                }
            })
            .collect())
    }
}
