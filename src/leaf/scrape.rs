//! HTML scrape strategy
//!
//! Renders the report page with the same parameters and reads its data table.
//! Rows scraped here are always marked eligible: the rendered page does not
//! carry the eligibility image reliably, so the scrape trusts the listing.

use super::{LeafQuery, LeafStrategy, StrategyError};
use crate::markup::clean_text;
use crate::model::DataRecord;
use crate::transport::{endpoint, paths, Request, Transport};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;

/// Rows with fewer cells are layout rows, not facilities
pub const MIN_CELLS: usize = 8;

/// A heuristic table needs more header cells than this
const MIN_HEADER_CELLS: usize = 5;

pub struct ScrapeStrategy {
    transport: Arc<Transport>,
    base_url: String,
}

impl ScrapeStrategy {
    pub fn new(transport: Arc<Transport>, base_url: &str) -> Self {
        Self {
            transport,
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl LeafStrategy for ScrapeStrategy {
    fn id(&self) -> &'static str {
        "scrape"
    }

    async fn fetch(&self, query: &LeafQuery) -> Result<Vec<DataRecord>, StrategyError> {
        let mut request = Request::get(endpoint(&self.base_url, paths::VIEW)?);
        request.params = query.view_params();
        let response = self.transport.execute(&request).await?;
        Ok(parse_table(&response.text()))
    }
}

fn locate_table(document: &Html) -> Option<ElementRef<'_>> {
    let by_id = Selector::parse("table#example").ok()?;
    if let Some(table) = document.select(&by_id).next() {
        return Some(table);
    }

    let tables = Selector::parse("table").ok()?;
    let thead = Selector::parse("thead").ok()?;
    let tbody = Selector::parse("tbody").ok()?;
    let th = Selector::parse("th").ok()?;
    document.select(&tables).find(|table| {
        table.select(&thead).next().is_some()
            && table.select(&tbody).next().is_some()
            && table.select(&th).count() > MIN_HEADER_CELLS
    })
}

/// Extracts facility rows from the report page
///
/// Returns an empty list when no suitable table exists. Missing trailing
/// cells take defaults: `"0"` for counts, `total` for `grand_total` and empty
/// stock-out fields.
pub fn parse_table(html: &str) -> Vec<DataRecord> {
    let document = Html::parse_document(html);
    let Some(table) = locate_table(&document) else {
        tracing::warn!("No data table found in report page");
        return Vec::new();
    };
    let (Ok(row_selector), Ok(cell_selector)) = (Selector::parse("tbody tr"), Selector::parse("td"))
    else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for row in table.select(&row_selector) {
        let row_text: String = row.text().collect();
        if row_text.contains("Grand Total") {
            continue;
        }

        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|cell| clean_text(&cell.text().collect::<String>()))
            .collect();
        if cells.len() < MIN_CELLS {
            continue;
        }

        let or = |i: usize, default: &str| {
            cells
                .get(i)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };
        records.push(DataRecord {
            serial: cells[0].clone(),
            facility: cells[1].clone(),
            opening_balance: cells[2].clone(),
            received: cells[3].clone(),
            total: cells[4].clone(),
            adj_plus: or(5, "0"),
            adj_minus: or(6, "0"),
            grand_total: or(7, &cells[4]),
            distribution: or(8, "0"),
            closing_balance: or(9, "0"),
            stock_out_reason: or(10, ""),
            stock_out_days: or(11, ""),
            eligible: true,
        });
    }

    records
}
