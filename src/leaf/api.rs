//! Structured API strategy
//!
//! Posts the DataTables request the report page itself issues and maps the
//! positional `aaData` rows onto [`DataRecord`]s.

use super::{LeafQuery, LeafStrategy, StrategyError};
use crate::markup::{clean_text, contains_marker};
use crate::model::DataRecord;
use crate::transport::{endpoint, paths, Request, Transport};
use crate::ParseError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Number of positional cells in an `aaData` row
pub const AA_DATA_COLUMNS: usize = 13;

/// Index of the cell holding the eligibility image
const ELIGIBLE_CELL: usize = 12;

pub struct ApiStrategy {
    transport: Arc<Transport>,
    base_url: String,
    /// Sent as `baseURL`; the datasource builds its links from it
    scip_url: String,
    eligible_marker: String,
}

impl ApiStrategy {
    pub fn new(
        transport: Arc<Transport>,
        base_url: &str,
        scip_url: &str,
        eligible_marker: &str,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.to_string(),
            scip_url: scip_url.to_string(),
            eligible_marker: eligible_marker.to_string(),
        }
    }

    fn request(&self, query: &LeafQuery) -> Result<Request, StrategyError> {
        Ok(Request::post(endpoint(&self.base_url, paths::DATASOURCE)?)
            .param("operation", "getItemlist")
            .param("sEcho", "2")
            .param("iColumns", AA_DATA_COLUMNS.to_string())
            .param("sColumns", "")
            .param("iDisplayStart", "0")
            .param("iDisplayLength", "-1")
            .param("Year", query.period.year.as_str())
            .param("Month", query.period.month.as_str())
            .param("Item", query.item.code.as_str())
            .param("UPNameList", query.location.upazila.id.as_str())
            .param("UnionList", query.location.union.id.as_str())
            .param("WHListAll", query.location.warehouse.id.as_str())
            .param("DistrictList", "All")
            .param("baseURL", self.scip_url.as_str()))
    }
}

#[async_trait]
impl LeafStrategy for ApiStrategy {
    fn id(&self) -> &'static str {
        "api"
    }

    async fn fetch(&self, query: &LeafQuery) -> Result<Vec<DataRecord>, StrategyError> {
        let response = self.transport.execute(&self.request(query)?).await?;
        Ok(parse_aa_data(&response.text(), &self.eligible_marker)?)
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Maps a DataTables `aaData` payload onto records
///
/// Cells are positional; missing trailing cells become empty strings. The
/// summary row (empty first cell, "Grand Total" in the second) is dropped.
/// `eligible` is true only when the raw last cell contains `marker`.
pub fn parse_aa_data(body: &str, marker: &str) -> Result<Vec<DataRecord>, ParseError> {
    let payload: Value = serde_json::from_str(body.trim_start_matches('\u{feff}'))?;
    let rows = payload
        .get("aaData")
        .and_then(Value::as_array)
        .ok_or(ParseError::MissingField("aaData"))?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(cells) = row.as_array() else {
            continue;
        };
        let raw: Vec<String> = (0..AA_DATA_COLUMNS)
            .map(|i| cells.get(i).map(cell_text).unwrap_or_default())
            .collect();

        if clean_text(&raw[0]).is_empty() && raw[1].contains("Grand Total") {
            continue;
        }

        let record = DataRecord {
            serial: raw[0].clone(),
            facility: raw[1].clone(),
            opening_balance: raw[2].clone(),
            received: raw[3].clone(),
            total: raw[4].clone(),
            adj_plus: raw[5].clone(),
            adj_minus: raw[6].clone(),
            grand_total: raw[7].clone(),
            distribution: raw[8].clone(),
            closing_balance: raw[9].clone(),
            stock_out_reason: raw[10].clone(),
            stock_out_days: raw[11].clone(),
            eligible: contains_marker(&raw[ELIGIBLE_CELL], marker),
        };
        records.push(record.sanitize());
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "sEcho": 2,
        "aaData": [
            ["1", "FWC Alinagar", "10", "5", "15", "0", "0", "15", "10", "5", "", "", "<img src='images/tick.png'>"],
            ["2", "<a href='#'>Satellite &amp; Clinic</a>", 20, 0, 20, 1, 0, 21, 6, 15, "", "", ""],
            ["", "<span class=isBold>Grand Total</span>", "<span class=isBold>30</span>", "5", "35", "1", "0", "36", "16", "20", "", "", ""]
        ]
    }"#;

    #[test]
    fn test_grand_total_row_is_excluded() {
        let records = parse_aa_data(PAYLOAD, "tick.png").unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.facility.contains("Grand Total")));
    }

    #[test]
    fn test_positional_mapping_and_markup() {
        let records = parse_aa_data(PAYLOAD, "tick.png").unwrap();

        let first = &records[0];
        assert_eq!(first.serial, "1");
        assert_eq!(first.facility, "FWC Alinagar");
        assert_eq!(first.grand_total, "15");
        assert_eq!(first.closing_balance, "5");
        assert!(first.eligible);

        let second = &records[1];
        assert_eq!(second.facility, "Satellite & Clinic");
        assert_eq!(second.opening_balance, "20");
        assert_eq!(second.adj_plus, "1");
        assert!(!second.eligible);
    }

    #[test]
    fn test_short_rows_padded_with_empty_cells() {
        let records = parse_aa_data(r#"{"aaData":[["7","Short row","3"]]}"#, "tick.png").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].opening_balance, "3");
        assert_eq!(records[0].received, "");
        assert!(!records[0].eligible);
    }

    #[test]
    fn test_custom_marker() {
        let body = r#"{"aaData":[["1","F","","","","","","","","","","","<img src='ok.gif'>"]]}"#;
        assert!(parse_aa_data(body, "ok.gif").unwrap()[0].eligible);
        assert!(!parse_aa_data(body, "tick.png").unwrap()[0].eligible);
    }

    #[test]
    fn test_request_carries_scip_base() {
        use crate::config::RemoteConfig;
        use crate::model::{Item, Location, Region, RegionLevel};

        let transport = Arc::new(Transport::new(&RemoteConfig::default()).unwrap());
        let strategy = ApiStrategy::new(
            transport,
            "https://lmis.example/reports/",
            "https://scip.example/scip/",
            "tick.png",
        );
        let query = LeafQuery {
            period: "2023-01".parse().unwrap(),
            location: Location {
                warehouse: Region::warehouse("WH-001", "Test WH"),
                upazila: Region::new(RegionLevel::Upazila, "T429", "Upazila"),
                union: Region::new(RegionLevel::Union, "1", "Union"),
            },
            item: Item::new("CON002", "Condom"),
        };

        let request = strategy.request(&query).unwrap();
        assert!(request.url.ends_with("sdpdataviewer/form2_view_datasource.php"));
        let base = request.params.iter().find(|(k, _)| k == "baseURL").map(|(_, v)| v.as_str());
        assert_eq!(base, Some("https://scip.example/scip/"));
    }

    #[test]
    fn test_empty_and_malformed_payloads() {
        assert!(parse_aa_data(r#"{"aaData":[]}"#, "tick.png").unwrap().is_empty());
        assert!(matches!(
            parse_aa_data(r#"{"data":[]}"#, "tick.png"),
            Err(ParseError::MissingField("aaData"))
        ));
        assert!(matches!(
            parse_aa_data("<html></html>", "tick.png"),
            Err(ParseError::Json(_))
        ));
    }
}
