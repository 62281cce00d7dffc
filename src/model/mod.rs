//! Domain model shared by every stage of the harvest
//!
//! Periods, region nodes, item descriptors, the canonical stock row and the
//! composite key the progress ledger uses to identify a unit of work.

pub mod catalog;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use catalog::{default_items, default_warehouses, WarehouseSeed};

/// Error returned when a `YYYY-MM` period string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not a valid YYYY-MM period")]
pub struct PeriodParseError(pub String);

/// A reporting month
///
/// Both parts are kept as the zero-padded strings the portal expects.
/// Ordering compares the numeric (year, month) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: String,
    pub month: String,
}

impl Period {
    /// Builds a period from numeric parts, validating the month
    pub fn new(year: u32, month: u32) -> Result<Self, PeriodParseError> {
        if !(1000..=9999).contains(&year) || !(1..=12).contains(&month) {
            return Err(PeriodParseError(format!("{}-{}", year, month)));
        }
        Ok(Self {
            year: format!("{:04}", year),
            month: format!("{:02}", month),
        })
    }

    fn parts(&self) -> (u32, u32) {
        (
            self.year.parse().unwrap_or_default(),
            self.month.parse().unwrap_or_default(),
        )
    }

    /// Returns the following month
    pub fn next(&self) -> Self {
        let (year, month) = self.parts();
        if month >= 12 {
            Self {
                year: format!("{:04}", year + 1),
                month: "01".to_string(),
            }
        } else {
            Self {
                year: self.year.clone(),
                month: format!("{:02}", month + 1),
            }
        }
    }

    /// Generates every month from `start` to `end`, both inclusive
    ///
    /// An inverted range yields an empty list.
    pub fn range(start: &Period, end: &Period) -> Vec<Period> {
        let last = end.parts();
        let mut periods = Vec::new();
        let mut current = start.clone();
        while current.parts() <= last {
            let next = current.next();
            periods.push(current);
            current = next;
        }
        periods
    }

    /// English month name, e.g. "January"
    pub fn month_name(&self) -> &'static str {
        let (_, month) = self.parts();
        u8::try_from(month)
            .ok()
            .and_then(|m| chrono::Month::try_from(m).ok())
            .map(|m| m.name())
            .unwrap_or("Unknown")
    }
}

impl FromStr for Period {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| PeriodParseError(s.to_string()))?;
        if year.len() != 4 || month.is_empty() || month.len() > 2 {
            return Err(PeriodParseError(s.to_string()));
        }
        let year: u32 = year.parse().map_err(|_| PeriodParseError(s.to_string()))?;
        let month: u32 = month.parse().map_err(|_| PeriodParseError(s.to_string()))?;
        Period::new(year, month).map_err(|_| PeriodParseError(s.to_string()))
    }
}

impl Ord for Period {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts().cmp(&other.parts())
    }
}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.month)
    }
}

/// Level of a node in the administrative hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionLevel {
    Warehouse,
    Upazila,
    Union,
}

impl RegionLevel {
    /// The level whose nodes are discovered beneath this one
    pub fn child(&self) -> Option<RegionLevel> {
        match self {
            Self::Warehouse => Some(Self::Upazila),
            Self::Upazila => Some(Self::Union),
            Self::Union => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warehouse => "warehouse",
            Self::Upazila => "upazila",
            Self::Union => "union",
        }
    }
}

impl fmt::Display for RegionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A warehouse, upazila or union as reported by the portal
///
/// `parent_id` only identifies the parent for lookups; regions are rebuilt
/// from remote listings for every period.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub level: RegionLevel,
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

impl Region {
    pub fn new(level: RegionLevel, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            level,
            id: id.into(),
            name: crate::markup::clean_text(&name.into()),
            parent_id: None,
        }
    }

    pub fn warehouse(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(RegionLevel::Warehouse, id, name)
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// A commodity tab on the report page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub code: String,
    pub name: String,
}

impl Item {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// Fully qualified position of a union in the hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub warehouse: Region,
    pub upazila: Region,
    pub union: Region,
}

/// One facility row of the Form 2 stock table
///
/// Numeric columns stay textual: the portal renders them as decorated strings
/// and the converter downstream keeps them verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRecord {
    pub serial: String,
    pub facility: String,
    pub opening_balance: String,
    pub received: String,
    pub total: String,
    pub adj_plus: String,
    pub adj_minus: String,
    pub grand_total: String,
    pub distribution: String,
    pub closing_balance: String,
    pub stock_out_reason: String,
    pub stock_out_days: String,
    pub eligible: bool,
}

impl DataRecord {
    /// Names of the textual columns, in table order
    pub const TEXT_COLUMNS: [&'static str; 12] = [
        "serial",
        "facility",
        "opening_balance",
        "received",
        "total",
        "adj_plus",
        "adj_minus",
        "grand_total",
        "distribution",
        "closing_balance",
        "stock_out_reason",
        "stock_out_days",
    ];

    /// Mutable references to every textual field, in table order
    pub fn text_fields_mut(&mut self) -> [&mut String; 12] {
        [
            &mut self.serial,
            &mut self.facility,
            &mut self.opening_balance,
            &mut self.received,
            &mut self.total,
            &mut self.adj_plus,
            &mut self.adj_minus,
            &mut self.grand_total,
            &mut self.distribution,
            &mut self.closing_balance,
            &mut self.stock_out_reason,
            &mut self.stock_out_days,
        ]
    }

    /// Strips markup and decodes entities in every textual field
    pub fn sanitize(mut self) -> Self {
        for field in self.text_fields_mut() {
            *field = crate::markup::clean_text(field);
        }
        self
    }
}

/// Composite identity of a unit of work
///
/// Trailing `None`s denote aggregate entries: a key with only a warehouse id
/// stands for the whole warehouse-month.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkUnitKey {
    pub period: Period,
    pub warehouse_id: String,
    pub subunit_id: Option<String>,
    pub leaf_id: Option<String>,
    pub item_code: Option<String>,
}

impl WorkUnitKey {
    pub fn warehouse(period: &Period, warehouse_id: &str) -> Self {
        Self {
            period: period.clone(),
            warehouse_id: warehouse_id.to_string(),
            subunit_id: None,
            leaf_id: None,
            item_code: None,
        }
    }

    pub fn subunit(period: &Period, warehouse_id: &str, subunit_id: &str) -> Self {
        Self {
            subunit_id: Some(subunit_id.to_string()),
            ..Self::warehouse(period, warehouse_id)
        }
    }

    pub fn leaf(period: &Period, warehouse_id: &str, subunit_id: &str, leaf_id: &str) -> Self {
        Self {
            leaf_id: Some(leaf_id.to_string()),
            ..Self::subunit(period, warehouse_id, subunit_id)
        }
    }

    pub fn item(
        period: &Period,
        warehouse_id: &str,
        subunit_id: &str,
        leaf_id: &str,
        item_code: &str,
    ) -> Self {
        Self {
            item_code: Some(item_code.to_string()),
            ..Self::leaf(period, warehouse_id, subunit_id, leaf_id)
        }
    }

    /// True for warehouse-month entries
    pub fn is_warehouse_level(&self) -> bool {
        self.subunit_id.is_none() && self.leaf_id.is_none() && self.item_code.is_none()
    }

    /// True for entries naming a single item
    pub fn is_item_level(&self) -> bool {
        self.item_code.is_some()
    }
}

impl fmt::Display for WorkUnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |p: &Option<String>| p.clone().unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.period,
            self.warehouse_id,
            part(&self.subunit_id),
            part(&self.leaf_id),
            part(&self.item_code)
        )
    }
}

impl FromStr for WorkUnitKey {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(5, '/').collect();
        if parts.len() != 5 || parts[1].is_empty() {
            return Err(PeriodParseError(s.to_string()));
        }
        let opt = |p: &str| (p != "-").then(|| p.to_string());
        Ok(Self {
            period: parts[0].parse()?,
            warehouse_id: parts[1].to_string(),
            subunit_id: opt(parts[2]),
            leaf_id: opt(parts[3]),
            item_code: opt(parts[4]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    #[test]
    fn test_period_parse_and_display() {
        let period = p("2023-1");
        assert_eq!(period.year, "2023");
        assert_eq!(period.month, "01");
        assert_eq!(period.to_string(), "2023-01");
        assert_eq!(period.month_name(), "January");
    }

    #[test]
    fn test_period_parse_rejects_garbage() {
        assert!("2023".parse::<Period>().is_err());
        assert!("2023-13".parse::<Period>().is_err());
        assert!("23-01".parse::<Period>().is_err());
        assert!("abcd-01".parse::<Period>().is_err());
    }

    #[test]
    fn test_period_range_crosses_year() {
        let periods = Period::range(&p("2016-11"), &p("2017-02"));
        let labels: Vec<String> = periods.iter().map(|p| p.to_string()).collect();
        assert_eq!(labels, vec!["2016-11", "2016-12", "2017-01", "2017-02"]);
    }

    #[test]
    fn test_period_range_single_and_inverted() {
        assert_eq!(Period::range(&p("2023-01"), &p("2023-01")).len(), 1);
        assert!(Period::range(&p("2023-02"), &p("2023-01")).is_empty());
    }

    #[test]
    fn test_period_ordering() {
        assert!(p("2016-12") < p("2017-01"));
        assert!(p("2017-02") > p("2017-01"));
    }

    #[test]
    fn test_period_range_ends_at_last_representable_month() {
        let last = p("9999-12");
        assert!(last.next() > last);

        let periods = Period::range(&p("9999-11"), &last);
        let labels: Vec<String> = periods.iter().map(|p| p.to_string()).collect();
        assert_eq!(labels, vec!["9999-11", "9999-12"]);
    }

    #[test]
    fn test_region_name_is_decoded() {
        let region = Region::warehouse("WH-020", "Cox&#039;s Bazar RWH");
        assert_eq!(region.name, "Cox's Bazar RWH");
    }

    #[test]
    fn test_work_unit_key_string_form() {
        let key = WorkUnitKey::item(&p("2023-01"), "WH-001", "T429", "1", "CON008+CON010");
        let text = key.to_string();
        assert_eq!(text, "2023-01/WH-001/T429/1/CON008+CON010");
        assert_eq!(text.parse::<WorkUnitKey>().unwrap(), key);

        let aggregate = WorkUnitKey::warehouse(&p("2023-01"), "WH-001");
        assert_eq!(aggregate.to_string(), "2023-01/WH-001/-/-/-");
        assert!(aggregate.is_warehouse_level());
        assert_eq!(aggregate.to_string().parse::<WorkUnitKey>().unwrap(), aggregate);
    }

    #[test]
    fn test_record_sanitize_strips_markup() {
        let record = DataRecord {
            facility: "<span class=isBold>FWC &amp; Clinic</span>".to_string(),
            opening_balance: " <b>10</b> ".to_string(),
            ..Default::default()
        }
        .sanitize();
        assert_eq!(record.facility, "FWC & Clinic");
        assert_eq!(record.opening_balance, "10");
    }
}
