//! Static catalogs used when the portal cannot be asked
//!
//! The item list mirrors the report's commodity tabs; the warehouse list is the
//! seed used when warehouse discovery fails or is disabled.

use super::Item;

/// A warehouse entry from the seed list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseSeed {
    pub id: &'static str,
    pub name: &'static str,
    pub district: &'static str,
}

const ITEMS: [(&str, &str); 12] = [
    ("CON008", "Shukhi"),
    ("CON010", "Shukhi (3rd Gen)"),
    ("CON008+CON010", "Oral Pill (Total)"),
    ("CON009", "Oral Pill Apon"),
    ("CON002", "Condom"),
    ("CON006", "Injectables (Vials)"),
    ("CON001", "AD Syringe (1ML)"),
    ("CON003", "ECP"),
    ("MCH021", "Tab. Misoprostol (Dose)"),
    ("MCH051", "7.1% CHLOROHEXIDINE"),
    ("MCH012", "MNP(SUSSET)"),
    ("MCH018", "Iron-Folic Acid (NOS)"),
];

const WAREHOUSES: [WarehouseSeed; 23] = [
    WarehouseSeed { id: "WH-011", name: "Bandarban RWH", district: "Bandarban" },
    WarehouseSeed { id: "WH-022", name: "Barishal RWH", district: "Barishal" },
    WarehouseSeed { id: "WH-001", name: "Bhola RWH", district: "Bhola" },
    WarehouseSeed { id: "WH-018", name: "Bogura RWH", district: "Bogura" },
    WarehouseSeed { id: "WH-019", name: "Chattogram RWH", district: "Chattogram" },
    WarehouseSeed { id: "WH-020", name: "Cox's Bazar RWH", district: "Cox's Bazar" },
    WarehouseSeed { id: "WH-014", name: "Cumilla RWH", district: "Cumilla" },
    WarehouseSeed { id: "WH-002", name: "Dhaka CWH", district: "Dhaka" },
    WarehouseSeed { id: "WH-021", name: "Dinajpur RWH", district: "Dinajpur" },
    WarehouseSeed { id: "WH-003", name: "Faridpur RWH", district: "Faridpur" },
    WarehouseSeed { id: "WH-004", name: "Jamalpur RWH", district: "Jamalpur" },
    WarehouseSeed { id: "WH-005", name: "Jashore RWH", district: "Jashore" },
    WarehouseSeed { id: "WH-006", name: "Khulna RWH", district: "Khulna" },
    WarehouseSeed { id: "WH-007", name: "Kushtia RWH", district: "Kushtia" },
    WarehouseSeed { id: "WH-008", name: "Mymensingh RWH", district: "Mymensingh" },
    WarehouseSeed { id: "WH-009", name: "Noakhali RWH", district: "Noakhali" },
    WarehouseSeed { id: "WH-010", name: "Pabna RWH", district: "Pabna" },
    WarehouseSeed { id: "WH-012", name: "Patuakhali RWH", district: "Patuakhali" },
    WarehouseSeed { id: "WH-013", name: "Rajshahi RWH", district: "Rajshahi" },
    WarehouseSeed { id: "WH-015", name: "Rangamati RWH", district: "Rangamati" },
    WarehouseSeed { id: "WH-016", name: "Rangpur RWH", district: "Rangpur" },
    WarehouseSeed { id: "WH-017", name: "Sylhet RWH", district: "Sylhet" },
    WarehouseSeed { id: "WH-023", name: "Tangail RWH", district: "Tangail" },
];

/// The twelve commodity tabs of the Form 2 report
pub fn default_items() -> Vec<Item> {
    ITEMS
        .iter()
        .map(|(code, name)| Item::new(*code, *name))
        .collect()
}

/// The warehouse seed list
pub fn default_warehouses() -> &'static [WarehouseSeed] {
    &WAREHOUSES
}

/// Looks up a district for a warehouse by id or by display name
pub fn district_for(warehouse_id: &str, warehouse_name: &str) -> Option<&'static str> {
    WAREHOUSES
        .iter()
        .find(|w| w.id == warehouse_id)
        .or_else(|| {
            WAREHOUSES
                .iter()
                .find(|w| w.name.eq_ignore_ascii_case(warehouse_name.trim()))
        })
        .map(|w| w.district)
}
