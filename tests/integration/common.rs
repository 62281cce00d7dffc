//! Shared fixtures: a fast test configuration and portal mocks

use lmis_harvest::config::{Config, ItemEntry, PacingConfig, WarehouseEntry};
use lmis_harvest::harvest::{Harvester, RunPlan};
use lmis_harvest::ledger::{open_ledger, ProgressLedger};
use lmis_harvest::storage::open_sink;
use std::path::Path;
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SDP_LIST: &str = "/sdplist/sdplist_Processing.php";
pub const DATASOURCE: &str = "/sdpdataviewer/form2_view_datasource.php";
pub const VIEW: &str = "/sdpdataviewer/form2_view.php";
pub const EXCEL: &str = "/sdpdataviewer/form2_view_excel.php";

/// One month, one seed warehouse, one item, no pacing, millisecond backoff
pub fn test_config(server: &MockServer, dir: &Path) -> Config {
    let mut config = Config::default();
    config.remote.base_url = format!("{}/", server.uri());
    config.remote.max_retries = 2;
    config.remote.backoff_unit_ms = 1;
    config.remote.timeout_secs = 5;
    config.harvest.start = "2023-01".to_string();
    config.harvest.end = Some("2023-01".to_string());
    config.harvest.discover_warehouses = false;
    config.harvest.probe_on_start = false;
    config.pacing = PacingConfig::none();
    config.output.root = dir.join("data").display().to_string();
    config.output.database_path = dir.join("lmis.db").display().to_string();
    config.items = vec![ItemEntry {
        code: "CON002".to_string(),
        name: "Condom".to_string(),
    }];
    config.warehouses = vec![WarehouseEntry {
        id: "WH-001".to_string(),
        name: "Test WH".to_string(),
        district: Some("Test District".to_string()),
    }];
    config
}

/// Opens sink and ledger the way `fetch` does and builds the harvester
pub fn build(config: Config, fresh: bool) -> (Harvester, RunPlan, Arc<dyn ProgressLedger>) {
    let sink = open_sink(&config).unwrap();
    let ledger = open_ledger(&config, &sink.destination(), fresh).unwrap();
    let plan = RunPlan::from_config(&config, ledger.as_ref()).unwrap();
    let harvester = Harvester::new(config, sink, ledger.clone()).unwrap();
    (harvester, plan, ledger)
}

/// Mounts one upazila (T429), one union (1) and one item tab (CON002)
pub async fn mount_hierarchy(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(SDP_LIST))
        .and(body_string_contains("operation=getSDPUPList"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"[{"upazila_id":"T429","upazila_name":"Test Upazila"}]"#),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(DATASOURCE))
        .and(body_string_contains("operation=getUnionList"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"[{"UnionCode":"1","UnionName":"Test Union"}]"#),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(DATASOURCE))
        .and(body_string_contains("operation=getItemTab"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<button id="CON002" class="btn tab">Condom</button>"#,
        ))
        .mount(server)
        .await;
}

/// Two facility rows plus the summary row the portal appends
pub fn two_row_payload() -> String {
    r#"{
        "sEcho": 2,
        "aaData": [
            ["1", "FWC Alinagar", "10", "5", "15", "0", "0", "15", "10", "5", "", "", "<img src='images/tick.png'>"],
            ["2", "Satellite Clinic", "20", "0", "20", "1", "0", "21", "6", "15", "", "", ""],
            ["", "<span class=isBold>Grand Total</span>", "30", "5", "35", "1", "0", "36", "16", "20", "", "", ""]
        ]
    }"#
    .to_string()
}

pub async fn mount_api(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path(DATASOURCE))
        .and(body_string_contains("operation=getItemlist"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// The key of the single item the fixtures describe
pub fn item_key() -> lmis_harvest::WorkUnitKey {
    lmis_harvest::WorkUnitKey::item(&"2023-01".parse().unwrap(), "WH-001", "T429", "1", "CON002")
}

pub fn batch_path(dir: &Path) -> std::path::PathBuf {
    dir.join("data/2023/01/WH-001/T429/1/CON002.json")
}
