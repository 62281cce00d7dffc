//! Listing discovery against mocked portal payloads

use crate::common::{test_config, DATASOURCE, SDP_LIST};
use lmis_harvest::discovery::DiscoveryClient;
use lmis_harvest::model::{Location, Period, Region, RegionLevel};
use lmis_harvest::transport::Transport;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, dir: &TempDir, discover: bool) -> DiscoveryClient {
    let config = test_config(server, dir.path());
    let transport = Arc::new(Transport::new(&config.remote).unwrap());
    DiscoveryClient::new(
        transport,
        config.remote.base_url.clone(),
        vec![Region::warehouse("WH-001", "Test WH")],
    )
    .with_warehouse_discovery(discover)
}

fn period() -> Period {
    "2023-01".parse().unwrap()
}

async fn mount_union_list(server: &MockServer, upcode: &str, body: &str) {
    Mock::given(method("POST"))
        .and(path(DATASOURCE))
        .and(body_string_contains("operation=getUnionList"))
        .and(body_string_contains(format!("upcode={}", upcode)))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_three_listing_shapes_normalize_identically() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_union_list(
        &server,
        "U1",
        r#"[{"UnionCode":"1","UnionName":"Alinagar"},{"UnionCode":"2","UnionName":"Bapta"}]"#,
    )
    .await;
    mount_union_list(
        &server,
        "U2",
        r#"{"data":[{"id":"1","name":"Alinagar"},{"id":"2","name":"Bapta"}]}"#,
    )
    .await;
    mount_union_list(
        &server,
        "U3",
        r#"<option value="">Select</option><option value="1">Alinagar</option><option value="2">Bapta</option>"#,
    )
    .await;

    let discovery = client(&server, &dir, true);
    let mut results = Vec::new();
    for upcode in ["U1", "U2", "U3"] {
        let upazila = Region::new(RegionLevel::Upazila, upcode, "Test Upazila");
        let unions = discovery.list_children(&upazila, &period()).await.unwrap();
        let pairs: Vec<(String, String)> = unions.iter().map(|u| (u.id.clone(), u.name.clone())).collect();
        assert!(unions.iter().all(|u| u.level == RegionLevel::Union));
        assert!(unions.iter().all(|u| u.parent_id.as_deref() == Some(upcode)));
        results.push(pairs);
    }

    assert_eq!(
        results[0],
        vec![
            ("1".to_string(), "Alinagar".to_string()),
            ("2".to_string(), "Bapta".to_string())
        ]
    );
    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);
}

#[tokio::test]
async fn test_warehouse_listing_falls_back_to_seed_list() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path(SDP_LIST))
        .and(body_string_contains("operation=getWHList"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let warehouses = client(&server, &dir, true).list_warehouses(&period()).await;
    assert_eq!(warehouses.len(), 1);
    assert_eq!(warehouses[0].id, "WH-001");
}

#[tokio::test]
async fn test_warehouse_listing_from_portal() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path(SDP_LIST))
        .and(body_string_contains("operation=getWHList"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<option value="WH-005">Barisal RWH</option><option value="WH-020">Cox&#039;s Bazar RWH</option>"#,
        ))
        .mount(&server)
        .await;

    let warehouses = client(&server, &dir, true).list_warehouses(&period()).await;
    let ids: Vec<&str> = warehouses.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["WH-005", "WH-020"]);
    assert_eq!(warehouses[1].name, "Cox's Bazar RWH");
}

#[tokio::test]
async fn test_unrecognized_listing_is_an_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path(SDP_LIST))
        .and(body_string_contains("operation=getSDPUPList"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Fatal error: database unavailable"))
        .mount(&server)
        .await;

    let warehouse = Region::warehouse("WH-001", "Test WH");
    let result = client(&server, &dir, true)
        .list_children(&warehouse, &period())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_item_tabs_are_discovered() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path(DATASOURCE))
        .and(body_string_contains("operation=getItemTab"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<button id="CON002" class="tab">Condom</button><button id="CON003" class="tab">Shukhi</button>"#,
        ))
        .mount(&server)
        .await;

    let location = Location {
        warehouse: Region::warehouse("WH-001", "Test WH"),
        upazila: Region::new(RegionLevel::Upazila, "T429", "Test Upazila"),
        union: Region::new(RegionLevel::Union, "1", "Test Union"),
    };
    let items = client(&server, &dir, true)
        .list_available_items(&location, &period())
        .await
        .unwrap();

    let codes: Vec<&str> = items.iter().map(|i| i.code.as_str()).collect();
    assert_eq!(codes, vec!["CON002", "CON003"]);
    assert_eq!(items[1].name, "Shukhi");
}
