//! Full harvest runs against a mocked portal

use crate::common::{
    batch_path, build, item_key, mount_api, mount_hierarchy, test_config, two_row_payload,
    DATASOURCE, EXCEL, SDP_LIST, VIEW,
};
use lmis_harvest::config::SinkKind;
use lmis_harvest::ledger::UnitStatus;
use lmis_harvest::storage::{FileSink, SqliteSink};
use lmis_harvest::{HarvestError, WorkUnitKey};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_end_to_end_single_item() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_hierarchy(&server).await;
    mount_api(&server, two_row_payload()).await;

    let (harvester, plan, ledger) = build(test_config(&server, dir.path()), false);
    let summary = harvester.run(&plan).await.unwrap();

    // One file with the two facility rows, summary row excluded
    let file = FileSink::read(&batch_path(dir.path())).unwrap();
    assert_eq!(file.data.len(), 2);
    assert_eq!(file.data[0].facility, "FWC Alinagar");
    assert!(file.data[0].eligible);
    assert!(!file.data[1].eligible);
    assert_eq!(file.metadata.warehouse_name, "Test WH");
    assert_eq!(file.metadata.district, "Test District");
    assert_eq!(file.metadata.union_name, "Test Union");
    assert_eq!(file.metadata.strategy.as_deref(), Some("api"));

    let entry = ledger.entry(&item_key()).unwrap().unwrap();
    assert_eq!(entry.status, UnitStatus::Completed);
    assert_eq!(entry.record_count, 2);

    let period = "2023-01".parse().unwrap();
    assert!(ledger.is_done(&WorkUnitKey::warehouse(&period, "WH-001")).unwrap());
    assert!(ledger.find_resume_point().unwrap().is_none());

    assert_eq!(summary.totals.records, 2);
    assert_eq!(summary.totals.items_with_data, 1);
    assert_eq!(summary.totals.unions, 1);
    assert_eq!(summary.totals.errors, 0);

    let logs = dir.path().join("data/logs");
    assert!(logs.join("2023_01_WH-001_log.json").exists());
    assert!(logs.join("2023_01_summary.json").exists());
    assert!(logs.join("run_summary.json").exists());
    assert!(logs.join("run_summary.md").exists());
}

#[tokio::test]
async fn test_completed_item_makes_no_data_requests() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_hierarchy(&server).await;

    Mock::given(method("POST"))
        .and(path(DATASOURCE))
        .and(body_string_contains("operation=getItemlist"))
        .respond_with(ResponseTemplate::new(200).set_body_string(two_row_payload()))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(VIEW))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (harvester, plan, ledger) = build(test_config(&server, dir.path()), false);
    ledger.mark_done(&item_key(), 2).unwrap();

    let summary = harvester.run(&plan).await.unwrap();
    assert_eq!(summary.totals.items_skipped, 1);
    assert_eq!(summary.totals.records, 0);
    assert!(!batch_path(dir.path()).exists());
}

#[tokio::test]
async fn test_completed_warehouse_is_not_listed() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path(SDP_LIST))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(0)
        .mount(&server)
        .await;

    let (harvester, plan, ledger) = build(test_config(&server, dir.path()), false);
    let period = "2023-01".parse().unwrap();
    ledger
        .mark_done(&WorkUnitKey::warehouse(&period, "WH-001"), 0)
        .unwrap();

    let summary = harvester.run(&plan).await.unwrap();
    assert_eq!(summary.totals.warehouses_skipped, 1);
    assert!(summary.periods[0].warehouse_results[0].skipped);
}

#[tokio::test]
async fn test_falls_back_to_scrape_when_api_is_garbled() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_hierarchy(&server).await;
    mount_api(&server, "<html>Session expired</html>".to_string()).await;

    let page = r#"<html><body><table id="example">
        <thead><tr><th>SL</th><th>SDP</th><th>Opening</th><th>Received</th><th>Total</th><th>Adj+</th><th>Adj-</th><th>Grand</th></tr></thead>
        <tbody>
          <tr><td>1</td><td>FWC Alinagar</td><td>10</td><td>5</td><td>15</td><td>0</td><td>0</td><td>15</td><td>10</td><td>5</td><td></td><td></td></tr>
          <tr><td></td><td>Grand Total</td><td>10</td><td>5</td><td>15</td><td>0</td><td>0</td><td>15</td><td>10</td><td>5</td><td></td><td></td></tr>
        </tbody></table></body></html>"#;
    Mock::given(method("GET"))
        .and(path(VIEW))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(EXCEL))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (harvester, plan, ledger) = build(test_config(&server, dir.path()), false);
    let summary = harvester.run(&plan).await.unwrap();

    let file = FileSink::read(&batch_path(dir.path())).unwrap();
    assert_eq!(file.data.len(), 1);
    assert_eq!(file.metadata.strategy.as_deref(), Some("scrape"));
    assert!(file.data[0].eligible);
    assert_eq!(ledger.entry(&item_key()).unwrap().unwrap().record_count, 1);
    assert_eq!(summary.totals.items_failed, 0);
}

#[tokio::test]
async fn test_item_without_rows_stays_failed_and_is_refetched() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_hierarchy(&server).await;

    Mock::given(method("POST"))
        .and(path(DATASOURCE))
        .and(body_string_contains("operation=getItemlist"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(VIEW))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Session expired</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(EXCEL))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 16]))
        .mount(&server)
        .await;

    let config = test_config(&server, dir.path());
    let (harvester, plan, ledger) = build(config.clone(), false);
    let summary = harvester.run(&plan).await.unwrap();

    assert_eq!(summary.totals.items_empty, 1);
    assert!(!batch_path(dir.path()).exists());
    let entry = ledger.entry(&item_key()).unwrap().unwrap();
    assert_eq!(entry.status, UnitStatus::Failed);
    assert_eq!(entry.record_count, 0);
    assert!(entry.error.unwrap().contains("no data found"));

    let period = "2023-01".parse().unwrap();
    assert!(!ledger.is_done(&WorkUnitKey::warehouse(&period, "WH-001")).unwrap());

    // The next run walks back down to the item
    let (harvester, plan, _) = build(config, false);
    let rerun = harvester.run(&plan).await.unwrap();
    assert_eq!(rerun.totals.warehouses_skipped, 0);
    assert_eq!(rerun.totals.items_skipped, 0);
    assert_eq!(rerun.totals.items_empty, 1);
}

#[tokio::test]
async fn test_failed_listing_leaves_resume_point() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path(SDP_LIST))
        .and(body_string_contains("operation=getSDPUPList"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (harvester, plan, ledger) = build(test_config(&server, dir.path()), false);
    let summary = harvester.run(&plan).await.unwrap();

    assert_eq!(summary.totals.errors, 1);
    let warehouse = &summary.periods[0].warehouse_results[0];
    assert!(!warehouse.is_clean());

    let point = ledger.find_resume_point().unwrap().unwrap();
    assert_eq!(point.to_string(), "2023-01:WH-001");
}

#[tokio::test]
async fn test_sqlite_sink_does_not_duplicate_rows() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_hierarchy(&server).await;
    mount_api(&server, two_row_payload()).await;

    let mut config = test_config(&server, dir.path());
    config.output.sink = SinkKind::Sqlite;
    let db_path = dir.path().join("lmis.db");

    let (harvester, plan, _) = build(config.clone(), false);
    let first = harvester.run(&plan).await.unwrap();
    assert_eq!(first.totals.records, 2);

    // A fresh ledger refetches, but the sink already holds the unit
    let (harvester, plan, ledger) = build(config, true);
    let second = harvester.run(&plan).await.unwrap();
    assert_eq!(second.totals.records, 0);
    assert_eq!(second.totals.items_skipped, 1);
    assert!(ledger.is_done(&item_key()).unwrap());

    let sink = SqliteSink::new(&db_path).unwrap();
    assert_eq!(sink.total_rows().unwrap(), 2);
    assert_eq!(sink.count_for_key(&item_key()).unwrap(), 2);
}

#[tokio::test]
async fn test_unmatched_warehouse_filter_is_fatal() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let mut config = test_config(&server, dir.path());
    config.harvest.warehouse_filter = Some("Nowhere".to_string());

    let (harvester, plan, _) = build(config, false);
    let result = harvester.run(&plan).await;
    assert!(matches!(result, Err(HarvestError::WarehouseNotFound(_))));
}

#[tokio::test]
async fn test_unreachable_portal_is_fatal() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let mut config = test_config(&server, dir.path());
    config.remote.base_url = "http://127.0.0.1:1/".to_string();
    config.remote.connect_timeout_secs = 2;
    config.harvest.probe_on_start = true;

    let (harvester, plan, _) = build(config, false);
    let result = harvester.run(&plan).await;
    assert!(matches!(result, Err(HarvestError::Transport(_))));
}

#[tokio::test]
async fn test_concurrent_warehouses_keep_listing_order() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_hierarchy(&server).await;
    mount_api(&server, two_row_payload()).await;

    let mut config = test_config(&server, dir.path());
    config.warehouses.push(lmis_harvest::config::WarehouseEntry {
        id: "WH-002".to_string(),
        name: "Second WH".to_string(),
        district: None,
    });
    config.harvest.workers = 2;

    let (harvester, plan, _) = build(config, false);
    let summary = harvester.run(&plan).await.unwrap();

    let ids: Vec<&str> = summary.periods[0]
        .warehouse_results
        .iter()
        .map(|w| w.id.as_str())
        .collect();
    assert_eq!(ids, vec!["WH-001", "WH-002"]);
    assert_eq!(summary.totals.records, 4);
    assert!(dir.path().join("data/2023/01/WH-002/T429/1/CON002.json").exists());
}
