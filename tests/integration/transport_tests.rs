//! Retry behavior of the transport against a live mock server

use lmis_harvest::config::RemoteConfig;
use lmis_harvest::transport::{Request, Transport, TransportError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_remote(retries: u32) -> RemoteConfig {
    RemoteConfig {
        max_retries: retries,
        backoff_unit_ms: 1,
        timeout_secs: 5,
        ..RemoteConfig::default()
    }
}

#[tokio::test]
async fn test_retries_503_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = Transport::new(&fast_remote(5)).unwrap();
    let response = transport
        .execute(&Request::get(format!("{}/flaky", server.uri())))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn test_non_retryable_status_fails_immediately() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/forbidden"))
        .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = Transport::new(&fast_remote(5)).unwrap();
    let result = transport
        .execute(&Request::post(format!("{}/forbidden", server.uri())).param("operation", "x"))
        .await;

    assert!(matches!(result, Err(TransportError::Status { status: 403, .. })));
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let transport = Transport::new(&fast_remote(3)).unwrap();
    let result = transport
        .execute(&Request::get(format!("{}/down", server.uri())))
        .await;

    match result {
        Err(TransportError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected exhaustion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_probe_reports_any_status_as_reachable() {
    let server = MockServer::start().await;
    let transport = Transport::new(&fast_remote(1)).unwrap();

    // Nothing mounted: wiremock answers 404
    let status = transport.probe(&server.uri()).await.unwrap();
    assert_eq!(status, 404);
}
