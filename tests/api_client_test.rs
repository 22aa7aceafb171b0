//! Integration tests for the authenticated status API client against a
//! local mock server

use hyperion::api::client::HttpStatusApi;
use hyperion::api::{StatusApi, fetch_all_systems};
use hyperion::config::ApiConfig;
use hyperion::error::HyperionError;
use mockito::{Mock, Server};
use serde_json::json;

fn test_config(base_url: &str) -> ApiConfig {
    ApiConfig {
        base_url: base_url.to_string(),
        access_key_id: "KEY-ID".to_string(),
        access_key_value: "KEY-VALUE".to_string(),
        user_id: "monitor@example.com".to_string(),
        password: "secret".to_string(),
        timeout_secs: 5,
        max_retries: 2,
        // Zero keeps the backoff paths instant under test
        retry_delay_secs: 0,
        page_size: 50,
    }
}

async fn mock_jwt(server: &mut Server) -> Mock {
    server
        .mock("POST", "/iam/jwt")
        .match_header("AccessKeyId", "KEY-ID")
        .match_header("AccessKeyValue", "KEY-VALUE")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"jwtToken": "token-1"}).to_string())
        .create_async()
        .await
}

#[tokio::test]
async fn status_fetch_sends_auth_and_parses_wire_casing() {
    let mut server = Server::new_async().await;
    let jwt = mock_jwt(&mut server).await;
    let status = server
        .mock("GET", "/pvsystems/sys-1/status")
        .match_header("authorization", "Bearer token-1")
        .match_header("AccessKeyId", "KEY-ID")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "status": "red",
                "TotalInverters": 3,
                "GreenInverters": ["inv-a"],
                "RedInverters": ["inv-b"],
                "MoonInverters": ["inv-c"],
                "lastUpdated": "2026-08-20T06:00:00Z"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let api = HttpStatusApi::new(&test_config(&server.url())).unwrap();
    let details = api.get_system_status_details("sys-1").await.unwrap();

    assert_eq!(details.status, "red");
    assert_eq!(details.total_inverters, 3);
    assert_eq!(details.green_inverters, vec!["inv-a"]);
    assert_eq!(details.red_inverters, vec!["inv-b"]);
    assert!(details.last_updated.is_some());

    jwt.assert_async().await;
    status.assert_async().await;
}

#[tokio::test]
async fn listing_pages_until_short_page_with_one_token_fetch() {
    let mut server = Server::new_async().await;
    let jwt = mock_jwt(&mut server).await;

    let page_one = server
        .mock("GET", "/pvsystems?offset=0&limit=2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "pvSystems": [
                    {"pvSystemId": "sys-1", "name": "Home"},
                    {"pvSystemId": "sys-2", "name": "Cabin"}
                ],
                "totalItemsCount": 3
            })
            .to_string(),
        )
        .create_async()
        .await;
    let page_two = server
        .mock("GET", "/pvsystems?offset=2&limit=2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "pvSystems": [{"pvSystemId": "sys-3", "name": "Barn"}],
                "totalItemsCount": 3
            })
            .to_string(),
        )
        .create_async()
        .await;

    let api = HttpStatusApi::new(&test_config(&server.url())).unwrap();
    let systems = fetch_all_systems(&api, 2).await.unwrap();

    let ids: Vec<&str> = systems.iter().map(|s| s.pv_system_id.as_str()).collect();
    assert_eq!(ids, vec!["sys-1", "sys-2", "sys-3"]);

    // Both pages ride on the same cached bearer token
    jwt.assert_async().await;
    page_one.assert_async().await;
    page_two.assert_async().await;
}

#[tokio::test]
async fn rejected_token_triggers_reauthentication() {
    let mut server = Server::new_async().await;
    let jwt = server
        .mock("POST", "/iam/jwt")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"jwtToken": "token-1"}).to_string())
        // One fetch per attempt: the 401 invalidates the cached token
        .expect(2)
        .create_async()
        .await;
    let status = server
        .mock("GET", "/pvsystems/sys-1/status")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;

    let api = HttpStatusApi::new(&test_config(&server.url())).unwrap();
    let result = api.get_system_status_details("sys-1").await;

    assert!(result.is_err());
    jwt.assert_async().await;
    status.assert_async().await;
}

#[tokio::test]
async fn missing_system_is_not_retried() {
    let mut server = Server::new_async().await;
    let _jwt = mock_jwt(&mut server).await;
    let status = server
        .mock("GET", "/pvsystems/gone/status")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let api = HttpStatusApi::new(&test_config(&server.url())).unwrap();
    let err = api.get_system_status_details("gone").await.unwrap_err();

    assert!(matches!(err, HyperionError::NotFound { .. }));
    status.assert_async().await;
}

#[tokio::test]
async fn server_errors_exhaust_the_retry_budget() {
    let mut server = Server::new_async().await;
    let _jwt = mock_jwt(&mut server).await;
    let status = server
        .mock("GET", "/pvsystems/sys-1/status")
        .with_status(503)
        .expect(2)
        .create_async()
        .await;

    let api = HttpStatusApi::new(&test_config(&server.url())).unwrap();
    let result = api.get_system_status_details("sys-1").await;

    assert!(result.is_err());
    status.assert_async().await;
}

#[tokio::test]
async fn rate_limiting_waits_and_retries() {
    let mut server = Server::new_async().await;
    let _jwt = mock_jwt(&mut server).await;
    let status = server
        .mock("GET", "/pvsystems/sys-1/status")
        .with_status(429)
        .with_header("Retry-After", "0")
        .expect(2)
        .create_async()
        .await;

    let api = HttpStatusApi::new(&test_config(&server.url())).unwrap();
    let result = api.get_system_status_details("sys-1").await;

    assert!(result.is_err());
    status.assert_async().await;
}
