#![cfg(feature = "server")]

mod common;

use anyhow::Result;
use httpmock::prelude::*;
use nova::adapters::http::router;
use serde_json::{json, Value};
use std::sync::Arc;

/// 在隨機埠啟動 HTTP 介面，回傳 base URL
async fn serve(h: common::Harness) -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = router(Arc::new(h.orchestrator));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{}", addr))
}

#[tokio::test]
async fn test_performance_info_accepts_get_without_body() -> Result<()> {
    let base = serve(common::harness("127.0.0.1", 9, 10)).await?;

    let response = reqwest::get(format!("{}/end-terminal-performance-info-request", base)).await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(
        body["output"]["configuration-response-common"]["response-code"],
        "success"
    );
    Ok(())
}

#[tokio::test]
async fn test_invalid_activation_body_is_bad_request() -> Result<()> {
    let base = serve(common::harness("127.0.0.1", 9, 10)).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/end-terminal-activation-request", base))
        .body("{not json")
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert!(body["error"].as_str().unwrap().contains("Required parameters missing"));
    Ok(())
}

#[tokio::test]
async fn test_create_service_failure_maps_to_saga_body() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/rests/operations/org-openroadm-service:temp-service-create");
        then.status(503).body("busy");
    });
    let base = serve(common::harness(&server.host(), server.port(), 10)).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/create-service", base))
        .json(&json!({ "frequency": 193100000, "TxPower": -2.0, "request-id": "http-1" }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "Temporary service creation failed");
    assert_eq!(body["failed_step"], "temporary_service_creation");
    assert!(body["detail"].as_str().unwrap().contains("HTTP 503"));
    assert!(body.get("rollback").is_none());
    Ok(())
}

#[tokio::test]
async fn test_service_list_passes_rnc_errors_through() -> Result<()> {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET)
            .path("/rests/data/org-openroadm-service:service-list");
        then.status(200)
            .json_body(json!({ "org-openroadm-service:service-list": { "services": [{ "service-name": "svc-1" }] } }));
    });
    let base = serve(common::harness(&server.host(), server.port(), 10)).await?;

    let body: Value = reqwest::get(format!("{}/service-list", base)).await?.json().await?;
    assert_eq!(
        body["org-openroadm-service:service-list"]["services"][0]["service-name"],
        "svc-1"
    );
    list.assert();

    let response = reqwest::get(format!("{}/temp-service-list", base)).await?;
    assert_eq!(response.status(), 400);
    Ok(())
}
