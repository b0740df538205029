mod common;

use anyhow::Result;
use common::{harness, A_HOST, Z_HOST};
use httpmock::prelude::*;
use nova::domain::model::NotificationMessage;
use nova::domain::ports::Datastore;
use nova::ServiceRequest;
use serde_json::json;

const TEMP_SERVICE_CREATE: &str = "/rests/operations/org-openroadm-service:temp-service-create";
const TEMP_SERVICE_LIST: &str = "/rests/data/org-openroadm-service:temp-service-list";
const TEMP_SERVICE_DELETE: &str = "/rests/operations/org-openroadm-service:temp-service-delete";
const SERVICE_CREATE: &str = "/rests/operations/org-openroadm-service:service-create";
const SERVICE_LIST: &str = "/rests/data/org-openroadm-service:service-list";
const SERVICE_DELETE: &str = "/rests/operations/org-openroadm-service:service-delete";
const POWER_SETUP: &str = "/rests/operations/transportpce-olm:service-power-setup";

fn request() -> ServiceRequest {
    ServiceRequest::from_body(&json!({
        "vendor": "VendorA",
        "component-name": "OCH-1-1",
        "frequency": 193100000,
        "TxPower": -2.5,
        "request-id": "req-1"
    }))
}

fn rnc_ack(message: &str) -> serde_json::Value {
    json!({
        "org-openroadm-service:output": {
            "configuration-response-common": {
                "response-code": "200",
                "response-message": message
            }
        }
    })
}

/// 建立流程中 RNC 端的列表與建立操作全部成功
fn mock_create_endpoints(server: &MockServer) {
    server.mock(|when, then| {
        when.method(POST).path(TEMP_SERVICE_CREATE);
        then.status(200).json_body(rnc_ack("PCE calculation in progress"));
    });
    server.mock(|when, then| {
        when.method(GET).path(TEMP_SERVICE_LIST);
        then.status(200)
            .json_body(json!({ "org-openroadm-service:temp-service-list": { "services": [] } }));
    });
    server.mock(|when, then| {
        when.method(POST).path(SERVICE_CREATE);
        then.status(200).json_body(rnc_ack("Service creation in progress"));
    });
    server.mock(|when, then| {
        when.method(GET).path(SERVICE_LIST);
        then.status(200)
            .json_body(json!({ "org-openroadm-service:service-list": { "services": [] } }));
    });
}

#[tokio::test]
async fn test_create_service_happy_path() -> Result<()> {
    let server = MockServer::start();
    mock_create_endpoints(&server);
    let power_a = server.mock(|when, then| {
        when.method(POST)
            .path(POWER_SETUP)
            .header("accept", "application/json")
            .body_contains(r#""end":"A""#);
        then.status(200).json_body(json!({ "output": { "result": "Success" } }));
    });
    let power_z = server.mock(|when, then| {
        when.method(POST).path(POWER_SETUP).body_contains(r#""end":"Z""#);
        then.status(200).json_body(json!({ "output": { "result": "Success" } }));
    });

    let h = harness(&server.host(), server.port(), 1000);
    // 通知先到、等待者後登記；以 rpc-action 區分階段
    h.bridge.deliver(NotificationMessage::decode(
        br#"{"request-id":"req-1","rpc-action":"service-create","stage":"service ready"}"#,
    ));
    h.bridge.deliver(NotificationMessage::decode(
        br#"{"request-id":"req-1","rpc-action":"temp-service-create","stage":"temp ready"}"#,
    ));

    let output = h.orchestrator.create_service(&request()).await.unwrap();

    let sections: Vec<&str> = output.as_object().unwrap().keys().map(String::as_str).collect();
    for key in [
        "end_terminal_performance_info",
        "temporary_service_creation",
        "end_terminal_activation",
        "service_creation",
        "end_terminal_power_control_A",
        "end_terminal_power_control_Z",
    ] {
        assert!(sections.contains(&key), "missing section {}", key);
    }
    assert_eq!(sections.len(), 6);
    assert!(output.get("rollback").is_none());

    let temp = &output["temporary_service_creation"];
    assert_eq!(temp["tpce_log"][0], "PCE calculation in progress");
    assert!(temp["tpce_log"][1].as_str().unwrap().contains("temp ready"));
    assert!(temp["create_temp_service_response"].is_object());
    let service_log = output["service_creation"]["tpce_log"][1].as_str().unwrap();
    assert!(service_log.contains("service ready"));

    let activation = &output["end_terminal_activation"];
    assert_eq!(activation["End_Terminal_Activation_Status"], "Activated");
    assert_eq!(activation["A_end_target_output_power"], json!(-2.0));
    assert_eq!(
        activation["output"]["configuration-response-common"]["request-id"],
        "act-header-1"
    );

    let perf = &output["end_terminal_performance_info"]["output"];
    assert_eq!(perf["configuration-response-common"]["request-id"], "req-1");
    assert_eq!(
        perf["a-z-end-common-interface-characteristics"]["min-frequency"].as_f64(),
        Some(191325000.0)
    );

    power_a.assert();
    power_z.assert();

    // 兩端各一次 candidate edit + commit
    let edits = h.devices.edits();
    assert_eq!(edits.len(), 2);
    assert_eq!(edits[0].0, A_HOST);
    assert_eq!(edits[1].0, Z_HOST);
    assert!(edits.iter().all(|(_, ds, _)| *ds == Datastore::Candidate));
    assert!(edits[0].2.contains("<frequency>193100000</frequency>"));
    assert_eq!(h.devices.commits(), 2);
    Ok(())
}

#[tokio::test]
async fn test_power_failure_at_z_rolls_back_in_reverse_order() -> Result<()> {
    let server = MockServer::start();
    mock_create_endpoints(&server);
    server.mock(|when, then| {
        when.method(POST).path(POWER_SETUP).body_contains(r#""end":"A""#);
        then.status(200).json_body(json!({ "output": { "result": "Success" } }));
    });
    server.mock(|when, then| {
        when.method(POST).path(POWER_SETUP).body_contains(r#""end":"Z""#);
        then.status(400).body("olm: port not found");
    });
    let cancel = server.mock(|when, then| {
        when.method(POST)
            .path(TEMP_SERVICE_DELETE)
            .body_contains(r#""common-id":"req-1""#);
        then.status(200).json_body(rnc_ack("Service deleted"));
    });

    let h = harness(&server.host(), server.port(), 20);
    let failure = h.orchestrator.create_service(&request()).await.unwrap_err();

    assert_eq!(failure.status, 400);
    assert_eq!(failure.error, "Power setup failed at Z-end");
    assert_eq!(failure.failed_step, "end_terminal_power_control_Z");
    assert!(failure.detail.as_str().unwrap().contains("port not found"));

    let rollback = failure.rollback.as_ref().unwrap();
    let keys: Vec<&str> = rollback.keys().map(String::as_str).collect();
    assert!(keys.contains(&"end_terminal_deactivation"));
    assert!(keys.contains(&"optical_tunnel_request_cancel"));
    assert_eq!(
        rollback["end_terminal_deactivation"]["End_Terminal_Activation_Status"],
        "Deactivated"
    );
    cancel.assert();

    // 啟用 2 次 + 停用 2 次
    assert_eq!(h.devices.edits().len(), 4);

    let body = failure.to_json();
    assert_eq!(body["failed_step"], "end_terminal_power_control_Z");
    assert!(body["rollback"].is_object());
    Ok(())
}

#[tokio::test]
async fn test_activation_failure_only_cancels_temp_service() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(TEMP_SERVICE_CREATE);
        then.status(200).json_body(rnc_ack("PCE calculation in progress"));
    });
    server.mock(|when, then| {
        when.method(GET).path(TEMP_SERVICE_LIST);
        then.status(200).json_body(json!({}));
    });
    let cancel = server.mock(|when, then| {
        when.method(POST).path(TEMP_SERVICE_DELETE);
        then.status(200).json_body(rnc_ack("Service deleted"));
    });
    let service_create = server.mock(|when, then| {
        when.method(POST).path(SERVICE_CREATE);
        then.status(200).json_body(rnc_ack("unexpected"));
    });

    let h = harness(&server.host(), server.port(), 20);
    h.devices.fail_edits_on(Z_HOST);

    let failure = h.orchestrator.create_service(&request()).await.unwrap_err();
    assert_eq!(failure.error, "End terminal activation failed");
    assert_eq!(failure.failed_step, "end_terminal_activation");
    assert_eq!(failure.status, 400);
    assert_eq!(failure.detail["conf_log"][0], format!("{}: power+freq set", A_HOST));

    let rollback = failure.rollback.unwrap();
    assert_eq!(rollback.len(), 1);
    assert!(rollback.contains_key("optical_tunnel_request_cancel"));
    cancel.assert();
    service_create.assert_hits(0);
    Ok(())
}

#[tokio::test]
async fn test_temp_service_failure_reports_without_rollback() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(TEMP_SERVICE_CREATE);
        then.status(500).body("pce unavailable");
    });

    let h = harness(&server.host(), server.port(), 20);
    let failure = h.orchestrator.create_service(&request()).await.unwrap_err();

    assert_eq!(failure.error, "Temporary service creation failed");
    assert!(failure.rollback.is_none());
    assert!(failure.to_json().get("rollback").is_none());
    assert!(h.devices.edits().is_empty());
    assert_eq!(h.bridge.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_notification_timeout_is_logged_not_fatal() -> Result<()> {
    let server = MockServer::start();
    mock_create_endpoints(&server);
    server.mock(|when, then| {
        when.method(POST).path(POWER_SETUP);
        then.status(200).json_body(json!({ "output": { "result": "Success" } }));
    });

    let h = harness(&server.host(), server.port(), 20);
    let output = h.orchestrator.create_service(&request()).await.unwrap();

    let log = output["service_creation"]["tpce_log"].as_array().unwrap();
    assert_eq!(log.len(), 3);
    assert!(log[1].as_str().unwrap().starts_with("Timeout waiting for notification"));
    assert!(log[2].get("org-openroadm-service:service-list").is_some());
    assert_eq!(h.bridge.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_temp_stage_notifications_do_not_confirm_service_creation() -> Result<()> {
    let server = MockServer::start();
    mock_create_endpoints(&server);
    server.mock(|when, then| {
        when.method(POST).path(POWER_SETUP);
        then.status(200).json_body(json!({ "output": { "result": "Success" } }));
    });

    let h = harness(&server.host(), server.port(), 20);
    for stage in ["PCE started", "PCE complete"] {
        let body = json!({
            "request-id": "req-1",
            "rpc-action": "temp-service-create",
            "stage": format!("temp-service {}", stage)
        });
        h.bridge.deliver(NotificationMessage::decode(body.to_string().as_bytes()));
    }
    // 未標示階段的舊訊息也不能被正式服務拿走
    h.bridge
        .deliver(NotificationMessage::decode(br#"{"request-id":"req-1","stage":"stale"}"#));

    let output = h.orchestrator.create_service(&request()).await.unwrap();

    let temp_log = output["temporary_service_creation"]["tpce_log"][1].as_str().unwrap();
    assert!(temp_log.contains("temp-service PCE started"));
    let service_log = output["service_creation"]["tpce_log"][1].as_str().unwrap();
    assert!(service_log.starts_with("Timeout waiting for notification"));
    assert_eq!(h.bridge.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_service_create_failure_rolls_back_both_and_reports_compensation_errors(
) -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(TEMP_SERVICE_CREATE);
        then.status(200).json_body(rnc_ack("PCE calculation in progress"));
    });
    server.mock(|when, then| {
        when.method(GET).path(TEMP_SERVICE_LIST);
        then.status(200).json_body(json!({}));
    });
    server.mock(|when, then| {
        when.method(POST).path(SERVICE_CREATE);
        then.status(500).body("service create boom");
    });
    let cancel = server.mock(|when, then| {
        when.method(POST).path(TEMP_SERVICE_DELETE);
        then.status(500).body("cancel boom");
    });

    let h = harness(&server.host(), server.port(), 20);
    let failure = h.orchestrator.create_service(&request()).await.unwrap_err();

    assert_eq!(failure.error, "Service creation failed");
    assert_eq!(failure.failed_step, "service_creation");

    let rollback = failure.rollback.as_ref().unwrap();
    assert_eq!(rollback.len(), 2);
    assert_eq!(
        rollback["end_terminal_deactivation"]["End_Terminal_Activation_Status"],
        "Deactivated"
    );
    // 取消失敗仍回報在 rollback 中
    let cancel_error = rollback["optical_tunnel_request_cancel"]["error"].as_str().unwrap();
    assert!(cancel_error.contains("cancel boom"));
    cancel.assert();

    // 啟用 2 次 + 補償停用 2 次
    assert_eq!(h.devices.edits().len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_delete_service_deactivates_then_deletes() -> Result<()> {
    let server = MockServer::start();
    let delete = server.mock(|when, then| {
        when.method(POST)
            .path(SERVICE_DELETE)
            .body_contains(r#""service-name":"svc-req-1""#);
        then.status(200).json_body(rnc_ack("Service delete in progress"));
    });

    let h = harness(&server.host(), server.port(), 20);
    let output = h.orchestrator.delete_service(&request()).await.unwrap();

    assert_eq!(
        output["end_terminal_deactivation"]["End_Terminal_Activation_Status"],
        "Deactivated"
    );
    assert_eq!(
        output["service_deletion"]["org-openroadm-service:output"]["configuration-response-common"]["response-message"],
        "Service delete in progress"
    );
    delete.assert();
    Ok(())
}

#[tokio::test]
async fn test_delete_service_failure_has_no_rollback() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(SERVICE_DELETE);
        then.status(404).body("service not found");
    });

    let h = harness(&server.host(), server.port(), 20);
    let failure = h.orchestrator.delete_service(&request()).await.unwrap_err();

    assert_eq!(failure.error, "Service deletion failed");
    assert_eq!(failure.failed_step, "service_deletion");
    assert!(failure.rollback.is_none());
    Ok(())
}
