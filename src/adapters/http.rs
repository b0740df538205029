use crate::core::orchestrator::{NovaOrchestrator, SagaResult};
use crate::domain::model::{EndpointRole, OperationResult, ServiceRequest};
use crate::domain::ports::{TerminalOperations, TransportOperations};
use crate::utils::error::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

type Shared<T, R> = State<Arc<NovaOrchestrator<T, R>>>;

/// 對外 HTTP 介面；每個路由只負責解析 body 與轉換回應
pub fn router<T, R>(orchestrator: Arc<NovaOrchestrator<T, R>>) -> Router
where
    T: TerminalOperations + 'static,
    R: TransportOperations + 'static,
{
    Router::new()
        .route(
            "/end-terminal-performance-info-request",
            get(performance_info::<T, R>).post(performance_info::<T, R>),
        )
        .route("/end-terminal-activation-request", post(activation::<T, R>))
        .route("/end-terminal-deactivation-request", post(deactivation::<T, R>))
        .route("/temp-service-create", post(temp_service_create::<T, R>))
        .route("/temp-service-list", get(temp_service_list::<T, R>))
        .route("/service-power-setup", post(power_setup_a::<T, R>))
        .route("/service-power-setup-z", post(power_setup_z::<T, R>))
        .route("/service-create", post(service_create::<T, R>))
        .route("/service-list", get(service_list::<T, R>))
        .route("/optical-tunnel-request-cancel", post(tunnel_cancel::<T, R>))
        .route("/service-delete", post(service_delete::<T, R>))
        .route("/create-service", post(create_service::<T, R>))
        .route("/delete-service", post(delete_service::<T, R>))
        .with_state(orchestrator)
}

/// 無效或缺少的 JSON 一律視為空物件
fn parse_request(body: &[u8]) -> ServiceRequest {
    let value = serde_json::from_slice::<Value>(body).unwrap_or_else(|_| json!({}));
    ServiceRequest::from_body(&value)
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn operation_response(result: OperationResult) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(failure) => (status(failure.status_code()), Json(failure.to_json())).into_response(),
    }
}

fn transport_response(result: Result<Value>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => {
            let body = json!({ "error": e.to_string() });
            (status(e.status_code()), Json(body)).into_response()
        }
    }
}

fn saga_response(result: SagaResult) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(failure) => (status(failure.status), Json(failure.to_json())).into_response(),
    }
}

async fn performance_info<T: TerminalOperations, R: TransportOperations>(
    State(nova): Shared<T, R>,
    body: Bytes,
) -> Response {
    operation_response(nova.terminal().performance_info(&parse_request(&body)).await)
}

async fn activation<T: TerminalOperations, R: TransportOperations>(
    State(nova): Shared<T, R>,
    body: Bytes,
) -> Response {
    operation_response(nova.terminal().activate(&parse_request(&body)).await)
}

async fn deactivation<T: TerminalOperations, R: TransportOperations>(
    State(nova): Shared<T, R>,
    body: Bytes,
) -> Response {
    operation_response(nova.terminal().deactivate(&parse_request(&body)).await)
}

async fn temp_service_create<T: TerminalOperations, R: TransportOperations>(
    State(nova): Shared<T, R>,
    body: Bytes,
) -> Response {
    transport_response(nova.transport().temp_service_create(&parse_request(&body)).await)
}

async fn temp_service_list<T: TerminalOperations, R: TransportOperations>(
    State(nova): Shared<T, R>,
) -> Response {
    transport_response(nova.transport().temp_service_list().await)
}

async fn power_setup_a<T: TerminalOperations, R: TransportOperations>(
    State(nova): Shared<T, R>,
    body: Bytes,
) -> Response {
    transport_response(
        nova.transport()
            .service_power_setup(EndpointRole::A, &parse_request(&body))
            .await,
    )
}

async fn power_setup_z<T: TerminalOperations, R: TransportOperations>(
    State(nova): Shared<T, R>,
    body: Bytes,
) -> Response {
    transport_response(
        nova.transport()
            .service_power_setup(EndpointRole::Z, &parse_request(&body))
            .await,
    )
}

async fn service_create<T: TerminalOperations, R: TransportOperations>(
    State(nova): Shared<T, R>,
    body: Bytes,
) -> Response {
    transport_response(nova.transport().service_create(&parse_request(&body)).await)
}

async fn service_list<T: TerminalOperations, R: TransportOperations>(
    State(nova): Shared<T, R>,
) -> Response {
    transport_response(nova.transport().service_list().await)
}

async fn tunnel_cancel<T: TerminalOperations, R: TransportOperations>(
    State(nova): Shared<T, R>,
    body: Bytes,
) -> Response {
    transport_response(
        nova.transport()
            .optical_tunnel_request_cancel(&parse_request(&body))
            .await,
    )
}

async fn service_delete<T: TerminalOperations, R: TransportOperations>(
    State(nova): Shared<T, R>,
    body: Bytes,
) -> Response {
    transport_response(nova.transport().service_delete(&parse_request(&body)).await)
}

async fn create_service<T: TerminalOperations, R: TransportOperations>(
    State(nova): Shared<T, R>,
    body: Bytes,
) -> Response {
    saga_response(nova.create_service(&parse_request(&body)).await)
}

async fn delete_service<T: TerminalOperations, R: TransportOperations>(
    State(nova): Shared<T, R>,
    body: Bytes,
) -> Response {
    saga_response(nova.delete_service(&parse_request(&body)).await)
}
