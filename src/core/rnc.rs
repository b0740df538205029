use crate::adapters::tunnel::SshTunnel;
use crate::config::toml_config::{RncConfig, RncMode};
use crate::core::notification::NotificationBridge;
use crate::domain::model::{Credentials, EndpointRole, JumpHost, ServiceRequest};
use crate::domain::ports::{PayloadTemplates, TransportOperations};
use crate::utils::error::{NovaError, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const TEMP_SERVICE_CREATE: &str = "/rests/operations/org-openroadm-service:temp-service-create";
const TEMP_SERVICE_LIST: &str = "/rests/data/org-openroadm-service:temp-service-list";
const SERVICE_POWER_SETUP: &str = "/rests/operations/transportpce-olm:service-power-setup";
const SERVICE_CREATE: &str = "/rests/operations/org-openroadm-service:service-create";
const SERVICE_LIST: &str = "/rests/data/org-openroadm-service:service-list";
const TEMP_SERVICE_DELETE: &str = "/rests/operations/org-openroadm-service:temp-service-delete";
const SERVICE_DELETE: &str = "/rests/operations/org-openroadm-service:service-delete";

const RESPONSE_MESSAGE: &str =
    "/org-openroadm-service:output/configuration-response-common/response-message";

#[derive(Clone, Copy)]
enum Budget {
    Quick,
    Heavy,
}

/// RNC/TPCE 的 RESTCONF client（直連或經由 SSH tunnel）
pub struct RncClient {
    settings: RncConfig,
    http: reqwest::Client,
    templates: Arc<dyn PayloadTemplates>,
    bridge: Arc<NotificationBridge>,
}

impl RncClient {
    pub fn new(
        settings: RncConfig,
        templates: Arc<dyn PayloadTemplates>,
        bridge: Arc<NotificationBridge>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .build()?;
        tracing::info!(
            "🔧 RNC client: {}://{}:{} ({:?} mode, connect={}s quick={}s heavy={}s)",
            settings.scheme,
            settings.host,
            settings.restconf_port,
            settings.mode,
            settings.connect_timeout,
            settings.timeout,
            settings.timeout_heavy
        );
        Ok(Self {
            settings,
            http,
            templates,
            bridge,
        })
    }

    fn timeout(&self, budget: Budget) -> Duration {
        match budget {
            Budget::Quick => self.settings.quick_timeout(),
            Budget::Heavy => self.settings.heavy_timeout(),
        }
    }

    /// 每次呼叫各自建立 tunnel，呼叫結束即關閉
    async fn open_base(&self) -> Result<(String, Option<SshTunnel>)> {
        let settings = &self.settings;
        match settings.mode {
            RncMode::Direct => Ok((
                format!("{}://{}:{}", settings.scheme, settings.host, settings.restconf_port),
                None,
            )),
            RncMode::Tunnel => {
                let jump = JumpHost {
                    host: settings.host.clone(),
                    port: settings.ssh_port,
                    credentials: Credentials {
                        username: settings.ssh_user.clone().unwrap_or_default(),
                        password: settings.ssh_pass.clone().unwrap_or_default(),
                    },
                };
                let tunnel = SshTunnel::open(
                    &jump,
                    &settings.host,
                    settings.restconf_port,
                    settings.connect_timeout(),
                )
                .await?;
                let base = format!("{}://127.0.0.1:{}", settings.scheme, tunnel.local_port());
                Ok((base, Some(tunnel)))
            }
        }
    }

    async fn call(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<&Value>,
        budget: Budget,
    ) -> Result<Value> {
        let (base, tunnel) = self.open_base().await?;
        let url = format!("{}{}", base, path);
        let timeout = self.timeout(budget);
        tracing::debug!("🌐 {} {} {}", operation, method, url);

        let mut request = self
            .http
            .request(method, &url)
            .basic_auth(&self.settings.rest_user, Some(&self.settings.rest_pass))
            .header(ACCEPT, "application/json")
            .timeout(timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let outcome = send(operation, request, timeout).await;
        if let Some(tunnel) = tunnel {
            tunnel.close().await;
        }
        outcome
    }

    fn render_json(&self, action: &str, request: &ServiceRequest) -> Result<Value> {
        let name = format!("{}.{}", self.settings.template_prefix, action);
        let raw = self.templates.render(&name, &request.template_vars())?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// 建立後等待事件通知，再重新查詢列表；等待逾時只記錄在 tpce_log
    async fn create_and_confirm(
        &self,
        operation: &str,
        action: &str,
        path: &str,
        request: &ServiceRequest,
    ) -> Result<(Value, Vec<Value>)> {
        let payload = self.render_json(action, request)?;
        let waiter = self.bridge.expect(&request.request_id, operation);

        let data = self
            .call(operation, Method::POST, path, Some(&payload), Budget::Heavy)
            .await?;

        let mut tpce_log = Vec::new();
        let message = data.pointer(RESPONSE_MESSAGE).cloned().unwrap_or(Value::Null);
        tracing::info!("✅ {} response: {}", operation, message);
        tpce_log.push(message);

        let wait = self.settings.notification_wait();
        match waiter.wait(wait).await {
            Some(notification) => {
                tracing::info!("📨 {} notification: {}", operation, notification.payload);
                tpce_log.push(Value::String(format!("Notification: {}", notification.payload)));
            }
            None => {
                tracing::warn!(
                    "⏰ Timeout waiting for {} notification (request-id {})",
                    operation,
                    request.request_id
                );
                tpce_log.push(Value::String(format!(
                    "Timeout waiting for notification after {:?} (request-id {})",
                    wait, request.request_id
                )));
            }
        }
        Ok((data, tpce_log))
    }
}

async fn send(
    operation: &str,
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<Value> {
    let response = request
        .send()
        .await
        .map_err(|e| NovaError::from_http(operation, timeout, e))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| NovaError::from_http(operation, timeout, e))?;

    if !status.is_success() {
        tracing::error!("❌ {} REST {}: {}", operation, status.as_u16(), text);
        let detail = if text.trim().is_empty() {
            status.canonical_reason().unwrap_or("no body").to_string()
        } else {
            text
        };
        return Err(NovaError::upstream(
            Some(status.as_u16()),
            format!("{}: {}", operation, detail),
        ));
    }

    if text.trim().is_empty() {
        return Ok(json!({}));
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

fn list_snapshot(result: Result<Value>) -> Value {
    result.unwrap_or_else(|e| json!({ "error": e.to_string() }))
}

#[async_trait]
impl TransportOperations for RncClient {
    async fn temp_service_create(&self, request: &ServiceRequest) -> Result<Value> {
        tracing::info!("🛤️ Temporary service creation ({})", request.request_id);
        let (data, mut tpce_log) = self
            .create_and_confirm(
                "temp-service-create",
                "temp_service_create",
                TEMP_SERVICE_CREATE,
                request,
            )
            .await?;
        tpce_log.push(list_snapshot(self.temp_service_list().await));
        Ok(json!({ "create_temp_service_response": data, "tpce_log": tpce_log }))
    }

    async fn temp_service_list(&self) -> Result<Value> {
        self.call("temp-service-list", Method::GET, TEMP_SERVICE_LIST, None, Budget::Quick)
            .await
    }

    async fn service_power_setup(
        &self,
        end: EndpointRole,
        request: &ServiceRequest,
    ) -> Result<Value> {
        tracing::info!("🔆 {} terminal power setup ({})", end, request.request_id);
        let action = format!("end_terminal_power_control_{}", end.label());
        let payload = self.render_json(&action, request)?;
        let operation = format!("service-power-setup {}", end);
        self.call(&operation, Method::POST, SERVICE_POWER_SETUP, Some(&payload), Budget::Heavy)
            .await
    }

    async fn service_create(&self, request: &ServiceRequest) -> Result<Value> {
        tracing::info!("🛤️ Service creation ({})", request.request_id);
        let (data, mut tpce_log) = self
            .create_and_confirm("service-create", "service_create", SERVICE_CREATE, request)
            .await?;
        tpce_log.push(list_snapshot(self.service_list().await));
        Ok(json!({ "create_service_response": data, "tpce_log": tpce_log }))
    }

    async fn service_list(&self) -> Result<Value> {
        self.call("service-list", Method::GET, SERVICE_LIST, None, Budget::Quick)
            .await
    }

    async fn optical_tunnel_request_cancel(&self, request: &ServiceRequest) -> Result<Value> {
        tracing::info!("↩️ Optical tunnel request cancel ({})", request.request_id);
        let payload = self.render_json("optical_tunnel_request_cancel", request)?;
        self.call(
            "temp-service-delete",
            Method::POST,
            TEMP_SERVICE_DELETE,
            Some(&payload),
            Budget::Quick,
        )
        .await
    }

    async fn service_delete(&self, request: &ServiceRequest) -> Result<Value> {
        tracing::info!("🗑️ Service deletion ({})", request.request_id);
        let payload = self.render_json("service_delete", request)?;
        self.call("service-delete", Method::POST, SERVICE_DELETE, Some(&payload), Budget::Quick)
            .await
    }
}
