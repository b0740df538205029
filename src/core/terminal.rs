use crate::config::toml_config::OperationalModeInfo;
use crate::core::capability::CapabilityResolver;
use crate::core::oc_lookup::PLATFORM_MODULE;
use crate::core::vendor::{hooks_for, VendorHooks};
use crate::domain::model::{
    ConnectionStrategy, EndpointRole, OperationFailure, OperationResult, ServiceRequest,
    TemplateVars, VendorProfile,
};
use crate::domain::ports::{
    ConnectTarget, Datastore, NetconfConnector, NetconfSession, PayloadTemplates,
    TerminalOperations,
};
use crate::utils::error::{NovaError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub const TERMINAL_DEVICE_NS: &str = "http://openconfig.net/yang/terminal-device";

const SET_POWER_AND_FREQUENCY: &str = "set_power_and_frequency";
const READ_TARGET_OUTPUT_POWER: &str = "read_target_output_power";

/// 已驗證的 activation/deactivation 參數
pub(crate) struct TuningParams {
    component: String,
    frequency: f64,
    power: f64,
}

impl TuningParams {
    /// 缺少 component-name 時使用設定中的預設 component
    pub(crate) fn from_request(
        request: &ServiceRequest,
        default_component: Option<&str>,
    ) -> Result<Self> {
        let component = request
            .component_name
            .as_deref()
            .or(default_component)
            .filter(|c| !c.is_empty());
        match (component, request.frequency, request.target_power) {
            (Some(component), Some(frequency), Some(power)) => Ok(Self {
                component: component.to_string(),
                frequency,
                power,
            }),
            _ => Err(NovaError::validation(
                "Required parameters missing: component-name, frequency and TxPower",
            )),
        }
    }
}

/// 單一 vendor 的終端設備控制器（A/Z 兩端，NETCONF/OpenConfig）
pub struct TerminalDeviceController {
    profile: VendorProfile,
    operational_mode: OperationalModeInfo,
    default_component: Option<String>,
    connector: Arc<dyn NetconfConnector>,
    templates: Arc<dyn PayloadTemplates>,
    resolver: Arc<CapabilityResolver>,
    hooks: Box<dyn VendorHooks>,
    logged_versions: Mutex<HashSet<(String, String)>>,
}

impl std::fmt::Debug for TerminalDeviceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalDeviceController")
            .field("profile", &self.profile)
            .field("operational_mode", &self.operational_mode)
            .field("default_component", &self.default_component)
            .finish_non_exhaustive()
    }
}

impl TerminalDeviceController {
    pub fn new(
        profile: VendorProfile,
        operational_mode: OperationalModeInfo,
        default_component: Option<String>,
        connector: Arc<dyn NetconfConnector>,
        templates: Arc<dyn PayloadTemplates>,
        resolver: Arc<CapabilityResolver>,
    ) -> Self {
        tracing::info!(
            "🔧 Terminal controller for '{}' ({}): A={} Z={}",
            profile.vendor,
            profile.kind.name(),
            profile.a_end.address,
            profile.z_end.address
        );
        let hooks = hooks_for(profile.kind);
        Self {
            profile,
            operational_mode,
            default_component,
            connector,
            templates,
            resolver,
            hooks,
            logged_versions: Mutex::new(HashSet::new()),
        }
    }

    /// 兩端各做一次 capability 協商；失敗只會留下空集合
    pub async fn negotiate_capabilities(&self) {
        for end in EndpointRole::BOTH {
            self.resolver.resolve(&self.target(end)).await;
        }
    }

    pub fn vendor(&self) -> &str {
        &self.profile.vendor
    }

    pub fn profile(&self) -> &VendorProfile {
        &self.profile
    }

    pub fn address(&self, end: EndpointRole) -> &str {
        &self.profile.endpoint(end).address
    }

    /// 憑證一律依端點角色選取
    pub fn target(&self, end: EndpointRole) -> ConnectTarget {
        let endpoint = self.profile.endpoint(end);
        ConnectTarget {
            host: endpoint.address.clone(),
            port: endpoint.port,
            username: endpoint.credentials.username.clone(),
            password: endpoint.credentials.password.clone(),
            via: match &endpoint.strategy {
                ConnectionStrategy::Direct => None,
                ConnectionStrategy::Tunneled(jump) => Some(jump.clone()),
            },
        }
    }

    pub async fn set_power_and_frequency(
        &self,
        end: EndpointRole,
        component: &str,
        frequency: f64,
        power: f64,
    ) -> Result<Value> {
        tracing::info!("⚡ set_power_and_frequency on {}", self.address(end));
        let mut vars = TemplateVars::new();
        vars.insert("component_name".to_string(), escape_xml(component));
        vars.insert("frequency".to_string(), frequency.to_string());
        vars.insert("target_output_power".to_string(), power.to_string());

        let config = self.render_payload(end, SET_POWER_AND_FREQUENCY, &vars).await?;
        tracing::debug!("📄 edit-config payload: {} bytes", config.len());

        let mut session = self.connector.connect(&self.target(end)).await?;
        let outcome = async {
            session.edit_config(Datastore::Candidate, &config).await?;
            session.commit().await
        }
        .await;
        close_quietly(session.as_mut(), self.address(end)).await;
        outcome?;

        tracing::info!("✅ set_power_and_frequency applied on {}", self.address(end));
        Ok(json!({ "message": "Target output power and frequency changed successfully" }))
    }

    pub async fn read_target_output_power(
        &self,
        end: EndpointRole,
        component: &str,
    ) -> Result<f64> {
        tracing::info!("📡 read_target_output_power on {}", self.address(end));
        let mut vars = TemplateVars::new();
        vars.insert("component_name".to_string(), escape_xml(component));
        let filter = self.render_payload(end, READ_TARGET_OUTPUT_POWER, &vars).await?;

        let mut session = self.connector.connect(&self.target(end)).await?;
        let reply = session.get_config(Datastore::Running, &filter).await;
        close_quietly(session.as_mut(), self.address(end)).await;

        let power = parse_target_output_power(&reply?)?;
        tracing::info!("📡 target-output-power on {} = {} dBm", self.address(end), power);
        Ok(power)
    }

    /// 渲染 payload 並直接寫入指定 datastore（用於 vendor hook）
    pub async fn apply_payload(
        &self,
        end: EndpointRole,
        name: &str,
        datastore: Datastore,
    ) -> Result<()> {
        let config = self.render_payload(end, name, &TemplateVars::new()).await?;
        let mut session = self.connector.connect(&self.target(end)).await?;
        let outcome = async {
            session.edit_config(datastore, &config).await?;
            if datastore == Datastore::Candidate {
                session.commit().await?;
            }
            Ok::<(), NovaError>(())
        }
        .await;
        close_quietly(session.as_mut(), self.address(end)).await;
        outcome
    }

    /// 查找順序：`<vendor>.<name>`、`common.<name>@<version>`、`common.<name>`
    async fn render_payload(
        &self,
        end: EndpointRole,
        name: &str,
        extra: &TemplateVars,
    ) -> Result<String> {
        let target = self.target(end);
        let version = self.resolver.version_for(&target, PLATFORM_MODULE).await;
        let revision = self.resolver.revision_for(&target, PLATFORM_MODULE).await;

        if name == SET_POWER_AND_FREQUENCY || name == READ_TARGET_OUTPUT_POWER {
            self.log_schema_once(version.as_deref(), revision.as_deref());
        }

        let mut vars = extra.clone();
        vars.insert("vendor".to_string(), self.profile.vendor.clone());
        if let Some(version) = &version {
            vars.insert("oc_version".to_string(), version.clone());
        }
        if let Some(revision) = &revision {
            vars.insert("oc_revision".to_string(), revision.clone());
        }

        let mut candidates = vec![format!("{}.{}", self.profile.vendor, name)];
        if let Some(version) = &version {
            candidates.push(format!("common.{}@{}", name, version));
        }
        candidates.push(format!("common.{}", name));

        for candidate in &candidates {
            match self.templates.render(candidate, &vars) {
                Ok(text) => {
                    tracing::debug!("📄 Rendered payload '{}'", candidate);
                    return Ok(text);
                }
                Err(NovaError::NotFoundError { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(NovaError::not_found(format!("payload template '{}'", name)))
    }

    fn log_schema_once(&self, version: Option<&str>, revision: Option<&str>) {
        let key = (
            PLATFORM_MODULE.to_string(),
            version.or(revision).unwrap_or("unknown").to_string(),
        );
        let mut logged = match self.logged_versions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !logged.insert(key) {
            return;
        }
        let release = version.and_then(|v| self.resolver.lookup().tag_for_version(v));
        tracing::info!(
            "📚 Using {} (release: {}, version: {}, revision: {})",
            PLATFORM_MODULE,
            release.unwrap_or("-"),
            version.unwrap_or("-"),
            revision.unwrap_or("-")
        );
    }

    fn tuning_params(&self, request: &ServiceRequest) -> Result<TuningParams> {
        TuningParams::from_request(request, self.default_component.as_deref())
    }

    async fn request_id_from(
        &self,
        payload: &str,
        prefix: &str,
        request: &ServiceRequest,
    ) -> String {
        let rendered = self
            .render_payload(EndpointRole::A, payload, &request.template_vars())
            .await
            .ok()
            .and_then(|text| serde_json::from_str::<Value>(&text).ok());
        match rendered.as_ref().and_then(header_request_id) {
            Some(rid) => rid,
            None => {
                let rid = format!("{}-{}", prefix, chrono::Utc::now().timestamp());
                tracing::warn!("🔶 No request-id in '{}' payload, generated {}", payload, rid);
                rid
            }
        }
    }

    async fn performance_info_inner(&self, request: &ServiceRequest) -> Result<Value> {
        let raw = self
            .render_payload(EndpointRole::A, "et_performance_info_req", &request.template_vars())
            .await?;
        let perf: Value = serde_json::from_str(&raw)?;
        let rid = header_request_id(&perf).unwrap_or_else(|| request.request_id.clone());

        let mode = &self.operational_mode;
        let mode_id = mode
            .operational_mode_id
            .clone()
            .or_else(|| self.profile.oper_mode.clone());
        let response = json!({
            "output": {
                "configuration-response-common": {
                    "request-id": rid,
                    "response-code": "success",
                    "response-message": "Request processed successfully!",
                    "ack-final-indicator": "final"
                },
                "a-z-end-common-interface-characteristics": {
                    "supported-operational-modes": [{ "operational-mode-id": mode_id }],
                    "min-frequency": mode.min_frequency,
                    "max-frequency": mode.max_frequency,
                    "min-granularity": mode.min_granularity
                }
            }
        });
        tracing::info!(
            "📊 Performance info: oper_mode={:?} min={:?} max={:?}",
            mode_id,
            mode.min_frequency,
            mode.max_frequency
        );
        Ok(response)
    }
}

#[async_trait]
impl TerminalOperations for TerminalDeviceController {
    async fn performance_info(&self, request: &ServiceRequest) -> OperationResult {
        tracing::info!("📊 End terminal performance info request ({})", self.vendor());
        self.performance_info_inner(request).await.map_err(|e| {
            tracing::error!("❌ Performance info failed: {}", e);
            OperationFailure::from(e)
        })
    }

    async fn activate(&self, request: &ServiceRequest) -> OperationResult {
        tracing::info!("🟢 End terminal activation request ({})", self.vendor());
        let params = self.tuning_params(request).map_err(|e| {
            tracing::error!("❌ Activation rejected: {}", e);
            OperationFailure::from(e)
        })?;

        let mut conf_log = Vec::new();
        let rid = self.request_id_from("et_activation_req", "act", request).await;

        for end in EndpointRole::BOTH {
            if let Err(e) = self.hooks.pre_activate(self, end).await {
                tracing::error!("❌ Pre-activation hook failed at {}: {}", end, e);
                return Err(OperationFailure::new(e, conf_log));
            }
        }

        for end in EndpointRole::BOTH {
            if let Err(e) = self
                .set_power_and_frequency(end, &params.component, params.frequency, params.power)
                .await
            {
                tracing::error!("❌ Activation failed at {}: {}", end, e);
                return Err(OperationFailure::new(e, conf_log));
            }
            conf_log.push(format!("{}: power+freq set", self.address(end)));
        }

        for end in EndpointRole::BOTH {
            if let Err(e) = self.hooks.post_activate(self, end).await {
                tracing::warn!("🔶 Post-activation hook failed at {}: {}", end, e);
                conf_log.push(format!("{}: post-activation hook failed: {}", self.address(end), e));
            }
        }

        let mut readback = Vec::with_capacity(2);
        for end in EndpointRole::BOTH {
            match self.read_target_output_power(end, &params.component).await {
                Ok(power) => {
                    conf_log.push(format!("{}: {} dBm", self.address(end), power));
                    readback.push(Some(power));
                }
                Err(e) => {
                    tracing::warn!("🔶 Readback failed at {}: {}", end, e);
                    conf_log.push(format!("{}: readback unavailable ({})", self.address(end), e));
                    readback.push(None);
                }
            }
        }
        tracing::info!("✅ Activation readback A={:?} Z={:?}", readback[0], readback[1]);

        Ok(json!({
            "output": { "configuration-response-common": ack_common(&rid) },
            "A_end_target_output_power": readback[0],
            "Z_end_target_output_power": readback[1],
            "End_Terminal_Activation_Status": "Activated",
            "conf_log": conf_log,
            "vendor": self.vendor()
        }))
    }

    async fn deactivate(&self, request: &ServiceRequest) -> OperationResult {
        tracing::info!("🔴 End terminal deactivation request ({})", self.vendor());
        let params = self.tuning_params(request).map_err(|e| {
            tracing::error!("❌ Deactivation rejected: {}", e);
            OperationFailure::from(e)
        })?;

        let mut conf_log = Vec::new();
        let rid = self.request_id_from("et_deactivation_req", "deact", request).await;

        for end in EndpointRole::BOTH {
            if let Err(e) = self
                .set_power_and_frequency(end, &params.component, params.frequency, params.power)
                .await
            {
                tracing::error!("❌ Deactivation failed at {}: {}", end, e);
                return Err(OperationFailure::new(e, conf_log));
            }
            conf_log.push(format!("{}: power+freq set", self.address(end)));
        }

        for end in EndpointRole::BOTH {
            if let Err(e) = self.hooks.post_deactivate(self, end).await {
                tracing::warn!("🔶 Post-deactivation hook failed at {}: {}", end, e);
                let address = self.address(end);
                conf_log.push(format!("{}: post-deactivation hook failed: {}", address, e));
            }
        }

        tracing::info!("✅ Deactivation completed for A and Z");
        Ok(json!({
            "output": { "configuration-response-common": ack_common(&rid) },
            "End_Terminal_Activation_Status": "Deactivated",
            "conf_log": conf_log,
            "vendor": self.vendor()
        }))
    }
}

fn ack_common(rid: &str) -> Value {
    json!({
        "request-id": rid,
        "response-code": "success",
        "response-message": "Request processed successfully!",
        "ack-final-indicator": "final"
    })
}

fn header_request_id(payload: &Value) -> Option<String> {
    payload
        .pointer("/input/sdnc-request-header/request-id")
        .and_then(Value::as_str)
        .filter(|rid| !rid.is_empty())
        .map(str::to_string)
}

/// XML 文字節點跳脫（edit-config 與 filter 皆為 XML）
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

async fn close_quietly(session: &mut dyn NetconfSession, address: &str) {
    if let Err(e) = session.close().await {
        tracing::debug!("close-session on {} failed: {}", address, e);
    }
}

/// 從 get-config 回覆中取出 `td:target-output-power`
pub fn parse_target_output_power(xml: &str) -> Result<f64> {
    let doc = roxmltree::Document::parse(xml)?;
    let node = doc
        .descendants()
        .find(|n| n.has_tag_name((TERMINAL_DEVICE_NS, "target-output-power")))
        .ok_or_else(|| NovaError::not_found("target-output-power"))?;
    let text = node.text().map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Err(NovaError::not_found("target-output-power"));
    }
    text.parse::<f64>().map_err(|_| {
        NovaError::upstream(None, format!("invalid target-output-power '{}'", text))
    })
}
