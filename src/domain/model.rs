use crate::utils::error::NovaError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// 模板渲染變數
pub type TemplateVars = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointRole {
    A,
    Z,
}

impl EndpointRole {
    pub const BOTH: [EndpointRole; 2] = [EndpointRole::A, EndpointRole::Z];

    pub fn label(&self) -> &'static str {
        match self {
            EndpointRole::A => "A",
            EndpointRole::Z => "Z",
        }
    }
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-end", self.label())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpHost {
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStrategy {
    Direct,
    Tunneled(JumpHost),
}

#[derive(Debug, Clone)]
pub struct DeviceEndpoint {
    pub address: String,
    pub port: u16,
    pub credentials: Credentials,
    pub role: EndpointRole,
    pub strategy: ConnectionStrategy,
}

/// 每個 vendor 綁定的控制器實作（靜態列舉）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerKind {
    Standard,
    JumpHost,
    Measurement,
}

impl ControllerKind {
    /// 依設定中的綁定名稱解析；未知或缺少時回傳 `None`
    pub fn from_binding(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().replace('_', "-").as_str() {
            "standard" | "default" | "openconfig" => Some(Self::Standard),
            "jump-host" | "jumphost" | "tunneled" => Some(Self::JumpHost),
            "measurement" => Some(Self::Measurement),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::JumpHost => "jump-host",
            Self::Measurement => "measurement",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VendorProfile {
    pub vendor: String,
    pub a_end: DeviceEndpoint,
    pub z_end: DeviceEndpoint,
    pub jump_host: Option<JumpHost>,
    pub oper_mode: Option<String>,
    pub kind: ControllerKind,
}

impl VendorProfile {
    pub fn endpoint(&self, role: EndpointRole) -> &DeviceEndpoint {
        match role {
            EndpointRole::A => &self.a_end,
            EndpointRole::Z => &self.z_end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityEntry {
    pub module: String,
    pub revision: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceCapabilities {
    pub modules: BTreeMap<String, CapabilityEntry>,
}

impl DeviceCapabilities {
    pub fn get(&self, module: &str) -> Option<&CapabilityEntry> {
        self.modules.get(module)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// 正規化後的服務請求
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRequest {
    pub vendor: Option<String>,
    pub component_name: Option<String>,
    pub frequency: Option<f64>,
    pub target_power: Option<f64>,
    pub request_id: String,
}

impl ServiceRequest {
    pub fn from_body(body: &Value) -> Self {
        Self {
            vendor: first_text(body, &["vendor"]).map(|v| normalize_vendor(&v)),
            component_name: first_text(body, &["component-name", "component_name"]),
            frequency: first_number(body, &["frequency"]),
            target_power: first_number(body, &["TxPower", "target_output_power"]),
            request_id: first_text(body, &["request-id", "request_id"])
                .unwrap_or_else(|| format!("nova-{}", uuid::Uuid::new_v4())),
        }
    }

    /// 缺少欄位時帶入預設 component
    pub fn with_default_component(mut self, default: Option<&str>) -> Self {
        if self.component_name.is_none() {
            self.component_name = default.filter(|c| !c.is_empty()).map(str::to_string);
        }
        self
    }

    pub fn template_vars(&self) -> TemplateVars {
        let mut vars = TemplateVars::new();
        vars.insert("request_id".to_string(), self.request_id.clone());
        if let Some(vendor) = &self.vendor {
            vars.insert("vendor".to_string(), vendor.clone());
        }
        if let Some(component) = &self.component_name {
            vars.insert("component_name".to_string(), component.clone());
        }
        if let Some(frequency) = self.frequency {
            vars.insert("frequency".to_string(), frequency.to_string());
        }
        if let Some(power) = self.target_power {
            vars.insert("target_output_power".to_string(), power.to_string());
        }
        vars
    }
}

fn first_text(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| body.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn first_number(body: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|k| body.get(*k))
        .find_map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
}

pub fn normalize_vendor(label: &str) -> String {
    label.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationMessage {
    pub correlation_id: Option<String>,
    /// 觸發此通知的 RPC（`rpc-action`），用來區分同一 id 的不同階段
    pub operation: Option<String>,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

const CORRELATION_KEYS: [&str; 4] = ["request-id", "request_id", "requestId", "common-id"];
const OPERATION_KEYS: [&str; 2] = ["rpc-action", "operation"];

impl NotificationMessage {
    pub fn decode(bytes: &[u8]) -> Self {
        let payload = match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        };
        let parsed = serde_json::from_str::<Value>(&payload).ok();
        let correlation_id = parsed.as_ref().and_then(|v| find_string(v, &CORRELATION_KEYS));
        let operation = parsed.as_ref().and_then(|v| find_string(v, &OPERATION_KEYS));
        Self {
            correlation_id,
            operation,
            payload,
            received_at: Utc::now(),
        }
    }
}

/// 任意深度找第一個符合的字串欄位
fn find_string(value: &Value, keys: &[&str]) -> Option<String> {
    match value {
        Value::Object(map) => {
            for key in keys {
                if let Some(Value::String(found)) = map.get(*key) {
                    return Some(found.clone());
                }
            }
            map.values().find_map(|v| find_string(v, keys))
        }
        Value::Array(items) => items.iter().find_map(|v| find_string(v, keys)),
        _ => None,
    }
}

/// 控制器操作失敗：錯誤加上已收集的步驟紀錄
#[derive(Debug)]
pub struct OperationFailure {
    pub error: NovaError,
    pub conf_log: Vec<String>,
}

impl OperationFailure {
    pub fn new(error: NovaError, conf_log: Vec<String>) -> Self {
        Self { error, conf_log }
    }

    pub fn status_code(&self) -> u16 {
        self.error.status_code()
    }

    pub fn to_json(&self) -> Value {
        if self.conf_log.is_empty() {
            json!({ "error": self.error.to_string() })
        } else {
            json!({ "error": self.error.to_string(), "conf_log": self.conf_log })
        }
    }
}

impl From<NovaError> for OperationFailure {
    fn from(error: NovaError) -> Self {
        Self::new(error, Vec::new())
    }
}

pub type OperationResult = std::result::Result<Value, OperationFailure>;
