#![allow(dead_code)]

use async_trait::async_trait;
use nova::adapters::templates::TemplateStore;
use nova::core::capability::CapabilityResolver;
use nova::core::dispatch::VendorDispatch;
use nova::core::notification::NotificationBridge;
use nova::core::oc_lookup::OpenConfigLookup;
use nova::core::rnc::RncClient;
use nova::domain::ports::{ConnectTarget, Datastore, NetconfConnector, NetconfSession};
use nova::utils::error::{NovaError, Result};
use nova::{NovaConfig, NovaOrchestrator};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const A_HOST: &str = "10.0.0.1";
pub const Z_HOST: &str = "10.0.0.2";

pub const PLATFORM_CAPABILITY: &str =
    "http://openconfig.net/yang/platform?module=openconfig-platform&revision=2022-12-20";

/// 模擬 NETCONF 設備：記錄每台設備的連線與 edit-config
#[derive(Default)]
pub struct FakeNetconf {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    connects: HashMap<String, usize>,
    edits: Vec<(String, Datastore, String)>,
    commits: usize,
    failing_hosts: HashSet<String>,
    power: HashMap<String, String>,
}

impl FakeNetconf {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_edits_on(&self, host: &str) {
        self.state.lock().unwrap().failing_hosts.insert(host.to_string());
    }

    pub fn set_power(&self, host: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .power
            .insert(host.to_string(), value.to_string());
    }

    pub fn connects(&self, host: &str) -> usize {
        self.state.lock().unwrap().connects.get(host).copied().unwrap_or(0)
    }

    pub fn edits(&self) -> Vec<(String, Datastore, String)> {
        self.state.lock().unwrap().edits.clone()
    }

    pub fn commits(&self) -> usize {
        self.state.lock().unwrap().commits
    }
}

struct FakeSession {
    host: String,
    capabilities: Vec<String>,
    device: Arc<FakeNetconf>,
}

/// 可共用的 connector 包裝
pub struct FakeConnector(pub Arc<FakeNetconf>);

#[async_trait]
impl NetconfConnector for FakeConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn NetconfSession>> {
        *self
            .0
            .state
            .lock()
            .unwrap()
            .connects
            .entry(target.host.clone())
            .or_default() += 1;
        Ok(Box::new(FakeSession {
            host: target.host.clone(),
            capabilities: vec![
                "urn:ietf:params:netconf:base:1.0".to_string(),
                PLATFORM_CAPABILITY.to_string(),
            ],
            device: self.0.clone(),
        }))
    }
}

#[async_trait]
impl NetconfSession for FakeSession {
    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn edit_config(&mut self, target: Datastore, config: &str) -> Result<()> {
        let mut state = self.device.state.lock().unwrap();
        if state.failing_hosts.contains(&self.host) {
            return Err(NovaError::upstream(None, format!("rpc-error on {}: invalid value", self.host)));
        }
        state.edits.push((self.host.clone(), target, config.to_string()));
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.device.state.lock().unwrap().commits += 1;
        Ok(())
    }

    async fn get_config(&mut self, _source: Datastore, _filter: &str) -> Result<String> {
        let power = self
            .device
            .state
            .lock()
            .unwrap()
            .power
            .get(&self.host)
            .cloned()
            .unwrap_or_else(|| "-2.0".to_string());
        Ok(format!(
            r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><data>
<terminal-device xmlns="http://openconfig.net/yang/terminal-device"><logical-channels><channel>
<optical-channel><config><target-output-power>{}</target-output-power></config></optical-channel>
</channel></logical-channels></terminal-device></data></rpc-reply>"#,
            power
        ))
    }

    async fn get_schema(&mut self, identifier: &str) -> Result<String> {
        Err(NovaError::not_found(format!("schema {}", identifier)))
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub fn templates() -> TemplateStore {
    TemplateStore::from_pairs([
        (
            "common.set_power_and_frequency",
            "<terminal-device><name>${component_name}</name><frequency>${frequency}</frequency><target-output-power>${target_output_power}</target-output-power></terminal-device>",
        ),
        (
            "common.read_target_output_power",
            "<terminal-device><name>${component_name}</name></terminal-device>",
        ),
        (
            "common.measurement_enable",
            "<measurement><enabled>true</enabled></measurement>",
        ),
        (
            "common.measurement_disable",
            "<measurement><enabled>false</enabled></measurement>",
        ),
        (
            "common.et_performance_info_req",
            r#"{"input": {"sdnc-request-header": {"request-id": "{request_id}"}}}"#,
        ),
        (
            "common.et_activation_req",
            r#"{"input": {"sdnc-request-header": {"request-id": "act-header-1"}}}"#,
        ),
        (
            "IC_SRG1_PP1.temp_service_create",
            r#"{"input": {"sdnc-request-header": {"request-id": "{request_id}"}, "common-id": "{request_id}"}}"#,
        ),
        (
            "IC_SRG1_PP1.service_create",
            r#"{"input": {"sdnc-request-header": {"request-id": "{request_id}"}, "service-name": "svc-{request_id}"}}"#,
        ),
        (
            "IC_SRG1_PP1.end_terminal_power_control_A",
            r#"{"input": {"service-name": "svc-{request_id}", "end": "A"}}"#,
        ),
        (
            "IC_SRG1_PP1.end_terminal_power_control_Z",
            r#"{"input": {"service-name": "svc-{request_id}", "end": "Z"}}"#,
        ),
        (
            "IC_SRG1_PP1.optical_tunnel_request_cancel",
            r#"{"input": {"common-id": "{request_id}"}}"#,
        ),
        (
            "IC_SRG1_PP1.service_delete",
            r#"{"input": {"service-delete-req-info": {"service-name": "svc-{request_id}"}}}"#,
        ),
    ])
}

/// 直連模式的 RNC 指向 mock server，通知等待縮短為 `wait_ms`
pub fn config_toml(rnc_host: &str, rnc_port: u16, wait_ms: u64) -> String {
    format!(
        r#"
[default]
vendor = "VendorA"
oper_mode = "OR-W-400G-oFEC"
component_name = "OCH-1-1"

[operational_mode]
operational_mode_id = "OR-W-400G-oFEC"
min_frequency = 191325000
max_frequency = 196125000
min_granularity = 6250

[vendors.VendorA]
routera_ip = "{a}"
routera_user = "admin"
routera_pass = "a-pass"
routerb_ip = "{z}"
routerb_user = "admin"
routerb_pass = "z-pass"

[vendors.VendorM]
routera_ip = "10.1.0.1"
routera_user = "admin"
routera_pass = "a-pass"
routerb_ip = "10.1.0.2"
routerb_user = "admin"
routerb_pass = "z-pass"
controller = "measurement"

[vendors.Broken]
routera_ip = "10.9.0.1"

[rnc]
host = "{host}"
restconf_port = {port}
mode = "direct"
rest_user = "admin"
rest_pass = "admin"
timeout = 5
timeout_heavy = 5
notification_wait_ms = {wait}
"#,
        a = A_HOST,
        z = Z_HOST,
        host = rnc_host,
        port = rnc_port,
        wait = wait_ms
    )
}

pub struct Harness {
    pub devices: Arc<FakeNetconf>,
    pub bridge: Arc<NotificationBridge>,
    pub dispatch: Arc<VendorDispatch>,
    pub orchestrator: NovaOrchestrator<VendorDispatch, RncClient>,
}

pub fn harness(rnc_host: &str, rnc_port: u16, wait_ms: u64) -> Harness {
    harness_from(&config_toml(rnc_host, rnc_port, wait_ms))
}

pub fn harness_from(toml: &str) -> Harness {
    let config = Arc::new(NovaConfig::from_str(toml).unwrap());
    let devices = FakeNetconf::new();
    let connector: Arc<dyn NetconfConnector> = Arc::new(FakeConnector(devices.clone()));
    let templates = Arc::new(templates());
    let resolver = Arc::new(CapabilityResolver::new(
        connector.clone(),
        Arc::new(OpenConfigLookup::default()),
    ));
    let bridge = Arc::new(NotificationBridge::new(
        std::time::Duration::ZERO,
        std::time::Duration::from_secs(1),
    ));
    let dispatch = Arc::new(VendorDispatch::new(
        config.clone(),
        connector,
        templates.clone(),
        resolver,
    ));
    let rnc = Arc::new(RncClient::new(config.rnc.clone(), templates, bridge.clone()).unwrap());
    Harness {
        devices,
        bridge,
        dispatch: dispatch.clone(),
        orchestrator: NovaOrchestrator::new(dispatch, rnc),
    }
}
