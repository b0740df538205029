use crate::domain::model::{
    normalize_vendor, ConnectionStrategy, ControllerKind, Credentials, DeviceEndpoint, EndpointRole,
    JumpHost, VendorProfile,
};
use crate::utils::error::{NovaError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NovaConfig {
    #[serde(default)]
    pub default: DefaultConfig,
    #[serde(default)]
    pub operational_mode: OperationalModeInfo,
    #[serde(default)]
    pub vendors: HashMap<String, VendorSection>,
    #[serde(default)]
    pub netconf: NetconfConfig,
    pub rnc: RncConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub openconfig: OpenConfigSettings,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultConfig {
    pub vendor: Option<String>,
    pub oper_mode: Option<String>,
    pub component_name: Option<String>,
}

/// 靜態的 operational-mode 範圍，合併進 performance info 回應
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationalModeInfo {
    #[serde(alias = "operational-mode-id")]
    pub operational_mode_id: Option<String>,
    #[serde(alias = "min-central-frequency")]
    pub min_frequency: Option<f64>,
    #[serde(alias = "max-central-frequency")]
    pub max_frequency: Option<f64>,
    #[serde(alias = "central-frequency-granularity")]
    pub min_granularity: Option<f64>,
}

/// 單一 vendor 區塊，支援 routerA/routerB 與 MPDR A/Z 兩種鍵名
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendorSection {
    #[serde(alias = "mpdra_ip")]
    pub routera_ip: Option<String>,
    #[serde(alias = "mpdra_user")]
    pub routera_user: Option<String>,
    #[serde(alias = "mpdra_pass")]
    pub routera_pass: Option<String>,
    #[serde(alias = "mpdrz_ip")]
    pub routerb_ip: Option<String>,
    #[serde(alias = "mpdrz_user")]
    pub routerb_user: Option<String>,
    #[serde(alias = "mpdrz_pass")]
    pub routerb_pass: Option<String>,
    pub jump_host: Option<String>,
    pub jump_user: Option<String>,
    pub jump_pass: Option<String>,
    pub jump_port: Option<u16>,
    pub oper_mode: Option<String>,
    pub controller: Option<String>,
    pub netconf_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetconfConfig {
    #[serde(default = "default_netconf_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_netconf_rpc_timeout")]
    pub rpc_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RncMode {
    Direct,
    Tunnel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RncConfig {
    pub host: String,
    #[serde(default = "default_restconf_port")]
    pub restconf_port: u16,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_rnc_mode")]
    pub mode: RncMode,
    pub rest_user: String,
    pub rest_pass: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(alias = "username")]
    pub ssh_user: Option<String>,
    #[serde(alias = "password")]
    pub ssh_pass: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_quick_timeout")]
    pub timeout: u64,
    #[serde(default = "default_heavy_timeout")]
    pub timeout_heavy: u64,
    #[serde(default = "default_notification_wait_ms")]
    pub notification_wait_ms: u64,
    #[serde(default = "default_template_prefix")]
    pub template_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_broker")]
    pub broker: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default = "default_group", alias = "group_id")]
    pub group: String,
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default = "default_templates_dir")]
    pub directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenConfigSettings {
    #[serde(default = "default_oc_repository")]
    pub repository: String,
    #[serde(default = "default_oc_platform_file")]
    pub platform_file: String,
    #[serde(default)]
    pub fetch_tags: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_netconf_connect_timeout() -> u64 {
    30
}
fn default_netconf_rpc_timeout() -> u64 {
    200
}
fn default_restconf_port() -> u16 {
    8181
}
fn default_scheme() -> String {
    "http".to_string()
}
fn default_rnc_mode() -> RncMode {
    RncMode::Tunnel
}
fn default_ssh_port() -> u16 {
    22
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_quick_timeout() -> u64 {
    60
}
fn default_heavy_timeout() -> u64 {
    180
}
fn default_notification_wait_ms() -> u64 {
    120_000
}
fn default_template_prefix() -> String {
    "IC_SRG1_PP1".to_string()
}
fn default_broker() -> String {
    "nats://localhost:4222".to_string()
}
fn default_group() -> String {
    "nova".to_string()
}
fn default_pacing_ms() -> u64 {
    1000
}
fn default_stop_timeout_ms() -> u64 {
    5000
}
fn default_templates_dir() -> String {
    "payloads".to_string()
}
fn default_oc_repository() -> String {
    "openconfig-public".to_string()
}
fn default_oc_platform_file() -> String {
    "release/models/platform/openconfig-platform.yang".to_string()
}
fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}

impl Default for NetconfConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_netconf_connect_timeout(),
            rpc_timeout_secs: default_netconf_rpc_timeout(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: default_broker(),
            topic: String::new(),
            group: default_group(),
            pacing_ms: default_pacing_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            directory: default_templates_dir(),
        }
    }
}

impl Default for OpenConfigSettings {
    fn default() -> Self {
        Self {
            repository: default_oc_repository(),
            platform_file: default_oc_platform_file(),
            fetch_tags: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl NetconfConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

impl RncConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn quick_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn heavy_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_heavy)
    }

    pub fn notification_wait(&self) -> Duration {
        Duration::from_millis(self.notification_wait_ms)
    }
}

impl EventsConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl NovaConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            NovaError::config(format!(
                "cannot read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_str(&content)
    }

    /// 從 TOML 字串解析配置
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        let mut config: NovaConfig = toml::from_str(&processed_content).map_err(|e| {
            NovaError::InvalidConfigValueError {
                field: "toml_parsing".to_string(),
                value: String::new(),
                reason: format!("TOML parsing error: {}", e),
            }
        })?;

        // vendor 鍵一律小寫
        config.vendors = config
            .vendors
            .into_iter()
            .map(|(name, section)| (normalize_vendor(&name), section))
            .collect();
        config.default.vendor = config.default.vendor.as_deref().map(normalize_vendor);

        Ok(config)
    }

    /// 替換 `${VAR}` 環境變數，不存在的保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| NovaError::config(format!("env pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 未設定 `[default].vendor` 時回傳空字串
    pub fn default_vendor(&self) -> String {
        self.default.vendor.clone().unwrap_or_default()
    }

    pub fn vendor_section(&self, vendor: &str) -> Option<&VendorSection> {
        self.vendors.get(vendor)
    }
}

impl Validate for NovaConfig {
    fn validate(&self) -> Result<()> {
        let rnc = &self.rnc;
        validation::validate_non_empty_string("rnc.host", &rnc.host)?;
        validation::validate_port("rnc.restconf_port", rnc.restconf_port)?;
        validation::validate_one_of("rnc.scheme", &rnc.scheme, &["http", "https"])?;
        validation::validate_non_empty_string("rnc.rest_user", &rnc.rest_user)?;
        validation::validate_non_empty_string("rnc.rest_pass", &rnc.rest_pass)?;
        validation::validate_positive_number("rnc.connect_timeout", rnc.connect_timeout, 1)?;
        validation::validate_positive_number("rnc.timeout", rnc.timeout, 1)?;
        validation::validate_positive_number("rnc.timeout_heavy", rnc.timeout_heavy, 1)?;
        validation::validate_non_empty_string("rnc.template_prefix", &rnc.template_prefix)?;

        if rnc.mode == RncMode::Tunnel {
            validation::validate_port("rnc.ssh_port", rnc.ssh_port)?;
            validation::validate_required_field("rnc.ssh_user", &rnc.ssh_user)?;
            validation::validate_required_field("rnc.ssh_pass", &rnc.ssh_pass)?;
        }

        validation::validate_positive_number(
            "netconf.connect_timeout_secs",
            self.netconf.connect_timeout_secs,
            1,
        )?;
        validation::validate_positive_number(
            "netconf.rpc_timeout_secs",
            self.netconf.rpc_timeout_secs,
            1,
        )?;

        if self.events.enabled {
            validation::validate_url("events.broker", &self.events.broker)?;
            validation::validate_non_empty_string("events.topic", &self.events.topic)?;
            validation::validate_non_empty_string("events.group", &self.events.group)?;
        }

        validation::validate_non_empty_string("server.listen", &self.server.listen)?;
        Ok(())
    }
}

impl VendorSection {
    /// 把 vendor 區塊轉成 VendorProfile；缺少位址或憑證時回傳 ConfigError
    pub fn to_profile(
        &self,
        vendor: &str,
        kind: ControllerKind,
        default_oper_mode: Option<&str>,
    ) -> Result<VendorProfile> {
        let require = |value: &Option<String>, key: &str| -> Result<String> {
            value
                .as_ref()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    NovaError::config(format!("vendor '{}' is missing '{}'", vendor, key))
                })
        };

        let jump_host = match (&self.jump_host, &self.jump_user, &self.jump_pass) {
            (Some(host), Some(user), Some(pass)) if !host.trim().is_empty() => Some(JumpHost {
                host: host.trim().to_string(),
                port: self.jump_port.unwrap_or(22),
                credentials: Credentials {
                    username: user.clone(),
                    password: pass.clone(),
                },
            }),
            (None, _, _) if kind != ControllerKind::JumpHost => None,
            _ => {
                return Err(NovaError::config(format!(
                    "jump host credentials missing for vendor '{}'",
                    vendor
                )))
            }
        };

        let strategy = match &jump_host {
            Some(jump) => ConnectionStrategy::Tunneled(jump.clone()),
            None => ConnectionStrategy::Direct,
        };
        let port = self.netconf_port.unwrap_or(830);

        let a_end = DeviceEndpoint {
            address: require(&self.routera_ip, "routera_ip")?,
            port,
            credentials: Credentials {
                username: require(&self.routera_user, "routera_user")?,
                password: require(&self.routera_pass, "routera_pass")?,
            },
            role: EndpointRole::A,
            strategy: strategy.clone(),
        };
        let z_end = DeviceEndpoint {
            address: require(&self.routerb_ip, "routerb_ip")?,
            port,
            credentials: Credentials {
                username: require(&self.routerb_user, "routerb_user")?,
                password: require(&self.routerb_pass, "routerb_pass")?,
            },
            role: EndpointRole::Z,
            strategy,
        };

        Ok(VendorProfile {
            vendor: vendor.to_string(),
            a_end,
            z_end,
            jump_host,
            oper_mode: self
                .oper_mode
                .clone()
                .or_else(|| default_oper_mode.map(str::to_string)),
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
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
routera_ip = "10.0.0.1"
routera_user = "admin"
routera_pass = "a-pass"
routerb_ip = "10.0.0.2"
routerb_user = "admin"
routerb_pass = "z-pass"
controller = "measurement"

[vendors.vendorb]
mpdra_ip = "172.16.0.1"
mpdra_user = "ua"
mpdra_pass = "pa"
mpdrz_ip = "172.16.0.2"
mpdrz_user = "uz"
mpdrz_pass = "pz"
jump_host = "bastion"
jump_user = "jump"
jump_pass = "jp"
controller = "jump-host"

[rnc]
host = "192.168.1.10"
mode = "direct"
rest_user = "admin"
rest_pass = "admin"
"#;

    #[test]
    fn test_parse_and_normalize_vendors() {
        let config = NovaConfig::from_str(SAMPLE).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_vendor(), "vendora");
        assert!(config.vendor_section("vendora").is_some());

        let bare = SAMPLE.replace("vendor = \"VendorA\"", "");
        let config = NovaConfig::from_str(&bare).unwrap();
        assert_eq!(config.default_vendor(), "");
        assert_eq!(config.rnc.restconf_port, 8181);
        assert_eq!(config.rnc.mode, RncMode::Direct);
        assert_eq!(config.rnc.notification_wait(), Duration::from_secs(120));
        assert!(!config.events.enabled);
    }

    #[test]
    fn test_alternate_key_scheme_builds_tunneled_profile() {
        let config = NovaConfig::from_str(SAMPLE).unwrap();
        let section = config.vendor_section("vendorb").unwrap();
        let profile = section
            .to_profile("vendorb", ControllerKind::JumpHost, Some("mode-x"))
            .unwrap();
        assert_eq!(profile.a_end.address, "172.16.0.1");
        assert_eq!(profile.z_end.credentials.username, "uz");
        assert_eq!(profile.a_end.credentials.password, "pa");
        assert_eq!(profile.oper_mode.as_deref(), Some("mode-x"));
        assert!(matches!(
            profile.z_end.strategy,
            ConnectionStrategy::Tunneled(ref jump) if jump.port == 22 && jump.host == "bastion"
        ));
    }

    #[test]
    fn test_missing_credentials_is_configuration_error() {
        let section = VendorSection {
            routera_ip: Some("10.0.0.1".into()),
            routera_user: Some("admin".into()),
            routerb_ip: Some("10.0.0.2".into()),
            ..Default::default()
        };
        let err = section
            .to_profile("broken", ControllerKind::Standard, None)
            .unwrap_err();
        assert!(matches!(err, NovaError::ConfigError { .. }));
    }

    #[test]
    fn test_jump_host_kind_requires_jump_credentials() {
        let section = VendorSection {
            routera_ip: Some("10.0.0.1".into()),
            routera_user: Some("u".into()),
            routera_pass: Some("p".into()),
            routerb_ip: Some("10.0.0.2".into()),
            routerb_user: Some("u".into()),
            routerb_pass: Some("p".into()),
            jump_host: Some("bastion".into()),
            ..Default::default()
        };
        assert!(section
            .to_profile("nec", ControllerKind::JumpHost, None)
            .is_err());
    }

    #[test]
    fn test_tunnel_mode_requires_ssh_credentials() {
        let toml = SAMPLE.replace("mode = \"direct\"", "mode = \"tunnel\"");
        let config = NovaConfig::from_str(&toml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(NovaError::MissingConfigError { .. })
        ));
    }
}
