use crate::core::oc_lookup::{extract_oc_ext_version, OpenConfigLookup, PLATFORM_MODULE};
use crate::domain::model::{CapabilityEntry, DeviceCapabilities};
use crate::domain::ports::{ConnectTarget, NetconfConnector};
use crate::utils::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

const MONITORING_CAPABILITY: &str = "ietf-netconf-monitoring";
const OPENCONFIG_MARKER: &str = "openconfig";

type CapabilityCell = Arc<OnceCell<Arc<DeviceCapabilities>>>;

/// 每台設備的 OpenConfig module revision/version 快取
///
/// 第一次接觸某個位址時建立一次 session；之後都命中快取，直到行程重啟。
/// 同一位址的並行首次請求共用同一個初始化（single-flight）。
pub struct CapabilityResolver {
    connector: Arc<dyn NetconfConnector>,
    lookup: Arc<OpenConfigLookup>,
    cache: Mutex<HashMap<String, CapabilityCell>>,
}

impl CapabilityResolver {
    pub fn new(connector: Arc<dyn NetconfConnector>, lookup: Arc<OpenConfigLookup>) -> Self {
        Self {
            connector,
            lookup,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn lookup(&self) -> &OpenConfigLookup {
        &self.lookup
    }

    /// 取得設備能力；連線失敗時記錄空集合，不回傳錯誤
    pub async fn resolve(&self, target: &ConnectTarget) -> Arc<DeviceCapabilities> {
        let cell = self.cell_for(&target.host);
        cell.get_or_init(|| async {
            match self.fetch(target).await {
                Ok(caps) => {
                    tracing::info!(
                        "✅ Cached OpenConfig capabilities for {}: {} modules",
                        target.host,
                        caps.modules.len()
                    );
                    tracing::debug!("📋 {}: {:?}", target.host, caps.modules);
                    Arc::new(caps)
                }
                Err(e) => {
                    tracing::warn!(
                        "🔶 Could not fetch capabilities from {}: {}",
                        target.host,
                        e
                    );
                    Arc::new(DeviceCapabilities::default())
                }
            }
        })
        .await
        .clone()
    }

    /// module 的版本：platform module 優先採用 schema 中的 semver，否則由 revision 查表
    pub async fn version_for(&self, target: &ConnectTarget, module: &str) -> Option<String> {
        let caps = self.resolve(target).await;
        let entry = caps.get(module)?;
        if module == PLATFORM_MODULE {
            if let Some(version) = &entry.version {
                return Some(version.clone());
            }
            let revision = entry.revision.as_deref()?;
            return Some(
                self.lookup
                    .version_by_revision(module, revision)
                    .unwrap_or(revision)
                    .to_string(),
            );
        }
        entry.revision.clone()
    }

    pub async fn revision_for(&self, target: &ConnectTarget, module: &str) -> Option<String> {
        self.resolve(target)
            .await
            .get(module)
            .and_then(|entry| entry.revision.clone())
    }

    fn cell_for(&self, address: &str) -> CapabilityCell {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.entry(address.to_string()).or_default().clone()
    }

    async fn fetch(&self, target: &ConnectTarget) -> Result<DeviceCapabilities> {
        tracing::info!("🔍 Fetching device capabilities from {}", target.host);
        let mut session = self.connector.connect(target).await?;
        let advertised = session.capabilities().to_vec();

        let mut caps = parse_capabilities(advertised.iter().map(String::as_str));

        if advertised.iter().any(|c| c.contains(MONITORING_CAPABILITY)) {
            for (module, entry) in caps.modules.iter_mut() {
                match session.get_schema(module).await {
                    Ok(schema) => {
                        entry.version = extract_oc_ext_version(&schema);
                        if let Some(version) = &entry.version {
                            tracing::debug!("📋 {}: {} version {}", target.host, module, version);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(
                            "⏭️ Skipping get-schema for {} on {}: {}",
                            module,
                            target.host,
                            e
                        );
                    }
                }
            }
        }

        if let Err(e) = session.close().await {
            tracing::debug!("close-session on {} failed: {}", target.host, e);
        }
        Ok(caps)
    }
}

/// 解析單一 capability URI 的 `module=` 與 `revision=` 參數
pub fn parse_capability(uri: &str) -> Option<CapabilityEntry> {
    if !uri.contains("module=") {
        return None;
    }
    let query = uri.rsplit('?').next().unwrap_or(uri);
    let mut module = None;
    let mut revision = None;
    for part in query.split('&') {
        if let Some(value) = part.strip_prefix("module=") {
            module = Some(value.to_string());
        } else if let Some(value) = part.strip_prefix("revision=") {
            revision = Some(value.to_string());
        }
    }
    module
        .filter(|m| !m.is_empty())
        .map(|module| CapabilityEntry {
            module,
            revision,
            version: None,
        })
}

/// 只保留 OpenConfig 相關的 capability
pub fn parse_capabilities<'a, I>(uris: I) -> DeviceCapabilities
where
    I: IntoIterator<Item = &'a str>,
{
    let modules = uris
        .into_iter()
        .filter(|uri| uri.contains(OPENCONFIG_MARKER))
        .filter_map(parse_capability)
        .map(|entry| (entry.module.clone(), entry))
        .collect();
    DeviceCapabilities { modules }
}
