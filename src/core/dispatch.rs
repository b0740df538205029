use crate::config::toml_config::NovaConfig;
use crate::core::capability::CapabilityResolver;
use crate::core::terminal::{TerminalDeviceController, TuningParams};
use crate::domain::model::{
    normalize_vendor, ControllerKind, OperationFailure, OperationResult, ServiceRequest,
};
use crate::domain::ports::{NetconfConnector, PayloadTemplates, TerminalOperations};
use crate::utils::error::{NovaError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

type ControllerCell = Arc<OnceCell<Arc<TerminalDeviceController>>>;

/// vendor 標籤 → 快取的終端控制器（每個 vendor 只建立一次）
pub struct VendorDispatch {
    config: Arc<NovaConfig>,
    connector: Arc<dyn NetconfConnector>,
    templates: Arc<dyn PayloadTemplates>,
    resolver: Arc<CapabilityResolver>,
    controllers: Mutex<HashMap<String, ControllerCell>>,
}

impl VendorDispatch {
    pub fn new(
        config: Arc<NovaConfig>,
        connector: Arc<dyn NetconfConnector>,
        templates: Arc<dyn PayloadTemplates>,
        resolver: Arc<CapabilityResolver>,
    ) -> Self {
        Self {
            config,
            connector,
            templates,
            resolver,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    /// 正規化 vendor 標籤；空值時使用設定中的預設 vendor
    pub fn vendor_key(&self, label: Option<&str>) -> String {
        label
            .map(normalize_vendor)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.config.default_vendor())
    }

    /// 取得（必要時建立）vendor 的控制器
    ///
    /// 建立失敗（例如缺少憑證）時不寫入快取，下次請求會重新嘗試。
    pub async fn controller_for(
        &self,
        label: Option<&str>,
    ) -> Result<Arc<TerminalDeviceController>> {
        let vendor = self.vendor_key(label);
        let cell = {
            let mut controllers = match self.controllers.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            controllers.entry(vendor.clone()).or_default().clone()
        };

        let controller = cell
            .get_or_try_init(|| async { self.build(&vendor).await.map(Arc::new) })
            .await?;
        Ok(controller.clone())
    }

    pub fn cached_vendors(&self) -> Vec<String> {
        let controllers = match self.controllers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        controllers
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(vendor, _)| vendor.clone())
            .collect()
    }

    async fn build(&self, vendor: &str) -> Result<TerminalDeviceController> {
        if vendor.is_empty() {
            return Err(NovaError::config(
                "no vendor in request and [default].vendor is not configured",
            ));
        }
        let section = self
            .config
            .vendor_section(vendor)
            .ok_or_else(|| NovaError::config(format!("vendor '{}' is not configured", vendor)))?;

        let kind = resolve_kind(vendor, section.controller.as_deref());
        let profile =
            section.to_profile(vendor, kind, self.config.default.oper_mode.as_deref())?;

        let controller = TerminalDeviceController::new(
            profile,
            self.config.operational_mode.clone(),
            self.config.default.component_name.clone(),
            self.connector.clone(),
            self.templates.clone(),
            self.resolver.clone(),
        );
        controller.negotiate_capabilities().await;
        Ok(controller)
    }

    async fn dispatch(
        &self,
        request: &ServiceRequest,
    ) -> std::result::Result<Arc<TerminalDeviceController>, OperationFailure> {
        self.controller_for(request.vendor.as_deref()).await.map_err(|e| {
            tracing::error!("❌ No controller for vendor {:?}: {}", request.vendor, e);
            OperationFailure::from(e)
        })
    }

    /// 建立控制器（會連線設備）之前先檢查必要參數
    fn check_tuning(
        &self,
        request: &ServiceRequest,
        action: &str,
    ) -> std::result::Result<(), OperationFailure> {
        let default_component = self.config.default.component_name.as_deref();
        TuningParams::from_request(request, default_component)
            .map(|_| ())
            .map_err(|e| {
                tracing::error!("❌ {} rejected: {}", action, e);
                OperationFailure::from(e)
            })
    }
}

/// 綁定名稱解析失敗時退回 Standard，不阻擋行程
fn resolve_kind(vendor: &str, binding: Option<&str>) -> ControllerKind {
    match binding {
        None => ControllerKind::Standard,
        Some(name) => ControllerKind::from_binding(name).unwrap_or_else(|| {
            tracing::warn!(
                "🔶 Unknown controller binding '{}' for vendor '{}', using standard",
                name,
                vendor
            );
            ControllerKind::Standard
        }),
    }
}

#[async_trait]
impl TerminalOperations for VendorDispatch {
    async fn performance_info(&self, request: &ServiceRequest) -> OperationResult {
        self.dispatch(request).await?.performance_info(request).await
    }

    async fn activate(&self, request: &ServiceRequest) -> OperationResult {
        self.check_tuning(request, "Activation")?;
        self.dispatch(request).await?.activate(request).await
    }

    async fn deactivate(&self, request: &ServiceRequest) -> OperationResult {
        self.check_tuning(request, "Deactivation")?;
        self.dispatch(request).await?.deactivate(request).await
    }
}
