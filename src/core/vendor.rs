use crate::core::terminal::TerminalDeviceController;
use crate::domain::model::{ControllerKind, EndpointRole};
use crate::domain::ports::Datastore;
use crate::utils::error::Result;
use async_trait::async_trait;

/// Vendor 專屬的前後置步驟；預設全部為 no-op
#[async_trait]
pub trait VendorHooks: Send + Sync {
    /// 在寫入功率與頻率之前執行，失敗會中止 activation
    async fn pre_activate(
        &self,
        _device: &TerminalDeviceController,
        _end: EndpointRole,
    ) -> Result<()> {
        Ok(())
    }

    async fn post_activate(
        &self,
        _device: &TerminalDeviceController,
        _end: EndpointRole,
    ) -> Result<()> {
        Ok(())
    }

    async fn post_deactivate(
        &self,
        _device: &TerminalDeviceController,
        _end: EndpointRole,
    ) -> Result<()> {
        Ok(())
    }
}

pub struct StandardHooks;

impl VendorHooks for StandardHooks {}

/// activation 後開啟量測，deactivation 後關閉（running datastore）
pub struct MeasurementHooks;

#[async_trait]
impl VendorHooks for MeasurementHooks {
    async fn post_activate(
        &self,
        device: &TerminalDeviceController,
        end: EndpointRole,
    ) -> Result<()> {
        tracing::info!("📏 Measurement ON at {}", device.address(end));
        device
            .apply_payload(end, "measurement_enable", Datastore::Running)
            .await
    }

    async fn post_deactivate(
        &self,
        device: &TerminalDeviceController,
        end: EndpointRole,
    ) -> Result<()> {
        tracing::info!("📏 Measurement OFF at {}", device.address(end));
        device
            .apply_payload(end, "measurement_disable", Datastore::Running)
            .await
    }
}

/// 依控制器種類選出 hook 組合；JumpHost 只影響連線方式
pub fn hooks_for(kind: ControllerKind) -> Box<dyn VendorHooks> {
    match kind {
        ControllerKind::Standard | ControllerKind::JumpHost => Box::new(StandardHooks),
        ControllerKind::Measurement => Box::new(MeasurementHooks),
    }
}
