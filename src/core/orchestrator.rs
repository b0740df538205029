use crate::core::saga::{Compensation, SagaExecution};
use crate::domain::model::{EndpointRole, OperationFailure, ServiceRequest};
use crate::domain::ports::{TerminalOperations, TransportOperations};
use crate::utils::error::NovaError;
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const PERFORMANCE_INFO: &str = "end_terminal_performance_info";
pub const TEMP_SERVICE: &str = "temporary_service_creation";
pub const ACTIVATION: &str = "end_terminal_activation";
pub const SERVICE_CREATION: &str = "service_creation";
pub const POWER_CONTROL_A: &str = "end_terminal_power_control_A";
pub const POWER_CONTROL_Z: &str = "end_terminal_power_control_Z";
pub const DEACTIVATION: &str = "end_terminal_deactivation";
pub const SERVICE_DELETION: &str = "service_deletion";

/// saga 失敗：失敗的步驟、錯誤內容與 rollback 結果
#[derive(Debug)]
pub struct SagaFailure {
    pub status: u16,
    pub error: String,
    pub failed_step: &'static str,
    pub detail: Value,
    pub rollback: Option<Map<String, Value>>,
}

impl SagaFailure {
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "error": self.error,
            "failed_step": self.failed_step,
            "detail": self.detail,
        });
        if let (Some(rollback), Some(obj)) = (&self.rollback, body.as_object_mut()) {
            obj.insert("rollback".to_string(), Value::Object(rollback.clone()));
        }
        body
    }
}

pub type SagaResult = std::result::Result<Value, SagaFailure>;

/// 步驟失敗的來源：控制器操作（含 conf_log）或 RESTCONF 呼叫
enum StepError {
    Terminal(OperationFailure),
    Transport(NovaError),
}

impl StepError {
    fn status(&self) -> u16 {
        match self {
            StepError::Terminal(f) => f.status_code(),
            StepError::Transport(e) => e.status_code(),
        }
    }

    fn detail(&self) -> Value {
        match self {
            StepError::Terminal(f) => f.to_json(),
            StepError::Transport(e) => Value::String(e.to_string()),
        }
    }
}

/// 跨 IPSDNC 與 RNC 的 create/delete saga
pub struct NovaOrchestrator<T: TerminalOperations, R: TransportOperations> {
    terminal: Arc<T>,
    transport: Arc<R>,
}

impl<T: TerminalOperations, R: TransportOperations> NovaOrchestrator<T, R> {
    pub fn new(terminal: Arc<T>, transport: Arc<R>) -> Self {
        Self { terminal, transport }
    }

    pub fn terminal(&self) -> &Arc<T> {
        &self.terminal
    }

    pub fn transport(&self) -> &Arc<R> {
        &self.transport
    }

    pub async fn create_service(&self, request: &ServiceRequest) -> SagaResult {
        tracing::info!("🚀 create_service started (request-id {})", request.request_id);
        let mut saga = SagaExecution::new();

        // 1) performance info：失敗不中止
        match self.terminal.performance_info(request).await {
            Ok(info) => saga.succeeded(PERFORMANCE_INFO, info, None),
            Err(failure) => saga.tolerated(PERFORMANCE_INFO, failure.to_json()),
        }

        // 2) 暫時路徑：尚無需補償的項目
        match self.transport.temp_service_create(request).await {
            Ok(tmp) => {
                saga.succeeded(TEMP_SERVICE, tmp, Some(Compensation::CancelOpticalTunnel))
            }
            Err(e) => {
                return Err(self
                    .fail(
                        &mut saga,
                        request,
                        TEMP_SERVICE,
                        "Temporary service creation failed",
                        StepError::Transport(e),
                    )
                    .await)
            }
        }

        // 3) 終端啟用
        match self.terminal.activate(request).await {
            Ok(act) => {
                saga.succeeded(ACTIVATION, act, Some(Compensation::DeactivateTerminals))
            }
            Err(failure) => {
                return Err(self
                    .fail(
                        &mut saga,
                        request,
                        ACTIVATION,
                        "End terminal activation failed",
                        StepError::Terminal(failure),
                    )
                    .await)
            }
        }

        // 4) 正式服務
        match self.transport.service_create(request).await {
            Ok(svc) => saga.succeeded(SERVICE_CREATION, svc, None),
            Err(e) => {
                return Err(self
                    .fail(
                        &mut saga,
                        request,
                        SERVICE_CREATION,
                        "Service creation failed",
                        StepError::Transport(e),
                    )
                    .await)
            }
        }

        // 5) 功率調整，A 端後 Z 端
        let ends = [(EndpointRole::A, POWER_CONTROL_A), (EndpointRole::Z, POWER_CONTROL_Z)];
        for (end, step) in ends {
            match self.transport.service_power_setup(end, request).await {
                Ok(power) => saga.succeeded(step, power, None),
                Err(e) => {
                    let message = format!("Power setup failed at {}", end);
                    return Err(self
                        .fail(&mut saga, request, step, &message, StepError::Transport(e))
                        .await);
                }
            }
        }

        tracing::info!("🎉 create_service completed (request-id {})", request.request_id);
        Ok(Value::Object(saga.outputs()))
    }

    /// 先停用終端再刪除服務；失敗原樣回報，不做補償
    pub async fn delete_service(&self, request: &ServiceRequest) -> SagaResult {
        tracing::info!("🗑️ delete_service started (request-id {})", request.request_id);
        let mut saga = SagaExecution::new();

        match self.terminal.deactivate(request).await {
            Ok(deact) => saga.succeeded(DEACTIVATION, deact, None),
            Err(failure) => {
                return Err(self
                    .fail(
                        &mut saga,
                        request,
                        DEACTIVATION,
                        "End terminal deactivation failed",
                        StepError::Terminal(failure),
                    )
                    .await)
            }
        }

        match self.transport.service_delete(request).await {
            Ok(deleted) => saga.succeeded(SERVICE_DELETION, deleted, None),
            Err(e) => {
                return Err(self
                    .fail(
                        &mut saga,
                        request,
                        SERVICE_DELETION,
                        "Service deletion failed",
                        StepError::Transport(e),
                    )
                    .await)
            }
        }

        Ok(Value::Object(saga.outputs()))
    }

    async fn fail(
        &self,
        saga: &mut SagaExecution,
        request: &ServiceRequest,
        step: &'static str,
        message: &str,
        error: StepError,
    ) -> SagaFailure {
        let detail = error.detail();
        saga.failed(step, detail.clone());
        tracing::error!("❌ {}: {}", message, detail);

        let compensations = saga.compensations();
        let rollback = if compensations.is_empty() {
            None
        } else {
            Some(self.compensate(&compensations, request).await)
        };

        SagaFailure {
            status: error.status(),
            error: message.to_string(),
            failed_step: step,
            detail,
            rollback,
        }
    }

    /// 每個補償動作都會執行，即使前一個失敗
    async fn compensate(
        &self,
        compensations: &[Compensation],
        request: &ServiceRequest,
    ) -> Map<String, Value> {
        let mut report = Map::new();
        for compensation in compensations {
            tracing::info!("↩️ Rollback: {}", compensation.report_key());
            let outcome = match compensation {
                Compensation::DeactivateTerminals => self
                    .terminal
                    .deactivate(request)
                    .await
                    .map_err(|failure| failure.to_json()),
                Compensation::CancelOpticalTunnel => self
                    .transport
                    .optical_tunnel_request_cancel(request)
                    .await
                    .map_err(|e| json!({ "error": e.to_string() })),
            };
            let value = match outcome {
                Ok(value) => value,
                Err(error) => {
                    tracing::error!(
                        "❌ Rollback step {} failed: {}",
                        compensation.report_key(),
                        error
                    );
                    error
                }
            };
            report.insert(compensation.report_key().to_string(), value);
        }
        report
    }
}
