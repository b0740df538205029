use serde_json::{Map, Value};

/// 已成功步驟登記的補償動作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    DeactivateTerminals,
    CancelOpticalTunnel,
}

impl Compensation {
    /// rollback 報告中的欄位名稱
    pub fn report_key(&self) -> &'static str {
        match self {
            Compensation::DeactivateTerminals => "end_terminal_deactivation",
            Compensation::CancelOpticalTunnel => "optical_tunnel_request_cancel",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Succeeded(Value),
    Failed(Value),
}

#[derive(Debug, Clone)]
pub struct SagaStep {
    pub name: &'static str,
    pub outcome: StepOutcome,
}

/// 一次 orchestrator 呼叫的步驟紀錄，只存在於呼叫期間
#[derive(Debug, Default)]
pub struct SagaExecution {
    steps: Vec<SagaStep>,
    compensations: Vec<Compensation>,
}

impl SagaExecution {
    pub fn new() -> Self {
        Self::default()
    }

    /// 記錄成功的步驟；補償動作只在步驟本身成功時登記
    pub fn succeeded(
        &mut self,
        name: &'static str,
        output: Value,
        compensation: Option<Compensation>,
    ) {
        tracing::info!("✅ Saga step '{}' succeeded", name);
        self.steps.push(SagaStep {
            name,
            outcome: StepOutcome::Succeeded(output),
        });
        if let Some(compensation) = compensation {
            self.compensations.push(compensation);
        }
    }

    /// 記錄失敗但不中止流程的步驟
    pub fn tolerated(&mut self, name: &'static str, detail: Value) {
        tracing::warn!("🔶 Saga step '{}' failed, continuing", name);
        self.steps.push(SagaStep {
            name,
            outcome: StepOutcome::Failed(detail),
        });
    }

    pub fn failed(&mut self, name: &'static str, detail: Value) {
        tracing::error!("❌ Saga step '{}' failed", name);
        self.steps.push(SagaStep {
            name,
            outcome: StepOutcome::Failed(detail),
        });
    }

    pub fn steps(&self) -> &[SagaStep] {
        &self.steps
    }

    /// 反向順序的待執行補償
    pub fn compensations(&self) -> Vec<Compensation> {
        self.compensations.iter().rev().copied().collect()
    }

    /// 每個步驟的輸出（失敗但被容忍的步驟輸出其錯誤內容）
    pub fn outputs(&self) -> Map<String, Value> {
        self.steps
            .iter()
            .map(|step| {
                let value = match &step.outcome {
                    StepOutcome::Succeeded(v) | StepOutcome::Failed(v) => v.clone(),
                };
                (step.name.to_string(), value)
            })
            .collect()
    }
}
