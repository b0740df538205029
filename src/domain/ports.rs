use crate::domain::model::{EndpointRole, JumpHost, OperationResult, ServiceRequest, TemplateVars};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// NETCONF datastore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datastore {
    Candidate,
    Running,
}

impl Datastore {
    pub fn as_str(&self) -> &'static str {
        match self {
            Datastore::Candidate => "candidate",
            Datastore::Running => "running",
        }
    }
}

/// 建立 NETCONF session 所需的位址與憑證
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub via: Option<JumpHost>,
}

#[async_trait]
pub trait NetconfSession: Send {
    /// 對端在 hello 中宣告的 capability URI
    fn capabilities(&self) -> &[String];
    async fn edit_config(&mut self, target: Datastore, config: &str) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;
    async fn get_config(&mut self, source: Datastore, subtree_filter: &str) -> Result<String>;
    async fn get_schema(&mut self, identifier: &str) -> Result<String>;
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait NetconfConnector: Send + Sync {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn NetconfSession>>;
}

/// Payload 模板庫：只依賴 render / not-found 的契約
pub trait PayloadTemplates: Send + Sync {
    fn render(&self, name: &str, vars: &TemplateVars) -> Result<String>;
}

/// 事件串流來源；回傳 `None` 代表串流結束
#[async_trait]
pub trait EventSource: Send {
    async fn recv(&mut self) -> Option<Vec<u8>>;
}

/// IPSDNC 端的請求層操作
#[async_trait]
pub trait TerminalOperations: Send + Sync {
    async fn performance_info(&self, request: &ServiceRequest) -> OperationResult;
    async fn activate(&self, request: &ServiceRequest) -> OperationResult;
    async fn deactivate(&self, request: &ServiceRequest) -> OperationResult;
}

/// RNC/TPCE 端的 RESTCONF 操作
#[async_trait]
pub trait TransportOperations: Send + Sync {
    async fn temp_service_create(&self, request: &ServiceRequest) -> Result<Value>;
    async fn temp_service_list(&self) -> Result<Value>;
    async fn service_power_setup(
        &self,
        end: EndpointRole,
        request: &ServiceRequest,
    ) -> Result<Value>;
    async fn service_create(&self, request: &ServiceRequest) -> Result<Value>;
    async fn service_list(&self) -> Result<Value>;
    async fn optical_tunnel_request_cancel(&self, request: &ServiceRequest) -> Result<Value>;
    async fn service_delete(&self, request: &ServiceRequest) -> Result<Value>;
}
