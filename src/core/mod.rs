pub mod capability;
pub mod dispatch;
pub mod notification;
pub mod oc_lookup;
pub mod orchestrator;
pub mod rnc;
pub mod saga;
pub mod terminal;
pub mod vendor;

pub use crate::domain::model::{OperationResult, ServiceRequest};
pub use crate::domain::ports::{TerminalOperations, TransportOperations};
pub use crate::utils::error::Result;
