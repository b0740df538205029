pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "server")]
pub use config::CliConfig;

pub use config::NovaConfig;
pub use core::orchestrator::NovaOrchestrator;
pub use domain::model::ServiceRequest;
pub use utils::error::{NovaError, Result};
