pub mod toml_config;

pub use toml_config::NovaConfig;

#[cfg(feature = "server")]
use clap::Parser;

#[cfg(feature = "server")]
#[derive(Debug, Clone, Parser)]
#[command(name = "nova")]
#[command(about = "Network Orchestration, Vigilance & Automation: optical service provisioning")]
pub struct CliConfig {
    #[arg(long, short = 'c', default_value = "config/nova.toml")]
    pub config: String,

    #[arg(long, help = "Override [server].listen")]
    pub listen: Option<String>,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[arg(long, short = 'v', help = "Enable verbose output")]
    pub verbose: bool,
}
