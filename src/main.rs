use anyhow::Context;
use clap::Parser;
use nova::adapters::http;
use nova::adapters::nats::NatsEventSource;
use nova::adapters::netconf::SshNetconfConnector;
use nova::adapters::templates::TemplateStore;
use nova::core::capability::CapabilityResolver;
use nova::core::dispatch::VendorDispatch;
use nova::core::notification::NotificationBridge;
use nova::core::oc_lookup::OpenConfigLookup;
use nova::core::rnc::RncClient;
use nova::utils::error::ErrorSeverity;
use nova::utils::{logger, validation::Validate};
use nova::{CliConfig, NovaConfig, NovaOrchestrator};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("🌐 Starting NOVA (config: {})", cli.config);

    // 載入並驗證配置
    let config = match NovaConfig::from_file(&cli.config).and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(
                "❌ Configuration failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            let exit_code = match e.severity() {
                ErrorSeverity::Critical => 3,
                _ => 1,
            };
            std::process::exit(exit_code);
        }
    };
    let config = Arc::new(config);

    let templates = Arc::new(
        TemplateStore::from_directory(&config.templates.directory)
            .with_context(|| format!("loading templates from {}", config.templates.directory))?,
    );
    let lookup = Arc::new(OpenConfigLookup::build(&config.openconfig));
    let connector = Arc::new(SshNetconfConnector::new(
        config.netconf.connect_timeout(),
        config.netconf.rpc_timeout(),
    ));
    let resolver = Arc::new(CapabilityResolver::new(connector.clone(), lookup));

    let bridge = Arc::new(NotificationBridge::new(
        config.events.pacing(),
        config.events.stop_timeout(),
    ));
    if config.events.enabled {
        match NatsEventSource::connect(&config.events).await {
            Ok(source) => {
                bridge.start(Box::new(source));
            }
            Err(e) => {
                // 沒有事件串流時，建立流程的通知等待會逾時但不失敗
                tracing::warn!("🔶 Event stream unavailable: {}", e);
            }
        }
    } else {
        tracing::info!("⏭️ Event stream disabled by config");
    }

    let dispatch = Arc::new(VendorDispatch::new(
        config.clone(),
        connector,
        templates.clone(),
        resolver,
    ));
    let rnc = Arc::new(
        RncClient::new(config.rnc.clone(), templates, bridge.clone())
            .context("building RNC client")?,
    );
    let orchestrator = Arc::new(NovaOrchestrator::new(dispatch, rnc));

    let listen = cli.listen.clone().unwrap_or_else(|| config.server.listen.clone());
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("binding {}", listen))?;
    tracing::info!("🚀 NOVA ready to orchestrate on http://{}", listen);

    axum::serve(listener, http::router(orchestrator))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("🛑 Shutdown requested");
        })
        .await
        .context("HTTP server failed")?;

    bridge.stop().await;
    tracing::info!("👋 NOVA stopped");
    Ok(())
}
