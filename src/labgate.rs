use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use labgate::{
    build_router,
    config::Config,
    events::EventBus,
    gateway::GuacamoleClient,
    lifecycle::{LifecycleConfig, LifecycleManager},
    scenario::{ScenarioCatalog, ScenarioRunner},
    session::SessionManager,
    vm::VmTrigger,
    AppState, BUILD_TIME, VERSION,
};

/// Crate modules plus the `security` and `perf` event targets.
fn default_directives(level: &str) -> String {
    format!(
        "labgate={level},labgate_backend={level},security={level},perf={level},tower_http=info",
        level = level
    )
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.observability.log_level)));

    if config.observability.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

fn load_catalog(config: &Config) -> Result<ScenarioCatalog> {
    match &config.scenario.catalog_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read scenario catalog {}", path.display()))?;
            ScenarioCatalog::from_json(&raw)
                .with_context(|| format!("Invalid scenario catalog {}", path.display()))
        }
        None => Ok(ScenarioCatalog::builtin(&config.scenario.scripts_root)),
    }
}

async fn shutdown_signal(tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Shutdown signal received");
    let _ = tx.send(true);
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    init_tracing(&config);

    info!("🧪 LABGATE Backend Starting");
    info!("Version: {} (built {})", VERSION, BUILD_TIME.trim());
    info!("Listen address: {}", config.server.listen_addr);
    info!("Environment: {}", config.server.environment);
    let roles: Vec<&str> = config.gateway.roles.iter().map(|r| r.name.as_str()).collect();
    info!("Roles: {}", roles.join(", "));

    let catalog = load_catalog(&config)?;
    info!("✅ Scenario catalog loaded ({} scenarios)", catalog.len());

    let guacamole = GuacamoleClient::new(&config.gateway).context("Failed to build gateway client")?;
    match guacamole.probe().await {
        Ok(status) if status.is_success() => {
            info!("✅ Guacamole connectivity test passed ({})", config.gateway.base_url)
        }
        Ok(status) => warn!("⚠️ Guacamole answered with HTTP {}", status.as_u16()),
        Err(e) => error!("❌ Guacamole connectivity test failed: {}", e),
    }

    let config = Arc::new(config);
    let events = EventBus::default();
    let sessions = Arc::new(SessionManager::in_memory(config.session_idle_timeout()));
    let gateway = Arc::new(guacamole);
    let vm = Arc::new(VmTrigger::new(&config.vm, events.clone()));
    info!("🖥️ VM trigger ready in {}", config.vm.workdir.display());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let lifecycle = Arc::new(LifecycleManager::new(
        sessions.clone(),
        gateway.clone(),
        events.clone(),
        LifecycleConfig {
            sweep_interval: config.session_sweep_interval(),
        },
    ));
    let sweeper = lifecycle.start(shutdown_rx);

    let state = AppState {
        config: config.clone(),
        sessions,
        gateway,
        scenarios: ScenarioRunner::new(catalog, config.scenario_timeout()),
        vm,
        events,
    };
    let app = build_router(state);

    let addr = config.server.listen_addr;
    info!("🌐 Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("✅ LABGATE Backend Ready");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_tx))
    .await
    .context("Server error")?;

    let grace = Duration::from_secs(config.server.graceful_shutdown_timeout_secs);
    if tokio::time::timeout(grace, sweeper).await.is_err() {
        warn!("Session sweep did not stop within {}s", grace.as_secs());
    }
    info!("👋 LABGATE Backend stopped");
    Ok(())
}
