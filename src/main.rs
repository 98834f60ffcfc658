// src/main.rs

use tokio::net::TcpListener;
use tracing::{error, info};

use license_gateway::config::get_config;
use license_gateway::logging::init_tracing;
use license_gateway::orchestrator::LicenseOrchestrator;
use license_gateway::server::{build_router, AppState};

/// License gateway entrypoint.
///
/// Loads configuration, wires the orchestrator and serves the HTTP gateway
/// until Ctrl-C. Failing to load config or bind the port is fatal.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = get_config()?;
    init_tracing(&config.logging.level);

    let orchestrator = LicenseOrchestrator::from_config(config)?;
    info!(
        remote = %config.remote.base_url,
        backend = ?config.storage.backend,
        data_dir = %config.storage.data_dir.display(),
        crypto = ?config.crypto.mode,
        force_mode = ?orchestrator.force_mode(),
        "License gateway configured"
    );

    let app = build_router(AppState::new(orchestrator));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .inspect_err(|e| error!("Failed to bind {addr}: {e}"))?;
    info!("Server started on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
}
