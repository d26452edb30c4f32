mod handlers;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use crucible_common::EngineConfig;
use crucible_engine::ExecutionEngine;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

const ENV_LISTEN_ADDR: &str = "CRUCIBLE_LISTEN_ADDR";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

pub struct AppState {
    pub engine: Arc<ExecutionEngine>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new().merge(routes::routes()).with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Crucible API booting...");

    let config = EngineConfig::from_env().context("Invalid engine configuration")?;
    let engine = ExecutionEngine::connect(&config).context("Failed to set up Docker client")?;

    // Not fatal: the daemon may come up after us
    match engine.ping().await {
        Ok(()) => info!("Connected to Docker"),
        Err(e) => warn!(error = %e, "Docker is not reachable yet"),
    }

    info!(
        workspace_root = %config.workspace_root.display(),
        max_output_bytes = config.max_output_bytes,
        "Engine configured"
    );

    let state = Arc::new(AppState {
        engine: Arc::new(engine),
    });

    let addr = std::env::var(ENV_LISTEN_ADDR).unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C, serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining in-flight executions");
}
