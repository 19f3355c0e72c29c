//! `semverd` server entry point.
//!
//! Initializes the configured storage backend, then starts the Axum HTTP
//! server with graceful shutdown. Storage connections are closed once the
//! server has drained.

use std::sync::Arc;

use anyhow::Context;
use semverd_storage::Manager;
use tokio::net::TcpListener;
use tracing::info;

use semverd_server::config::ServerConfig;
use semverd_server::routes;
use semverd_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment.
    let config = ServerConfig::from_env().context("invalid configuration")?;

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(storage = config.storage.name(), "semverd starting");

    let manager = Manager::init(&config.storage)
        .await
        .with_context(|| format!("failed to initialize {} storage", config.storage.name()))?;
    let state = Arc::new(AppState::new(manager));

    let app = routes::build_router(Arc::clone(&state), config.create_concurrency);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "semverd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state
        .manager()
        .close()
        .await
        .context("failed to close storage")?;

    info!("semverd stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
