//! calsnap server binary.

use anyhow::{Context, Result};
use calsnap_server::config::load_config;
use calsnap_server::{AppState, create_router, spawn_retention_task};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// calsnap - encrypted calendar snapshot server
#[derive(Parser, Debug)]
#[command(name = "calsnapd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "CALSNAP_CONFIG",
        default_value = "config/server.toml"
    )]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("calsnapd v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    calsnap_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let metadata = calsnap_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata store health check failed")?;
    tracing::info!("Metadata store initialized");

    let state = AppState::new(config.clone(), metadata)?;

    let shutdown = CancellationToken::new();
    let retention_handle = match state.retention_interval() {
        Some(interval) => {
            let engine = Arc::new(state.retention_engine());
            tracing::info!(
                interval_secs = interval.as_secs(),
                "Retention task spawned"
            );
            Some(spawn_retention_task(engine, interval, shutdown.clone()))
        }
        None => {
            tracing::info!("Retention disabled");
            None
        }
    };

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    shutdown.cancel();
    if let Some(handle) = retention_handle
        && let Err(e) = handle.await
    {
        tracing::warn!(error = %e, "Retention task ended abnormally");
    }

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
    shutdown.cancel();
}
