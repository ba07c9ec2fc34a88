use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::infra::config::ServerConfig;

/// Installs the log subscriber. Call [`init_env`] first so a `RUST_LOG` set in
/// `.env` is honoured.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(filter_from_env(EnvFilter::DEFAULT_ENV))
        .init();
}

fn filter_from_env(var: &str) -> EnvFilter {
    EnvFilter::try_from_env(var).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Loads `.env` into the process environment. Runs before logging is set up, so
/// the outcome is returned for the caller to report.
pub fn init_env() -> Result<PathBuf, dotenvy::Error> {
    dotenvy::dotenv()
}

pub fn load_env_file(path: &Path) -> Result<PathBuf, dotenvy::Error> {
    dotenvy::from_path(path).map(|()| path.to_path_buf())
}

/// Serves `app` until Ctrl+C.
pub async fn serve(name: &str, app: Router, server: &ServerConfig) -> Result<()> {
    let address = server.address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    info!("{} listening on {}", name, address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("{} stopped", name);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", err);
        std::future::pending::<()>().await;
    }
}
