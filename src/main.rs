//! lanshare - share files with devices on your local network.
//!
//! ## Testing with multiple instances on one machine
//!
//! Run two instances with distinct ports and download directories:
//! ```bash
//! # Terminal 1
//! lanshare --http-port 8080 --discovery-port 8888 --download-dir /tmp/a
//!
//! # Terminal 2
//! lanshare --http-port 8081 --discovery-port 8889 --download-dir /tmp/b
//! ```

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lanshare::config::{Config, DEFAULT_DISCOVERY_PORT, DEFAULT_HTTP_PORT};
use lanshare::http::{self, ApiState};
use lanshare::net::{DiscoveryConfig, DiscoveryEngine, TransferClient};

#[derive(Parser)]
#[command(name = "lanshare")]
#[command(about = "Share files with devices on your local network")]
#[command(version)]
struct Cli {
    /// HTTP server port (ingest endpoint + operator API)
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT)]
    http_port: u16,

    /// UDP discovery port
    #[arg(long, default_value_t = DEFAULT_DISCOVERY_PORT)]
    discovery_port: u16,

    /// Device name shown to peers (defaults to the hostname)
    #[arg(long)]
    device_name: Option<String>,

    /// Directory incoming files are stored in
    #[arg(long)]
    download_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = Config::new(
        cli.http_port,
        cli.discovery_port,
        cli.device_name,
        cli.download_dir,
    );
    info!(
        device = %config.device_name,
        download_dir = %config.download_dir.display(),
        "Starting lanshare"
    );

    let engine = Arc::new(
        DiscoveryEngine::start(DiscoveryConfig::new(
            config.discovery_port,
            config.http_port,
            config.device_name.clone(),
        ))
        .await
        .context("failed to start discovery engine")?,
    );

    let state = ApiState {
        engine: Arc::clone(&engine),
        transfers: Arc::new(TransferClient::new().context("failed to build transfer client")?),
        download_dir: config.download_dir.clone(),
        staging_dir: Config::staging_dir(),
    };

    let listener = tokio::net::TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.http_port))
        .await
        .with_context(|| format!("failed to bind HTTP port {}", config.http_port))?;
    info!(port = config.http_port, "HTTP server listening");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    engine.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Resolves when the process receives Ctrl-C.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => {
            error!(error = %err, "Failed to listen for shutdown signal");
            // Without a signal handler there is nothing to wait for; park
            // so the server keeps running.
            std::future::pending::<()>().await;
        }
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
