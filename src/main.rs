//! hotswap-proxy binary.
//!
//! Loads the static configuration, starts the engine with the configured
//! providers and serves until SIGINT/SIGTERM.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use hotswap_proxy::config::{load_config, ProxyConfig};
use hotswap_proxy::lifecycle::wait_for_shutdown_signal;
use hotswap_proxy::observability::{logging, metrics};
use hotswap_proxy::provider::{FileProvider, Provider};
use hotswap_proxy::Engine;

#[derive(Debug, Parser)]
#[command(name = "hotswap-proxy", version, about = "Reverse proxy with hot-swapped routing")]
struct Cli {
    /// Path to the static configuration file (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "hotswap-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        throttle_ms = config.reload.throttle_ms,
        grace_timeout_secs = config.reload.grace_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();
    if let Some(file) = &config.file {
        providers.push(Arc::new(FileProvider::new(file)));
    } else {
        tracing::warn!("No provider configured, every request will get 404");
    }

    let engine = Engine::start(&config, providers).await?;
    tracing::info!(address = %engine.local_addr(), "Listening for connections");

    wait_for_shutdown_signal().await;
    engine.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
