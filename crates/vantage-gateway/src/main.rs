//! # Vantage gateway
//!
//! Realtime telemetry fan-out gateway: ingests typed events from an
//! upstream log, retains bounded recent history per topic, and rebroadcasts
//! live events to WebSocket subscriber sessions.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! vantage
//!
//! # Run with environment variables
//! VANTAGE_PORT=8080 VANTAGE_HOST=0.0.0.0 vantage
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vantage_core::Hub;
use vantage_ingest::{IngestionAdapter, SyntheticSource};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vantage=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!(
        "Starting Vantage gateway on {}:{}",
        config.host,
        config.port
    );

    // Initialize metrics
    metrics::init_metrics();
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            tracing::error!("Failed to start metrics server: {}", e);
        }
    }

    // Wire the hub and the upstream adapter
    let hub = Arc::new(Hub::with_config(config.hub_config()));
    let source = Arc::new(SyntheticSource::new(config.synthetic_config()));
    let adapter = IngestionAdapter::spawn(source, hub.clone(), config.ingest_config());

    // Serve until ctrl-c, then stop ingestion in bounded time
    handlers::run_server(config, hub, shutdown_signal()).await?;
    adapter.shutdown().await;

    tracing::info!("Vantage gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
