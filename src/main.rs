//! Pipeline gateway.
//!
//! Fronts an ordered chain of stage services and forwards each request
//! through them, buffered or as a live event stream.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │                 PIPELINE GATEWAY                  │
//!  Client Request    │  ┌─────────┐   ┌──────────────┐                   │
//!  ──────────────────┼─▶│  http   │──▶│ orchestrator │── stage 1..n ─────┼──▶ Stages
//!                    │  │ server  │   └──────┬───────┘                   │
//!  Result / Events   │  └─────────┘          │                           │
//!  ◀─────────────────┼───────────────  ┌─────▼──────┐  ┌───────────────┐ │
//!                    │                 │   retry    │─▶│circuit breaker│ │
//!                    │                 │  executor  │  │ (per stage)   │ │
//!                    │                 └────────────┘  └───────────────┘ │
//!                    │  config (hot reload) · observability · lifecycle  │
//!                    └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use pipeline_gateway::config::watcher::ConfigWatcher;
use pipeline_gateway::config::{load_config, load_from_env};
use pipeline_gateway::lifecycle::signals::shutdown_signal;
use pipeline_gateway::observability::{logging, metrics};
use pipeline_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "pipeline-gateway", version, about = "Resilient gateway for a linear service pipeline")]
struct Args {
    /// TOML config file, watched for pipeline changes. Defaults plus
    /// environment overrides when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "pipeline-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        stages = config.pipeline.services.len(),
        max_retries = config.retries.max_retries,
        failure_threshold = config.circuit_breaker.failure_threshold,
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

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    // The watcher must outlive the server; without a file there are no updates.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, &config);
            (Some(watcher.run()?), updates)
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    HttpServer::new(config).run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
