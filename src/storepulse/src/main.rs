//! StorePulse — merchant store lifecycle analytics service.
//!
//! Main entry point that wires the datastore, the analytics engines, and
//! the HTTP server.

use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use storepulse_api::rest::AppState;
use storepulse_api::ApiServer;
use storepulse_core::config::AppConfig;
use storepulse_datastore::MemoryDatastore;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "storepulse")]
#[command(about = "Merchant store lifecycle analytics service")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "STOREPULSE__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "STOREPULSE__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Start with an empty datastore instead of the seeded demo roster
    #[arg(long, default_value_t = false)]
    no_seed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storepulse=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("StorePulse starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        "Configuration loaded"
    );

    // Wire the datastore. The in-memory implementation stands in for the
    // external key-value store the reports read in production.
    let datastore = Arc::new(MemoryDatastore::new());
    if !cli.no_seed {
        datastore.seed_demo_data(Utc::now().date_naive());
        info!(stores = datastore.store_count(), "Demo roster seeded");
    }

    let state = AppState::from_datastore(&config, datastore);
    let api_server = ApiServer::new(config, state);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("StorePulse is ready to serve reports");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
