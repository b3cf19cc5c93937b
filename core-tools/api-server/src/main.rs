// Shipwright API server
// Serves the orchestrator over HTTP until Ctrl-C

use anyhow::Context;
use api_server::ApiServer;
use clap::Parser;
use shipwright_engine::config::Config;
use shipwright_engine::telemetry::{init_telemetry_with_level, MemorySink};
use shipwright_engine::Orchestrator;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// HTTP API for the Shipwright orchestrator
#[derive(Parser, Debug)]
#[command(name = "shipwright-api")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Specify alternate configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load_or_create()?,
    };
    init_telemetry_with_level(&config.core.log_level);

    tracing::info!("Shipwright API v{}", env!("CARGO_PKG_VERSION"));

    let telemetry = Arc::new(MemorySink::new(config.telemetry.buffer_capacity));
    let orchestrator = Arc::new(Orchestrator::with_default_agents(&config, telemetry).await);

    let server = ApiServer::start(orchestrator.clone(), config.core.debug, args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;
    println!("Listening on http://{}", server.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    server.stop().await;
    orchestrator.shutdown().await;
    Ok(())
}
