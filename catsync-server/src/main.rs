//! catsync trigger service
//!
//! Runs bulk reconciliation, full wipes and single-event syncs on request.
//!
//! Usage:
//!   catsync-server --config catsync.json --port 8080
//!
//! Runs hold a process-local lock, so deploy a single replica.

use anyhow::{Context, Result};
use catsync_engine::http::{HttpSourceFetcher, HttpTargetClient};
use catsync_engine::{InMemoryLockStore, SyncOrchestrator, TargetPorts};
use catsync_server::{build_router, AppState, ServiceConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "catsync-server")]
#[command(about = "HTTP trigger service for catalog reconciliation")]
struct Args {
    /// Path to the JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP port, overriding the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let config = match &args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            ServiceConfig::load(path)?
        }
        None => {
            info!("No config file given, using defaults");
            ServiceConfig::default()
        }
    };
    let port = args.port.unwrap_or(config.port);

    let source = HttpSourceFetcher::new(config.source.clone())
        .context("Failed to create source client")?;
    let target = HttpTargetClient::new(config.target.clone())
        .context("Failed to create target client")?;
    let orchestrator = SyncOrchestrator::new(
        config.sync.clone(),
        Arc::new(InMemoryLockStore::new()),
        Arc::new(source),
        TargetPorts::from_shared(Arc::new(target)),
    )
    .context("Failed to create orchestrator")?;

    let app = build_router(AppState::new(orchestrator));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind HTTP port {}", port))?;

    info!("catsync-server listening on port {}", port);
    info!("Source: {}", config.source.base_url);
    info!("Target: {}", config.target.base_url);
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
