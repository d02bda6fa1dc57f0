//! tally-ri (Results Ingest) - survey results service
//!
//! Merges concurrent survey submissions into per-survey results tables and
//! serves them back for review and export.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tally_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use tally_common::EventBus;
use tally_ri::results::GatePolicy;
use tally_ri::{build_router, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "tally-ri", version, about = "Survey results ingestion service")]
struct Args {
    /// Root folder holding `data/` (overrides TALLY_ROOT_FOLDER and config)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    // Read quietly: the configured level is needed to build the subscriber
    let (config, config_source) = TomlConfig::load_or_default(args.config.as_deref());

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    // Build identification first
    info!(
        "Starting Tally Results Ingest (tally-ri) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    config_source.log();

    let root_folder = RootFolderResolver::new("results-ingest")
        .with_cli_arg(args.root_folder)
        .with_toml_root(config.root_folder.clone())
        .resolve();

    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let data_dir = initializer.data_dir();
    info!("Data folder: {}", data_dir.display());
    info!("Survey catalog: {}", initializer.catalog_path().display());

    let gate_policy = GatePolicy::from(config.gate.clone());
    info!(
        "Results gate: {} retries, {:?} backoff, stale after {:?}",
        gate_policy.max_retries, gate_policy.backoff, gate_policy.stale_after
    );

    let event_bus = EventBus::new(100);
    let state = AppState::new(&data_dir, gate_policy, event_bus);
    let app = build_router(state);

    let port = args.port.unwrap_or(config.port);
    let addr = format!("{}:{}", config.bind_address, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("tally-ri listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
