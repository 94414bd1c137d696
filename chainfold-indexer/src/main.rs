//! Chainfold indexer
//!
//! Reduces batches of Ethereum logs into entity snapshots and publishes the
//! resulting changes.

use anyhow::Result;
use chainfold_indexer::{IndexerConfig, RawLog, ServiceContainer};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chainfold-indexer")]
#[command(about = "Entity reduction engine for Ethereum logs")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "indexer.toml")]
    config: String,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    /// Dry run mode (validate config and exit)
    #[arg(long)]
    dry_run: bool,

    /// JSON file with raw logs to reduce instead of waiting for a listener
    #[arg(short, long)]
    input: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_found = std::path::Path::new(&cli.config).exists();
    let mut config = if config_found {
        IndexerConfig::load(Some(&cli.config))?
    } else {
        IndexerConfig::load(None)?
    };

    // Override log level if provided
    if let Some(log_level) = cli.log_level {
        config.monitoring.log_level = log_level;
    }

    // Initialize logging
    init_logging(&config);

    if !config_found {
        warn!("Config file not found, using defaults: {}", cli.config);
    }

    info!("Starting chainfold indexer");
    info!("Storage backend: {:?}", config.storage.backend);
    info!("Revertable window: {}", config.reduce.max_revertable_events);

    // Validate configuration and create directories
    config.validate_all()?;
    config.ensure_directories()?;
    info!("Configuration validated successfully");

    if cli.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        return Ok(());
    }

    let container = ServiceContainer::new(config).await?;
    container.health_check().await?;

    if let Some(input) = cli.input {
        let content = std::fs::read_to_string(&input)?;
        let raw_logs: Vec<RawLog> = serde_json::from_str(&content)?;
        info!("Reducing {} raw logs from {}", raw_logs.len(), input);

        let report = container.pipeline.post_process_logs(raw_logs).await;
        println!("{}", serde_json::to_string_pretty(&report)?);

        if !report.is_clean() {
            warn!("Batch finished with failures");
        }
    } else {
        info!("Indexer started. Press Ctrl+C to shutdown.");
        signal::ctrl_c().await?;
        info!("Received shutdown signal");
    }

    container.shutdown().await;
    info!("Shutting down chainfold indexer");
    Ok(())
}

fn init_logging(config: &IndexerConfig) {
    let log_level = config
        .monitoring
        .log_level
        .parse()
        .unwrap_or(tracing::Level::INFO);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("chainfold_indexer={}", log_level).into());

    if config.monitoring.structured_logging {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
