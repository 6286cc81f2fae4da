mod commands;
mod config;
mod feeds;
mod listener;
mod platform;
mod publisher;
mod runner;
mod scheduler;
mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Mastodon bot that publishes RSS feeds and manages them through mentions
#[derive(Parser)]
#[command(name = "mastofeed")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for mentions and answer commands (runs forever)
    Listen,
    /// Run one polling and publishing cycle
    Run,
    /// Publish from the queue without polling
    PublishQueue,
    /// Publish a test status
    PublishTest,
    /// Run the polling cycle on the configured cron schedule
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mastofeed=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    info!("Loading configuration from: {}", cli.config.display());
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    info!("Configuration loaded successfully");
    info!("  Account: {}", config.app.user);
    info!("  Instance: {}", config.mastodon.api_base_url);
    info!("  Feeds: {}", config.feed_parser.storage_file.display());
    info!("  Queue: {}", config.queue_storage.file.display());
    if config.publisher.dry_run {
        info!("  Dry run: nothing will be published");
    }

    match cli.command {
        Commands::Listen => listener::run(&config).await,
        Commands::Run => runner::run_cycle(&config).await,
        Commands::PublishQueue => runner::publish_queue(&config).await,
        Commands::PublishTest => runner::publish_test(&config).await,
        Commands::Schedule => scheduler::run(Arc::new(config)).await,
    }
}
