mod config;
mod events;
mod setup;
mod stdio;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use setup::{ensure_database_directory_from_config, initialize_app};
use stdio::StdioMcpServer;
use telemetry::{init_telemetry, log_config_validation, log_startup_info};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "task-coordinator")]
#[command(about = "Task coordination server for fleets of autonomous agents")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CONFIG_FILE")]
    config: Option<String>,

    /// Database URL override, e.g. sqlite:///path/to/tasks.sqlite or :memory:
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(config_file) => {
            info!("loading configuration from file: {}", config_file);
            Config::from_file(config_file)?
        }
        None => {
            info!("loading configuration from environment");
            Config::from_env()?
        }
    };

    if let Some(ref database_url) = cli.database_url {
        info!("overriding database URL from CLI");
        config.database.url = Some(database_url.clone());
    }

    if let Some(ref log_level) = cli.log_level {
        info!("overriding log level from CLI");
        config.logging.level = log_level.clone();
    }

    Ok(config)
}

/// How many stale reservations the sweeper unlocks per pass. Keeps a single
/// sweep from holding the write path for an unbounded batch.
const STALE_SWEEP_CHUNK_SIZE: usize = 25;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli).context("failed to load configuration")?;

    init_telemetry(&config.logging).context("failed to initialize telemetry")?;
    log_config_validation(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "configuration validation failed");
        std::process::exit(1);
    }

    log_startup_info(&config);

    ensure_database_directory_from_config(&config)
        .context("failed to create database directory")?;

    let app = initialize_app(&config).await.context("failed to initialize application")?;

    info!("task coordinator is ready, reading JSON-RPC requests from stdin");

    let stale_timeout = config.stale_timeout();
    let sweep_interval = config.stale_sweep_interval();
    let sweeper_lifecycle = app.lifecycle.clone();
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sweeper_lifecycle.sweep_stale(stale_timeout, STALE_SWEEP_CHUNK_SIZE).await {
                Ok(unlocked) if !unlocked.is_empty() => {
                    info!(count = unlocked.len(), "stale sweeper unlocked tasks");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "stale sweep pass failed"),
            }
        }
    });

    let server = StdioMcpServer::new(app.dispatcher);

    tokio::select! {
        result = server.serve() => {
            sweeper.abort();
            match result {
                Ok(()) => {
                    info!("task coordinator shut down cleanly");
                    Ok(())
                }
                Err(e) => {
                    error!(error = %e, "task coordinator error");
                    std::process::exit(3);
                }
            }
        }
        _ = shutdown_signal() => {
            sweeper.abort();
            info!("shutdown signal received, stopping server");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("failed to register SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl+c");
        info!("received Ctrl+C");
    }
}
