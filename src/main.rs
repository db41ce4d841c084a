//! Dashboard client - main entry point
//!
//! Headless runner: connects to the configured broker, logs telemetry
//! updates and status transitions, and shuts down gracefully on SIGINT or
//! SIGTERM. When the connection is lost the process keeps running so an
//! operator can observe the degraded state; recovery is a restart or an
//! embedding application calling reconnect.

use clap::{Parser, Subcommand};
use dashlink::observability::init_default_logging;
use dashlink::{ConnectionStatus, DashboardClient, DashboardConfig};
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tracing::{error, info, warn};

/// MQTT-over-WebSocket dashboard client
#[derive(Parser)]
#[command(name = "dashlink")]
#[command(about = "MQTT-over-WebSocket dashboard client")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the broker and stream telemetry to the log
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting dashlink v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_client(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<DashboardConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(DashboardConfig::load_from_file(path)?)
        }
        None => {
            // Try default locations
            let default_paths = vec!["dashlink.toml", "config/dashlink.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(DashboardConfig::load_from_file(&path)?);
                }
            }

            error!(
                "No configuration file found. Please provide one with -c/--config or create dashlink.toml"
            );
            process::exit(1);
        }
    }
}

async fn run_client(config: DashboardConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = DashboardClient::from_config(&config)?;
    info!(client_id = %client.identity(), broker = %config.broker.url, "client built");

    client.connect().await?;

    let mut readings = client.reading_watch();
    let mut statuses = client.status_watch();

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Client is running and waiting for telemetry...");

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
            changed = readings.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(reading) = readings.borrow_and_update().clone() {
                    info!(
                        temperature = reading.temperature,
                        humidity = reading.humidity,
                        observed_at = %reading.observed_at,
                        "telemetry reading"
                    );
                }
            }
            changed = statuses.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *statuses.borrow_and_update();
                match status {
                    ConnectionStatus::Lost => {
                        warn!("connection lost; waiting for operator action");
                    }
                    other => info!(status = %other, "connection status changed"),
                }
            }
        }
    }

    info!("Application shutdown initiated");
    client.shutdown().await?;
    Ok(())
}

fn handle_config_command(
    config: DashboardConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
