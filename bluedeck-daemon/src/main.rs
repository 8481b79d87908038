/*!
 * bluedeck Daemon
 * Bluetooth audio control plane over bluetoothctl and pactl
 */

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::net::UnixListener;
use tracing::{error, info};
use uuid::Uuid;

mod aggregator;
mod client;
mod config;
mod device;
mod dispatcher;
mod error;
mod ipc;
mod jobs;
mod naming;
mod process;
mod scanner;
mod service;

use client::BluedeckClient;
use config::DaemonConfig;
use dispatcher::Action;
use ipc::{IpcServer, Request};
use process::SystemRunner;
use service::BluedeckService;

#[derive(Parser)]
#[command(name = "bluedeckd")]
#[command(about = "Bluetooth audio control-plane daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "/etc/bluedeck/bluedeckd.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    Run,
    /// Print the current device snapshot
    Devices,
    /// Print whether discovery is active
    ScanStatus,
    /// Start a bounded discovery session
    Scan,
    /// Show a background job
    Job { id: Uuid },
    /// Probe the battery level of one device
    Battery { mac: String },
    /// connect, disconnect, pair, remove, trust or untrust a device
    Action { action: Action, mac: String },
    /// Set the A2DP sink volume of a device
    Volume { mac: String, volume: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("bluedeck_daemon={}", log_level))
        .with_writer(std::io::stderr)
        .init();

    let config = DaemonConfig::load(&cli.config)?;

    let request = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => return run_daemon(config).await,
        Commands::Devices => Request::ListDevices,
        Commands::ScanStatus => Request::ScanStatus,
        Commands::Scan => Request::ScanOn,
        Commands::Job { id } => Request::JobStatus { id },
        Commands::Battery { mac } => Request::Battery { mac },
        Commands::Action { action, mac } => Request::Action { action, mac },
        // Passed through as text; the daemon does the validation
        Commands::Volume { mac, volume } => Request::SetVolume {
            mac,
            volume: Value::String(volume),
        },
    };

    let client = BluedeckClient::new(config.socket_path);
    let response = client.send_request(request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn run_daemon(config: DaemonConfig) -> Result<()> {
    info!("bluedeck daemon starting...");

    let service = Arc::new(BluedeckService::new(Arc::new(SystemRunner), &config));

    let socket_path = Path::new(&config.socket_path);
    if let Some(dir) = socket_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    // A previous run may have left its socket behind
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    let ipc_server = IpcServer::new(listener, service);

    info!("bluedeck daemon ready on socket: {}", config.socket_path);

    tokio::select! {
        result = ipc_server.run() => {
            if let Err(e) = &result {
                error!("IPC server stopped: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    if let Err(e) = std::fs::remove_file(socket_path) {
        error!("Failed to remove socket {}: {}", config.socket_path, e);
    }
    Ok(())
}
