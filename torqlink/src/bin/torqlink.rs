//! torqlink daemon
//!
//! Loads the configuration, connects to every controller and runs until
//! Ctrl-C. Log verbosity follows `RUST_LOG` and defaults to `info`.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use torqlink::client::{DeviceStore, Fleet, StatusService};
use torqlink::config::{Config, DEFAULT_CONFIG_PATH};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "torqlink", version, about = "Tightening-controller open protocol client")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    if cli.check {
        println!(
            "{}: {} device(s) configured",
            cli.config.display(),
            config.devices.len()
        );
        for device in &config.devices {
            println!("  {}", device);
        }
        return Ok(());
    }

    log::info!("Starting torqlink with {} device(s)", config.devices.len());

    let store = Arc::new(DeviceStore::new());
    let status = StatusService::new(Arc::clone(&store), config.devices.clone());
    let fleet = Fleet::new(config.devices, store, config.client);

    let cancel = CancellationToken::new();
    let running = tokio::spawn(fleet.run(cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    log::info!("Shutdown requested, closing connections...");
    cancel.cancel();
    running.await.context("fleet task panicked")?;

    let snapshot = status.fleet_status().await;
    for (id, tool) in &snapshot.tools {
        log::info!(
            "[{}] final state: connected={}, last update {}",
            id,
            tool.connected,
            tool.last_update
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        );
    }
    Ok(())
}
