//! palette-fade
//!
//! Standalone host: resolve the configuration, activate the plugin and run
//! until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

use palette_fade::config::{Config, RawConfig};
use palette_fade::plugin;

mod cli;
use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut raw = match &cli.config {
        Some(path) => RawConfig::load(path)?,
        None => {
            let path = RawConfig::default_path();
            if path.exists() {
                info!("Loading config from {:?}", path);
                RawConfig::load(&path)?
            } else {
                RawConfig::default()
            }
        }
    };
    if cli.input.is_some() {
        raw.input = cli.input;
    }
    if cli.address.is_some() {
        raw.address = cli.address;
    }
    let config = Config::resolve(raw).context("invalid configuration")?;

    // Set up Ctrl-C handler
    let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("install Ctrl-C handler")?;

    let handle = plugin::activate(config)
        .await
        .context("failed to activate")?;
    info!("Running. Ctrl+C to stop.");

    stop_rx.recv().await;
    info!("Stopping...");
    handle.deactivate().await;
    Ok(())
}
