//! Plugin entry points for a host application
//!
//! The host resolves a [`Config`] and calls [`activate`]; the returned
//! [`PluginHandle`] owns the background scheduler task. Calling
//! [`PluginHandle::reconfigure`] with a new configuration (e.g. after the
//! host wrote a new image) takes effect at the start of the next cycle.

use std::sync::Arc;

use openrgb_transport::{LedController, OpenRgbClient};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::driver::DeviceDriver;
use crate::error::Result;
use crate::scheduler::{PluginState, Scheduler};

/// Connect to the controller at `config.address` and start fading
pub async fn activate(config: Config) -> Result<PluginHandle> {
    let client = OpenRgbClient::connect(&config.address).await?;
    activate_with(config, Arc::new(client)).await
}

/// Start fading on an already connected controller
pub async fn activate_with(config: Config, controller: Arc<dyn LedController>) -> Result<PluginHandle> {
    let driver = DeviceDriver::activate(controller).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (config_tx, config_rx) = watch::channel(config.clone());

    let scheduler = Scheduler::new(config, driver, shutdown_rx).with_config_updates(config_rx);
    let task = tokio::spawn(scheduler.run());
    info!("Plugin activated");

    Ok(PluginHandle {
        shutdown: shutdown_tx,
        config: config_tx,
        task,
    })
}

/// A running plugin instance; dropping it stops the scheduler
#[derive(Debug)]
pub struct PluginHandle {
    shutdown: watch::Sender<bool>,
    config: watch::Sender<Config>,
    task: JoinHandle<PluginState>,
}

impl PluginHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Replace the configuration for subsequent cycles
    pub fn reconfigure(&self, config: Config) {
        self.config.send_replace(config);
    }

    /// Stop at the next suspension point and release the controller
    pub async fn deactivate(self) -> Option<PluginState> {
        // Fails only when the task is already gone
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(state) => {
                info!("Plugin deactivated, last color {}", state.current());
                Some(state)
            }
            Err(e) => {
                warn!("Scheduler task ended abnormally: {e}");
                None
            }
        }
    }
}
