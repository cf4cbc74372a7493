//! Device driver adapter
//!
//! Translates "show this color" into per-device LED updates on the
//! controller. Devices are switched to direct mode and their resizable
//! zones sized on activation, and again after the connection was lost.

use std::sync::Arc;

use openrgb_transport::{DeviceInfo, LedController, Rgb};
use tracing::{debug, info, warn};

use crate::color::Color;
use crate::error::Result;

pub struct DeviceDriver {
    controller: Arc<dyn LedController>,
    devices: Vec<DeviceInfo>,
    /// Set after a lost connection; devices are prepared again before the
    /// next update since a restarted server forgets direct mode and sizes
    stale: bool,
}

impl DeviceDriver {
    /// Enumerate devices and prepare them for direct color updates
    pub async fn activate(controller: Arc<dyn LedController>) -> Result<Self> {
        let devices = prepare(controller.as_ref()).await?;
        Ok(Self {
            controller,
            devices,
            stale: false,
        })
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    /// Set every LED of every device to `color`
    pub async fn set_color(&mut self, color: Color) -> Result<()> {
        if self.stale {
            info!("Controller connection was lost, preparing devices again");
            self.devices = prepare(self.controller.as_ref()).await?;
            self.stale = false;
        }

        let rgb = Rgb::from(color);
        for device in self.devices.iter().filter(|d| d.led_count > 0) {
            let leds = vec![rgb; device.led_count];
            if let Err(e) = self.controller.update_leds(device.index, &leds).await {
                self.stale = e.is_disconnect();
                return Err(e.into());
            }
        }
        Ok(())
    }
}

/// Switch every device to direct mode and size resizable zones to the
/// device's LED count
async fn prepare(controller: &dyn LedController) -> Result<Vec<DeviceInfo>> {
    let mut devices = controller.devices().await?;
    let mut resized = false;

    for device in &devices {
        controller.set_custom_mode(device.index).await?;

        // Without this some controllers only light the first zone's LEDs
        for (zone_index, zone) in device.zones.iter().enumerate() {
            if !zone.is_resizable() {
                continue;
            }
            let target = (device.led_count as u32).clamp(zone.leds_min, zone.leds_max);
            if target == zone.leds_count {
                continue;
            }
            debug!(
                "Resizing zone '{}' of {} from {} to {} LEDs",
                zone.name, device.name, zone.leds_count, target
            );
            controller
                .resize_zone(device.index, zone_index as u32, target)
                .await?;
            resized = true;
        }
    }

    if resized {
        devices = controller.devices().await?;
    }

    for device in &devices {
        info!("Using {} ({} LEDs)", device.name, device.led_count);
    }
    if devices.is_empty() {
        warn!("Controller reports no devices");
    }
    Ok(devices)
}

impl std::fmt::Debug for DeviceDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceDriver")
            .field("devices", &self.devices)
            .finish_non_exhaustive()
    }
}
