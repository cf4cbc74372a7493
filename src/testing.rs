//! In-memory LED controller for tests
//!
//! [`RecordingController`] keeps every command it receives so tests can
//! assert on exactly what would have reached the hardware, and can be told
//! to fail specific `update_leds` calls.
//!
//! This is a test double. Nothing here talks to a real controller; it is
//! public so integration tests and hosts embedding the plugin can drive the
//! scheduler without an OpenRGB server.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use openrgb_transport::{DeviceInfo, LedController, Rgb, TransportError, ZoneInfo};

use crate::color::Color;

#[derive(Debug, Default)]
struct Recorded {
    devices: Vec<DeviceInfo>,
    custom_mode: Vec<u32>,
    resized: Vec<(u32, u32, u32)>,
    updates: Vec<(u32, Vec<Rgb>)>,
    update_calls: usize,
    enumerations: usize,
}

/// Fake controller recording every command
#[derive(Debug, Default)]
pub struct RecordingController {
    state: Mutex<Recorded>,
    failing_updates: HashSet<usize>,
    unreachable: bool,
}

impl RecordingController {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self {
            state: Mutex::new(Recorded {
                devices,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// One device with a single fixed zone of `leds` LEDs
    pub fn single_device(leds: u32) -> Self {
        Self::new(vec![device(0, "Test Strip", leds, leds, leds)])
    }

    /// Fail the given `update_leds` calls (1-based, counted across devices)
    pub fn failing_updates(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.failing_updates = calls.into_iter().collect();
        self
    }

    /// Fail every command as if the server were down
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Every successful `update_leds` call, in order
    pub fn updates(&self) -> Vec<(u32, Vec<Rgb>)> {
        self.lock().updates.clone()
    }

    /// First LED color of each successful update to `device`
    pub fn pushed_colors(&self, device: u32) -> Vec<Color> {
        self.lock()
            .updates
            .iter()
            .filter(|(index, _)| *index == device)
            .filter_map(|(_, leds)| leds.first())
            .map(|rgb| Color::new(rgb.r, rgb.g, rgb.b))
            .collect()
    }

    pub fn update_calls(&self) -> usize {
        self.lock().update_calls
    }

    pub fn custom_mode_devices(&self) -> Vec<u32> {
        self.lock().custom_mode.clone()
    }

    /// `(device, zone, size)` for every resize
    pub fn resized(&self) -> Vec<(u32, u32, u32)> {
        self.lock().resized.clone()
    }

    pub fn enumerations(&self) -> usize {
        self.lock().enumerations
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        // A panicking test thread must not hide the recording from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_reachable(&self) -> Result<(), TransportError> {
        if self.unreachable {
            Err(TransportError::Connect {
                address: "127.0.0.1:6742".into(),
                source: std::io::ErrorKind::ConnectionRefused.into(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LedController for RecordingController {
    async fn devices(&self) -> Result<Vec<DeviceInfo>, TransportError> {
        self.check_reachable()?;
        let mut state = self.lock();
        state.enumerations += 1;
        Ok(state.devices.clone())
    }

    async fn set_custom_mode(&self, device: u32) -> Result<(), TransportError> {
        self.check_reachable()?;
        let mut state = self.lock();
        if !state.devices.iter().any(|d| d.index == device) {
            return Err(TransportError::DeviceNotFound(device));
        }
        state.custom_mode.push(device);
        Ok(())
    }

    async fn resize_zone(&self, device: u32, zone: u32, size: u32) -> Result<(), TransportError> {
        self.check_reachable()?;
        let mut state = self.lock();
        let dev = state
            .devices
            .iter_mut()
            .find(|d| d.index == device)
            .ok_or(TransportError::DeviceNotFound(device))?;
        let z = dev
            .zones
            .get_mut(zone as usize)
            .ok_or_else(|| TransportError::Protocol(format!("no zone {zone}")))?;
        z.leds_count = size;
        dev.led_count = dev.zone_led_total();
        state.resized.push((device, zone, size));
        Ok(())
    }

    async fn update_leds(&self, device: u32, colors: &[Rgb]) -> Result<(), TransportError> {
        self.check_reachable()?;
        let mut state = self.lock();
        state.update_calls += 1;
        if self.failing_updates.contains(&state.update_calls) {
            return Err(TransportError::Timeout(5000));
        }
        state.updates.push((device, colors.to_vec()));
        Ok(())
    }
}

/// Device with one zone
pub fn device(index: u32, name: &str, leds_min: u32, leds_max: u32, leds_count: u32) -> DeviceInfo {
    DeviceInfo {
        index,
        name: name.to_string(),
        zones: vec![ZoneInfo {
            name: "Zone 1".to_string(),
            leds_min,
            leds_max,
            leds_count,
        }],
        led_count: leds_count as usize,
    }
}
