//! Common types for the transport layer

/// Color as sent on the wire (OpenRGB stores a padding byte after blue)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A zone (segment) of LEDs on a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneInfo {
    pub name: String,
    pub leds_min: u32,
    pub leds_max: u32,
    pub leds_count: u32,
}

impl ZoneInfo {
    /// Zones with a fixed LED count cannot be resized
    pub fn is_resizable(&self) -> bool {
        self.leds_min < self.leds_max
    }
}

/// An RGB device exposed by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Controller index on the server
    pub index: u32,
    pub name: String,
    pub zones: Vec<ZoneInfo>,
    /// Number of individually addressable LEDs
    pub led_count: usize,
}

impl DeviceInfo {
    /// Total LEDs across zones, which may differ from `led_count` until zones
    /// have been resized
    pub fn zone_led_total(&self) -> usize {
        self.zones.iter().map(|z| z.leds_count as usize).sum()
    }
}
