//! Transport layer for RGB device control through an OpenRGB server
//!
//! The [`LedController`] trait is the narrow capability the rest of the
//! system depends on: enumerate devices, switch them to direct control and
//! push LED colors. [`OpenRgbClient`] implements it over the OpenRGB SDK
//! TCP protocol.

pub mod client;
pub mod error;
pub mod protocol;
pub mod types;

pub use client::{OpenRgbClient, DEFAULT_CLIENT_NAME, DEFAULT_TIMEOUT};
pub use error::TransportError;
pub use protocol::DEFAULT_PORT;
pub use types::{DeviceInfo, Rgb, ZoneInfo};

use async_trait::async_trait;

/// The core controller trait - backends and test doubles implement this
#[async_trait]
pub trait LedController: Send + Sync {
    /// List every device known to the controller
    async fn devices(&self) -> Result<Vec<DeviceInfo>, TransportError>;

    /// Put a device into direct (software-controlled) mode
    async fn set_custom_mode(&self, device: u32) -> Result<(), TransportError>;

    /// Change the LED count of a resizable zone
    async fn resize_zone(&self, device: u32, zone: u32, size: u32) -> Result<(), TransportError>;

    /// Set every LED of a device, one color per LED
    async fn update_leds(&self, device: u32, colors: &[Rgb]) -> Result<(), TransportError>;
}
