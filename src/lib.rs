// Palette fade - image palette extraction and smooth LED color transitions
// driven through an OpenRGB server

pub mod color;
pub mod config;
pub mod driver;
pub mod error;
pub mod fade;
pub mod palette;
pub mod plugin;
pub mod scheduler;
pub mod sequencer;
/// Test double for [`LedController`], not for production use
pub mod testing;

pub use color::Color;
pub use config::{Config, RawConfig};
pub use driver::DeviceDriver;
pub use error::{Error, Result};
pub use fade::{fade, Gradient};
pub use palette::{extract, Palette};
pub use plugin::{activate, activate_with, PluginHandle};
pub use scheduler::{Phase, PluginState, Scheduler, TickOutcome};
pub use sequencer::ColorSequencer;

pub use openrgb_transport::{DeviceInfo, LedController, OpenRgbClient, TransportError};
