//! Error types for palette extraction, fading and device updates

use openrgb_transport::TransportError;
use thiserror::Error;

/// Errors from the palette/fade pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Image could not be decoded (corrupt, unsupported or vector format)
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Image file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Extraction produced no colors (e.g. a fully transparent image)
    #[error("Palette is empty")]
    EmptyPalette,

    /// LED controller unreachable or rejected a command
    #[error("Controller unavailable: {0}")]
    ControllerUnavailable(#[from] TransportError),

    /// Missing or out-of-range option
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl Error {
    /// Recoverable errors skip the current cycle; the rest stop the plugin
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Configuration(_))
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
