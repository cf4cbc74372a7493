//! Plugin configuration
//!
//! Options arrive as a flat key/value table (TOML, or strings handed over by
//! the host) and are resolved once into an immutable [`Config`]. Numbers may
//! be given either as TOML numbers or as strings.

use std::fmt::Debug;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use openrgb_transport::DEFAULT_PORT;
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::{Error, Result};

pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_GRADIENT_STEPS: usize = 20;
pub const DEFAULT_MAX_PALETTE_SIZE: usize = 10;
pub const DEFAULT_QUALITY: u32 = 10;
pub const DEFAULT_INTERVAL_SECS: f64 = 0.05;
pub const DEFAULT_PAUSE_AFTER_FADE_SECS: f64 = 0.0;

const GRADIENT_STEPS_RANGE: RangeInclusive<i64> = 1..=10_000;
const MAX_PALETTE_SIZE_RANGE: RangeInclusive<i64> = 1..=256;
const QUALITY_RANGE: RangeInclusive<i64> = 1..=1000;
const SECONDS_RANGE: RangeInclusive<f64> = 0.0..=3600.0;

/// A numeric option as written by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl NumberValue {
    fn as_i64(&self, name: &str) -> Result<i64> {
        match self {
            NumberValue::Int(v) => Ok(*v),
            NumberValue::Float(v) if v.fract() == 0.0 => Ok(*v as i64),
            NumberValue::Text(s) => s.trim().parse().map_err(|_| invalid(name, s)),
            other => Err(invalid(name, other)),
        }
    }

    fn as_f64(&self, name: &str) -> Result<f64> {
        match self {
            NumberValue::Int(v) => Ok(*v as f64),
            NumberValue::Float(v) => Ok(*v),
            NumberValue::Text(s) => s.trim().parse().map_err(|_| invalid(name, s)),
        }
    }
}

fn invalid(name: &str, value: &dyn Debug) -> Error {
    Error::Configuration(format!("{name}: invalid number {value:?}"))
}

/// Unresolved options, all optional. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    pub input: Option<String>,
    pub address: Option<String>,
    pub gradient_steps: Option<NumberValue>,
    pub max_palette_size: Option<NumberValue>,
    pub quality: Option<NumberValue>,
    pub interval: Option<NumberValue>,
    pub pause_after_fade: Option<NumberValue>,
    /// Whitespace-separated colors used instead of the image palette
    pub colors: Option<String>,
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Source image
    pub input: PathBuf,
    /// Controller address as `host:port`
    pub address: String,
    pub gradient_steps: usize,
    pub max_palette_size: usize,
    pub quality: u32,
    /// Delay between gradient frames
    pub interval: Duration,
    /// Rest after each completed fade
    pub pause_after_fade: Duration,
    /// Fixed palette overriding the image; empty when unset
    pub colors: Vec<Color>,
}

impl RawConfig {
    /// Default config file path (~/.config/palette-fade/config.toml)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("palette-fade")
            .join("config.toml")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Configuration(format!("parse TOML: {e}")))
    }
}

impl Config {
    /// Load and resolve a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        Self::resolve(RawConfig::load(path)?)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Self::resolve(RawConfig::from_toml(content)?)
    }

    /// Apply defaults and validate every option
    pub fn resolve(raw: RawConfig) -> Result<Self> {
        let input = match raw.input.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => expand_home(s),
            _ => return Err(Error::Configuration("input: option is required".into())),
        };

        let address = parse_address(raw.address.as_deref().unwrap_or(DEFAULT_ADDRESS))?;

        let gradient_steps = int_option(
            "gradient_steps",
            raw.gradient_steps.as_ref(),
            DEFAULT_GRADIENT_STEPS as i64,
            GRADIENT_STEPS_RANGE,
        )? as usize;
        let max_palette_size = int_option(
            "max_palette_size",
            raw.max_palette_size.as_ref(),
            DEFAULT_MAX_PALETTE_SIZE as i64,
            MAX_PALETTE_SIZE_RANGE,
        )? as usize;
        let quality = int_option(
            "quality",
            raw.quality.as_ref(),
            DEFAULT_QUALITY as i64,
            QUALITY_RANGE,
        )? as u32;

        let interval = seconds_option("interval", raw.interval.as_ref(), DEFAULT_INTERVAL_SECS)?;
        let pause_after_fade = seconds_option(
            "pause_after_fade",
            raw.pause_after_fade.as_ref(),
            DEFAULT_PAUSE_AFTER_FADE_SECS,
        )?;

        let colors = raw
            .colors
            .as_deref()
            .unwrap_or("")
            .split_whitespace()
            .map(|s| {
                Color::parse(s).ok_or_else(|| Error::Configuration(format!("colors: invalid color {s:?}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            input,
            address,
            gradient_steps,
            max_palette_size,
            quality,
            interval,
            pause_after_fade,
            colors,
        })
    }
}

impl TryFrom<RawConfig> for Config {
    type Error = Error;

    fn try_from(raw: RawConfig) -> Result<Self> {
        Self::resolve(raw)
    }
}

/// Error unless `value` lies within `range`
pub fn ensure_range<T: PartialOrd + Debug>(name: &str, value: T, range: &RangeInclusive<T>) -> Result<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "{name}: value {value:?} is out of range {range:?}"
        )))
    }
}

fn int_option(
    name: &str,
    value: Option<&NumberValue>,
    default: i64,
    range: RangeInclusive<i64>,
) -> Result<i64> {
    let value = match value {
        Some(v) => v.as_i64(name)?,
        None => default,
    };
    ensure_range(name, value, &range)?;
    Ok(value)
}

fn seconds_option(name: &str, value: Option<&NumberValue>, default: f64) -> Result<Duration> {
    let value = match value {
        Some(v) => v.as_f64(name)?,
        None => default,
    };
    // NaN fails the range check
    ensure_range(name, value, &SECONDS_RANGE)?;
    Ok(Duration::from_secs_f64(value))
}

/// `~` or `~/...` relative to the home directory
fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

/// Normalize `host[:port]` to `host:port`
pub fn parse_address(address: &str) -> Result<String> {
    let address = address.trim();
    let bad = || Error::Configuration(format!("address: invalid address {address:?}"));

    let (host, port) = if let Some(rest) = address.strip_prefix('[') {
        // [v6]:port or [v6]
        let (host, after) = rest.split_once(']').ok_or_else(bad)?;
        match after.strip_prefix(':') {
            Some(port) => (format!("[{host}]"), Some(port)),
            None if after.is_empty() => (format!("[{host}]"), None),
            None => return Err(bad()),
        }
    } else if address.matches(':').count() > 1 {
        // Bare IPv6 literal, no port
        (format!("[{address}]"), None)
    } else {
        match address.split_once(':') {
            Some((host, port)) => (host.to_string(), Some(port)),
            None => (address.to_string(), None),
        }
    };

    if host.is_empty() || host == "[]" {
        return Err(bad());
    }
    let port = match port {
        Some(p) => p.parse::<u16>().map_err(|_| bad())?,
        None => DEFAULT_PORT,
    };
    Ok(format!("{host}:{port}"))
}
