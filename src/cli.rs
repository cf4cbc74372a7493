// CLI definitions using clap

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "palette-fade")]
#[command(author, version, about = "Fade RGB devices through the dominant colors of an image")]
pub struct Cli {
    /// Config file path (default: ~/.config/palette-fade/config.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Source image, overrides `input` from the config file
    #[arg(short, long, value_name = "IMAGE")]
    pub input: Option<String>,

    /// OpenRGB server as host[:port], overrides `address`
    #[arg(short, long)]
    pub address: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
