// CLI definitions using clap

use clap::{Parser, Subcommand};
use keylight_core::{LedId, UpdateMode};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keylight")]
#[command(author, version, about = "Layered per-key keyboard lighting")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/keylight/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the configured LED layout
    #[command(visible_aliases = ["leds"])]
    Layout {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the effect library, or show one effect
    #[command(visible_aliases = ["fx"])]
    Effects {
        /// Effect to show in detail
        name: Option<String>,
    },

    /// Print the effective configuration
    Config {
        /// Save it to the config path
        #[arg(long)]
        write: bool,
    },

    /// Light the keyboard until interrupted
    Run {
        /// Effect to play on top of the configured scene
        #[arg(short, long)]
        effect: Option<String>,

        /// Effect variable, e.g. --var color=red
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// LEDs the effect paints (default: all)
        #[arg(long, value_delimiter = ',')]
        keys: Vec<LedId>,

        /// Update mode (manual, auto-on-effect, continuous)
        #[arg(long)]
        mode: Option<UpdateMode>,

        /// Updates per second
        #[arg(long)]
        fps: Option<f32>,

        /// Render in the terminal instead of logging writes
        #[arg(long)]
        preview: bool,

        /// Stop after this many seconds
        #[arg(long, value_name = "SECS")]
        duration: Option<f64>,
    },
}
