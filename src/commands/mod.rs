//! Command handlers for the CLI application.
//!
//! - `layout`: print the LED layout
//! - `effects`: list and inspect the effect library
//! - `config`: print or write the configuration
//! - `run`: light the keyboard

pub mod config;
pub mod effects;
pub mod layout;
pub mod run;

use std::path::{Path, PathBuf};

use keylight::effect::EffectLibrary;
use keylight::KeylightConfig;
use keylight_core::LedPosition;

pub use run::RunOptions;

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;

/// Loaded configuration shared by all commands
pub struct Context {
    pub config: KeylightConfig,
    pub config_path: PathBuf,
}

impl Context {
    /// Directory relative layout and effect paths resolve against
    pub fn base_dir(&self) -> &Path {
        self.config_path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn layout(&self) -> anyhow::Result<Vec<LedPosition>> {
        self.config.layout.resolve(self.base_dir())
    }

    pub fn effects_path(&self) -> PathBuf {
        self.base_dir().join(self.config.effects_path())
    }

    /// Load the effect library, creating the default file if missing.
    pub fn effects(&self) -> anyhow::Result<EffectLibrary> {
        Ok(EffectLibrary::load_or_create(&self.effects_path())?)
    }
}
