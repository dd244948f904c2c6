//! Configuration for the keylight host
//!
//! Stored as TOML, by default at `~/.config/keylight/config.toml`. A missing
//! file yields the defaults; every loaded file is validated before use.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use keylight_core::{
    validate_frequency, GradientStop, LedId, Rect, RgbColor, UpdateMode,
    DEFAULT_MIN_OVERLAP, DEFAULT_UPDATE_FREQUENCY_HZ,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::effect::default_effects_path;
use crate::layout::MAX_GRID_LEDS;

/// Standard key pitch in millimetres
pub const KEY_PITCH_MM: f32 = 19.05;

/// Where the LED layout comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayoutConfig {
    /// A regular grid of square keys, ids row-major from 0
    Grid {
        cols: u32,
        rows: u32,
        #[serde(default = "default_key_size")]
        key_size: f32,
        #[serde(default)]
        spacing: f32,
    },
    /// A TOML file of `[[leds]]` entries, relative to the config file
    File { path: PathBuf },
}

fn default_key_size() -> f32 {
    KEY_PITCH_MM
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig::Grid {
            cols: 16,
            rows: 6,
            key_size: KEY_PITCH_MM,
            spacing: 0.0,
        }
    }
}

/// A statically lit group of LEDs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default)]
    pub z_index: i32,
    /// Solid fill
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<RgbColor>,
    /// Left-to-right gradient across the group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gradient: Vec<GradientStop>,
    /// Explicit LED ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub leds: Vec<LedId>,
    /// Area selection, in layout units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_overlap: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<LedId>,
}

impl GroupConfig {
    pub fn min_overlap(&self) -> f32 {
        self.min_overlap.unwrap_or(DEFAULT_MIN_OVERLAP)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            bail!("group name must not be empty");
        }
        if self.color.is_some() && !self.gradient.is_empty() {
            bail!("group '{}': set either color or gradient, not both", self.name);
        }
        if !self.leds.is_empty() && self.rect.is_some() {
            bail!("group '{}': set either leds or rect, not both", self.name);
        }
        if let Some(fraction) = self.min_overlap {
            if !(0.0..=1.0).contains(&fraction) {
                bail!(
                    "group '{}': min_overlap must be within 0.0..=1.0, got {}",
                    self.name,
                    fraction
                );
            }
        }
        Ok(())
    }
}

/// Complete keylight configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeylightConfig {
    #[serde(default)]
    pub update_mode: UpdateMode,
    #[serde(default = "default_frequency")]
    pub update_frequency_hz: f32,
    /// Fill behind every group and effect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<RgbColor>,
    /// Effect library; defaults to `keylight/effects.toml` in the user config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects_path: Option<PathBuf>,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

fn default_frequency() -> f32 {
    DEFAULT_UPDATE_FREQUENCY_HZ
}

impl Default for KeylightConfig {
    fn default() -> Self {
        Self {
            update_mode: UpdateMode::default(),
            update_frequency_hz: DEFAULT_UPDATE_FREQUENCY_HZ,
            background: Some(RgbColor::new(16, 16, 24)),
            effects_path: None,
            layout: LayoutConfig::default(),
            // Function row as a cool-to-warm gradient
            groups: vec![GroupConfig {
                name: "function-row".to_string(),
                z_index: 0,
                color: None,
                gradient: vec![
                    GradientStop::new(0.0, RgbColor::new(0, 128, 255)),
                    GradientStop::new(1.0, RgbColor::new(255, 64, 0)),
                ],
                leds: Vec::new(),
                rect: Some(Rect::new(0.0, 0.0, 16.0 * KEY_PITCH_MM, KEY_PITCH_MM)),
                min_overlap: None,
                exclude: Vec::new(),
            }],
        }
    }
}

impl KeylightConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keylight")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: KeylightConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(path, self.to_toml()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_frequency(self.update_frequency_hz)?;

        if let LayoutConfig::Grid { cols, rows, key_size, spacing } = &self.layout {
            if *cols == 0 || *rows == 0 {
                bail!("grid layout needs at least one row and column");
            }
            if cols.checked_mul(*rows).map_or(true, |n| n > MAX_GRID_LEDS) {
                bail!("grid layout {cols}x{rows} exceeds {MAX_GRID_LEDS} LEDs");
            }
            if !(*key_size > 0.0) || *spacing < 0.0 {
                bail!("grid key_size must be positive and spacing non-negative");
            }
        }

        let mut names = BTreeSet::new();
        for group in &self.groups {
            group.validate()?;
            if !names.insert(group.name.as_str()) {
                bail!("duplicate group name '{}'", group.name);
            }
        }
        Ok(())
    }

    /// Effect library path, falling back to the default location
    pub fn effects_path(&self) -> PathBuf {
        self.effects_path.clone().unwrap_or_else(default_effects_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = KeylightConfig::default();
        let toml_str = config.to_toml().unwrap();
        assert!(toml_str.contains("update_mode = \"auto-on-effect\""));
        assert!(toml_str.contains("background = \"#101018\""));
        assert!(toml_str.contains("type = \"grid\""));
    }

    #[test]
    fn test_roundtrip() {
        let config = KeylightConfig::default();
        let parsed = KeylightConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config = KeylightConfig::from_toml("update_mode = \"continuous\"").unwrap();
        assert_eq!(config.update_mode, UpdateMode::Continuous);
        assert_eq!(config.update_frequency_hz, DEFAULT_UPDATE_FREQUENCY_HZ);
        assert_eq!(config.layout, LayoutConfig::default());
        assert!(config.groups.is_empty());
        assert_eq!(config.background, None);
    }

    #[test]
    fn test_group_parse() {
        let config = KeylightConfig::from_toml(
            r##"
            background = "black"

            [layout]
            type = "grid"
            cols = 4
            rows = 2

            [[groups]]
            name = "arrows"
            color = "#FF8800"
            leds = [1, 2, 3]
            z_index = 2

            [[groups]]
            name = "left"
            rect = { x = 0, y = 0, width = 20, height = 40 }
            min_overlap = 0.9
            gradient = [
                { offset = 0.0, color = "red" },
                { offset = 1.0, color = "blue" },
            ]
            "##,
        )
        .unwrap();

        assert_eq!(config.background, Some(RgbColor::BLACK));
        assert_eq!(config.groups[0].color, Some(RgbColor::new(255, 136, 0)));
        assert_eq!(config.groups[0].leds, vec![1, 2, 3]);
        assert_eq!(config.groups[1].min_overlap(), 0.9);
        assert_eq!(config.groups[1].gradient.len(), 2);
        assert_eq!(config.groups[0].min_overlap(), DEFAULT_MIN_OVERLAP);
    }

    #[test]
    fn test_oversized_grid_rejected() {
        let huge = "[layout]\ntype = \"grid\"\ncols = 4000000000\nrows = 2\n";
        let err = KeylightConfig::from_toml(huge).unwrap_err();
        assert!(format!("{err:#}").contains("exceeds"));
        let wide = "[layout]\ntype = \"grid\"\ncols = 5000\nrows = 1\n";
        assert!(KeylightConfig::from_toml(wide).is_err());
        let square = "[layout]\ntype = \"grid\"\ncols = 64\nrows = 64\n";
        assert!(KeylightConfig::from_toml(square).is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(KeylightConfig::from_toml("update_mode = \"sometimes\"").is_err());
        assert!(KeylightConfig::from_toml("update_frequency_hz = 0.0").is_err());
        assert!(KeylightConfig::from_toml("background = \"plaid\"").is_err());
        assert!(KeylightConfig::from_toml(
            "[[groups]]\nname = \"a\"\nleds = [1]\n\n[[groups]]\nname = \"a\"\nleds = [2]\n"
        )
        .is_err());
        assert!(KeylightConfig::from_toml(
            "[[groups]]\nname = \"g\"\ncolor = \"red\"\ngradient = [{ offset = 0.0, color = \"red\" }]\n"
        )
        .is_err());
        assert!(KeylightConfig::from_toml("[layout]\ntype = \"grid\"\ncols = 0\nrows = 1\n").is_err());
    }
}
