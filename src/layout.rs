//! LED layouts: generated grids and TOML layout files
//!
//! A layout file lists one `[[leds]]` table per LED:
//!
//! ```toml
//! [[leds]]
//! id = 0
//! x = 0.0
//! y = 0.0
//! width = 19.05
//! height = 19.05
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Context};
use keylight_core::{LedPosition, Rect};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LayoutConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutFile {
    #[serde(default)]
    pub leds: Vec<LedPosition>,
}

impl LayoutFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read layout {}", path.display()))?;
        let file: LayoutFile = toml::from_str(&content)
            .with_context(|| format!("invalid layout {}", path.display()))?;
        file.validate()?;
        Ok(file)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, toml::to_string_pretty(self)?)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    fn validate(&self) -> anyhow::Result<()> {
        let mut seen = BTreeSet::new();
        for led in &self.leds {
            if !seen.insert(led.id) {
                bail!("duplicate LED id {}", led.id);
            }
            if !(led.rect.width > 0.0 && led.rect.height > 0.0) {
                bail!("LED {} has an empty rectangle", led.id);
            }
        }
        Ok(())
    }
}

/// Largest LED count a generated grid may have
pub const MAX_GRID_LEDS: u32 = 4096;

/// A `cols` × `rows` grid of square keys. Ids are row-major from 0.
pub fn grid(cols: u32, rows: u32, key_size: f32, spacing: f32) -> Vec<LedPosition> {
    let pitch = key_size + spacing;
    (0..rows)
        .flat_map(|row| {
            (0..cols).map(move |col| {
                LedPosition::new(
                    row * cols + col,
                    Rect::new(col as f32 * pitch, row as f32 * pitch, key_size, key_size),
                )
            })
        })
        .collect()
}

impl LayoutConfig {
    /// Build the LED positions. Relative file paths resolve against `base_dir`.
    pub fn resolve(&self, base_dir: &Path) -> anyhow::Result<Vec<LedPosition>> {
        let leds = match self {
            LayoutConfig::Grid {
                cols,
                rows,
                key_size,
                spacing,
            } => grid(*cols, *rows, *key_size, *spacing),
            LayoutConfig::File { path } => LayoutFile::load(&base_dir.join(path))?.leds,
        };
        debug!("Layout has {} LEDs", leds.len());
        Ok(leds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_is_row_major() {
        let leds = grid(3, 2, 10.0, 2.0);
        assert_eq!(leds.len(), 6);
        assert_eq!(leds[0], LedPosition::new(0, Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert_eq!(leds[4], LedPosition::new(4, Rect::new(12.0, 12.0, 10.0, 10.0)));
    }

    #[test]
    fn test_layout_file_parse() {
        let file: LayoutFile = toml::from_str(
            "[[leds]]\nid = 7\nx = 1\ny = 2\nwidth = 3\nheight = 4\n",
        )
        .unwrap();
        assert_eq!(file.leds, vec![LedPosition::new(7, Rect::new(1.0, 2.0, 3.0, 4.0))]);
    }

    #[test]
    fn test_layout_file_rejects_duplicates() {
        let file = LayoutFile {
            leds: vec![
                LedPosition::new(1, Rect::new(0.0, 0.0, 1.0, 1.0)),
                LedPosition::new(1, Rect::new(1.0, 0.0, 1.0, 1.0)),
            ],
        };
        assert!(file.validate().is_err());
    }
}
