//! Apply a configuration's static lighting to a keyboard

use std::sync::Arc;

use anyhow::Context;
use keylight_core::{solid, Keyboard, LedGroup, LinearGradientBrush, SharedBrush};
use tracing::{debug, warn};

use crate::config::{GroupConfig, KeylightConfig};

/// The groups a configuration attached to a keyboard
#[derive(Debug, Default)]
pub struct Scene {
    groups: Vec<Arc<LedGroup>>,
}

impl Scene {
    /// Configure `keyboard` from `config`: update settings, background and
    /// groups. Groups are attached in config order.
    pub fn apply(keyboard: &Keyboard, config: &KeylightConfig) -> anyhow::Result<Self> {
        keyboard
            .set_update_frequency(config.update_frequency_hz)
            .context("invalid update frequency")?;

        keyboard.set_background(config.background.map(solid));

        let mut groups = Vec::with_capacity(config.groups.len());
        for group_config in &config.groups {
            let group = build_group(keyboard, group_config);
            if group.is_empty() {
                warn!("Group '{}' matches no LEDs", group.name());
            }
            if group.brush().is_none() {
                warn!("Group '{}' has no color or gradient", group.name());
            }
            debug!(
                "Group '{}': {} LEDs at z {}",
                group.name(),
                group.len(),
                group.z_index()
            );
            keyboard.attach_group(&group);
            groups.push(group);
        }

        // Mode last, so a running loop sees the full scene
        keyboard
            .set_update_mode(config.update_mode)
            .context("failed to apply update mode")?;

        Ok(Self { groups })
    }

    pub fn groups(&self) -> &[Arc<LedGroup>] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&Arc<LedGroup>> {
        self.groups.iter().find(|g| g.name() == name)
    }

    /// Detach every group this scene attached.
    pub fn clear(self, keyboard: &Keyboard) {
        for group in &self.groups {
            keyboard.detach_group(group);
        }
    }
}

fn build_group(keyboard: &Keyboard, config: &GroupConfig) -> Arc<LedGroup> {
    let mut builder = LedGroup::builder(config.name.clone())
        .z_index(config.z_index)
        .min_overlap(config.min_overlap())
        .exclude(config.exclude.iter().copied());

    builder = match config.rect {
        Some(rect) => builder.rect(rect),
        None => builder.leds(config.leds.iter().copied()),
    };

    if let Some(brush) = group_brush(config) {
        builder = builder.brush(brush);
    }
    builder.build(keyboard)
}

fn group_brush(config: &GroupConfig) -> Option<SharedBrush> {
    if let Some(color) = config.color {
        return Some(solid(color));
    }
    if config.gradient.is_empty() {
        return None;
    }
    Some(Arc::new(LinearGradientBrush::horizontal(config.gradient.clone())))
}
