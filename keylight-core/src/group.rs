//! Spatial LED groups
//!
//! A group is a named, z-ordered set of LEDs painted by one brush. The LED
//! set is resolved against the keyboard layout when the group is built and
//! only recomputed when [`LedGroup::refresh`] is called.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::brush::{solid, SharedBrush};
use crate::color::RgbColor;
use crate::geometry::{Point, Rect};
use crate::keyboard::Keyboard;
use crate::led::LedId;

/// Default minimum fraction of an LED's area that must lie inside a
/// group rectangle for the LED to belong to the group.
pub const DEFAULT_MIN_OVERLAP: f32 = 0.5;

/// How a group picks its LEDs from the layout
#[derive(Debug, Clone, PartialEq)]
pub enum GroupSelector {
    /// Explicit LED ids (unknown ids are dropped)
    Leds(Vec<LedId>),
    /// LEDs covered by a rectangle
    Rect { rect: Rect, min_overlap: f32 },
    /// LEDs covered by the rectangle spanning two LEDs
    BetweenLeds {
        from: LedId,
        to: LedId,
        min_overlap: f32,
    },
}

pub struct LedGroup {
    name: String,
    selector: GroupSelector,
    excluded: RwLock<BTreeSet<LedId>>,
    leds: RwLock<Vec<LedId>>,
    brush: RwLock<Option<SharedBrush>>,
    z_index: AtomicI32,
}

impl std::fmt::Debug for LedGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedGroup")
            .field("name", &self.name)
            .field("leds", &*self.leds.read())
            .field("z_index", &self.z_index())
            .finish_non_exhaustive()
    }
}

impl LedGroup {
    pub fn builder(name: impl Into<String>) -> GroupBuilder {
        GroupBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selector(&self) -> &GroupSelector {
        &self.selector
    }

    /// LED ids in this group, ascending
    pub fn leds(&self) -> Vec<LedId> {
        self.leds.read().clone()
    }

    pub fn contains(&self, id: LedId) -> bool {
        self.leds.read().binary_search(&id).is_ok()
    }

    pub fn len(&self) -> usize {
        self.leds.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.leds.read().is_empty()
    }

    pub fn brush(&self) -> Option<SharedBrush> {
        self.brush.read().clone()
    }

    pub fn set_brush(&self, brush: SharedBrush) {
        *self.brush.write() = Some(brush);
    }

    /// Paint the whole group one color.
    pub fn set_color(&self, color: RgbColor) {
        self.set_brush(solid(color));
    }

    pub fn clear_brush(&self) {
        *self.brush.write() = None;
    }

    pub fn z_index(&self) -> i32 {
        self.z_index.load(Ordering::Relaxed)
    }

    pub fn set_z_index(&self, z_index: i32) {
        self.z_index.store(z_index, Ordering::Relaxed);
    }

    /// Remove LEDs from the group. Exclusions survive [`refresh`](Self::refresh).
    pub fn exclude<I>(&self, ids: I)
    where
        I: IntoIterator<Item = LedId>,
    {
        let mut excluded = self.excluded.write();
        excluded.extend(ids);
        self.leds.write().retain(|id| !excluded.contains(id));
    }

    /// Re-resolve the LED set against the keyboard layout.
    pub fn refresh(&self, keyboard: &Keyboard) {
        let leds = resolve(&self.selector, &self.excluded.read(), keyboard);
        *self.leds.write() = leds;
    }
}

fn resolve(selector: &GroupSelector, excluded: &BTreeSet<LedId>, keyboard: &Keyboard) -> Vec<LedId> {
    let candidates: Vec<LedId> = match selector {
        GroupSelector::Leds(ids) => ids
            .iter()
            .copied()
            .filter(|id| keyboard.contains_led(*id))
            .collect(),
        GroupSelector::Rect { rect, min_overlap } => keyboard.leds_in(rect, *min_overlap),
        GroupSelector::BetweenLeds {
            from,
            to,
            min_overlap,
        } => match (keyboard.led_rect(*from), keyboard.led_rect(*to)) {
            (Some(a), Some(b)) => keyboard.leds_in(&a.union(&b), *min_overlap),
            _ => Vec::new(),
        },
    };
    let set: BTreeSet<LedId> = candidates
        .into_iter()
        .filter(|id| !excluded.contains(id))
        .collect();
    set.into_iter().collect()
}

/// Builder for [`LedGroup`]
#[derive(Clone)]
pub struct GroupBuilder {
    name: String,
    selector: GroupSelector,
    min_overlap: f32,
    excluded: BTreeSet<LedId>,
    brush: Option<SharedBrush>,
    z_index: i32,
}

impl GroupBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: GroupSelector::Leds(Vec::new()),
            min_overlap: DEFAULT_MIN_OVERLAP,
            excluded: BTreeSet::new(),
            brush: None,
            z_index: 0,
        }
    }

    pub fn leds<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = LedId>,
    {
        self.selector = GroupSelector::Leds(ids.into_iter().collect());
        self
    }

    pub fn rect(mut self, rect: Rect) -> Self {
        self.selector = GroupSelector::Rect {
            rect,
            min_overlap: self.min_overlap,
        };
        self
    }

    pub fn between_points(self, from: Point, to: Point) -> Self {
        self.rect(Rect::from_points(from, to))
    }

    pub fn between_leds(mut self, from: LedId, to: LedId) -> Self {
        self.selector = GroupSelector::BetweenLeds {
            from,
            to,
            min_overlap: self.min_overlap,
        };
        self
    }

    /// Minimum covered fraction for rectangle selection (default 0.5).
    pub fn min_overlap(mut self, fraction: f32) -> Self {
        self.min_overlap = fraction;
        match &mut self.selector {
            GroupSelector::Rect { min_overlap, .. }
            | GroupSelector::BetweenLeds { min_overlap, .. } => *min_overlap = fraction,
            GroupSelector::Leds(_) => {}
        }
        self
    }

    pub fn exclude<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = LedId>,
    {
        self.excluded.extend(ids);
        self
    }

    pub fn brush(mut self, brush: SharedBrush) -> Self {
        self.brush = Some(brush);
        self
    }

    pub fn color(self, color: RgbColor) -> Self {
        self.brush(solid(color))
    }

    pub fn z_index(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }

    /// Resolve the LED set against `keyboard` without attaching.
    pub fn build(self, keyboard: &Keyboard) -> Arc<LedGroup> {
        let leds = resolve(&self.selector, &self.excluded, keyboard);
        Arc::new(LedGroup {
            name: self.name,
            selector: self.selector,
            excluded: RwLock::new(self.excluded),
            leds: RwLock::new(leds),
            brush: RwLock::new(self.brush),
            z_index: AtomicI32::new(self.z_index),
        })
    }

    /// Build and attach to `keyboard` in one step.
    pub fn attach(self, keyboard: &Keyboard) -> Arc<LedGroup> {
        let group = self.build(keyboard);
        keyboard.attach_group(&group);
        group
    }
}
