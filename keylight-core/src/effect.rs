//! Time-driven paint sources

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::brush::SharedBrush;
use crate::color::RgbColor;
use crate::error::PaintError;
use crate::geometry::{Point, Rect};
use crate::led::LedId;

/// A stateful paint source with a lifecycle.
///
/// Each tick the keyboard calls [`update`](Effect::update) with the seconds
/// elapsed since the previous tick (0.0 on the first tick after attach),
/// then samples [`color_at`](Effect::color_at) for every target LED. Once
/// [`is_done`](Effect::is_done) reports true the effect is detached after
/// that tick's paint pass.
pub trait Effect: Send {
    fn name(&self) -> &str {
        "effect"
    }

    /// Paint order among effects; higher paints later.
    fn z_index(&self) -> i32 {
        0
    }

    /// LEDs this effect paints; `None` paints the whole keyboard.
    fn target_leds(&self) -> Option<Vec<LedId>> {
        None
    }

    fn is_done(&self) -> bool {
        false
    }

    fn update(&mut self, delta_seconds: f32) -> Result<(), PaintError>;

    fn color_at(&self, area: &Rect, point: Point) -> Result<RgbColor, PaintError>;

    fn on_attach(&mut self) {}

    fn on_detach(&mut self) {}
}

/// Shared handle to an attached effect; identity is pointer identity.
pub type SharedEffect = Arc<Mutex<dyn Effect>>;

/// Wrap an effect for attaching.
pub fn shared<E: Effect + 'static>(effect: E) -> SharedEffect {
    Arc::new(Mutex::new(effect))
}

/// An attached effect plus the time of its last tick
pub(crate) struct EffectRunner {
    pub(crate) effect: SharedEffect,
    last_tick: Option<Instant>,
}

impl EffectRunner {
    pub(crate) fn new(effect: SharedEffect) -> Self {
        Self {
            effect,
            last_tick: None,
        }
    }

    /// Seconds since the previous tick, recording `now` as the new last tick.
    pub(crate) fn advance(&mut self, now: Instant) -> f32 {
        let delta = match self.last_tick {
            Some(prev) => now.saturating_duration_since(prev).as_secs_f32(),
            None => 0.0,
        };
        self.last_tick = Some(now);
        delta
    }

    pub(crate) fn is(&self, effect: &SharedEffect) -> bool {
        Arc::ptr_eq(&self.effect, effect)
    }
}

/// Paints a brush for a fixed duration (or forever), then finishes.
pub struct BrushEffect {
    name: String,
    brush: SharedBrush,
    targets: Option<Vec<LedId>>,
    z_index: i32,
    duration: Option<Duration>,
    elapsed: Duration,
}

impl BrushEffect {
    pub fn new(name: impl Into<String>, brush: SharedBrush) -> Self {
        Self {
            name: name.into(),
            brush,
            targets: None,
            z_index: 0,
            duration: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_targets<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = LedId>,
    {
        self.targets = Some(ids.into_iter().collect());
        self
    }

    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

impl Effect for BrushEffect {
    fn name(&self) -> &str {
        &self.name
    }

    fn z_index(&self) -> i32 {
        self.z_index
    }

    fn target_leds(&self) -> Option<Vec<LedId>> {
        self.targets.clone()
    }

    fn is_done(&self) -> bool {
        self.duration.is_some_and(|d| self.elapsed >= d)
    }

    fn update(&mut self, delta_seconds: f32) -> Result<(), PaintError> {
        let step = Duration::try_from_secs_f32(delta_seconds.max(0.0)).unwrap_or(Duration::MAX);
        self.elapsed = self.elapsed.saturating_add(step);
        Ok(())
    }

    fn color_at(&self, area: &Rect, point: Point) -> Result<RgbColor, PaintError> {
        self.brush.color_at(area, point)
    }

    fn on_attach(&mut self) {
        self.elapsed = Duration::ZERO;
    }
}
