//! Paint resolution
//!
//! One pass paints, in order: the background brush over every LED, the
//! groups by ascending z-index, then the effects by ascending z-index. A
//! later paint overwrites an earlier one; there is no blending. Ties keep
//! attach order.
//!
//! Each source's colors are computed in full before any LED is touched, so
//! a source that fails part-way leaves all of its LEDs at their previous
//! requested color.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::brush::Brush;
use crate::color::RgbColor;
use crate::effect::{Effect, EffectRunner, SharedEffect};
use crate::error::{LightingError, PaintError};
use crate::geometry::{Point, Rect};
use crate::group::LedGroup;
use crate::keyboard::LedSlot;
use crate::led::LedId;
use crate::observer::{FaultObserver, FaultRecord, FaultSource};

pub(crate) struct Compositor<'a> {
    leds: &'a BTreeMap<LedId, LedSlot>,
    bounds: Rect,
    observer: &'a dyn FaultObserver,
}

impl<'a> Compositor<'a> {
    pub(crate) fn new(
        leds: &'a BTreeMap<LedId, LedSlot>,
        bounds: Rect,
        observer: &'a dyn FaultObserver,
    ) -> Self {
        Self {
            leds,
            bounds,
            observer,
        }
    }

    pub(crate) fn paint_background(&self, brush: &dyn Brush) {
        let ids: Vec<LedId> = self.leds.keys().copied().collect();
        self.apply(FaultSource::Background, &ids, &self.bounds, |area, p| {
            brush.color_at(area, p)
        });
    }

    pub(crate) fn paint_groups(&self, groups: &[Arc<LedGroup>]) {
        let mut ordered: Vec<&Arc<LedGroup>> = groups.iter().collect();
        ordered.sort_by_key(|g| g.z_index());

        for group in ordered {
            let Some(brush) = group.brush() else {
                continue;
            };
            let ids = group.leds();
            let Some(area) = self.area_of(&ids) else {
                continue;
            };
            let source = FaultSource::Group(group.name().to_string());
            self.apply(source, &ids, &area, |area, p| brush.color_at(area, p));
        }
    }

    /// Update and paint every effect. Returns the effects that reported
    /// done during this pass; the caller detaches them afterwards.
    ///
    /// Every call into an effect runs inside one fault boundary per effect:
    /// a failure anywhere in its step skips it for this pass and is reported
    /// once.
    pub(crate) fn paint_effects(
        &self,
        runners: &mut [EffectRunner],
        now: Instant,
    ) -> Vec<SharedEffect> {
        let mut order = Vec::with_capacity(runners.len());
        for (i, runner) in runners.iter_mut().enumerate() {
            let handle = Arc::clone(&runner.effect);
            let effect = handle.lock();
            match guarded(|| Ok(effect.z_index())) {
                Ok(z) => order.push((z, i)),
                Err(message) => {
                    runner.advance(now);
                    self.fault(effect_source(&*effect), message);
                }
            }
        }
        order.sort_by_key(|&(z, _)| z);

        let mut done = Vec::new();
        for (_, i) in order {
            let runner = &mut runners[i];
            let delta = runner.advance(now);
            let handle = Arc::clone(&runner.effect);
            let mut effect = handle.lock();

            let step = guarded(|| {
                effect.update(delta)?;
                let targets = match effect.target_leds() {
                    Some(ids) => ids,
                    None => self.leds.keys().copied().collect(),
                };
                let colors = match self.area_of(&targets) {
                    Some(area) => {
                        let fx = &*effect;
                        self.sample(&targets, &area, |area, p| fx.color_at(area, p))?
                    }
                    None => Vec::new(),
                };
                Ok((colors, effect.is_done()))
            });

            match step {
                Ok((colors, finished)) => {
                    self.write(colors);
                    if finished {
                        done.push(Arc::clone(&handle));
                    }
                }
                Err(message) => self.fault(effect_source(&*effect), message),
            }
        }
        done
    }

    /// Sample `paint` for every known LED in `ids`, then write the results.
    /// A failed sample leaves every LED untouched and is reported.
    fn apply<F>(&self, source: FaultSource, ids: &[LedId], area: &Rect, paint: F)
    where
        F: Fn(&Rect, Point) -> Result<RgbColor, PaintError>,
    {
        match guarded(|| self.sample(ids, area, paint)) {
            Ok(colors) => self.write(colors),
            Err(message) => self.fault(source, message),
        }
    }

    fn sample<F>(
        &self,
        ids: &[LedId],
        area: &Rect,
        paint: F,
    ) -> Result<Vec<(LedId, RgbColor)>, PaintError>
    where
        F: Fn(&Rect, Point) -> Result<RgbColor, PaintError>,
    {
        ids.iter()
            .filter_map(|id| self.leds.get(id).map(|slot| (*id, slot.rect.center())))
            .map(|(id, center)| paint(area, center).map(|color| (id, color)))
            .collect()
    }

    fn write(&self, colors: Vec<(LedId, RgbColor)>) {
        for (id, color) in colors {
            if let Some(slot) = self.leds.get(&id) {
                slot.state.lock().set_color(color);
            }
        }
    }

    fn area_of(&self, ids: &[LedId]) -> Option<Rect> {
        Rect::enclosing(ids.iter().filter_map(|id| self.leds.get(id).map(|s| s.rect)))
    }

    fn fault(&self, source: FaultSource, message: String) {
        debug!("Paint fault in {}: {}", source, message);
        let error = LightingError::Paint {
            origin: source.clone(),
            message,
        };
        self.observer.on_fault(FaultRecord::from_error(source, &error));
    }
}

/// Fault source for an effect, tolerating a `name` that panics.
fn effect_source(effect: &dyn Effect) -> FaultSource {
    let name = guarded(|| Ok(effect.name().to_string()))
        .unwrap_or_else(|_| "effect".to_string());
    FaultSource::Effect(name)
}

/// Run a paint step, turning both errors and panics into a message.
fn guarded<T, F>(f: F) -> Result<T, String>
where
    F: FnOnce() -> Result<T, PaintError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
