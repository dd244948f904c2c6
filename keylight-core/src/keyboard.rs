//! The keyboard device: LED ownership, attach/detach, and the tick
//!
//! ```text
//!  [LedGroup]* [Effect]* background
//!        \        |        /
//!         [Compositor pass]      ← groups read lock + effects lock
//!                 |
//!     LedState (requested/committed)
//!                 |
//!      dirty subset or full flush
//!                 |
//!           [LedBackend]
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::backend::LedBackend;
use crate::brush::{solid, SharedBrush};
use crate::color::RgbColor;
use crate::compositor::Compositor;
use crate::effect::{EffectRunner, SharedEffect};
use crate::error::LightingError;
use crate::geometry::{Point, Rect};
use crate::group::LedGroup;
use crate::led::{LedColorUpdate, LedId, LedState};
use crate::observer::{FaultObserver, FaultRecord, FaultSource, LogObserver};
use crate::scheduler::{validate_frequency, SchedulerState, UpdateLoop, UpdateMode, UpdateSettings};

/// One LED owned by the keyboard
pub(crate) struct LedSlot {
    pub(crate) rect: Rect,
    pub(crate) state: Mutex<LedState>,
}

/// State shared between the keyboard handle and its update thread
pub(crate) struct Shared {
    leds: BTreeMap<LedId, LedSlot>,
    bounds: Rect,
    groups: RwLock<Vec<Arc<LedGroup>>>,
    effects: Mutex<Vec<EffectRunner>>,
    background: RwLock<Option<SharedBrush>>,
    settings: Mutex<UpdateSettings>,
    backend: Mutex<Box<dyn LedBackend>>,
    observer: Arc<dyn FaultObserver>,
    pub(crate) scheduler: Mutex<Option<UpdateLoop>>,
}

impl Shared {
    /// Paint, detach finished effects, commit, and flush to the backend.
    pub(crate) fn tick(&self, flush_all: bool) -> Result<(), LightingError> {
        let background = self.background.read().clone();

        let done = {
            let groups = self.groups.read();
            let mut effects = self.effects.lock();
            let compositor = Compositor::new(&self.leds, self.bounds, self.observer.as_ref());
            if let Some(brush) = background {
                compositor.paint_background(brush.as_ref());
            }
            compositor.paint_groups(&groups);
            compositor.paint_effects(&mut effects, Instant::now())
        };

        for effect in &done {
            self.detach_effect(effect);
        }

        let batch = self.commit(flush_all);
        if batch.is_empty() {
            trace!("Nothing to write");
            return Ok(());
        }

        trace!("Writing {} LEDs", batch.len());
        self.backend.lock().write_colors(&batch)?;
        Ok(())
    }

    /// Commit every LED and return the painted ones that need writing.
    fn commit(&self, flush_all: bool) -> Vec<LedColorUpdate> {
        let mut batch = Vec::new();
        for (&id, slot) in &self.leds {
            let mut state = slot.state.lock();
            if flush_all || state.is_dirty() {
                if let Some(color) = state.requested() {
                    batch.push(LedColorUpdate::new(id, color));
                }
            }
            state.commit();
        }
        batch
    }

    pub(crate) fn should_run(&self) -> bool {
        let mode = self.settings.lock().mode;
        mode.should_run(!self.effects.lock().is_empty())
    }

    pub(crate) fn settings(&self) -> UpdateSettings {
        *self.settings.lock()
    }

    pub(crate) fn report(&self, record: FaultRecord) {
        self.observer.on_fault(record);
    }

    fn detach_effect(&self, effect: &SharedEffect) -> bool {
        let mut effects = self.effects.lock();
        let Some(pos) = effects.iter().position(|r| r.is(effect)) else {
            return false;
        };
        let runner = effects.remove(pos);
        let mut fx = runner.effect.lock();
        fx.on_detach();
        debug!("Detached effect '{}'", fx.name());
        true
    }
}

/// A per-key RGB keyboard.
///
/// Owns every LED reported by the backend layout, the attached groups and
/// effects, and the background update loop. Share it as `Arc<Keyboard>`
/// across threads. Dropping it stops the update loop.
pub struct Keyboard {
    shared: Arc<Shared>,
}

impl Keyboard {
    /// Query the backend layout and create a keyboard that logs faults.
    pub fn new<B: LedBackend + 'static>(backend: B) -> Result<Self, LightingError> {
        Self::with_observer(backend, Arc::new(LogObserver))
    }

    pub fn with_observer<B: LedBackend + 'static>(
        mut backend: B,
        observer: Arc<dyn FaultObserver>,
    ) -> Result<Self, LightingError> {
        let layout = backend.led_layout()?;

        let mut leds = BTreeMap::new();
        for pos in layout {
            let slot = LedSlot {
                rect: pos.rect,
                state: Mutex::new(LedState::new()),
            };
            if leds.insert(pos.id, slot).is_some() {
                warn!("Duplicate LED id {} in layout, keeping the last", pos.id);
            }
        }
        let bounds = Rect::enclosing(leds.values().map(|s| s.rect)).unwrap_or_default();
        debug!("Keyboard with {} LEDs, bounds {:?}", leds.len(), bounds);

        let keyboard = Self {
            shared: Arc::new(Shared {
                leds,
                bounds,
                groups: RwLock::new(Vec::new()),
                effects: Mutex::new(Vec::new()),
                background: RwLock::new(None),
                settings: Mutex::new(UpdateSettings::default()),
                backend: Mutex::new(Box::new(backend)),
                observer,
                scheduler: Mutex::new(None),
            }),
        };
        keyboard.check_update_loop()?;
        Ok(keyboard)
    }

    // ---- Layout ----

    /// All LED ids, ascending
    pub fn led_ids(&self) -> Vec<LedId> {
        self.shared.leds.keys().copied().collect()
    }

    pub fn led_count(&self) -> usize {
        self.shared.leds.len()
    }

    pub fn contains_led(&self, id: LedId) -> bool {
        self.shared.leds.contains_key(&id)
    }

    pub fn led_rect(&self, id: LedId) -> Option<Rect> {
        self.shared.leds.get(&id).map(|s| s.rect)
    }

    /// Rectangle enclosing every LED
    pub fn bounds(&self) -> Rect {
        self.shared.bounds
    }

    /// The LED whose rectangle contains `point`
    pub fn led_at(&self, point: Point) -> Option<LedId> {
        self.shared
            .leds
            .iter()
            .find(|(_, s)| s.rect.contains(point))
            .map(|(&id, _)| id)
    }

    /// LEDs with at least `min_overlap` of their area inside `rect`.
    pub fn leds_in(&self, rect: &Rect, min_overlap: f32) -> Vec<LedId> {
        self.shared
            .leds
            .iter()
            .filter(|(_, s)| s.rect.overlap_fraction(rect) >= min_overlap)
            .map(|(&id, _)| id)
            .collect()
    }

    // ---- Per-LED colors ----

    /// Request a color for one LED. Returns false for an unknown id; a
    /// locked LED silently keeps its color.
    pub fn set_color(&self, id: LedId, color: RgbColor) -> bool {
        match self.shared.leds.get(&id) {
            Some(slot) => {
                slot.state.lock().set_color(color);
                true
            }
            None => false,
        }
    }

    /// Requested color of an LED (`None` if unknown or never painted)
    pub fn color(&self, id: LedId) -> Option<RgbColor> {
        self.shared
            .leds
            .get(&id)
            .and_then(|s| s.state.lock().requested())
    }

    /// Color last handed to the backend
    pub fn committed_color(&self, id: LedId) -> Option<RgbColor> {
        self.shared
            .leds
            .get(&id)
            .and_then(|s| s.state.lock().committed())
    }

    pub fn is_dirty(&self, id: LedId) -> bool {
        self.shared
            .leds
            .get(&id)
            .is_some_and(|s| s.state.lock().is_dirty())
    }

    pub fn lock_led(&self, id: LedId) -> bool {
        self.with_state(id, LedState::lock)
    }

    pub fn unlock_led(&self, id: LedId) -> bool {
        self.with_state(id, LedState::unlock)
    }

    pub fn is_locked(&self, id: LedId) -> bool {
        self.shared
            .leds
            .get(&id)
            .is_some_and(|s| s.state.lock().is_locked())
    }

    /// Copy of an LED's full state
    pub fn led_state(&self, id: LedId) -> Result<LedState, LightingError> {
        self.shared
            .leds
            .get(&id)
            .map(|s| s.state.lock().clone())
            .ok_or(LightingError::UnknownLed(id))
    }

    fn with_state(&self, id: LedId, f: impl FnOnce(&mut LedState)) -> bool {
        match self.shared.leds.get(&id) {
            Some(slot) => {
                f(&mut slot.state.lock());
                true
            }
            None => false,
        }
    }

    // ---- Background ----

    pub fn background(&self) -> Option<SharedBrush> {
        self.shared.background.read().clone()
    }

    pub fn set_background(&self, brush: Option<SharedBrush>) {
        *self.shared.background.write() = brush;
    }

    pub fn set_background_color(&self, color: RgbColor) {
        self.set_background(Some(solid(color)));
    }

    // ---- Groups ----

    /// Attach a group. Returns false if it is already attached.
    pub fn attach_group(&self, group: &Arc<LedGroup>) -> bool {
        let mut groups = self.shared.groups.write();
        if groups.iter().any(|g| Arc::ptr_eq(g, group)) {
            return false;
        }
        groups.push(Arc::clone(group));
        debug!("Attached group '{}' ({} LEDs)", group.name(), group.len());
        true
    }

    /// Detach a group. Returns false if it was not attached.
    pub fn detach_group(&self, group: &Arc<LedGroup>) -> bool {
        let mut groups = self.shared.groups.write();
        let Some(pos) = groups.iter().position(|g| Arc::ptr_eq(g, group)) else {
            return false;
        };
        groups.remove(pos);
        debug!("Detached group '{}'", group.name());
        true
    }

    /// Attached groups in attach order
    pub fn groups(&self) -> Vec<Arc<LedGroup>> {
        self.shared.groups.read().clone()
    }

    pub fn group_count(&self) -> usize {
        self.shared.groups.read().len()
    }

    // ---- Effects ----

    /// Attach an effect, calling its `on_attach`. Returns false if it is
    /// already attached.
    pub fn attach_effect(&self, effect: &SharedEffect) -> bool {
        {
            let mut effects = self.shared.effects.lock();
            if effects.iter().any(|r| r.is(effect)) {
                return false;
            }
            let mut fx = effect.lock();
            fx.on_attach();
            debug!("Attached effect '{}'", fx.name());
            drop(fx);
            effects.push(EffectRunner::new(Arc::clone(effect)));
        }
        self.check_update_loop_logged();
        true
    }

    /// Detach an effect, calling its `on_detach`. Returns false if it was
    /// not attached.
    ///
    /// When this leaves nothing for the update loop to do, the call blocks
    /// until the loop thread has exited.
    pub fn detach_effect(&self, effect: &SharedEffect) -> bool {
        let detached = self.shared.detach_effect(effect);
        self.check_update_loop_logged();
        detached
    }

    pub fn effect_count(&self) -> usize {
        self.shared.effects.lock().len()
    }

    pub fn has_effect(&self) -> bool {
        self.effect_count() > 0
    }

    pub fn is_effect_attached(&self, effect: &SharedEffect) -> bool {
        self.shared.effects.lock().iter().any(|r| r.is(effect))
    }

    // ---- Update ----

    /// Run one tick: composite, commit, and write changed LEDs (or every
    /// painted LED when `flush_all`).
    ///
    /// Backend failures are returned; paint failures are reported to the
    /// fault observer and do not fail the tick.
    pub fn update(&self, flush_all: bool) -> Result<(), LightingError> {
        let result = self.shared.tick(flush_all);
        self.check_update_loop_logged();
        result
    }

    pub fn update_mode(&self) -> UpdateMode {
        self.shared.settings.lock().mode
    }

    /// Change the update mode, starting or stopping the loop as needed.
    /// Stopping blocks until the loop thread has exited.
    pub fn set_update_mode(&self, mode: UpdateMode) -> Result<(), LightingError> {
        self.shared.settings.lock().mode = mode;
        debug!("Update mode set to {}", mode);
        self.check_update_loop()
    }

    /// Target updates per second
    pub fn update_frequency(&self) -> f32 {
        self.shared.settings.lock().frequency_hz
    }

    /// Set the target updates per second. Takes effect on the next loop iteration.
    pub fn set_update_frequency(&self, hz: f32) -> Result<(), LightingError> {
        let hz = validate_frequency(hz)?;
        self.shared.settings.lock().frequency_hz = hz;
        self.check_update_loop()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        match &*self.shared.scheduler.lock() {
            Some(running) if !running.is_stopping() => SchedulerState::Running,
            _ => SchedulerState::Stopped,
        }
    }

    /// Start or stop the update loop to match the current mode.
    fn check_update_loop(&self) -> Result<(), LightingError> {
        let mut slot = self.shared.scheduler.lock();

        // Reap a loop that stopped itself
        if slot.as_ref().is_some_and(UpdateLoop::is_stopping) {
            if let Some(finished) = slot.take() {
                finished.stop_and_join();
            }
        }

        let should_run = self.shared.should_run();
        if should_run && slot.is_none() {
            let running =
                UpdateLoop::spawn(Arc::clone(&self.shared)).map_err(LightingError::Thread)?;
            *slot = Some(running);
        } else if !should_run {
            if let Some(running) = slot.take() {
                running.stop_and_join();
            }
        }
        Ok(())
    }

    fn check_update_loop_logged(&self) {
        if let Err(e) = self.check_update_loop() {
            warn!("Failed to update scheduler: {}", e);
            self.shared
                .report(FaultRecord::from_error(FaultSource::Scheduler, &e));
        }
    }
}

impl Drop for Keyboard {
    fn drop(&mut self) {
        if let Some(running) = self.shared.scheduler.lock().take() {
            running.stop_and_join();
        }
    }
}
