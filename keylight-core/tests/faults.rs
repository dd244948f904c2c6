//! Integration tests for fault isolation: paint faults stay inside their
//! source, hardware faults reach the caller or the observer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use keylight_core::{
    shared, solid, BackendError, BrushEffect, ChannelObserver, Effect, FaultKind, FaultSource, FnBrush, Keyboard,
    LedColorUpdate, LedGroup, LedPosition, LightingError, PaintError, Point, Rect,
    RecordingBackend, RgbColor, UpdateMode, WriteLog,
};

fn layout() -> Vec<LedPosition> {
    (1..=3)
        .map(|id| LedPosition::new(id, Rect::new(id as f32 * 10.0, 0.0, 10.0, 10.0)))
        .collect()
}

fn observed_keyboard() -> (
    Keyboard,
    WriteLog,
    crossbeam_channel::Receiver<keylight_core::FaultRecord>,
) {
    let (backend, log) = RecordingBackend::new(layout());
    let (observer, rx) = ChannelObserver::unbounded();
    let kb = Keyboard::with_observer(backend, Arc::new(observer)).unwrap();
    kb.set_update_mode(UpdateMode::Manual).unwrap();
    (kb, log, rx)
}

/// Paints green, but fails its first paint when asked to.
struct FlakyEffect {
    fail_once: Arc<AtomicBool>,
    panic: bool,
}

impl Effect for FlakyEffect {
    fn name(&self) -> &str {
        "flaky"
    }

    fn target_leds(&self) -> Option<Vec<u32>> {
        Some(vec![1, 2])
    }

    fn update(&mut self, _delta_seconds: f32) -> Result<(), PaintError> {
        Ok(())
    }

    fn color_at(&self, _area: &Rect, _point: Point) -> Result<RgbColor, PaintError> {
        if self.fail_once.swap(false, Ordering::SeqCst) {
            if self.panic {
                panic!("sensor unplugged");
            }
            return Err(PaintError::new("sensor unplugged"));
        }
        Ok(RgbColor::GREEN)
    }
}

#[test]
fn faulting_effect_is_reported_once_and_isolated() {
    let (kb, log, rx) = observed_keyboard();
    LedGroup::builder("base")
        .leds([1, 2, 3])
        .color(RgbColor::RED)
        .attach(&kb);
    let fail_once = Arc::new(AtomicBool::new(true));
    let fx = shared(FlakyEffect {
        fail_once: Arc::clone(&fail_once),
        panic: false,
    });
    kb.attach_effect(&fx);

    // The tick still succeeds; the effect's LEDs keep the group color
    kb.update(false).unwrap();
    assert_eq!(kb.color(1), Some(RgbColor::RED));
    assert_eq!(kb.color(3), Some(RgbColor::RED));
    assert_eq!(log.batch_count(), 1);

    let record = rx.try_recv().unwrap();
    assert_eq!(record.source, FaultSource::Effect("flaky".into()));
    assert_eq!(record.kind, FaultKind::Paint);
    assert!(record.message.contains("sensor unplugged"));
    assert!(rx.try_recv().is_err());

    // Next tick is normal
    kb.update(false).unwrap();
    assert_eq!(kb.color(1), Some(RgbColor::GREEN));
    assert_eq!(kb.color(2), Some(RgbColor::GREEN));
    assert_eq!(kb.color(3), Some(RgbColor::RED));
    assert!(rx.try_recv().is_err());
    assert_eq!(kb.effect_count(), 1);
}

#[test]
fn panicking_effect_is_caught() {
    let (kb, _log, rx) = observed_keyboard();
    let fx = shared(FlakyEffect {
        fail_once: Arc::new(AtomicBool::new(true)),
        panic: true,
    });
    kb.attach_effect(&fx);

    kb.update(false).unwrap();
    let record = rx.try_recv().unwrap();
    assert_eq!(record.kind, FaultKind::Paint);
    assert!(record.message.contains("panicked"));

    kb.update(false).unwrap();
    assert_eq!(kb.color(2), Some(RgbColor::GREEN));
}

#[test]
fn faulting_group_brush_leaves_other_groups_painting() {
    let (kb, _log, rx) = observed_keyboard();
    LedGroup::builder("ok")
        .leds([1])
        .color(RgbColor::BLUE)
        .attach(&kb);
    LedGroup::builder("broken")
        .leds([2, 3])
        .brush(Arc::new(FnBrush(|_: &Rect, p: Point| {
            if p.x > 30.0 {
                Err(PaintError::new("out of range"))
            } else {
                Ok(RgbColor::WHITE)
            }
        })))
        .attach(&kb);

    kb.update(false).unwrap();
    assert_eq!(kb.color(1), Some(RgbColor::BLUE));
    // Partial results are discarded
    assert_eq!(kb.color(2), None);
    assert_eq!(kb.color(3), None);

    let record = rx.try_recv().unwrap();
    assert_eq!(record.source, FaultSource::Group("broken".into()));
}

#[test]
fn backend_failure_propagates_from_update() {
    let (kb, log, _rx) = observed_keyboard();
    kb.set_background_color(RgbColor::RED);
    log.fail_next(1);

    let err = kb.update(false).unwrap_err();
    assert!(matches!(
        err,
        LightingError::Backend(BackendError::Disconnected)
    ));
    assert!(err.is_hardware());

    kb.update(true).unwrap();
    assert_eq!(log.last().map(|b| b.len()), Some(3));
}

#[test]
fn worker_survives_backend_failure() {
    let (backend, log) = RecordingBackend::new(layout());
    let (observer, rx) = ChannelObserver::unbounded();
    let kb = Keyboard::with_observer(backend, Arc::new(observer)).unwrap();
    kb.set_update_frequency(100.0).unwrap();

    log.fail_next(1);
    kb.set_background_color(RgbColor::RED);
    kb.set_update_mode(UpdateMode::Continuous).unwrap();

    let record = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(record.source, FaultSource::Scheduler);
    assert_eq!(record.kind, FaultKind::Hardware);

    kb.set_background_color(RgbColor::GREEN);
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while log.last().is_none() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(
        log.last().and_then(|b| b.first().copied()),
        Some(LedColorUpdate::new(1, RgbColor::GREEN))
    );
}

/// Which call a `Misbehaving` effect fails in, once
#[derive(Clone, Copy, PartialEq)]
enum Stage {
    UpdateErr,
    UpdatePanic,
    Targets,
    ZIndex,
}

/// Paints blue on LED 1, failing once at `stage`.
struct Misbehaving {
    stage: Stage,
    armed: AtomicBool,
}

impl Misbehaving {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            armed: AtomicBool::new(true),
        }
    }

    fn trips(&self, stage: Stage) -> bool {
        self.stage == stage && self.armed.swap(false, Ordering::SeqCst)
    }
}

impl Effect for Misbehaving {
    fn name(&self) -> &str {
        "misbehaving"
    }

    fn z_index(&self) -> i32 {
        if self.trips(Stage::ZIndex) {
            panic!("z-index lookup failed");
        }
        5
    }

    fn target_leds(&self) -> Option<Vec<u32>> {
        if self.trips(Stage::Targets) {
            panic!("target lookup failed");
        }
        Some(vec![1])
    }

    fn update(&mut self, _delta_seconds: f32) -> Result<(), PaintError> {
        if self.trips(Stage::UpdatePanic) {
            panic!("update blew up");
        }
        if self.trips(Stage::UpdateErr) {
            return Err(PaintError::new("update failed"));
        }
        Ok(())
    }

    fn color_at(&self, _area: &Rect, _point: Point) -> Result<RgbColor, PaintError> {
        Ok(RgbColor::BLUE)
    }
}

/// Tick K faults inside the effect, tick K+1 paints normally.
fn assert_effect_fault_is_contained(stage: Stage, expected: &str) {
    let (kb, log, rx) = observed_keyboard();
    LedGroup::builder("base")
        .leds([1, 2])
        .color(RgbColor::RED)
        .attach(&kb);
    let fx = shared(Misbehaving::new(stage));
    let healthy = shared(BrushEffect::new("healthy", solid(RgbColor::GREEN)).with_targets([3]));
    kb.attach_effect(&fx);
    kb.attach_effect(&healthy);

    kb.update(false).unwrap();
    assert_eq!(kb.committed_color(1), Some(RgbColor::RED));
    assert_eq!(kb.committed_color(2), Some(RgbColor::RED));
    assert_eq!(kb.committed_color(3), Some(RgbColor::GREEN));
    assert_eq!(log.batch_count(), 1);

    let record = rx.try_recv().unwrap();
    assert_eq!(record.source, FaultSource::Effect("misbehaving".into()));
    assert_eq!(record.kind, FaultKind::Paint);
    assert!(
        record.message.contains(expected),
        "unexpected message: {}",
        record.message
    );
    assert!(rx.try_recv().is_err());

    kb.update(false).unwrap();
    assert_eq!(kb.committed_color(1), Some(RgbColor::BLUE));
    assert_eq!(kb.committed_color(2), Some(RgbColor::RED));
    assert!(kb.is_effect_attached(&fx));
    assert!(rx.try_recv().is_err());
}

#[test]
fn effect_update_error_is_contained() {
    assert_effect_fault_is_contained(Stage::UpdateErr, "update failed");
}

#[test]
fn effect_update_panic_is_contained() {
    assert_effect_fault_is_contained(Stage::UpdatePanic, "update blew up");
}

#[test]
fn effect_target_lookup_panic_is_contained() {
    assert_effect_fault_is_contained(Stage::Targets, "target lookup failed");
}

#[test]
fn effect_z_index_panic_is_contained() {
    assert_effect_fault_is_contained(Stage::ZIndex, "z-index lookup failed");
}
