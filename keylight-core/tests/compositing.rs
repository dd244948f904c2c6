//! Integration tests for paint resolution and dirty tracking.
//!
//! All keyboards here run in `Manual` mode so every tick is driven by the
//! test through `Keyboard::update`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use keylight_core::{
    shared, Effect, GradientStop, Keyboard, LedColorUpdate, LedGroup, LedPosition,
    LinearGradientBrush, PaintError, Point, Rect, RecordingBackend, RgbColor, UpdateMode,
    WriteLog,
};

fn row(ids: &[u32]) -> Vec<LedPosition> {
    ids.iter()
        .enumerate()
        .map(|(i, &id)| LedPosition::new(id, Rect::new(i as f32 * 10.0, 0.0, 10.0, 10.0)))
        .collect()
}

fn manual_keyboard(ids: &[u32]) -> (Keyboard, WriteLog) {
    let (backend, log) = RecordingBackend::new(row(ids));
    let kb = Keyboard::new(backend).unwrap();
    kb.set_update_mode(UpdateMode::Manual).unwrap();
    (kb, log)
}

/// Finishes after a fixed number of updates and counts lifecycle calls.
struct CountdownEffect {
    color: RgbColor,
    remaining: u32,
    z_index: i32,
    targets: Option<Vec<u32>>,
    updates: Arc<AtomicUsize>,
    detaches: Arc<AtomicUsize>,
}

impl CountdownEffect {
    fn new(color: RgbColor, remaining: u32) -> Self {
        Self {
            color,
            remaining,
            z_index: 0,
            targets: None,
            updates: Arc::new(AtomicUsize::new(0)),
            detaches: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Effect for CountdownEffect {
    fn name(&self) -> &str {
        "countdown"
    }

    fn z_index(&self) -> i32 {
        self.z_index
    }

    fn target_leds(&self) -> Option<Vec<u32>> {
        self.targets.clone()
    }

    fn is_done(&self) -> bool {
        self.remaining == 0
    }

    fn update(&mut self, _delta_seconds: f32) -> Result<(), PaintError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.remaining = self.remaining.saturating_sub(1);
        Ok(())
    }

    fn color_at(&self, _area: &Rect, _point: Point) -> Result<RgbColor, PaintError> {
        Ok(self.color)
    }

    fn on_detach(&mut self) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Background and groups ──

#[test]
fn background_and_group_write_one_batch() {
    let (kb, log) = manual_keyboard(&[1, 2]);
    kb.set_background_color(RgbColor::BLUE);
    LedGroup::builder("accent")
        .leds([2])
        .color(RgbColor::RED)
        .attach(&kb);

    kb.update(false).unwrap();

    assert_eq!(
        log.batches(),
        vec![vec![
            LedColorUpdate::new(1, RgbColor::BLUE),
            LedColorUpdate::new(2, RgbColor::RED),
        ]]
    );
    assert_eq!(kb.committed_color(1), Some(RgbColor::BLUE));
    assert_eq!(kb.committed_color(2), Some(RgbColor::RED));

    // Nothing changed, so nothing is written
    kb.update(false).unwrap();
    assert_eq!(log.batch_count(), 1);
}

#[test]
fn nothing_dirty_after_tick() {
    let (kb, _log) = manual_keyboard(&[1, 2, 3]);
    kb.set_color(2, RgbColor::GREEN);
    assert!(kb.is_dirty(2));
    assert!(!kb.is_dirty(1));

    kb.update(false).unwrap();
    for id in kb.led_ids() {
        assert!(!kb.is_dirty(id), "LED {id} still dirty");
    }
}

#[test]
fn higher_z_index_wins_regardless_of_attach_order() {
    for high_first in [true, false] {
        let (kb, _log) = manual_keyboard(&[1]);
        let high = LedGroup::builder("high")
            .leds([1])
            .color(RgbColor::GREEN)
            .z_index(5)
            .build(&kb);
        let low = LedGroup::builder("low")
            .leds([1])
            .color(RgbColor::RED)
            .z_index(-1)
            .build(&kb);

        if high_first {
            kb.attach_group(&high);
            kb.attach_group(&low);
        } else {
            kb.attach_group(&low);
            kb.attach_group(&high);
        }
        kb.update(false).unwrap();
        assert_eq!(kb.color(1), Some(RgbColor::GREEN));
    }
}

#[test]
fn equal_z_index_keeps_attach_order() {
    let (kb, _log) = manual_keyboard(&[1]);
    LedGroup::builder("first")
        .leds([1])
        .color(RgbColor::RED)
        .attach(&kb);
    LedGroup::builder("second")
        .leds([1])
        .color(RgbColor::BLUE)
        .attach(&kb);

    kb.update(false).unwrap();
    assert_eq!(kb.color(1), Some(RgbColor::BLUE));
}

#[test]
fn z_index_change_applies_next_tick() {
    let (kb, _log) = manual_keyboard(&[1]);
    let a = LedGroup::builder("a")
        .leds([1])
        .color(RgbColor::RED)
        .z_index(1)
        .attach(&kb);
    LedGroup::builder("b")
        .leds([1])
        .color(RgbColor::BLUE)
        .attach(&kb);

    kb.update(false).unwrap();
    assert_eq!(kb.color(1), Some(RgbColor::RED));

    a.set_z_index(-1);
    kb.update(false).unwrap();
    assert_eq!(kb.color(1), Some(RgbColor::BLUE));
}

#[test]
fn effects_paint_over_groups() {
    let (kb, _log) = manual_keyboard(&[1, 2]);
    LedGroup::builder("all")
        .leds([1, 2])
        .color(RgbColor::RED)
        .z_index(100)
        .attach(&kb);
    let mut fx = CountdownEffect::new(RgbColor::WHITE, 10);
    fx.targets = Some(vec![2]);
    let fx = shared(fx);
    kb.attach_effect(&fx);

    kb.update(false).unwrap();
    assert_eq!(kb.color(1), Some(RgbColor::RED));
    assert_eq!(kb.color(2), Some(RgbColor::WHITE));
}

#[test]
fn gradient_background_samples_led_centers() {
    let (kb, _log) = manual_keyboard(&[0, 1, 2]);
    kb.set_background(Some(Arc::new(LinearGradientBrush::horizontal(vec![
        GradientStop::new(0.0, RgbColor::RED),
        GradientStop::new(1.0, RgbColor::BLUE),
    ]))));

    kb.update(false).unwrap();
    let left = kb.color(0).unwrap();
    let mid = kb.color(1).unwrap();
    let right = kb.color(2).unwrap();
    assert!(left.r > mid.r && mid.r > right.r);
    assert!(left.b < mid.b && mid.b < right.b);
}

#[test]
fn unpainted_leds_are_never_written() {
    let (kb, log) = manual_keyboard(&[1, 2, 3]);
    LedGroup::builder("one")
        .leds([2])
        .color(RgbColor::RED)
        .attach(&kb);

    kb.update(true).unwrap();
    assert_eq!(log.last(), Some(vec![LedColorUpdate::new(2, RgbColor::RED)]));
    assert_eq!(kb.color(1), None);
}

#[test]
fn flush_all_rewrites_every_painted_led() {
    let (kb, log) = manual_keyboard(&[1, 2]);
    kb.set_background_color(RgbColor::GREEN);
    kb.update(false).unwrap();
    kb.update(false).unwrap();
    assert_eq!(log.batch_count(), 1);

    kb.update(true).unwrap();
    assert_eq!(log.batch_count(), 2);
    assert_eq!(log.last().map(|b| b.len()), Some(2));
}

#[test]
fn backend_never_sees_an_empty_batch() {
    let (kb, log) = manual_keyboard(&[1, 2]);
    kb.update(false).unwrap();
    kb.update(true).unwrap();
    assert_eq!(log.batch_count(), 0);

    kb.set_color(1, RgbColor::RED);
    kb.update(false).unwrap();
    kb.update(false).unwrap();
    assert!(log.batches().iter().all(|b| !b.is_empty()));
    assert_eq!(log.batch_count(), 1);
}

// ── Locking ──

#[test]
fn locked_led_ignores_paint() {
    let (kb, log) = manual_keyboard(&[1, 2]);
    assert!(kb.lock_led(1));
    kb.set_background_color(RgbColor::RED);

    kb.update(false).unwrap();
    assert_eq!(kb.color(1), None);
    assert_eq!(log.last(), Some(vec![LedColorUpdate::new(2, RgbColor::RED)]));
}

#[test]
fn lock_keeps_current_color_and_unlock_does_not_replay() {
    let (kb, _log) = manual_keyboard(&[1]);
    kb.set_color(1, RgbColor::GREEN);
    kb.lock_led(1);
    assert!(kb.is_locked(1));
    assert_eq!(kb.color(1), Some(RgbColor::GREEN));

    kb.set_color(1, RgbColor::RED);
    assert_eq!(kb.color(1), Some(RgbColor::GREEN));

    kb.unlock_led(1);
    assert_eq!(kb.color(1), Some(RgbColor::GREEN));
    kb.set_color(1, RgbColor::BLUE);
    assert_eq!(kb.color(1), Some(RgbColor::BLUE));
}

// ── Effect lifecycle ──

#[test]
fn done_effect_paints_its_last_tick_then_detaches() {
    let (kb, log) = manual_keyboard(&[1]);
    let fx = CountdownEffect::new(RgbColor::WHITE, 1);
    let updates = Arc::clone(&fx.updates);
    let detaches = Arc::clone(&fx.detaches);
    let fx = shared(fx);
    assert!(kb.attach_effect(&fx));

    // Tick N: painted, then found done
    kb.update(false).unwrap();
    assert_eq!(log.last(), Some(vec![LedColorUpdate::new(1, RgbColor::WHITE)]));
    assert_eq!(updates.load(Ordering::SeqCst), 1);
    assert_eq!(kb.effect_count(), 0);
    assert_eq!(detaches.load(Ordering::SeqCst), 1);

    // Tick N+1: not updated again
    kb.update(false).unwrap();
    assert_eq!(updates.load(Ordering::SeqCst), 1);
    assert_eq!(detaches.load(Ordering::SeqCst), 1);
    assert!(!kb.is_effect_attached(&fx));
}

#[test]
fn duplicate_attach_and_unknown_detach_are_rejected() {
    let (kb, _log) = manual_keyboard(&[1]);
    let fx = shared(CountdownEffect::new(RgbColor::RED, 5));
    assert!(kb.attach_effect(&fx));
    assert!(!kb.attach_effect(&fx));
    assert_eq!(kb.effect_count(), 1);

    assert!(kb.detach_effect(&fx));
    assert!(!kb.detach_effect(&fx));

    let group = LedGroup::builder("g").leds([1]).build(&kb);
    assert!(kb.attach_group(&group));
    assert!(!kb.attach_group(&group));
    assert!(kb.detach_group(&group));
    assert!(!kb.detach_group(&group));
}

#[test]
fn manual_detach_calls_on_detach_once() {
    let (kb, _log) = manual_keyboard(&[1]);
    let fx = CountdownEffect::new(RgbColor::RED, 5);
    let detaches = Arc::clone(&fx.detaches);
    let fx = shared(fx);
    kb.attach_effect(&fx);
    kb.detach_effect(&fx);
    kb.detach_effect(&fx);
    assert_eq!(detaches.load(Ordering::SeqCst), 1);
}

// ── Group selection ──

#[test]
fn rect_selection_honors_min_overlap() {
    let (kb, _log) = manual_keyboard(&[0, 1, 2, 3]);
    let area = Rect::new(0.0, 0.0, 25.0, 10.0);

    let half = LedGroup::builder("half").rect(area).build(&kb);
    assert_eq!(half.leds(), vec![0, 1, 2]);

    let strict = LedGroup::builder("strict")
        .rect(area)
        .min_overlap(0.6)
        .build(&kb);
    assert_eq!(strict.leds(), vec![0, 1]);
}

#[test]
fn between_leds_and_points_select_spanned_keys() {
    let (kb, _log) = manual_keyboard(&[0, 1, 2, 3]);
    let span = LedGroup::builder("span").between_leds(1, 3).build(&kb);
    assert_eq!(span.leds(), vec![1, 2, 3]);

    let points = LedGroup::builder("points")
        .between_points(Point::new(0.0, 0.0), Point::new(20.0, 10.0))
        .build(&kb);
    assert_eq!(points.leds(), vec![0, 1]);

    let missing = LedGroup::builder("missing").between_leds(1, 99).build(&kb);
    assert!(missing.is_empty());
}

#[test]
fn explicit_ids_drop_unknown_and_excluded() {
    let (kb, _log) = manual_keyboard(&[0, 1, 2]);
    let group = LedGroup::builder("g")
        .leds([2, 0, 7, 1])
        .exclude([1])
        .build(&kb);
    assert_eq!(group.leds(), vec![0, 2]);

    group.exclude([2]);
    assert_eq!(group.leds(), vec![0]);
    // Exclusions survive re-resolution
    group.refresh(&kb);
    assert_eq!(group.leds(), vec![0]);
}

#[test]
fn brush_change_applies_next_tick() {
    let (kb, log) = manual_keyboard(&[1]);
    let group = LedGroup::builder("g")
        .leds([1])
        .color(RgbColor::RED)
        .attach(&kb);
    kb.update(false).unwrap();

    group.set_color(RgbColor::GREEN);
    kb.update(false).unwrap();
    assert_eq!(log.last(), Some(vec![LedColorUpdate::new(1, RgbColor::GREEN)]));

    // A group without a brush leaves its LEDs alone
    group.clear_brush();
    kb.update(false).unwrap();
    assert_eq!(kb.color(1), Some(RgbColor::GREEN));
    assert_eq!(log.batch_count(), 2);
}
