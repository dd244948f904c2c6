//! Update modes and the background update loop
//!
//! ```text
//!  set_update_mode / attach / detach / update
//!                  |
//!          check_update_loop ──► should_run?
//!                  |                 |
//!      Stopped ──spawn──► Running ──stop + join──► Stopped
//!                           |
//!                 [worker: tick, sleep(frame - elapsed)]
//! ```
//!
//! The worker never blocks on the scheduler slot, so the thread that stops
//! it can hold the slot while joining.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::error::LightingError;
use crate::keyboard::Shared;
use crate::observer::{FaultKind, FaultRecord, FaultSource};

/// Default update frequency (updates per second)
pub const DEFAULT_UPDATE_FREQUENCY_HZ: f32 = 30.0;

/// Longest uninterrupted sleep of the worker between frames, so stop
/// requests and frequency changes are picked up during long frames.
const MAX_SLEEP_SLICE: Duration = Duration::from_millis(50);

/// When the background loop runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UpdateMode {
    /// Only explicit `update` calls push colors
    Manual,
    /// Run while at least one effect is attached
    #[default]
    AutoOnEffect,
    /// Always run
    Continuous,
}

impl UpdateMode {
    pub const ALL: &'static [UpdateMode] = &[
        UpdateMode::Manual,
        UpdateMode::AutoOnEffect,
        UpdateMode::Continuous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMode::Manual => "manual",
            UpdateMode::AutoOnEffect => "auto-on-effect",
            UpdateMode::Continuous => "continuous",
        }
    }

    /// Whether the loop should run given whether any effect is attached.
    pub fn should_run(&self, has_effect: bool) -> bool {
        match self {
            UpdateMode::Manual => false,
            UpdateMode::AutoOnEffect => has_effect,
            UpdateMode::Continuous => true,
        }
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateMode {
    type Err = LightingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "manual" => Ok(UpdateMode::Manual),
            "autooneffect" | "auto" => Ok(UpdateMode::AutoOnEffect),
            "continuous" => Ok(UpdateMode::Continuous),
            _ => Err(LightingError::Configuration(format!(
                "unknown update mode: \"{s}\""
            ))),
        }
    }
}

impl TryFrom<String> for UpdateMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map_err(|e: LightingError| e.to_string())
    }
}

impl From<UpdateMode> for String {
    fn from(mode: UpdateMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Update mode and target frequency of one keyboard
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateSettings {
    pub mode: UpdateMode,
    pub frequency_hz: f32,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            mode: UpdateMode::default(),
            frequency_hz: DEFAULT_UPDATE_FREQUENCY_HZ,
        }
    }
}

impl UpdateSettings {
    /// Target time budget of one tick. Saturates at `Duration::MAX` for
    /// frequencies too low to express.
    pub fn frame_duration(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / f64::from(self.frequency_hz)).unwrap_or(Duration::MAX)
    }
}

/// Reject non-positive or non-finite frequencies.
pub fn validate_frequency(hz: f32) -> Result<f32, LightingError> {
    if hz.is_finite() && hz > 0.0 {
        Ok(hz)
    } else {
        Err(LightingError::Configuration(format!(
            "update frequency must be positive, got {hz}"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Handle to a running worker thread
pub(crate) struct UpdateLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl UpdateLoop {
    pub(crate) fn spawn(shared: Arc<Shared>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("keylight-update".into())
            .spawn(move || run(&shared, &thread_stop))?;
        info!("Update loop started");
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// True once a stop was requested, by a caller or by the loop itself.
    pub(crate) fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Signal the worker and block until it has exited.
    pub(crate) fn stop_and_join(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Update loop thread panicked");
            }
        }
        info!("Update loop stopped");
    }
}

/// Marks the loop stopped however the worker exits, so a dead worker is
/// reaped and respawned by the next evaluation.
struct ExitGuard<'a> {
    shared: &'a Shared,
    stop: &'a AtomicBool,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if std::thread::panicking() {
            warn!("Update loop thread panicked");
            self.shared.report(FaultRecord {
                source: FaultSource::Scheduler,
                kind: FaultKind::Scheduler,
                message: "update loop panicked".to_string(),
            });
        }
    }
}

fn run(shared: &Shared, stop: &AtomicBool) {
    let _guard = ExitGuard { shared, stop };
    debug!("Update loop thread started");

    while !stop.load(Ordering::SeqCst) {
        let started = Instant::now();

        match panic::catch_unwind(AssertUnwindSafe(|| shared.tick(false))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Update failed: {}", e);
                shared.report(FaultRecord::from_error(FaultSource::Scheduler, &e));
            }
            Err(_) => {
                warn!("Update panicked");
                shared.report(FaultRecord {
                    source: FaultSource::Scheduler,
                    kind: FaultKind::Hardware,
                    message: "update panicked".to_string(),
                });
            }
        }

        // Leave on our own once the mode no longer wants us (e.g. the last
        // effect finished). If a caller is evaluating the scheduler right
        // now, let it decide instead.
        if let Some(_slot) = shared.scheduler.try_lock() {
            if !shared.should_run() {
                stop.store(true, Ordering::SeqCst);
                debug!("Update loop has nothing left to do");
                break;
            }
        }

        let elapsed = started.elapsed();
        let budget = shared.settings().frame_duration();
        if elapsed >= budget {
            trace!("Tick overran its budget ({:?} > {:?})", elapsed, budget);
            continue;
        }
        wait_for_next_frame(shared, stop, started);
    }

    debug!("Update loop thread exiting");
}

/// Sleep until the current frame budget, measured from `started`, is used
/// up. The budget is re-read every slice.
fn wait_for_next_frame(shared: &Shared, stop: &AtomicBool, started: Instant) {
    while !stop.load(Ordering::SeqCst) {
        let budget = shared.settings().frame_duration();
        match budget.checked_sub(started.elapsed()) {
            Some(remaining) if !remaining.is_zero() => {
                std::thread::sleep(remaining.min(MAX_SLEEP_SLICE))
            }
            _ => return,
        }
    }
}
