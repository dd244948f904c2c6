//! `run`: light the keyboard from the configured scene plus an optional effect
//!
//! Runs until Ctrl-C, `q` in the preview, the `--duration` elapses, or the
//! effect finishes on its own (when no duration was given).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context as _};
use keylight::backend::{preview, LoggingBackend, PreviewBackend, TerminalGuard};
use keylight::effect::parse_vars;
use keylight::{KeylightConfig, Scene};
use keylight_core::{
    shared, validate_frequency, ChannelObserver, Keyboard, LedBackend, LedId, SharedEffect,
    UpdateMode, UpdateSettings,
};
use tracing::{info, warn};

use super::{CommandResult, Context};

/// How often the run loop checks for quit when the scheduler drives updates
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct RunOptions {
    pub effect: Option<String>,
    pub vars: Vec<String>,
    pub keys: Vec<LedId>,
    pub mode: Option<UpdateMode>,
    pub fps: Option<f32>,
    pub preview: bool,
    pub duration: Option<f64>,
}

struct RunSummary {
    elapsed: Duration,
    effect_finished: bool,
}

pub fn run(ctx: &Context, opts: RunOptions) -> CommandResult {
    let layout = ctx.layout()?;
    if layout.is_empty() {
        bail!("layout has no LEDs");
    }

    let duration = match opts.duration {
        Some(secs) => match Duration::try_from_secs_f64(secs) {
            Ok(d) => Some(d),
            Err(_) => bail!("--duration must be a non-negative number of seconds"),
        },
        None => None,
    };

    let effect = match &opts.effect {
        Some(name) => Some(load_effect(ctx, name, &opts.vars, &opts.keys)?),
        None => None,
    };

    let mut config = ctx.config.clone();
    if let Some(mode) = opts.mode {
        config.update_mode = mode;
    }
    if let Some(fps) = opts.fps {
        config.update_frequency_hz = validate_frequency(fps)?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))
        .context("failed to set Ctrl-C handler")?;

    let (observer, faults) = ChannelObserver::unbounded();
    let driver = Driver {
        config: &config,
        effect: effect.as_ref(),
        duration,
        running: &running,
    };

    let summary = if opts.preview {
        let title = opts.effect.as_deref().unwrap_or("scene");
        let guard = TerminalGuard::enter().context("failed to start terminal preview")?;
        let result = driver.drive(PreviewBackend::new(layout, title), observer, true);
        drop(guard);
        result?
    } else {
        let backend = LoggingBackend::new(layout);
        let frame = backend.frame();
        let summary = driver.drive(backend, observer, false)?;
        let stats = frame.snapshot();
        info!(
            "{} writes, {} LED updates, {} LEDs lit",
            stats.writes,
            stats.leds_written,
            stats.colors.len()
        );
        summary
    };

    let fault_count = faults
        .try_iter()
        .inspect(|f| warn!("{:?} fault in {}: {}", f.kind, f.source, f.message))
        .count();

    println!(
        "Ran for {:.1}s{}{}",
        summary.elapsed.as_secs_f64(),
        if summary.effect_finished {
            ", effect finished"
        } else {
            ""
        },
        if fault_count > 0 {
            format!(", {fault_count} faults")
        } else {
            String::new()
        }
    );
    Ok(())
}

fn load_effect(
    ctx: &Context,
    name: &str,
    var_args: &[String],
    keys: &[LedId],
) -> anyhow::Result<SharedEffect> {
    let vars = parse_vars(var_args)?;
    let lib = ctx.effects()?;
    let effect = lib.instantiate(name, &vars).with_context(|| {
        match lib.get(name).map(|def| def.required_variables()) {
            Some(required) if !required.is_empty() => format!(
                "cannot start '{name}' (variables: {})",
                required.join(", ")
            ),
            _ => format!("cannot start '{name}'"),
        }
    })?;

    let effect = if keys.is_empty() {
        effect
    } else {
        effect.with_targets(keys.iter().copied())
    };
    Ok(shared(effect))
}

fn frame_duration(kb: &Keyboard) -> Duration {
    UpdateSettings {
        mode: kb.update_mode(),
        frequency_hz: kb.update_frequency(),
    }
    .frame_duration()
}

struct Driver<'a> {
    config: &'a KeylightConfig,
    effect: Option<&'a SharedEffect>,
    duration: Option<Duration>,
    running: &'a AtomicBool,
}

impl Driver<'_> {
    fn drive<B: LedBackend + 'static>(
        &self,
        backend: B,
        observer: ChannelObserver,
        preview: bool,
    ) -> anyhow::Result<RunSummary> {
        let kb = Keyboard::with_observer(backend, Arc::new(observer))?;
        let scene = Scene::apply(&kb, self.config)?;
        kb.update(true)?;

        if let Some(effect) = self.effect {
            kb.attach_effect(effect);
        }
        info!(
            "Running {} LEDs, {} groups, mode {} at {} Hz",
            kb.led_count(),
            kb.group_count(),
            kb.update_mode(),
            kb.update_frequency()
        );

        let started = Instant::now();
        let mut effect_finished = false;
        let mut next_tick = Some(started);
        while self.running.load(Ordering::SeqCst) {
            if self.duration.is_some_and(|d| started.elapsed() >= d) {
                break;
            }
            if preview && preview::quit_requested()? {
                break;
            }

            let manual = kb.update_mode() == UpdateMode::Manual;
            if manual && next_tick.is_some_and(|t| Instant::now() >= t) {
                if let Err(e) = kb.update(false) {
                    warn!("Update failed: {}", e);
                }
                next_tick = Instant::now().checked_add(frame_duration(&kb));
            }

            if let Some(effect) = self.effect {
                if !kb.is_effect_attached(effect) {
                    effect_finished = true;
                    if self.duration.is_none() {
                        break;
                    }
                }
            }

            // Short naps keep Ctrl-C, `q` and the duration responsive at any frequency
            let pause = match next_tick {
                Some(t) if manual => t.saturating_duration_since(Instant::now()).min(POLL_INTERVAL),
                _ => POLL_INTERVAL,
            };
            thread::sleep(pause);
        }

        if let Some(effect) = self.effect {
            kb.detach_effect(effect);
        }
        scene.clear(&kb);

        Ok(RunSummary {
            elapsed: started.elapsed(),
            effect_finished,
        })
    }
}
