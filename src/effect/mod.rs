//! Keyframe effect library.
//!
//! Effects are defined in TOML with keyframes that specify time, brightness,
//! optional color and easing. Color variables (`$name`) make an effect a
//! reusable template; they are resolved when the effect is triggered. A
//! resolved effect becomes a [`KeyframeEffect`] that the keyboard animates.
//!
//! # Example TOML
//!
//! ```toml
//! [breathe]
//! color = "$color"
//! keyframes = [
//!     { t = 0,    v = 0.0, easing = "EaseInOut" },
//!     { t = 1000, v = 1.0, easing = "EaseInOut" },
//!     { t = 2000, v = 0.0 },
//! ]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use keyframe::functions as ease;
use keyframe::EasingFunction;
use keylight_core::{Effect, LedId, PaintError, Point, Rect, RgbColor};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum EffectError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid effect TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown effect: {0}")]
    Unknown(String),

    #[error("unresolved variable: ${0}")]
    UnresolvedVariable(String),

    #[error("invalid color for ${name}: {value}")]
    InvalidVariable { name: String, value: String },

    #[error("invalid color: {0}")]
    InvalidColor(String),
}

// ── TOML definition types ────────────────────────────────────────────

/// Effect definition as loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectDef {
    #[serde(skip)]
    pub name: String,
    /// Default color or `$variable` name.
    pub color: Option<String>,
    #[serde(default)]
    pub keyframes: Vec<KeyframeDef>,
    /// Special mode (e.g. "rainbow").
    pub mode: Option<String>,
    /// Rainbow speed multiplier.
    pub speed: Option<f32>,
    /// Auto-expire in ms (-1 or absent = no expiry).
    pub ttl_ms: Option<i32>,
    /// Paint order among effects
    #[serde(default)]
    pub priority: i32,
    pub description: Option<String>,
}

impl EffectDef {
    /// Variables referenced by the effect, in first-use order.
    pub fn required_variables(&self) -> Vec<String> {
        let colors = self
            .color
            .iter()
            .chain(self.keyframes.iter().filter_map(|kf| kf.color.as_ref()));
        let mut vars: Vec<String> = Vec::new();
        for name in colors.filter_map(|c| c.strip_prefix('$')) {
            if !vars.iter().any(|v| v == name) {
                vars.push(name.to_string());
            }
        }
        vars
    }

    pub fn ttl(&self) -> Option<Duration> {
        match self.ttl_ms {
            Some(ms) if ms > 0 => Some(Duration::from_millis(ms as u64)),
            _ => None,
        }
    }

    /// Time of the last keyframe, in ms
    pub fn cycle_ms(&self) -> f64 {
        self.keyframes.last().map(|kf| kf.t).unwrap_or(0.0)
    }
}

/// A single keyframe in the effect definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyframeDef {
    /// Time in ms from animation start.
    pub t: f64,
    /// Brightness value 0.0-1.0.
    pub v: f64,
    /// Per-keyframe color override (literal or `$variable`).
    pub color: Option<String>,
    /// Easing function to the *next* keyframe.
    #[serde(default = "default_easing")]
    pub easing: String,
}

fn default_easing() -> String {
    "Linear".to_string()
}

/// A named collection of effects loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EffectLibrary {
    #[serde(flatten)]
    pub effects: BTreeMap<String, EffectDef>,
}

impl EffectLibrary {
    pub fn load(path: &Path) -> Result<Self, EffectError> {
        let content = std::fs::read_to_string(path).map_err(|source| EffectError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, EffectError> {
        let mut lib: EffectLibrary = toml::from_str(content)?;
        for (name, def) in &mut lib.effects {
            def.name = name.clone();
        }
        Ok(lib)
    }

    /// The effects shipped with keylight.
    pub fn builtin() -> Result<Self, EffectError> {
        Self::from_toml(DEFAULT_EFFECTS_TOML)
    }

    /// Load `path`, writing the built-in library there first if it is missing.
    pub fn load_or_create(path: &Path) -> Result<Self, EffectError> {
        if !path.exists() {
            let write_err = |source| EffectError::Write {
                path: path.to_path_buf(),
                source,
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
            std::fs::write(path, DEFAULT_EFFECTS_TOML).map_err(write_err)?;
            info!("Created default effects: {}", path.display());
        }
        Self::load(path)
    }

    pub fn get(&self, name: &str) -> Option<&EffectDef> {
        self.effects.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.effects.keys().map(|s| s.as_str()).collect()
    }

    /// Resolve a named effect with the given variables.
    pub fn instantiate(
        &self,
        name: &str,
        vars: &BTreeMap<String, String>,
    ) -> Result<KeyframeEffect, EffectError> {
        let def = self
            .get(name)
            .ok_or_else(|| EffectError::Unknown(name.to_string()))?;
        Ok(KeyframeEffect::new(name, resolve(def, vars)?))
    }
}

/// Default location of the effect library
pub fn default_effects_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("keylight")
        .join("effects.toml")
}

// ── Easing ───────────────────────────────────────────────────────────

/// Interpolation curve between two keyframes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    /// Keep the previous value until the next keyframe
    Hold,
    EaseIn,
    EaseOut,
    EaseInOut,
    EaseInCubic,
    EaseOutCubic,
    EaseInOutCubic,
    EaseInQuart,
    EaseOutQuart,
    EaseInOutQuart,
    EaseInQuint,
    EaseOutQuint,
    EaseInOutQuint,
}

impl Easing {
    /// Look up an easing by its TOML name. Unknown names fall back to linear.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Linear" => Easing::Linear,
            "Hold" | "Step" => Easing::Hold,
            "EaseIn" | "EaseInQuad" => Easing::EaseIn,
            "EaseOut" | "EaseOutQuad" => Easing::EaseOut,
            "EaseInOut" | "EaseInOutQuad" => Easing::EaseInOut,
            "EaseInCubic" => Easing::EaseInCubic,
            "EaseOutCubic" => Easing::EaseOutCubic,
            "EaseInOutCubic" => Easing::EaseInOutCubic,
            "EaseInQuart" => Easing::EaseInQuart,
            "EaseOutQuart" => Easing::EaseOutQuart,
            "EaseInOutQuart" => Easing::EaseInOutQuart,
            // keyframe has no expo curves; quint is the closest
            "EaseInQuint" | "EaseInExpo" => Easing::EaseInQuint,
            "EaseOutQuint" | "EaseOutExpo" => Easing::EaseOutQuint,
            "EaseInOutQuint" | "EaseInOutExpo" => Easing::EaseInOutQuint,
            other => {
                warn!("Unknown easing '{}', using Linear", other);
                Easing::Linear
            }
        }
    }

    /// Map segment progress in [0, 1] to eased progress.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::Hold => 0.0,
            Easing::EaseIn => ease::EaseIn.y(t),
            Easing::EaseOut => ease::EaseOut.y(t),
            Easing::EaseInOut => ease::EaseInOut.y(t),
            Easing::EaseInCubic => ease::EaseInCubic.y(t),
            Easing::EaseOutCubic => ease::EaseOutCubic.y(t),
            Easing::EaseInOutCubic => ease::EaseInOutCubic.y(t),
            Easing::EaseInQuart => ease::EaseInQuart.y(t),
            Easing::EaseOutQuart => ease::EaseOutQuart.y(t),
            Easing::EaseInOutQuart => ease::EaseInOutQuart.y(t),
            Easing::EaseInQuint => ease::EaseInQuint.y(t),
            Easing::EaseOutQuint => ease::EaseOutQuint.y(t),
            Easing::EaseInOutQuint => ease::EaseInOutQuint.y(t),
        }
    }
}

// ── Resolved (runtime) types ─────────────────────────────────────────

/// A keyframe with its color resolved and easing looked up.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedKeyframe {
    pub t_ms: f64,
    pub color: RgbColor,
    pub brightness: f64,
    /// Curve towards the next keyframe
    pub easing: Easing,
}

/// Ready-to-evaluate effect
#[derive(Debug, Clone)]
pub struct ResolvedEffect {
    pub keyframes: Vec<ResolvedKeyframe>,
    pub cycle_ms: f64,
    /// Hue rotation speed, when in rainbow mode
    pub rainbow: Option<f32>,
    pub ttl: Option<Duration>,
    pub priority: i32,
}

impl ResolvedEffect {
    /// Color at `elapsed_ms` into the animation.
    pub fn evaluate(&self, elapsed_ms: f64) -> RgbColor {
        self.evaluate_at(elapsed_ms, 0.0)
    }

    /// Color at `elapsed_ms` for a key at horizontal position `x` (0..1
    /// across the painted area). Only rainbow effects vary with position.
    pub fn evaluate_at(&self, elapsed_ms: f64, x: f32) -> RgbColor {
        let brightness = self.brightness(elapsed_ms) as f32;

        if let Some(speed) = self.rainbow {
            let phase = if self.cycle_ms > 0.0 {
                (elapsed_ms % self.cycle_ms) / self.cycle_ms
            } else {
                0.0
            };
            let hue = (phase as f32 + x) * 360.0 * speed;
            return RgbColor::from_hsv(hue, 1.0, brightness);
        }

        match self.keyframes.as_slice() {
            [] => RgbColor::BLACK,
            [only] => only.color.scale(only.brightness as f32),
            _ => self.color(elapsed_ms).scale(brightness),
        }
    }

    fn brightness(&self, elapsed_ms: f64) -> f64 {
        match self.segment(elapsed_ms) {
            None => 1.0,
            Some(Segment::At(kf)) => kf.brightness,
            Some(Segment::Between(a, b, t)) => {
                a.brightness + (b.brightness - a.brightness) * a.easing.apply(t)
            }
        }
    }

    /// Colors interpolate linearly; easing shapes brightness only.
    fn color(&self, elapsed_ms: f64) -> RgbColor {
        match self.segment(elapsed_ms) {
            None => RgbColor::BLACK,
            Some(Segment::At(kf)) => kf.color,
            Some(Segment::Between(a, b, t)) => RgbColor::lerp(a.color, b.color, t as f32),
        }
    }

    /// The keyframe pair surrounding `elapsed_ms`, wrapped into the cycle.
    fn segment(&self, elapsed_ms: f64) -> Option<Segment<'_>> {
        let first = self.keyframes.first()?;
        if self.cycle_ms <= 0.0 {
            return Some(Segment::At(first));
        }
        let t = elapsed_ms % self.cycle_ms;
        let Some(i) = self.keyframes.windows(2).position(|w| t < w[1].t_ms) else {
            return self.keyframes.last().map(Segment::At);
        };
        let (a, b) = (&self.keyframes[i], &self.keyframes[i + 1]);
        let span = b.t_ms - a.t_ms;
        if span <= 0.0 {
            return Some(Segment::At(a));
        }
        Some(Segment::Between(a, b, ((t - a.t_ms) / span).clamp(0.0, 1.0)))
    }
}

enum Segment<'a> {
    At(&'a ResolvedKeyframe),
    Between(&'a ResolvedKeyframe, &'a ResolvedKeyframe, f64),
}

// ── Resolution (variable substitution) ───────────────────────────────

/// Resolve an effect definition. `vars` maps variable names (without `$`)
/// to color strings.
pub fn resolve(
    def: &EffectDef,
    vars: &BTreeMap<String, String>,
) -> Result<ResolvedEffect, EffectError> {
    let rainbow = (def.mode.as_deref() == Some("rainbow")).then(|| def.speed.unwrap_or(1.0));

    let keyframes = if def.keyframes.is_empty() {
        // Solid: one keyframe at full brightness
        vec![ResolvedKeyframe {
            t_ms: 0.0,
            color: resolve_color(def.color.as_deref(), vars)?,
            brightness: 1.0,
            easing: Easing::Linear,
        }]
    } else {
        def.keyframes
            .iter()
            .map(|kf| {
                Ok(ResolvedKeyframe {
                    t_ms: kf.t,
                    color: resolve_color(kf.color.as_deref().or(def.color.as_deref()), vars)?,
                    brightness: kf.v.clamp(0.0, 1.0),
                    easing: Easing::from_name(&kf.easing),
                })
            })
            .collect::<Result<Vec<_>, EffectError>>()?
    };

    Ok(ResolvedEffect {
        keyframes,
        cycle_ms: def.cycle_ms(),
        rainbow,
        ttl: def.ttl(),
        priority: def.priority,
    })
}

/// Keyframe color > effect color > black.
fn resolve_color(
    color: Option<&str>,
    vars: &BTreeMap<String, String>,
) -> Result<RgbColor, EffectError> {
    let Some(s) = color else {
        return Ok(RgbColor::BLACK);
    };

    match s.strip_prefix('$') {
        Some(name) => {
            let value = vars
                .get(name)
                .ok_or_else(|| EffectError::UnresolvedVariable(name.to_string()))?;
            RgbColor::parse(value).ok_or_else(|| EffectError::InvalidVariable {
                name: name.to_string(),
                value: value.clone(),
            })
        }
        None => RgbColor::parse(s).ok_or_else(|| EffectError::InvalidColor(s.to_string())),
    }
}

/// Parse `key=value` pairs into a variable map.
pub fn parse_vars<S: AsRef<str>>(args: &[S]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();
    for arg in args {
        let arg = arg.as_ref();
        let (k, v) = arg
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("invalid --var '{arg}' (expected key=value)"))?;
        vars.insert(k.trim().to_string(), v.trim().to_string());
    }
    Ok(vars)
}

// ── Keyboard effect ──────────────────────────────────────────────────

/// A resolved keyframe effect animated by the keyboard.
///
/// Time advances only through [`Effect::update`]; the effect finishes once
/// its TTL has elapsed. Priority becomes the z-index.
#[derive(Debug, Clone)]
pub struct KeyframeEffect {
    name: String,
    resolved: ResolvedEffect,
    elapsed_ms: f64,
    targets: Option<Vec<LedId>>,
    z_index: i32,
}

impl KeyframeEffect {
    pub fn new(name: impl Into<String>, resolved: ResolvedEffect) -> Self {
        let z_index = resolved.priority;
        Self {
            name: name.into(),
            resolved,
            elapsed_ms: 0.0,
            targets: None,
            z_index,
        }
    }

    /// Restrict the effect to these LEDs.
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

    pub fn elapsed(&self) -> Duration {
        Duration::try_from_secs_f64(self.elapsed_ms / 1000.0).unwrap_or(Duration::MAX)
    }

    pub fn resolved(&self) -> &ResolvedEffect {
        &self.resolved
    }
}

impl Effect for KeyframeEffect {
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
        self.resolved
            .ttl
            .is_some_and(|ttl| self.elapsed_ms >= ttl.as_secs_f64() * 1000.0)
    }

    fn update(&mut self, delta_seconds: f32) -> Result<(), PaintError> {
        if !delta_seconds.is_finite() || delta_seconds < 0.0 {
            return Err(PaintError::new(format!("invalid time step {delta_seconds}")));
        }
        self.elapsed_ms += f64::from(delta_seconds) * 1000.0;
        Ok(())
    }

    fn color_at(&self, area: &Rect, point: Point) -> Result<RgbColor, PaintError> {
        let x = if area.width > 0.0 {
            ((point.x - area.x) / area.width).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Ok(self.resolved.evaluate_at(self.elapsed_ms, x))
    }

    fn on_attach(&mut self) {
        self.elapsed_ms = 0.0;
    }
}

// ── Default effects ──────────────────────────────────────────────────

pub const DEFAULT_EFFECTS_TOML: &str = r##"# keylight effect library
# Each section defines a named effect with keyframes.
# Colors can be literals ("red", "#FF0000") or variables ("$color").
# Variables are resolved at trigger time with --var name=value.

[breathe]
color = "$color"
description = "Smooth fade in/out"
keyframes = [
    { t = 0,    v = 0.0, easing = "EaseInOut" },
    { t = 1000, v = 1.0, easing = "EaseInOut" },
    { t = 2000, v = 0.0 },
]

[flash]
color = "$color"
description = "On/off blink"
keyframes = [
    { t = 0,    v = 1.0, easing = "Hold" },
    { t = 500,  v = 0.0, easing = "Hold" },
    { t = 1000, v = 1.0 },
]

[pulse]
color = "$color"
description = "Quick flash then slow fade"
keyframes = [
    { t = 0,   v = 0.0, easing = "EaseOutQuad" },
    { t = 80,  v = 1.0, easing = "EaseInQuint" },
    { t = 800, v = 0.0 },
]
ttl_ms = 800

[solid]
color = "$color"
description = "Constant color"
priority = -10

[police]
description = "Red/blue alternating flash"
keyframes = [
    { t = 0,   color = "red",  v = 1.0, easing = "Hold" },
    { t = 200, color = "blue", v = 1.0, easing = "Hold" },
    { t = 400, color = "red",  v = 1.0 },
]

[rainbow]
mode = "rainbow"
speed = 1.0
description = "Hue wave across the keyboard"
keyframes = [
    { t = 0,    v = 1.0 },
    { t = 3000, v = 1.0 },
]

[build-status]
color = "$status"
description = "Build result indicator"
priority = 10
keyframes = [
    { t = 0,    v = 0.0, easing = "EaseOutQuad" },
    { t = 100,  v = 1.0, easing = "Hold" },
    { t = 2000, v = 1.0, easing = "EaseInQuint" },
    { t = 3000, v = 0.0 },
]
ttl_ms = 3000
"##;
