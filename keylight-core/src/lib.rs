//! Layered LED compositing for per-key RGB keyboards
//!
//! A [`Keyboard`] owns the LEDs reported by an [`LedBackend`] and paints them
//! each tick from three layers: a background brush, z-ordered [`LedGroup`]s,
//! and z-ordered time-driven [`Effect`]s. Only LEDs whose color changed are
//! written back to the device, either on demand or from a background update
//! loop controlled by the [`UpdateMode`].

pub mod backend;
pub mod brush;
pub mod color;
mod compositor;
pub mod effect;
pub mod error;
pub mod geometry;
pub mod group;
pub mod keyboard;
pub mod led;
pub mod observer;
pub mod scheduler;

pub use backend::{LedBackend, RecordingBackend, WriteLog};
pub use brush::{
    solid, Brush, FnBrush, GradientStop, LinearGradientBrush, SharedBrush, SolidColorBrush,
};
pub use color::RgbColor;
pub use effect::{shared, BrushEffect, Effect, SharedEffect};
pub use error::{BackendError, LightingError, PaintError};
pub use geometry::{Point, Rect};
pub use group::{GroupBuilder, GroupSelector, LedGroup, DEFAULT_MIN_OVERLAP};
pub use keyboard::Keyboard;
pub use led::{LedColorUpdate, LedId, LedPosition, LedState};
pub use observer::{ChannelObserver, FaultKind, FaultObserver, FaultRecord, FaultSource, LogObserver};
pub use scheduler::{
    validate_frequency, SchedulerState, UpdateMode, UpdateSettings, DEFAULT_UPDATE_FREQUENCY_HZ,
};
