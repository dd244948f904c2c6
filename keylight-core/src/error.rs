//! Error types for compositing and device I/O

use thiserror::Error;

use crate::led::LedId;
use crate::observer::FaultSource;

/// Failure raised by a brush or effect while producing a color.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PaintError(String);

impl PaintError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<String> for PaintError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for PaintError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Errors reported by the device backend (layout query or color write)
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Device disconnected")]
    Disconnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Layout query failed: {0}")]
    Layout(String),
}

/// Errors from keyboard lighting operations
#[derive(Error, Debug)]
pub enum LightingError {
    /// A group or effect failed while painting; recovered locally
    #[error("Paint fault in {origin}: {message}")]
    Paint { origin: FaultSource, message: String },

    /// The backend rejected a write; the connection is unusable
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Invalid update mode or frequency
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Unknown LED id: {0}")]
    UnknownLed(LedId),

    #[error("Failed to start update thread: {0}")]
    Thread(#[source] std::io::Error),
}

impl LightingError {
    /// Whether this error came from the hardware side rather than a paint source.
    pub fn is_hardware(&self) -> bool {
        matches!(self, LightingError::Backend(_))
    }
}
