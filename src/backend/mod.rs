//! Concrete LED backends for the host
//!
//! - `logging`: headless backend that logs every write and keeps the frame
//! - `preview`: renders the keyboard in the terminal with true-color cells

pub mod logging;
pub mod preview;

pub use logging::{Frame, FrameHandle, LoggingBackend};
pub use preview::{PreviewBackend, TerminalGuard};
