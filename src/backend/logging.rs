//! Headless backend: logs write batches and keeps the resulting frame.

use std::collections::BTreeMap;
use std::sync::Arc;

use keylight_core::{BackendError, LedBackend, LedColorUpdate, LedId, LedPosition, RgbColor};
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Colors last written, plus write statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub colors: BTreeMap<LedId, RgbColor>,
    /// Number of write batches received
    pub writes: u64,
    /// Total LED updates across all batches
    pub leds_written: u64,
}

/// Shared view of a [`LoggingBackend`]'s frame
#[derive(Debug, Clone, Default)]
pub struct FrameHandle(Arc<Mutex<Frame>>);

impl FrameHandle {
    pub fn snapshot(&self) -> Frame {
        self.0.lock().clone()
    }

    pub fn color(&self, id: LedId) -> Option<RgbColor> {
        self.0.lock().colors.get(&id).copied()
    }

    pub fn writes(&self) -> u64 {
        self.0.lock().writes
    }
}

pub struct LoggingBackend {
    layout: Vec<LedPosition>,
    frame: FrameHandle,
}

impl LoggingBackend {
    pub fn new(layout: Vec<LedPosition>) -> Self {
        Self {
            layout,
            frame: FrameHandle::default(),
        }
    }

    pub fn frame(&self) -> FrameHandle {
        self.frame.clone()
    }
}

impl LedBackend for LoggingBackend {
    fn led_layout(&mut self) -> Result<Vec<LedPosition>, BackendError> {
        Ok(self.layout.clone())
    }

    fn write_colors(&mut self, batch: &[LedColorUpdate]) -> Result<(), BackendError> {
        let mut frame = self.frame.0.lock();
        frame.writes += 1;
        frame.leds_written += batch.len() as u64;
        debug!("Write #{}: {} LEDs", frame.writes, batch.len());
        for update in batch {
            trace!("  LED {:3} -> {}", update.id, update.color());
            frame.colors.insert(update.id, update.color());
        }
        Ok(())
    }
}
