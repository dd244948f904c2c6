//! Device backend: the boundary to the physical keyboard
//!
//! ```text
//!   [Keyboard]  ── led_layout() once at construction
//!       |       ── write_colors(batch) per tick, batch never empty
//!   [LedBackend] ← vendor SDK, HID stream, terminal preview, test recorder
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::BackendError;
use crate::led::{LedColorUpdate, LedPosition};

pub trait LedBackend: Send {
    /// Every LED the device exposes. Queried once.
    fn led_layout(&mut self) -> Result<Vec<LedPosition>, BackendError>;

    /// Push colors to the device. `batch` is never empty.
    fn write_colors(&mut self, batch: &[LedColorUpdate]) -> Result<(), BackendError>;
}

impl<B: LedBackend + ?Sized> LedBackend for Box<B> {
    fn led_layout(&mut self) -> Result<Vec<LedPosition>, BackendError> {
        (**self).led_layout()
    }

    fn write_colors(&mut self, batch: &[LedColorUpdate]) -> Result<(), BackendError> {
        (**self).write_colors(batch)
    }
}

#[derive(Default)]
struct WriteLogInner {
    batches: Vec<Vec<LedColorUpdate>>,
    pending_failures: usize,
}

/// Shared view of the batches a [`RecordingBackend`] received
#[derive(Clone, Default)]
pub struct WriteLog {
    inner: Arc<Mutex<WriteLogInner>>,
}

impl WriteLog {
    pub fn batches(&self) -> Vec<Vec<LedColorUpdate>> {
        self.inner.lock().batches.clone()
    }

    pub fn batch_count(&self) -> usize {
        self.inner.lock().batches.len()
    }

    pub fn last(&self) -> Option<Vec<LedColorUpdate>> {
        self.inner.lock().batches.last().cloned()
    }

    pub fn clear(&self) {
        self.inner.lock().batches.clear();
    }

    /// Make the next `n` writes fail with [`BackendError::Disconnected`].
    pub fn fail_next(&self, n: usize) {
        self.inner.lock().pending_failures = n;
    }
}

/// In-memory backend that records every write batch
pub struct RecordingBackend {
    layout: Vec<LedPosition>,
    log: WriteLog,
}

impl RecordingBackend {
    pub fn new(layout: Vec<LedPosition>) -> (Self, WriteLog) {
        let log = WriteLog::default();
        (
            Self {
                layout,
                log: log.clone(),
            },
            log,
        )
    }
}

impl LedBackend for RecordingBackend {
    fn led_layout(&mut self) -> Result<Vec<LedPosition>, BackendError> {
        Ok(self.layout.clone())
    }

    fn write_colors(&mut self, batch: &[LedColorUpdate]) -> Result<(), BackendError> {
        let mut inner = self.log.inner.lock();
        if inner.pending_failures > 0 {
            inner.pending_failures -= 1;
            return Err(BackendError::Disconnected);
        }
        inner.batches.push(batch.to_vec());
        Ok(())
    }
}
