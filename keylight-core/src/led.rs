//! Per-LED color state and the records exchanged with the backend

use serde::{Deserialize, Serialize};

use crate::color::RgbColor;
use crate::geometry::Rect;

/// Stable integer identity of one addressable LED
pub type LedId = u32;

/// Physical placement of one LED as reported by the device layout
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedPosition {
    pub id: LedId,
    #[serde(flatten)]
    pub rect: Rect,
}

impl LedPosition {
    pub fn new(id: LedId, rect: Rect) -> Self {
        Self { id, rect }
    }
}

/// One entry of a hardware write batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedColorUpdate {
    pub id: LedId,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl LedColorUpdate {
    pub fn new(id: LedId, color: RgbColor) -> Self {
        Self {
            id,
            r: color.r,
            g: color.g,
            b: color.b,
        }
    }

    pub fn color(&self) -> RgbColor {
        RgbColor::new(self.r, self.g, self.b)
    }
}

/// Requested vs. committed color of one LED.
///
/// `None` means nothing has painted the LED yet; such LEDs are never sent
/// to the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedState {
    requested: Option<RgbColor>,
    committed: Option<RgbColor>,
    locked: bool,
}

impl LedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a new color. Ignored while the LED is locked.
    pub fn set_color(&mut self, color: RgbColor) {
        if !self.locked {
            self.requested = Some(color);
        }
    }

    pub fn requested(&self) -> Option<RgbColor> {
        self.requested
    }

    /// Color last handed to the device
    pub fn committed(&self) -> Option<RgbColor> {
        self.committed
    }

    pub fn is_dirty(&self) -> bool {
        self.requested != self.committed
    }

    pub fn commit(&mut self) {
        self.committed = self.requested;
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}
