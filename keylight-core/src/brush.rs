//! Paint sources: functions from (bounding area, sample point) to a color

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::color::RgbColor;
use crate::error::PaintError;
use crate::geometry::{Point, Rect};

/// A paint source sampled once per LED per tick.
///
/// `area` is the bounding rectangle of the LEDs being painted and `point`
/// the center of the LED being sampled.
pub trait Brush: Send + Sync {
    fn color_at(&self, area: &Rect, point: Point) -> Result<RgbColor, PaintError>;
}

/// Shared handle to a brush, as stored by groups and the keyboard background
pub type SharedBrush = Arc<dyn Brush>;

/// Paints every point the same color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolidColorBrush {
    pub color: RgbColor,
}

impl SolidColorBrush {
    pub fn new(color: RgbColor) -> Self {
        Self { color }
    }
}

impl Brush for SolidColorBrush {
    fn color_at(&self, _area: &Rect, _point: Point) -> Result<RgbColor, PaintError> {
        Ok(self.color)
    }
}

/// Color at a relative position along a gradient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    /// Position along the gradient, 0.0 (start) to 1.0 (end)
    pub offset: f32,
    pub color: RgbColor,
}

impl GradientStop {
    pub fn new(offset: f32, color: RgbColor) -> Self {
        Self { offset, color }
    }
}

/// Linear gradient between two points given relative to the painted area
/// (`(0,0)` top-left, `(1,1)` bottom-right).
#[derive(Debug, Clone, PartialEq)]
pub struct LinearGradientBrush {
    start: Point,
    end: Point,
    stops: Vec<GradientStop>,
}

impl LinearGradientBrush {
    pub fn new(start: Point, end: Point, mut stops: Vec<GradientStop>) -> Self {
        stops.sort_by(|a, b| a.offset.total_cmp(&b.offset));
        Self { start, end, stops }
    }

    /// Left-to-right gradient across the painted area
    pub fn horizontal(stops: Vec<GradientStop>) -> Self {
        Self::new(Point::new(0.0, 0.5), Point::new(1.0, 0.5), stops)
    }

    pub fn stops(&self) -> &[GradientStop] {
        &self.stops
    }

    /// Color at a gradient offset, clamped to the outermost stops.
    pub fn color_at_offset(&self, offset: f32) -> Option<RgbColor> {
        let first = self.stops.first()?;
        let last = self.stops.last()?;
        if offset <= first.offset {
            return Some(first.color);
        }
        if offset >= last.offset {
            return Some(last.color);
        }
        let upper = self.stops.iter().position(|s| s.offset >= offset)?;
        let a = &self.stops[upper - 1];
        let b = &self.stops[upper];
        let span = b.offset - a.offset;
        if span <= f32::EPSILON {
            return Some(b.color);
        }
        Some(RgbColor::lerp(a.color, b.color, (offset - a.offset) / span))
    }
}

impl Brush for LinearGradientBrush {
    fn color_at(&self, area: &Rect, point: Point) -> Result<RgbColor, PaintError> {
        // Project the point, in area-relative coordinates, onto start→end
        let rel = if area.width > 0.0 && area.height > 0.0 {
            Point::new(
                (point.x - area.x) / area.width,
                (point.y - area.y) / area.height,
            )
        } else {
            Point::new(0.0, 0.0)
        };
        let dx = self.end.x - self.start.x;
        let dy = self.end.y - self.start.y;
        let len_sq = dx * dx + dy * dy;
        let offset = if len_sq > 0.0 {
            ((rel.x - self.start.x) * dx + (rel.y - self.start.y) * dy) / len_sq
        } else {
            0.0
        };
        self.color_at_offset(offset)
            .ok_or_else(|| PaintError::new("gradient has no stops"))
    }
}

/// Adapts a closure into a brush.
pub struct FnBrush<F>(pub F);

impl<F> Brush for FnBrush<F>
where
    F: Fn(&Rect, Point) -> Result<RgbColor, PaintError> + Send + Sync,
{
    fn color_at(&self, area: &Rect, point: Point) -> Result<RgbColor, PaintError> {
        (self.0)(area, point)
    }
}

/// Shorthand for a shared solid brush.
pub fn solid(color: RgbColor) -> SharedBrush {
    Arc::new(SolidColorBrush::new(color))
}
