use serde::{Deserialize, Serialize};

use crate::error::{ChartError, ChartResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn is_valid(self) -> bool {
        self.width > 0 && self.height > 0
    }

    #[must_use]
    pub fn bounds(self) -> PlotRect {
        PlotRect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }
}

/// Chart margins in pixels, `{ top, right, bottom, left }` like the chart props.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Margins {
    #[must_use]
    pub const fn uniform(value: f64) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform(5.0)
    }
}

/// Axis-aligned rectangle in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PlotRect {
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn right(self) -> f64 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(self) -> f64 {
        self.y + self.height
    }

    #[must_use]
    pub fn center(self) -> (f64, f64) {
        (self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Shrinks the rectangle by `margins`, failing when nothing drawable remains.
    pub fn inset(self, margins: Margins) -> ChartResult<Self> {
        let width = self.width - margins.left - margins.right;
        let height = self.height - margins.top - margins.bottom;
        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return Err(ChartError::InvalidData(format!(
                "margins leave no drawable area ({width}x{height})"
            )));
        }
        Ok(Self::new(
            self.x + margins.left,
            self.y + margins.top,
            width,
            height,
        ))
    }

    /// Splits off a band; every `take_*` returns `(taken, rest)`.
    #[must_use]
    pub fn take_top(self, amount: f64) -> (Self, Self) {
        let amount = amount.clamp(0.0, self.height);
        (
            Self::new(self.x, self.y, self.width, amount),
            Self::new(self.x, self.y + amount, self.width, self.height - amount),
        )
    }

    #[must_use]
    pub fn take_bottom(self, amount: f64) -> (Self, Self) {
        let amount = amount.clamp(0.0, self.height);
        (
            Self::new(self.x, self.bottom() - amount, self.width, amount),
            Self::new(self.x, self.y, self.width, self.height - amount),
        )
    }

    #[must_use]
    pub fn take_left(self, amount: f64) -> (Self, Self) {
        let amount = amount.clamp(0.0, self.width);
        (
            Self::new(self.x, self.y, amount, self.height),
            Self::new(self.x + amount, self.y, self.width - amount, self.height),
        )
    }
}
