use serde::{Deserialize, Serialize};

/// Bounding box in normalized model coordinates.
///
/// Origin and extents are fractions of the frame in `[0, 1]`, with the origin at the
/// bottom-left corner (y grows upward).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl NormalizedRect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// The whole frame.
    pub fn full() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.w.is_finite() && self.h.is_finite()
    }
}

/// One detector output: label, confidence, and a box in model coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub label: String,
    /// 0.0..=1.0
    pub confidence: f32,
    pub bbox: NormalizedRect,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: NormalizedRect) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}
