//! Mapping from model coordinates to display coordinates.

use serde::{Deserialize, Serialize};

use crate::detect::NormalizedRect;
use crate::frame::SurfaceSize;

/// Box in absolute display pixels, top-left origin (y grows downward).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn min_x(&self) -> f32 {
        self.x
    }

    pub fn min_y(&self) -> f32 {
        self.y
    }

    pub fn mid_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn mid_y(&self) -> f32 {
        self.y + self.height / 2.0
    }
}

/// Scale a normalized, bottom-left-origin box onto `surface`, flipping the vertical axis.
///
/// `x = nx·W`, `y = (1 − ny − nh)·H`, `w = nw·W`, `h = nh·H`. No clamping is applied:
/// boxes the model places partly outside the frame stay partly outside the surface.
pub fn to_display(bbox: &NormalizedRect, surface: SurfaceSize) -> PixelRect {
    PixelRect::new(
        bbox.x * surface.width,
        (1.0 - bbox.y - bbox.h) * surface.height,
        bbox.w * surface.width,
        bbox.h * surface.height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_frame_covers_full_surface() {
        let surface = SurfaceSize::new(390.0, 844.0);
        let rect = to_display(&NormalizedRect::full(), surface);
        assert_eq!(rect, PixelRect::new(0.0, 0.0, 390.0, 844.0));
    }

    #[test]
    fn bottom_box_lands_at_bottom_of_screen() {
        let surface = SurfaceSize::new(100.0, 200.0);
        let rect = to_display(&NormalizedRect::new(0.0, 0.0, 1.0, 0.25), surface);
        assert_eq!(rect.y, (1.0 - 0.25) * 200.0);
        assert_eq!(rect.height, 50.0);
    }

    #[test]
    fn top_box_lands_at_top_of_screen() {
        let surface = SurfaceSize::new(100.0, 200.0);
        let rect = to_display(&NormalizedRect::new(0.5, 0.75, 0.5, 0.25), surface);
        assert_eq!(rect, PixelRect::new(50.0, 0.0, 50.0, 50.0));
    }

    #[test]
    fn midpoints_for_overlay_placement() {
        let rect = PixelRect::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(rect.mid_x(), 25.0);
        assert_eq!(rect.mid_y(), 40.0);
        assert_eq!((rect.min_x(), rect.min_y()), (10.0, 20.0));
    }
}
