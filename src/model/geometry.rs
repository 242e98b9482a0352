//! Rectangle geometry in image pixel coordinates.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle given by its corners, in image pixels.
///
/// A rectangle attached to a box always satisfies `x_min < x_max` and
/// `y_min < y_max` and lies inside `[0, width] × [0, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl Rect {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Create a rectangle from two arbitrary corner points (e.g. a mouse drag).
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x_min: x1.min(x2),
            y_min: y1.min(y2),
            x_max: x1.max(x2),
            y_max: y1.max(y2),
        }
    }

    /// Create a rectangle from its top-left corner and size.
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Center point as `(x, y)`.
    pub fn center(&self) -> (f32, f32) {
        (
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }

    /// Whether all four coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x_min.is_finite()
            && self.y_min.is_finite()
            && self.x_max.is_finite()
            && self.y_max.is_finite()
    }

    /// Whether the rectangle has strictly positive width and height.
    pub fn is_valid(&self) -> bool {
        self.is_finite() && self.x_min < self.x_max && self.y_min < self.y_max
    }

    /// Clamp every coordinate into `[0, width] × [0, height]`.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let w = width as f32;
        let h = height as f32;
        Self {
            x_min: self.x_min.clamp(0.0, w),
            y_min: self.y_min.clamp(0.0, h),
            x_max: self.x_max.clamp(0.0, w),
            y_max: self.y_max.clamp(0.0, h),
        }
    }

    /// Check if a point is inside the rectangle (edges included).
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    /// Translate by `(dx, dy)` without clamping.
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self::new(
            self.x_min + dx,
            self.y_min + dy,
            self.x_max + dx,
            self.y_max + dy,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_corners_normalizes() {
        let a = Rect::from_corners(10.0, 20.0, 50.0, 80.0);
        let b = Rect::from_corners(50.0, 80.0, 10.0, 20.0);
        assert_eq!(a, b);
        assert_eq!(a.width(), 40.0);
        assert_eq!(a.height(), 60.0);
    }

    #[test]
    fn test_clamped() {
        let r = Rect::new(-5.0, -1.0, 900.0, 300.0).clamped(800, 600);
        assert_eq!(r, Rect::new(0.0, 0.0, 800.0, 300.0));
    }

    #[test]
    fn test_clamp_can_collapse() {
        // Entirely outside on the right collapses to zero width
        let r = Rect::new(900.0, 10.0, 950.0, 20.0).clamped(800, 600);
        assert!(!r.is_valid());
    }

    #[test]
    fn test_validity() {
        assert!(Rect::new(0.0, 0.0, 1.0, 1.0).is_valid());
        assert!(!Rect::new(1.0, 0.0, 1.0, 1.0).is_valid());
        assert!(!Rect::new(0.0, 2.0, 1.0, 1.0).is_valid());
        assert!(!Rect::new(f32::NAN, 0.0, 1.0, 1.0).is_valid());
    }

    #[test]
    fn test_center_and_area() {
        let r = Rect::new(100.0, 100.0, 300.0, 400.0);
        assert_eq!(r.center(), (200.0, 250.0));
        assert_eq!(r.area(), 60_000.0);
        assert!(r.contains(100.0, 400.0));
        assert!(!r.contains(99.0, 200.0));
    }
}
