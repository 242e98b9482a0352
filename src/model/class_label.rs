//! Class (label) definitions.

use serde::{Deserialize, Serialize};

/// Stable identifier of a class within a project.
pub type ClassId = u32;

/// A label class that boxes can be assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLabel {
    /// Unique, never reused identifier.
    pub id: ClassId,
    /// Unique display name.
    pub name: String,
    /// RGB color for rendering.
    pub color: [u8; 3],
}

impl ClassLabel {
    /// Create a class with a color derived from its id.
    pub fn new(id: ClassId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: default_color(id),
        }
    }

    pub fn with_color(mut self, color: [u8; 3]) -> Self {
        self.color = color;
        self
    }
}

/// Default color for a class id, spread around the hue circle.
pub fn default_color(id: ClassId) -> [u8; 3] {
    // Golden angle for good distribution
    let hue = (id as f32 * 137.5) % 360.0;
    let (r, g, b) = hsv_to_rgb(hue, 0.7, 0.9);
    [
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    ]
}

/// Convert HSV to RGB (h in degrees, s and v in 0-1).
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (r + m, g + m, b + m)
}
