//! Axis-aligned box geometry

use serde::{Deserialize, Serialize};

/// Axis-aligned box given by its left/top and right/bottom edges.
///
/// Coordinates are whatever frame the owner uses (tile-normalized, page-normalized
/// or pixels). Edge ordering (`x1 <= x2`, `y1 <= y2`) is expected but not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Signed area; negative for inverted boxes
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

/// Intersection-over-union of two boxes.
///
/// Non-overlapping boxes give exactly `0.0`. When the union is zero (both boxes
/// degenerate) the result is `0.0` as well.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let inter_x1 = a.x1.max(b.x1);
    let inter_y1 = a.y1.max(b.y1);
    let inter_x2 = a.x2.min(b.x2);
    let inter_y2 = a.y2.min(b.y2);

    let inter_w = (inter_x2 - inter_x1).max(0.0);
    let inter_h = (inter_y2 - inter_y1).max(0.0);
    let intersection = inter_w * inter_h;

    let union = a.area() + b.area() - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
