// src/bounds.rs

//! Axis-aligned viewport rectangle in world coordinates.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle `{xmin, ymin, xmax, ymax}` describing the region
/// of the plane a job is contoured over.
///
/// Validity (`xmax > xmin`, `ymax > ymin`) is a caller obligation, not
/// enforced by the type; a degenerate rectangle simply produces no contour.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Bounds {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Bounds { xmin, ymin, xmax, ymax }
    }

    /// Width of the rectangle.
    pub fn w(&self) -> f64 {
        self.xmax - self.xmin
    }

    /// Height of the rectangle.
    pub fn h(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Whether `(x, y)` lies strictly inside the rectangle (open rectangle;
    /// points on the boundary are outside).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x > self.xmin && x < self.xmax && y > self.ymin && y < self.ymax
    }

    /// Returns a copy grown symmetrically about the center by `factor`.
    /// `expand(1.0)` is the identity; `expand(2.0)` doubles each side.
    pub fn expand(&self, factor: f64) -> Self {
        let f = factor - 1.0;
        let bw = self.w();
        let bh = self.h();
        Bounds {
            xmin: self.xmin - bw * f / 2.0,
            ymin: self.ymin - bh * f / 2.0,
            xmax: self.xmax + bw * f / 2.0,
            ymax: self.ymax + bh * f / 2.0,
        }
    }
}
