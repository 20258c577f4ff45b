// src/color.rs

//! Per-job stroke color, read back by the UI layer when drawing a contour.

use serde::{Deserialize, Serialize};

/// An RGB true color, each component 0-255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }
}

impl Default for Color {
    /// Jobs start out black, matching the default equation stroke.
    fn default() -> Self {
        Color::new(0, 0, 0)
    }
}

impl From<(u8, u8, u8)> for Color {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Color::new(r, g, b)
    }
}
