//! Axis-aligned integer rectangles in frame coordinates.

use serde::{Deserialize, Serialize};

/// Rectangle with top-left `(x, y)` and size `width × height`, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Square of side `2 * radius + 1` centered on `center`.
    pub fn around(center: [i32; 2], radius: u32) -> Self {
        let r = radius as i32;
        Self {
            x: center[0] - r,
            y: center[1] - r,
            width: 2 * radius + 1,
            height: 2 * radius + 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the region lies entirely inside an image of the given size.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.x as i64 + self.width as i64 <= width as i64
            && self.y as i64 + self.height as i64 <= height as i64
    }

    pub fn top_left(&self) -> [f64; 2] {
        [self.x as f64, self.y as f64]
    }

    /// Parse `"x,y,width,height"`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split(',').map(str::trim);
        let x = parts.next()?.parse().ok()?;
        let y = parts.next()?.parse().ok()?;
        let width = parts.next()?.parse().ok()?;
        let height = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(x, y, width, height))
    }
}
