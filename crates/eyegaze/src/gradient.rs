//! Per-pixel image gradients.

use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

/// Horizontal and vertical derivative planes of a grayscale image.
///
/// Positive `gx` means intensity increases towards +x, positive `gy`
/// towards +y (down).
#[derive(Debug, Clone)]
pub struct GradientField {
    width: u32,
    height: u32,
    gx: Vec<f32>,
    gy: Vec<f32>,
}

impl GradientField {
    /// 3×3 Sobel derivatives of `gray`.
    pub fn sobel(gray: &GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        let gx = horizontal_sobel(gray);
        let gy = vertical_sobel(gray);
        Self {
            width,
            height,
            gx: gx.pixels().map(|p| p.0[0] as f32).collect(),
            gy: gy.pixels().map(|p| p.0[0] as f32).collect(),
        }
    }

    /// Build a field from a closure evaluated at every pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [f32; 2]) -> Self {
        let n = (width as usize) * (height as usize);
        let mut gx = Vec::with_capacity(n);
        let mut gy = Vec::with_capacity(n);
        for y in 0..height {
            for x in 0..width {
                let [dx, dy] = f(x, y);
                gx.push(dx);
                gy.push(dy);
            }
        }
        Self { width, height, gx, gy }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn idx(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Gradient at integer pixel `(x, y)`. Panics when out of range.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> [f32; 2] {
        let i = self.idx(x, y);
        [self.gx[i], self.gy[i]]
    }

    /// Gradient at the pixel containing `p` (coordinates truncated), or
    /// `None` outside the field.
    pub fn at_point(&self, p: [f64; 2]) -> Option<[f32; 2]> {
        if !p[0].is_finite() || !p[1].is_finite() || p[0] < 0.0 || p[1] < 0.0 {
            return None;
        }
        let x = p[0] as u32;
        let y = p[1] as u32;
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.get(x, y))
    }

    /// Euclidean gradient magnitude per pixel, row-major.
    pub fn magnitudes(&self) -> Vec<f32> {
        self.gx
            .iter()
            .zip(&self.gy)
            .map(|(&x, &y)| x.hypot(y))
            .collect()
    }
}
