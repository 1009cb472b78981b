//! Precomputed Cartesian-to-polar resampling table.

use image::{GrayImage, Luma};

use crate::raster::bilinear_sample_checked;

/// Sampling table mapping a `size × size` image to `n_angles` columns
/// (angle, starting at +x and turning towards +y) by `n_radii` rows
/// (radius in pixels from the image center).
///
/// Built once and shared read-only across frames.
#[derive(Debug, Clone)]
pub struct PolarRemap {
    size: u32,
    n_angles: u32,
    n_radii: u32,
    coords: Vec<[f32; 2]>,
}

impl PolarRemap {
    pub fn new(size: u32, n_angles: u32, n_radii: u32) -> Self {
        let c = size as f32 / 2.0;
        let step = 360.0 / n_angles.max(1) as f32;
        let mut coords = Vec::with_capacity((n_angles * n_radii) as usize);
        for r in 0..n_radii {
            for a in 0..n_angles {
                let (s, co) = (a as f32 * step).to_radians().sin_cos();
                coords.push([c + r as f32 * co, c + r as f32 * s]);
            }
        }
        Self {
            size,
            n_angles,
            n_radii,
            coords,
        }
    }

    /// Side of the square source image the table expects.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn n_angles(&self) -> u32 {
        self.n_angles
    }

    pub fn n_radii(&self) -> u32 {
        self.n_radii
    }

    /// Angle of column `a` in degrees.
    pub fn angle_deg(&self, a: u32) -> f64 {
        a as f64 * 360.0 / self.n_angles.max(1) as f64
    }

    /// Source position sampled for (angle column, radius row).
    pub fn source_point(&self, a: u32, r: u32) -> [f32; 2] {
        self.coords[(r * self.n_angles + a) as usize]
    }

    /// Resample `img` into polar form. Samples falling outside the image are 0.
    pub fn remap(&self, img: &GrayImage) -> GrayImage {
        GrayImage::from_fn(self.n_angles, self.n_radii, |a, r| {
            let [x, y] = self.source_point(a, r);
            let v = bilinear_sample_checked(img, x, y).unwrap_or(0.0);
            Luma([v.round().clamp(0.0, 255.0) as u8])
        })
    }
}
