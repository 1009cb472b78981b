//! Limbus candidate extraction in polar coordinates.
//!
//! The eye crop is resampled around its center so that the iris/sclera
//! boundary becomes a roughly horizontal edge. A Gabor filter tuned to
//! dark-to-bright transitions along the radius then picks one edge radius
//! per surveyed angle.

mod polar;

pub use polar::PolarRemap;

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use imageproc::filter::median_filter;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::raster::{argmax_first, blur_gray, normalize_to_255, sigma_for_kernel, to_gray};

/// Gabor kernel parameters, following the OpenCV `getGaborKernel` convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GaborParams {
    /// Odd kernel side.
    pub ksize: u32,
    pub sigma: f64,
    /// Orientation of the normal to the stripes (radians).
    pub theta: f64,
    /// Wavelength of the sinusoid (pixels).
    pub lambda: f64,
    /// Spatial aspect ratio.
    pub gamma: f64,
    /// Phase offset (radians).
    pub psi: f64,
}

impl Default for GaborParams {
    fn default() -> Self {
        Self {
            ksize: 7,
            sigma: 2.0,
            theta: std::f64::consts::FRAC_PI_2,
            lambda: 2.0 * std::f64::consts::PI,
            gamma: 2.0,
            psi: std::f64::consts::FRAC_PI_2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimbusConfig {
    /// Side of the square working image.
    pub working_size: u32,
    /// Polar columns (angles over a full turn).
    pub polar_angles: u32,
    /// Polar rows (radius in working pixels).
    pub polar_radii: u32,
    /// Median filter radius applied before resizing.
    pub median_radius: u32,
    /// Gaussian sigma applied to the polar image.
    pub polar_blur_sigma: f32,
    pub gabor: GaborParams,
    /// Radii below this fraction of `working_size` are ignored.
    pub min_radius_fraction: f64,
    /// Radii at or above this fraction of `working_size` are ignored.
    pub max_radius_fraction: f64,
    /// Half-width (degrees) of the bands around straight down (90°) and
    /// straight up (270°) where eyelids usually cover the limbus.
    pub ignored_half_width_deg: f64,
}

impl Default for LimbusConfig {
    fn default() -> Self {
        Self {
            working_size: 150,
            polar_angles: 360,
            polar_radii: 100,
            median_radius: 2,
            polar_blur_sigma: sigma_for_kernel(5),
            gabor: GaborParams::default(),
            min_radius_fraction: 0.2,
            max_radius_fraction: 0.5,
            ignored_half_width_deg: 30.0,
        }
    }
}

impl LimbusConfig {
    /// Sampling table matching this configuration.
    pub fn polar_remap(&self) -> PolarRemap {
        PolarRemap::new(self.working_size, self.polar_angles, self.polar_radii)
    }

    /// Whether the polar column at `deg` is skipped.
    pub fn is_ignored_angle(&self, deg: f64) -> bool {
        let hw = self.ignored_half_width_deg;
        [90.0, 270.0]
            .iter()
            .any(|&c| deg >= c - hw && deg < c + hw)
    }
}

/// One limbus edge point per surveyed angle, in crop coordinates.
///
/// `remap` must have been built for `config.working_size`. The crop is
/// assumed to be centered on the eye.
pub fn find_limbus_candidates(
    eye: &RgbImage,
    remap: &PolarRemap,
    config: &LimbusConfig,
) -> Vec<[f64; 2]> {
    let (w, h) = eye.dimensions();
    let size = remap.size();
    if w == 0 || h == 0 || size == 0 {
        return Vec::new();
    }

    let gray = median_filter(&to_gray(eye), config.median_radius, config.median_radius);
    let working = imageops::resize(&gray, size, size, FilterType::Triangle);
    let polar = blur_gray(&remap.remap(&working), config.polar_blur_sigma);

    let (kernel, ksize) = gabor_kernel(&config.gabor);
    let mut response = correlate_polar(&polar, &kernel, ksize);
    response.iter_mut().for_each(|v| *v = v.max(0.0));
    normalize_to_255(&mut response);

    let n_angles = remap.n_angles() as usize;
    let n_radii = remap.n_radii() as usize;
    let r_min = (size as f64 * config.min_radius_fraction) as usize;
    let r_max = ((size as f64 * config.max_radius_fraction) as usize).min(n_radii);

    let c = size as f64 / 2.0;
    let sx = w as f64 / size as f64;
    let sy = h as f64 / size as f64;

    let mut points = Vec::with_capacity(n_angles);
    let mut column = vec![0.0f32; n_radii];
    for a in 0..n_angles {
        let deg = remap.angle_deg(a as u32);
        if config.is_ignored_angle(deg) {
            continue;
        }
        for (r, v) in column.iter_mut().enumerate() {
            *v = if r >= r_min && r < r_max {
                response[r * n_angles + a]
            } else {
                0.0
            };
        }
        let r = argmax_first(&column).unwrap_or(0) as f64;
        let (s, co) = deg.to_radians().sin_cos();
        let u = c + r * co;
        let v = c + r * s;
        points.push([(u + 0.5) * sx - 0.5, (v + 0.5) * sy - 0.5]);
    }
    trace!(n_points = points.len(), "limbus candidates");
    points
}

/// Gabor kernel laid out row-major, `ksize × ksize`.
pub(crate) fn gabor_kernel(p: &GaborParams) -> (Vec<f32>, usize) {
    let k = (p.ksize.max(1) | 1) as i32;
    let half = k / 2;
    let sigma_x = p.sigma;
    let sigma_y = p.sigma / p.gamma;
    let ex = -0.5 / (sigma_x * sigma_x);
    let ey = -0.5 / (sigma_y * sigma_y);
    let (s, c) = p.theta.sin_cos();
    let freq = 2.0 * std::f64::consts::PI / p.lambda;

    let mut kernel = vec![0.0f32; (k * k) as usize];
    for y in -half..=half {
        for x in -half..=half {
            let xr = x as f64 * c + y as f64 * s;
            let yr = -(x as f64) * s + y as f64 * c;
            let v = (ex * xr * xr + ey * yr * yr).exp() * (freq * xr + p.psi).cos();
            let row = (half - y) as usize;
            let col = (half - x) as usize;
            kernel[row * k as usize + col] = v as f32;
        }
    }
    (kernel, k as usize)
}

/// Correlate a polar image with `kernel`: angles wrap around, radii reflect
/// at the ends.
fn correlate_polar(polar: &GrayImage, kernel: &[f32], ksize: usize) -> Vec<f32> {
    let (cols, rows) = (polar.width() as i32, polar.height() as i32);
    let half = (ksize / 2) as i32;
    let raw = polar.as_raw();
    let mut out = vec![0.0f32; (cols * rows) as usize];
    for r in 0..rows {
        for c in 0..cols {
            let mut acc = 0.0f32;
            for ky in 0..ksize as i32 {
                let sr = reflect101(r + ky - half, rows);
                let row_base = (sr * cols) as usize;
                for kx in 0..ksize as i32 {
                    let sc = (c + kx - half).rem_euclid(cols);
                    acc += kernel[(ky * ksize as i32 + kx) as usize] * raw[row_base + sc as usize] as f32;
                }
            }
            out[(r * cols + c) as usize] = acc;
        }
    }
    out
}

fn reflect101(i: i32, n: i32) -> i32 {
    if n <= 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= n {
        i = if i < 0 { -i } else { 2 * n - 2 - i };
    }
    i
}
