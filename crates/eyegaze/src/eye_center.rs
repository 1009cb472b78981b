//! Eye-center localization by gradient voting.
//!
//! A candidate center scores high when the image gradients around it point
//! away from it (dark iris, brighter surroundings). Scores are weighted by
//! how dark the candidate pixel itself is.

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::gradient::GradientField;
use crate::raster::{argmax_first, blur_gray, normalize_to_255, to_gray};

/// Configuration for eye-center voting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeCenterConfig {
    /// Width of the downscaled voting image (pixels).
    pub fast_width: u32,
    /// Gaussian sigma applied to the downscaled image.
    pub blur_sigma: f32,
    /// Divisor of the darkness weight `(255 - I) / scale`.
    pub darkness_scale: f32,
}

impl Default for EyeCenterConfig {
    fn default() -> Self {
        Self {
            fast_width: 40,
            blur_sigma: 1.1,
            darkness_scale: 100.0,
        }
    }
}

/// Gradient pixel surviving the magnitude threshold, with unit direction.
#[derive(Debug, Clone, Copy)]
struct Edgel {
    x: f32,
    y: f32,
    ux: f32,
    uy: f32,
}

/// Locate the eye center in `eye` (crop coordinates, always inside the crop).
pub fn locate_eye_center(eye: &RgbImage, config: &EyeCenterConfig) -> [f64; 2] {
    let (w, h) = eye.dimensions();
    if w == 0 || h == 0 {
        return [0.0, 0.0];
    }

    let fast_w = config.fast_width.clamp(1, w);
    let fast_h = ((h as f64 * fast_w as f64 / w as f64).round() as u32).max(1);
    let small = imageops::resize(&to_gray(eye), fast_w, fast_h, FilterType::Triangle);
    let small = blur_gray(&small, config.blur_sigma);

    let scores = center_scores(&small, config.darkness_scale);
    let best = argmax_first(&scores).unwrap_or(0);
    let bx = (best % fast_w as usize) as f64;
    let by = (best / fast_w as usize) as f64;

    let sx = w as f64 / fast_w as f64;
    let sy = h as f64 / fast_h as f64;
    [
        (bx * sx).clamp(0.0, (w - 1) as f64),
        (by * sy).clamp(0.0, (h - 1) as f64),
    ]
}

/// Voting accumulator over every pixel of `gray`, normalized to [0, 255].
pub(crate) fn center_scores(gray: &GrayImage, darkness_scale: f32) -> Vec<f32> {
    let (w, h) = gray.dimensions();
    let edgels = strong_edgels(gray);

    let score_at = |idx: usize| -> f32 {
        let cx = (idx % w as usize) as f32;
        let cy = (idx / w as usize) as f32;
        let darkness = (255.0 - gray.as_raw()[idx] as f32) / darkness_scale;
        if darkness <= 0.0 {
            return 0.0;
        }
        let sum: f32 = edgels
            .iter()
            .filter_map(|e| {
                let dx = e.x - cx;
                let dy = e.y - cy;
                let norm = (dx * dx + dy * dy).sqrt();
                if norm == 0.0 {
                    return None;
                }
                let dot = (dx * e.ux + dy * e.uy) / norm;
                (dot > 0.0).then_some(dot)
            })
            .sum();
        sum * darkness
    };

    let n = (w as usize) * (h as usize);
    #[cfg(feature = "parallel")]
    let mut scores: Vec<f32> = (0..n).into_par_iter().map(score_at).collect();
    #[cfg(not(feature = "parallel"))]
    let mut scores: Vec<f32> = (0..n).map(score_at).collect();

    normalize_to_255(&mut scores);
    scores
}

/// Gradients at least `mean + std / 2` in magnitude, normalized to unit length.
fn strong_edgels(gray: &GrayImage) -> Vec<Edgel> {
    let (w, _) = gray.dimensions();
    let field = GradientField::sobel(gray);
    let mags = field.magnitudes();
    if mags.is_empty() {
        return Vec::new();
    }

    let n = mags.len() as f32;
    let mean = mags.iter().sum::<f32>() / n;
    let var = mags.iter().map(|m| (m - mean) * (m - mean)).sum::<f32>() / n;
    let thresh = mean + var.sqrt() / 2.0;

    mags.iter()
        .enumerate()
        .filter(|&(_, &m)| m > 0.0 && m >= thresh)
        .map(|(i, &m)| {
            let x = (i % w as usize) as u32;
            let y = (i / w as usize) as u32;
            let [gx, gy] = field.get(x, y);
            Edgel {
                x: x as f32,
                y: y as f32,
                ux: gx / m,
                uy: gy / m,
            }
        })
        .collect()
}
