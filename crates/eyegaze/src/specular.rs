//! Removal of small specular highlights from an eye crop.
//!
//! Bright blobs are located on a blurred, closed grayscale copy, the small
//! ones are masked, and the masked pixels are rebuilt from their
//! surroundings.

use std::collections::HashSet;

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::morphology::{grayscale_close, grayscale_dilate, Mask};
use imageproc::point::Point;
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::raster::{blur_gray, to_gray};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecularConfig {
    /// Gaussian sigma applied before thresholding.
    pub blur_sigma: f32,
    /// Radius of the closing disk and of the mask dilation.
    pub morph_radius: u8,
    /// Threshold as a fraction of `min + max` of the closed image.
    pub threshold_ratio: f32,
    /// Neighborhood radius used when filling masked pixels.
    pub inpaint_radius: u32,
}

impl Default for SpecularConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            morph_radius: 2,
            threshold_ratio: 0.75,
            inpaint_radius: 2,
        }
    }
}

/// Return a copy of `eye` with small bright blobs inpainted.
pub fn remove_specular(eye: &RgbImage, config: &SpecularConfig) -> RgbImage {
    let mask = specular_mask(eye, config);
    let n_masked = mask.pixels().filter(|p| p[0] != 0).count();
    if n_masked == 0 {
        return eye.clone();
    }
    trace!(n_masked, "inpainting specular highlights");
    inpaint(eye, &mask, config.inpaint_radius)
}

/// Binary mask (255 = reflection) of the blobs [`remove_specular`] rebuilds.
pub fn specular_mask(eye: &RgbImage, config: &SpecularConfig) -> GrayImage {
    let (w, h) = eye.dimensions();
    if w == 0 || h == 0 {
        return GrayImage::new(w, h);
    }

    let blurred = blur_gray(&to_gray(eye), config.blur_sigma);
    let disk = Mask::disk(config.morph_radius);
    let closed = grayscale_close(&blurred, &disk);

    let (lo, hi) = closed
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    let thresh = (lo as f32 + hi as f32) * config.threshold_ratio;
    let binary = GrayImage::from_fn(w, h, |x, y| {
        Luma([if closed.get_pixel(x, y)[0] as f32 > thresh { 255 } else { 0 }])
    });

    let max_area = (w + h) as f64 / 2.0;
    let labels = connected_components(&binary, Connectivity::Eight, Luma([0u8]));
    let keep: HashSet<u32> = find_contours::<i32>(&binary)
        .iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .filter(|c| polygon_area(&c.points) < max_area)
        .filter_map(|c| c.points.first())
        .map(|p| labels.get_pixel(p.x as u32, p.y as u32)[0])
        .filter(|&label| label != 0)
        .collect();

    if keep.is_empty() {
        return GrayImage::new(w, h);
    }
    let filled = GrayImage::from_fn(w, h, |x, y| {
        Luma([if keep.contains(&labels.get_pixel(x, y)[0]) { 255 } else { 0 }])
    });
    grayscale_dilate(&filled, &disk)
}

/// Shoelace area of a closed contour.
fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice.abs() as f64 * 0.5
}

/// Fill masked pixels from the mask boundary inward. Each filled pixel is the
/// inverse-distance weighted mean of the known pixels within `radius`.
fn inpaint(img: &RgbImage, mask: &GrayImage, radius: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let mut out = img.clone();
    let mut known: Vec<bool> = mask.pixels().map(|p| p[0] == 0).collect();
    if !known.iter().any(|&k| k) {
        return out;
    }

    let r = radius.max(1) as i32;
    let offsets: Vec<(i32, i32, f32)> = (-r..=r)
        .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| (dx, dy) != (0, 0) && dx * dx + dy * dy <= r * r)
        .map(|(dx, dy)| (dx, dy, 1.0 / ((dx * dx + dy * dy) as f32).sqrt()))
        .collect();
    let idx = |x: i32, y: i32| y as usize * w as usize + x as usize;

    loop {
        let mut fills = Vec::new();
        for y in 0..h as i32 {
            for x in 0..w as i32 {
                if known[idx(x, y)] {
                    continue;
                }
                let mut acc = [0.0f32; 3];
                let mut wsum = 0.0f32;
                for &(dx, dy, wt) in &offsets {
                    let (sx, sy) = (x + dx, y + dy);
                    if sx < 0 || sy < 0 || sx >= w as i32 || sy >= h as i32 || !known[idx(sx, sy)] {
                        continue;
                    }
                    let p = out.get_pixel(sx as u32, sy as u32).0;
                    for c in 0..3 {
                        acc[c] += p[c] as f32 * wt;
                    }
                    wsum += wt;
                }
                if wsum > 0.0 {
                    let px = acc.map(|v| (v / wsum).round().clamp(0.0, 255.0) as u8);
                    fills.push((x, y, px));
                }
            }
        }
        if fills.is_empty() {
            break;
        }
        for (x, y, px) in fills {
            out.put_pixel(x as u32, y as u32, Rgb(px));
            known[idx(x, y)] = true;
        }
    }
    out
}
