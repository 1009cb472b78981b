//! Synthetic eye images for unit tests.

use image::{Rgb, RgbImage};

pub(crate) const SCLERA: u8 = 215;
pub(crate) const IRIS: u8 = 55;

/// Render dark iris disks of `radius` at `centers` on a light background,
/// then soften the edges slightly.
///
/// Pixels at distance `d <= radius` from a center are `IRIS`, others
/// `SCLERA`, before blurring.
pub(crate) fn draw_eyes(w: u32, h: u32, centers: &[[f32; 2]], radius: f32) -> RgbImage {
    let img = RgbImage::from_fn(w, h, |x, y| {
        let inside = centers.iter().any(|c| {
            let dx = x as f32 - c[0];
            let dy = y as f32 - c[1];
            (dx * dx + dy * dy).sqrt() <= radius
        });
        let v = if inside { IRIS } else { SCLERA };
        Rgb([v, v, v])
    });
    imageproc::filter::gaussian_blur_f32(&img, 1.5)
}

/// Single-eye crop with the iris at `center`.
pub(crate) fn draw_eye_crop(w: u32, h: u32, center: [f32; 2], radius: f32) -> RgbImage {
    draw_eyes(w, h, &[center], radius)
}
