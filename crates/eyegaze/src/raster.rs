//! Small raster helpers shared by the pipeline stages.

use image::{imageops, GrayImage, ImageBuffer, Luma, RgbImage};

use crate::region::Region;

/// Gaussian sigma OpenCV derives from an odd kernel size.
pub fn sigma_for_kernel(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Luma conversion of a color image.
pub fn to_gray(img: &RgbImage) -> GrayImage {
    imageops::grayscale(img)
}

/// Gaussian-blur a `GrayImage` through an f32 buffer. `sigma <= 0` is a copy.
pub fn blur_gray(img: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 || img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    let f: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
            Luma([img.get_pixel(x, y)[0] as f32])
        });
    let blurred = imageproc::filter::gaussian_blur_f32(&f, sigma);
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        Luma([blurred.get_pixel(x, y)[0].round().clamp(0.0, 255.0) as u8])
    })
}

/// Invert intensities (255 − v).
pub fn invert_gray(img: &GrayImage) -> GrayImage {
    let mut out = img.clone();
    imageops::invert(&mut out);
    out
}

/// Grayscale, histogram-equalized counterpart of a color frame.
pub fn equalize_gray(frame: &RgbImage) -> GrayImage {
    imageproc::contrast::equalize_histogram(&to_gray(frame))
}

/// Copy `region` out of a color image. The region must fit inside it.
pub fn crop_rgb(img: &RgbImage, region: &Region) -> RgbImage {
    imageops::crop_imm(
        img,
        region.x.max(0) as u32,
        region.y.max(0) as u32,
        region.width,
        region.height,
    )
    .to_image()
}

/// Copy `region` out of a grayscale image. The region must fit inside it.
pub fn crop_gray(img: &GrayImage, region: &Region) -> GrayImage {
    imageops::crop_imm(
        img,
        region.x.max(0) as u32,
        region.y.max(0) as u32,
        region.width,
        region.height,
    )
    .to_image()
}

/// Sample a grayscale image at sub-pixel position using bilinear interpolation.
/// Returns raw intensity in [0, 255] or `None` if sampling is out of bounds.
#[inline]
pub fn bilinear_sample_checked(img: &GrayImage, x: f32, y: f32) -> Option<f32> {
    let (w, h) = img.dimensions();
    if w < 2 || h < 2 || x < 0.0 || y < 0.0 {
        return None;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    if x0 >= w - 1 || y0 >= h - 1 {
        return None;
    }

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let stride = w as usize;
    let idx00 = y0 as usize * stride + x0 as usize;
    let idx01 = idx00 + stride;

    let raw = img.as_raw();
    let p00 = raw[idx00] as f32;
    let p10 = raw[idx00 + 1] as f32;
    let p01 = raw[idx01] as f32;
    let p11 = raw[idx01 + 1] as f32;

    Some(
        (1.0 - fx) * (1.0 - fy) * p00
            + fx * (1.0 - fy) * p10
            + (1.0 - fx) * fy * p01
            + fx * fy * p11,
    )
}

/// Rescale `values` linearly onto [0, 255]. A constant input becomes all zeros.
pub fn normalize_to_255(values: &mut [f32]) {
    let (lo, hi) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = hi - lo;
    if !range.is_finite() || range <= 0.0 {
        values.iter_mut().for_each(|v| *v = 0.0);
        return;
    }
    let s = 255.0 / range;
    values.iter_mut().for_each(|v| *v = (*v - lo) * s);
}

/// Index of the first maximum. `None` for an empty slice.
pub fn argmax_first(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
