//! Upper-eyelid parabola and the filter that drops limbus points above it.

use image::RgbImage;
use imageproc::gradients::vertical_sobel;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::raster::{argmax_first, blur_gray, invert_gray, sigma_for_kernel, to_gray};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EyelidConfig {
    /// Canthus offset along the inter-eye direction, fraction of the inter-eye distance.
    pub canthus_along_ratio: f64,
    /// Upward canthus offset, fraction of the inter-eye distance.
    pub canthus_up_ratio: f64,
    /// Shift of the detected eyelid edge towards the eye, fraction of crop height.
    pub eyelid_offset_ratio: f64,
    /// Fraction of the crop (from the top) searched for the eyelid edge.
    pub search_fraction: f64,
    pub blur_sigma: f32,
}

impl Default for EyelidConfig {
    fn default() -> Self {
        Self {
            canthus_along_ratio: 0.2,
            canthus_up_ratio: 0.08,
            eyelid_offset_ratio: 0.1,
            search_fraction: 1.0 / 3.0,
            blur_sigma: sigma_for_kernel(5),
        }
    }
}

/// `y = a x² + b x + c` in full-frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Parabola {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Parabola {
    /// Parabola through three points; `None` if they do not define one
    /// (repeated x, or a non-finite solution).
    pub fn through(points: &[[f64; 2]; 3]) -> Option<Self> {
        let m = Matrix3::from_fn(|r, c| points[r][0].powi(2 - c as i32));
        let rhs = Vector3::new(points[0][1], points[1][1], points[2][1]);
        let sol = m.lu().solve(&rhs)?;
        sol.iter()
            .all(|v| v.is_finite())
            .then(|| Self {
                a: sol[0],
                b: sol[1],
                c: sol[2],
            })
    }

    pub fn eval(&self, x: f64) -> f64 {
        (self.a * x + self.b) * x + self.c
    }

    /// Strictly below the curve in image coordinates (larger y).
    pub fn is_below(&self, p: [f64; 2]) -> bool {
        p[1] > self.eval(p[0])
    }
}

/// Approximate inner and outer eye corners (full-frame).
///
/// `eye_vec` is the full-frame vector between the two eye centers; its sign
/// does not matter.
pub fn guess_eye_corners(
    center: [f64; 2],
    eye_vec: [f64; 2],
    config: &EyelidConfig,
) -> Option<[[f64; 2]; 2]> {
    let d = eye_vec[0].hypot(eye_vec[1]);
    if d < 1e-9 || !d.is_finite() {
        return None;
    }
    let u = [eye_vec[0] / d, eye_vec[1] / d];
    // perpendicular pointing down the image
    let mut n = [-u[1], u[0]];
    if n[1] < 0.0 {
        n = [-n[0], -n[1]];
    }
    let along = config.canthus_along_ratio * d;
    let up = config.canthus_up_ratio * d;
    let corner = |s: f64| {
        [
            center[0] + s * along * u[0] - up * n[0],
            center[1] + s * along * u[1] - up * n[1],
        ]
    };
    Some([corner(1.0), corner(-1.0)])
}

/// Point on the upper eyelid straight above the eye center (full-frame).
///
/// Scans the center column of the eye crop, which must be centered on `center`.
pub fn find_upper_eyelid_point(
    center: [f64; 2],
    eye: &RgbImage,
    config: &EyelidConfig,
) -> Option<[f64; 2]> {
    let (w, h) = eye.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let inverted = blur_gray(&invert_gray(&to_gray(eye)), config.blur_sigma);
    let dy = vertical_sobel(&inverted);
    let col = w / 2;
    let search = ((h as f64 * config.search_fraction) as u32).clamp(1, h);
    let column: Vec<f32> = (0..search).map(|y| dy.get_pixel(col, y)[0] as f32).collect();
    let idx = argmax_first(&column)? as f64;

    let y = center[1] - (h / 2) as f64 + idx + h as f64 * config.eyelid_offset_ratio;
    Some([center[0], y])
}

/// Fit the upper-eyelid parabola through both eye corners and the eyelid point.
pub fn estimate_upper_eyelid(
    center: [f64; 2],
    eye_vec: [f64; 2],
    eye: &RgbImage,
    config: &EyelidConfig,
) -> Option<Parabola> {
    let [c0, c1] = guess_eye_corners(center, eye_vec, config)?;
    let top = find_upper_eyelid_point(center, eye, config)?;
    Parabola::through(&[c0, top, c1])
}

/// Keep crop-relative `points` that lie strictly below `eyelid` once shifted
/// to the full frame by `crop_origin`.
pub fn filter_below_eyelid(
    points: &[[f64; 2]],
    eyelid: &Parabola,
    crop_origin: [f64; 2],
) -> Vec<[f64; 2]> {
    points
        .iter()
        .copied()
        .filter(|p| eyelid.is_below([p[0] + crop_origin[0], p[1] + crop_origin[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgb;

    #[test]
    fn parabola_through_three_points() {
        let p = Parabola::through(&[[0.0, 1.0], [1.0, 0.0], [2.0, 1.0]]).expect("parabola");
        assert_relative_eq!(p.a, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.b, -2.0, epsilon = 1e-12);
        assert_relative_eq!(p.c, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn repeated_x_is_degenerate() {
        assert!(Parabola::through(&[[3.0, 1.0], [3.0, 5.0], [4.0, 2.0]]).is_none());
    }

    #[test]
    fn filter_boundary_is_exclusive() {
        let p = Parabola {
            a: 0.0,
            b: 0.0,
            c: 50.0,
        };
        let pts = [[5.0, 40.0], [6.0, 39.0], [7.0, 41.0], [8.0, 20.0]];
        let kept = filter_below_eyelid(&pts, &p, [100.0, 10.0]);
        assert_eq!(kept, vec![[7.0, 41.0]]);
    }

    #[test]
    fn corners_sit_beside_and_above_the_center() {
        let cfg = EyelidConfig::default();
        for v in [[-300.0, 0.0], [300.0, 0.0]] {
            let [a, b] = guess_eye_corners([200.0, 150.0], v, &cfg).expect("corners");
            let (left, right) = if a[0] < b[0] { (a, b) } else { (b, a) };
            assert_relative_eq!(left[0], 140.0, epsilon = 1e-9);
            assert_relative_eq!(right[0], 260.0, epsilon = 1e-9);
            assert_relative_eq!(left[1], 126.0, epsilon = 1e-9);
            assert_relative_eq!(right[1], 126.0, epsilon = 1e-9);
        }
        assert!(guess_eye_corners([0.0, 0.0], [0.0, 0.0], &cfg).is_none());
    }

    #[test]
    fn eyelid_point_tracks_top_of_dark_band() {
        // bright skin above row 20, dark below
        let eye = RgbImage::from_fn(61, 61, |_, y| {
            if y < 20 {
                Rgb([220, 220, 220])
            } else {
                Rgb([50, 50, 50])
            }
        });
        let p = find_upper_eyelid_point([300.0, 200.0], &eye, &EyelidConfig::default())
            .expect("point");
        assert_eq!(p[0], 300.0);
        let idx = p[1] - 200.0 + 30.0 - 6.1;
        assert!((idx - 19.5).abs() <= 1.0, "edge row {idx}");
    }

    #[test]
    fn eyelid_parabola_opens_over_the_eye() {
        let eye = RgbImage::from_fn(61, 61, |_, y| {
            if y < 20 {
                Rgb([220, 220, 220])
            } else {
                Rgb([50, 50, 50])
            }
        });
        let center = [300.0, 200.0];
        let p = estimate_upper_eyelid(center, [200.0, 0.0], &eye, &EyelidConfig::default())
            .expect("parabola");
        assert!(p.a < 0.0);
        assert!(p.eval(300.0) > p.eval(260.0));
        assert!(p.is_below(center));
    }
}
