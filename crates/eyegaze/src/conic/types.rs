//! Core conic and ellipse types with conversions.

use serde::{Deserialize, Serialize};

use crate::gradient::GradientField;

// ── Types ──────────────────────────────────────────────────────────────────

/// General conic: A x² + B xy + C y² + D x + E y + F = 0
/// Stored as [A, B, C, D, E, F].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConicCoeffs(pub [f64; 6]);

/// Geometric ellipse in rotated-rectangle form.
///
/// `width` is always the full major axis and `height` the full minor axis;
/// `angle` is the direction of the major axis from +x in degrees, in [0, 180).
/// The coordinate frame (crop-relative or full-frame) is decided by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipse {
    /// Center (x, y) in pixels.
    pub center: [f64; 2],
    /// Full major axis length (pixels).
    pub width: f64,
    /// Full minor axis length (pixels).
    pub height: f64,
    /// Major-axis rotation in degrees, [0, 180).
    pub angle: f64,
}

/// Configuration for the gradient-aware RANSAC limbus fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    /// Number of independent trials.
    pub trials: usize,
    /// Inlier-refinement rounds per surviving trial.
    pub refine_iters: usize,
    /// Inlier gate on the scaled algebraic distance (1px-equivalent units).
    pub max_inlier_error: f64,
    /// Side of the central box the center must fall in, as a fraction of crop width.
    pub center_box_fraction: f64,
    /// Minimum accepted major axis (full length, pixels).
    pub min_major_axis_px: f64,
    /// Maximum accepted axis length (full length, pixels).
    pub max_axis_px: f64,
    /// Maximum accepted major/minor ratio.
    pub max_aspect_ratio: f64,
    /// RNG seed; each trial derives its own stream from it.
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            trials: 10,
            refine_iters: 3,
            max_inlier_error: 2.0,
            center_box_fraction: 0.5,
            min_major_axis_px: 40.0,
            max_axis_px: 200.0,
            max_aspect_ratio: 4.0,
            seed: 42,
        }
    }
}

/// Result of a RANSAC fit.
#[derive(Debug, Clone)]
pub struct RansacResult {
    /// Best ellipse, `None` when no trial survived the constraints.
    pub ellipse: Option<Ellipse>,
    /// Points supporting `ellipse`.
    pub inliers: Vec<[f64; 2]>,
    /// Edge-strength support of `ellipse`; `-inf` while empty.
    pub goodness: f64,
}

impl RansacResult {
    /// The empty result: no ellipse, no inliers, goodness `-inf`.
    pub fn empty() -> Self {
        Self {
            ellipse: None,
            inliers: Vec::new(),
            goodness: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ellipse.is_none()
    }

    /// Keep whichever result has the higher goodness; ties keep `self`.
    pub fn better(self, other: Self) -> Self {
        if other.goodness > self.goodness {
            other
        } else {
            self
        }
    }
}

// ── Conic evaluation ───────────────────────────────────────────────────────

impl ConicCoeffs {
    /// Normalize conic coefficients so that A + C = 1 (trace of quadratic part).
    /// Returns `None` if A + C ≈ 0 (degenerate / hyperbola-like).
    pub fn normalized(&self) -> Option<Self> {
        let [a, b, c, d, e, f] = self.0;
        let trace = a + c;
        if trace.abs() < 1e-15 {
            return None;
        }
        let s = 1.0 / trace;
        Some(Self([a * s, b * s, c * s, d * s, e * s, f * s]))
    }

    /// Algebraic distance of a point (x, y) to this conic.
    pub fn algebraic_distance(&self, x: f64, y: f64) -> f64 {
        let [a, b, c, d, e, f] = self.0;
        a * x * x + b * x * y + c * y * y + d * x + e * y + f
    }

    /// Gradient of the algebraic distance at (x, y).
    pub fn algebraic_gradient(&self, x: f64, y: f64) -> [f64; 2] {
        let [a, b, c, d, e, _] = self.0;
        [2.0 * a * x + b * y + d, b * x + 2.0 * c * y + e]
    }

    /// Unit direction of [`Self::algebraic_gradient`]; zero at stationary points.
    pub fn algebraic_gradient_dir(&self, x: f64, y: f64) -> [f64; 2] {
        let [gx, gy] = self.algebraic_gradient(x, y);
        let n = gx.hypot(gy);
        if n < 1e-15 {
            return [0.0, 0.0];
        }
        [gx / n, gy / n]
    }

    /// Check whether the conic represents an ellipse (discriminant B²−4AC < 0).
    pub fn is_ellipse(&self) -> bool {
        let [a, b, c, ..] = self.0;
        b * b - 4.0 * a * c < 0.0
    }

    /// Convert to geometric ellipse parameters.
    /// Returns `None` if the conic is not an ellipse.
    pub fn to_ellipse(self) -> Option<Ellipse> {
        conic_to_ellipse(&self)
    }
}

// ── Ellipse utilities ──────────────────────────────────────────────────────

impl Ellipse {
    /// Check basic validity: positive axes, finite values.
    pub fn is_valid(&self) -> bool {
        self.width > 0.0
            && self.height > 0.0
            && self.width.is_finite()
            && self.height.is_finite()
            && self.center[0].is_finite()
            && self.center[1].is_finite()
            && self.angle.is_finite()
    }

    /// Major/minor ratio (>= 1 for a canonical ellipse).
    pub fn aspect_ratio(&self) -> f64 {
        if self.width >= self.height {
            self.width / self.height
        } else {
            self.height / self.width
        }
    }

    /// Swap axes if needed so that `width` is the major axis.
    pub fn canonical(self) -> Self {
        if self.height > self.width {
            Self {
                center: self.center,
                width: self.height,
                height: self.width,
                angle: normalize_angle_deg(self.angle + 90.0),
            }
        } else {
            Self {
                angle: normalize_angle_deg(self.angle),
                ..self
            }
        }
    }

    /// Same ellipse shifted by `offset` (e.g. crop-relative to full-frame).
    pub fn translated(self, offset: [f64; 2]) -> Self {
        Self {
            center: [self.center[0] + offset[0], self.center[1] + offset[1]],
            ..self
        }
    }

    /// Unit direction of the minor axis.
    pub fn minor_axis_dir(&self) -> [f64; 2] {
        let t = self.angle.to_radians();
        [-t.sin(), t.cos()]
    }

    /// Convert to conic coefficients, scaled so the value at the center is -1.
    pub fn to_conic(self) -> ConicCoeffs {
        ellipse_to_conic(&self)
    }

    /// Axis-aligned bounds `[x_min, y_min, x_max, y_max]` of the ellipse curve.
    pub fn bounds(&self) -> [f64; 4] {
        let (s, c) = self.angle.to_radians().sin_cos();
        let a = self.width * 0.5;
        let b = self.height * 0.5;
        let hx = ((a * c).powi(2) + (b * s).powi(2)).sqrt();
        let hy = ((a * s).powi(2) + (b * c).powi(2)).sqrt();
        [
            self.center[0] - hx,
            self.center[1] - hy,
            self.center[0] + hx,
            self.center[1] + hy,
        ]
    }

    /// Whether the pixel bounding box of the ellipse lies inside a `w`×`h` image.
    pub fn fits_inside(&self, w: u32, h: u32) -> bool {
        let [x0, y0, x1, y1] = self.bounds();
        x0.floor() >= 0.0 && y0.floor() >= 0.0 && x1.ceil() < w as f64 && y1.ceil() < h as f64
    }

    /// Sample `n` points on the ellipse boundary.
    pub fn sample_points(&self, n: usize) -> Vec<[f64; 2]> {
        let (sin_a, cos_a) = self.angle.to_radians().sin_cos();
        let a = self.width * 0.5;
        let b = self.height * 0.5;
        (0..n)
            .map(|i| {
                let t = 2.0 * std::f64::consts::PI * (i as f64) / (n as f64);
                let px = a * t.cos();
                let py = b * t.sin();
                let x = self.center[0] + cos_a * px - sin_a * py;
                let y = self.center[1] + sin_a * px + cos_a * py;
                [x, y]
            })
            .collect()
    }

    /// Sum over `points` of the dot product between the image gradient and the
    /// conic's outward gradient direction. Points without a gradient sample
    /// contribute nothing.
    pub fn edge_support(&self, points: &[[f64; 2]], gradients: &GradientField) -> f64 {
        let conic = self.to_conic();
        points
            .iter()
            .filter_map(|&p| {
                let [gx, gy] = gradients.at_point(p)?;
                let [dx, dy] = conic.algebraic_gradient_dir(p[0], p[1]);
                Some(gx as f64 * dx + gy as f64 * dy)
            })
            .sum()
    }
}

// ── Conversion: conic ↔ ellipse ────────────────────────────────────────────

/// Convert general conic coefficients to geometric ellipse parameters.
///
/// The general conic is A x² + B xy + C y² + D x + E y + F = 0.
/// Returns `None` if the conic does not represent a proper ellipse.
pub fn conic_to_ellipse(c: &ConicCoeffs) -> Option<Ellipse> {
    let [a, b, c_coeff, d, e, f] = c.0;

    let disc = b * b - 4.0 * a * c_coeff;
    if disc >= 0.0 {
        return None;
    }

    // Center by solving the 2x2 system:
    //   2A·cx + B·cy + D = 0
    //   B·cx + 2C·cy + E = 0
    let denom = 4.0 * a * c_coeff - b * b;
    let cx = (b * e - 2.0 * c_coeff * d) / denom;
    let cy = (b * d - 2.0 * a * e) / denom;

    let angle = if (a - c_coeff).abs() < 1e-15 {
        if b > 0.0 {
            std::f64::consts::FRAC_PI_4
        } else if b < 0.0 {
            -std::f64::consts::FRAC_PI_4
        } else {
            0.0
        }
    } else {
        0.5 * b.atan2(a - c_coeff)
    };

    // Eigenvalues of the 2x2 quadratic part
    let sum = a + c_coeff;
    let diff = ((a - c_coeff).powi(2) + b * b).sqrt();
    let lambda1 = (sum + diff) / 2.0;
    let lambda2 = (sum - diff) / 2.0;

    // F' = value of the conic at the center
    let f_prime = a * cx * cx + b * cx * cy + c_coeff * cy * cy + d * cx + e * cy + f;
    if f_prime.abs() < 1e-15 {
        return None;
    }

    let a_sq = -f_prime / lambda1;
    let b_sq = -f_prime / lambda2;
    if a_sq <= 0.0 || b_sq <= 0.0 {
        return None;
    }

    // lambda1 pairs with the axis at `angle`, lambda2 with the one 90° off.
    let ellipse = Ellipse {
        center: [cx, cy],
        width: 2.0 * a_sq.sqrt(),
        height: 2.0 * b_sq.sqrt(),
        angle: angle.to_degrees(),
    }
    .canonical();

    ellipse.is_valid().then_some(ellipse)
}

/// Convert geometric ellipse parameters to general conic coefficients.
///
/// The result evaluates to -1 at the center and 0 on the curve.
pub fn ellipse_to_conic(e: &Ellipse) -> ConicCoeffs {
    let (sin_a, cos_a) = e.angle.to_radians().sin_cos();
    let a = e.width * 0.5;
    let b = e.height * 0.5;
    let a2 = a * a;
    let b2 = b * b;
    let [x0, y0] = e.center;

    let ca = cos_a * cos_a / a2 + sin_a * sin_a / b2;
    let cb = 2.0 * cos_a * sin_a * (1.0 / a2 - 1.0 / b2);
    let cc = sin_a * sin_a / a2 + cos_a * cos_a / b2;
    let cd = -2.0 * ca * x0 - cb * y0;
    let ce = -cb * x0 - 2.0 * cc * y0;
    let cf = ca * x0 * x0 + cb * x0 * y0 + cc * y0 * y0 - 1.0;

    ConicCoeffs([ca, cb, cc, cd, ce, cf])
}

/// Normalize an angle in degrees to [0, 180).
pub fn normalize_angle_deg(angle: f64) -> f64 {
    let a = angle.rem_euclid(180.0);
    if a >= 180.0 {
        0.0
    } else {
        a
    }
}
