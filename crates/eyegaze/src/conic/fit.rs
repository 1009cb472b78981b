//! Least-squares conic fitting on normalized coordinates.

use nalgebra::{Matrix6, SymmetricEigen, Vector6};

use super::types::{ConicCoeffs, Ellipse};

/// Hartley-style normalization: translate to centroid and scale so the mean
/// distance from the origin is √2. Returns (mean_x, mean_y, scale).
pub(crate) fn normalization_params(points: &[[f64; 2]]) -> (f64, f64, f64) {
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(ax, ay), p| (ax + p[0], ay + p[1]));
    let mx = sx / n;
    let my = sy / n;

    let mean_dist = points
        .iter()
        .map(|p| ((p[0] - mx).powi(2) + (p[1] - my).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let scale = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    (mx, my, scale)
}

/// Map a conic fitted in normalized coordinates x' = s(x − mx), y' = s(y − my)
/// back to the original coordinate frame.
pub(crate) fn denormalize_conic(c: &ConicCoeffs, mx: f64, my: f64, s: f64) -> ConicCoeffs {
    let [a, b, cc, d, e, f] = c.0;
    let s2 = s * s;

    let a_o = a * s2;
    let b_o = b * s2;
    let c_o = cc * s2;
    let d_o = -2.0 * a * s2 * mx - b * s2 * my + d * s;
    let e_o = -b * s2 * mx - 2.0 * cc * s2 * my + e * s;
    let f_o = a * s2 * mx * mx + b * s2 * mx * my + cc * s2 * my * my - d * s * mx - e * s * my + f;

    ConicCoeffs([a_o, b_o, c_o, d_o, e_o, f_o])
}

/// Fit a general conic to `points` by minimizing the algebraic residual
/// under a unit-norm constraint on the coefficients.
///
/// Needs at least five points. With exactly five points in general position
/// the conic passes through all of them. The result has unit Frobenius norm;
/// use [`ConicCoeffs::normalized`] for the ellipse scaling.
pub fn fit_conic_lsq(points: &[[f64; 2]]) -> Option<ConicCoeffs> {
    if points.len() < 5 {
        return None;
    }

    let (mx, my, s) = normalization_params(points);

    let mut scatter = Matrix6::<f64>::zeros();
    for p in points {
        let x = (p[0] - mx) * s;
        let y = (p[1] - my) * s;
        let row = Vector6::new(x * x, x * y, y * y, x, y, 1.0);
        scatter += row * row.transpose();
    }

    let eig = SymmetricEigen::new(scatter);
    let (min_idx, _) = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.total_cmp(b))?;
    let v = eig.eigenvectors.column(min_idx);
    if v.iter().any(|c| !c.is_finite()) {
        return None;
    }

    let normalized = ConicCoeffs([v[0], v[1], v[2], v[3], v[4], v[5]]);
    let conic = denormalize_conic(&normalized, mx, my, s);
    let norm = conic.0.iter().map(|c| c * c).sum::<f64>().sqrt();
    if !norm.is_finite() || norm < 1e-300 {
        return None;
    }
    Some(ConicCoeffs(conic.0.map(|c| c / norm)))
}

/// Fit an ellipse to `points`.
///
/// Returns `None` when fewer than five points are given or when the best
/// conic is not a proper ellipse.
pub fn fit_ellipse(points: &[[f64; 2]]) -> Option<Ellipse> {
    let conic = fit_conic_lsq(points)?;
    if !conic.is_ellipse() {
        return None;
    }
    conic.normalized()?.to_ellipse()
}
