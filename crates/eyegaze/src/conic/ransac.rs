//! Gradient-aware RANSAC for limbus ellipses.
//!
//! Each trial fits a 5-point ellipse, checks it against the crop geometry and
//! the image gradients, then refines it on its inliers. The trial whose
//! inliers agree best with the edge directions wins.

use rand::prelude::*;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, trace};

use super::fit::fit_ellipse;
use super::types::{Ellipse, RansacConfig, RansacResult};
use crate::gradient::GradientField;

/// Points drawn per trial.
pub const SAMPLE_SIZE: usize = 5;

/// Fit the limbus ellipse to candidate `points` (crop coordinates).
///
/// `gradients` must cover the same crop; its size defines the geometric
/// constraints. Returns [`RansacResult::empty`] when no trial survives.
pub fn fit_limbus_ellipse(
    points: &[[f64; 2]],
    gradients: &GradientField,
    config: &RansacConfig,
) -> RansacResult {
    if points.len() < SAMPLE_SIZE || config.trials == 0 {
        debug!(
            n_points = points.len(),
            "too few limbus candidates for RANSAC"
        );
        return RansacResult::empty();
    }

    let run = |trial: usize| run_trial(points, gradients, config, trial);

    #[cfg(feature = "parallel")]
    let best = (0..config.trials)
        .into_par_iter()
        .map(run)
        .reduce(RansacResult::empty, RansacResult::better);
    #[cfg(not(feature = "parallel"))]
    let best = (0..config.trials)
        .map(run)
        .fold(RansacResult::empty(), RansacResult::better);

    debug!(
        found = best.ellipse.is_some(),
        n_inliers = best.inliers.len(),
        goodness = best.goodness,
        "limbus RANSAC finished"
    );
    best
}

fn trial_seed(seed: u64, trial: usize) -> u64 {
    seed ^ (trial as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn run_trial(
    points: &[[f64; 2]],
    gradients: &GradientField,
    config: &RansacConfig,
    trial: usize,
) -> RansacResult {
    let mut rng = StdRng::seed_from_u64(trial_seed(config.seed, trial));
    let sample: Vec<[f64; 2]> = sample_indices(&mut rng, points.len(), SAMPLE_SIZE)
        .into_iter()
        .map(|i| points[i])
        .collect();

    let Some(ellipse) = fit_ellipse(&sample) else {
        trace!(trial, "sample is not an ellipse");
        return RansacResult::empty();
    };
    if !satisfies_constraints(&ellipse, gradients, config) {
        trace!(trial, ?ellipse, "sample ellipse violates constraints");
        return RansacResult::empty();
    }
    if !gradients_agree(&ellipse, &sample, gradients) {
        trace!(trial, "sample disagrees with image gradients");
        return RansacResult::empty();
    }

    // axis gates apply to the sample only
    let Some((current, inliers)) = refine(ellipse, points, config) else {
        trace!(trial, "too few inliers after refinement");
        return RansacResult::empty();
    };
    if !lies_within_crop(&current, gradients, config) {
        return RansacResult::empty();
    }

    let goodness = current.edge_support(&inliers, gradients);
    trace!(trial, n_inliers = inliers.len(), goodness, "trial accepted");
    RansacResult {
        ellipse: Some(current),
        inliers,
        goodness,
    }
}

/// Iteratively refit `start` on its inliers. `None` once fewer than five
/// inliers remain or the refit is not an ellipse.
fn refine(
    start: Ellipse,
    points: &[[f64; 2]],
    config: &RansacConfig,
) -> Option<(Ellipse, Vec<[f64; 2]>)> {
    let mut current = start;
    let mut inliers = Vec::new();
    for _ in 0..config.refine_iters.max(1) {
        inliers = collect_inliers(&current, points, config.max_inlier_error);
        if inliers.len() < SAMPLE_SIZE {
            return None;
        }
        current = fit_ellipse(&inliers)?;
    }
    Some((current, inliers))
}

/// Geometric plausibility of a sample ellipse: placement plus axis gates.
pub(crate) fn satisfies_constraints(
    e: &Ellipse,
    gradients: &GradientField,
    config: &RansacConfig,
) -> bool {
    lies_within_crop(e, gradients, config)
        && e.width >= config.min_major_axis_px
        && e.width <= config.max_axis_px
        && e.aspect_ratio() <= config.max_aspect_ratio
}

/// Center inside the central box and bounding box inside the crop.
pub(crate) fn lies_within_crop(
    e: &Ellipse,
    gradients: &GradientField,
    config: &RansacConfig,
) -> bool {
    if !e.is_valid() {
        return false;
    }
    let (w, h) = (gradients.width(), gradients.height());

    let side_x = w as f64 * config.center_box_fraction;
    let side_y = h as f64 * config.center_box_fraction;
    let x0 = (w as f64 - side_x) * 0.5;
    let y0 = (h as f64 - side_y) * 0.5;
    let [cx, cy] = e.center;
    if cx < x0 || cx >= x0 + side_x || cy < y0 || cy >= y0 + side_y {
        return false;
    }
    e.fits_inside(w, h)
}

/// Every sample point must see an image gradient pointing the same way as
/// the conic's outward normal.
fn gradients_agree(e: &Ellipse, sample: &[[f64; 2]], gradients: &GradientField) -> bool {
    let conic = e.to_conic();
    sample.iter().all(|&p| {
        let Some([gx, gy]) = gradients.at_point(p) else {
            return false;
        };
        let [dx, dy] = conic.algebraic_gradient_dir(p[0], p[1]);
        gx as f64 * dx + gy as f64 * dy > 0.0
    })
}

/// Points whose algebraic distance, scaled to one pixel off the minor
/// vertex, is below `max_error`.
fn collect_inliers(e: &Ellipse, points: &[[f64; 2]], max_error: f64) -> Vec<[f64; 2]> {
    let conic = e.to_conic();
    let [mx, my] = e.minor_axis_dir();
    let r = e.height * 0.5 + 1.0;
    let one_px = conic
        .algebraic_distance(e.center[0] + r * mx, e.center[1] + r * my)
        .abs();
    if one_px < 1e-15 {
        return Vec::new();
    }
    let limit = max_error * max_error;
    points
        .iter()
        .copied()
        .filter(|p| {
            let err = conic.algebraic_distance(p[0], p[1]) / one_px;
            err * err < limit
        })
        .collect()
}

/// Sample `k` distinct indices from `0..n` using Fisher–Yates partial shuffle.
fn sample_indices(rng: &mut impl Rng, n: usize, k: usize) -> Vec<usize> {
    debug_assert!(k <= n);
    let mut indices: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = rng.gen_range(i..n);
        indices.swap(i, j);
    }
    indices.truncate(k);
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_test_ellipse() -> Ellipse {
        Ellipse {
            center: [100.0, 98.0],
            width: 90.0,
            height: 66.0,
            angle: 25.0,
        }
    }

    /// Gradient field pointing along the outward normal of `e` everywhere.
    fn outward_field(e: &Ellipse, w: u32, h: u32, sign: f32) -> GradientField {
        let conic = e.to_conic();
        GradientField::from_fn(w, h, |x, y| {
            let [dx, dy] = conic.algebraic_gradient_dir(x as f64 + 0.5, y as f64 + 0.5);
            [sign * 100.0 * dx as f32, sign * 100.0 * dy as f32]
        })
    }

    #[test]
    fn exact_points_recover_ellipse() {
        let e = make_test_ellipse();
        let pts = e.sample_points(120);
        let grads = outward_field(&e, 200, 200, 1.0);
        let result = fit_limbus_ellipse(&pts, &grads, &RansacConfig::default());

        let fit = result.ellipse.expect("ellipse");
        assert_relative_eq!(fit.center[0], e.center[0], epsilon = 1e-3);
        assert_relative_eq!(fit.center[1], e.center[1], epsilon = 1e-3);
        assert_relative_eq!(fit.width, e.width, epsilon = 1e-3);
        assert_relative_eq!(fit.height, e.height, epsilon = 1e-3);
        assert_relative_eq!(fit.angle, e.angle, epsilon = 1e-3);
        assert_eq!(result.inliers.len(), 120);
        assert!(result.goodness > 0.0);
    }

    #[test]
    fn tolerates_a_few_outliers() {
        let e = make_test_ellipse();
        let mut pts = e.sample_points(100);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..8 {
            pts.push([rng.gen_range(20.0..180.0), rng.gen_range(20.0..180.0)]);
        }
        let grads = outward_field(&e, 200, 200, 1.0);
        let result = fit_limbus_ellipse(&pts, &grads, &RansacConfig::default());

        let fit = result.ellipse.expect("ellipse");
        assert_relative_eq!(fit.center[0], e.center[0], epsilon = 1.0);
        assert_relative_eq!(fit.center[1], e.center[1], epsilon = 1.0);
        assert_relative_eq!(fit.width, e.width, epsilon = 2.0);
        assert_relative_eq!(fit.height, e.height, epsilon = 2.0);
    }

    #[test]
    fn fewer_than_five_points_is_empty() {
        let e = make_test_ellipse();
        let grads = outward_field(&e, 200, 200, 1.0);
        let result = fit_limbus_ellipse(&e.sample_points(4), &grads, &RansacConfig::default());
        assert!(result.is_empty());
        assert!(result.inliers.is_empty());
        assert_eq!(result.goodness, f64::NEG_INFINITY);
    }

    #[test]
    fn inverted_gradients_reject_every_trial() {
        let e = make_test_ellipse();
        let grads = outward_field(&e, 200, 200, -1.0);
        let result = fit_limbus_ellipse(&e.sample_points(60), &grads, &RansacConfig::default());
        assert!(result.is_empty());
    }

    #[test]
    fn small_ellipse_is_rejected() {
        let e = Ellipse {
            center: [100.0, 100.0],
            width: 30.0,
            height: 24.0,
            angle: 0.0,
        };
        let grads = outward_field(&e, 200, 200, 1.0);
        let result = fit_limbus_ellipse(&e.sample_points(60), &grads, &RansacConfig::default());
        assert!(result.is_empty());
    }

    #[test]
    fn off_center_ellipse_is_rejected() {
        let e = Ellipse {
            center: [45.0, 100.0],
            width: 60.0,
            height: 50.0,
            angle: 0.0,
        };
        let grads = outward_field(&e, 200, 200, 1.0);
        let result = fit_limbus_ellipse(&e.sample_points(60), &grads, &RansacConfig::default());
        assert!(result.is_empty());
    }

    #[test]
    fn constraints_reject_elongated_and_clipped() {
        let grads = GradientField::from_fn(200, 200, |_, _| [0.0, 0.0]);
        let cfg = RansacConfig::default();
        let ok = Ellipse {
            center: [100.0, 100.0],
            width: 80.0,
            height: 60.0,
            angle: 10.0,
        };
        assert!(satisfies_constraints(&ok, &grads, &cfg));

        let elongated = Ellipse {
            width: 180.0,
            height: 40.0,
            ..ok
        };
        assert!(!satisfies_constraints(&elongated, &grads, &cfg));

        let clipped = Ellipse {
            center: [120.0, 100.0],
            width: 170.0,
            height: 100.0,
            angle: 0.0,
        };
        assert!(!satisfies_constraints(&clipped, &grads, &cfg));
    }

    #[test]
    fn refinement_may_leave_the_aspect_gate() {
        let grads = GradientField::from_fn(200, 200, |_, _| [0.0, 0.0]);
        let cfg = RansacConfig::default();
        let target = Ellipse {
            center: [100.0, 100.0],
            width: 88.0,
            height: 20.0,
            angle: 0.0,
        };
        let start = Ellipse {
            height: 23.2,
            ..target
        };
        assert!(satisfies_constraints(&start, &grads, &cfg));

        let (refined, inliers) = refine(start, &target.sample_points(90), &cfg).expect("refined");
        assert_eq!(inliers.len(), 90);
        assert_relative_eq!(refined.height, 20.0, epsilon = 1e-6);
        assert!(refined.aspect_ratio() > cfg.max_aspect_ratio);
        assert!(lies_within_crop(&refined, &grads, &cfg));
        assert!(!satisfies_constraints(&refined, &grads, &cfg));
    }

    #[test]
    fn collinear_candidates_yield_nothing() {
        // four points on one line force a line-pair conic for any sample
        // taking them, and no other sample exists
        let mut pts: Vec<[f64; 2]> = (0..4)
            .map(|i| [60.0 + 20.0 * i as f64, 80.0 + 10.0 * i as f64])
            .collect();
        pts.push([100.0, 130.0]);
        assert!(fit_ellipse(&pts).is_none());

        let grads = GradientField::from_fn(200, 200, |_, _| [1.0, 1.0]);
        let result = fit_limbus_ellipse(&pts, &grads, &RansacConfig::default());
        assert!(result.is_empty());
    }

    #[test]
    fn same_seed_same_result() {
        let e = make_test_ellipse();
        let mut pts = e.sample_points(80);
        pts.extend([[30.0, 40.0], [170.0, 20.0], [60.0, 160.0]]);
        let grads = outward_field(&e, 200, 200, 1.0);
        let cfg = RansacConfig {
            seed: 1234,
            ..Default::default()
        };
        let a = fit_limbus_ellipse(&pts, &grads, &cfg);
        let b = fit_limbus_ellipse(&pts, &grads, &cfg);
        assert_eq!(a.ellipse, b.ellipse);
        assert_eq!(a.inliers, b.inliers);
    }

    #[test]
    fn sample_indices_are_distinct() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut idx = sample_indices(&mut rng, 12, 5);
        idx.sort_unstable();
        idx.dedup();
        assert_eq!(idx.len(), 5);
        assert!(idx.iter().all(|&i| i < 12));
    }
}
