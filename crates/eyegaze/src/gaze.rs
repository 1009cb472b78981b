//! 3D limbus pose from an image ellipse, and its gaze ray's screen intersection.
//!
//! Camera-centered millimeters: x grows towards the image's left (the
//! subject's right), y down, z away from the camera. The screen is the plane
//! `z = 0`.

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::camera::CameraIntrinsics;
use crate::conic::Ellipse;

/// Which of the two mirror-ambiguous limbus poses to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disambiguation {
    /// Candidate whose gaze point is closest (Manhattan) to the camera origin.
    #[default]
    ClosestToCenter,
    /// Always the `+theta` pose.
    PositiveTheta,
    /// Always the `-theta` pose.
    NegativeTheta,
}

impl Disambiguation {
    /// Index (0 = `+theta`, 1 = `-theta`) of the chosen candidate point.
    pub fn select(self, candidates_mm: &[[f64; 2]; 2]) -> usize {
        match self {
            Disambiguation::PositiveTheta => 0,
            Disambiguation::NegativeTheta => 1,
            Disambiguation::ClosestToCenter => {
                let d = |p: &[f64; 2]| p[0].abs() + p[1].abs();
                if d(&candidates_mm[1]) < d(&candidates_mm[0]) {
                    1
                } else {
                    0
                }
            }
        }
    }
}

/// Gaze solver parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeGeometryConfig {
    /// Physical limbus radius (mm).
    pub limbus_radius_mm: f64,
    pub disambiguation: Disambiguation,
    /// Drop a per-eye gaze point whose pixel position lies further outside
    /// the screen than this fraction of its size. `None` keeps everything.
    pub max_offscreen_fraction: Option<f64>,
}

impl Default for GazeGeometryConfig {
    fn default() -> Self {
        Self {
            limbus_radius_mm: 6.0,
            disambiguation: Disambiguation::ClosestToCenter,
            max_offscreen_fraction: None,
        }
    }
}

/// Limbus disk in camera coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limbus {
    /// Disk center (mm).
    pub center: Vector3<f64>,
    /// Unit normal, pointing from the eye towards the screen.
    pub normal: Vector3<f64>,
}

impl Limbus {
    /// Where the ray `center + t * normal` meets the screen plane.
    pub fn screen_intersection(&self) -> Option<[f64; 2]> {
        if self.normal.z.abs() < 1e-12 {
            return None;
        }
        let t = -self.center.z / self.normal.z;
        let p = [
            self.center.x + self.normal.x * t,
            self.center.y + self.normal.y * t,
        ];
        (p[0].is_finite() && p[1].is_finite()).then_some(p)
    }
}

/// Both limbus poses consistent with an image ellipse, `+theta` first.
pub fn limbus_candidates(
    ellipse: &Ellipse,
    intrinsics: &CameraIntrinsics,
    radius_mm: f64,
) -> Option<[Limbus; 2]> {
    if !ellipse.is_valid() || !intrinsics.is_valid() {
        return None;
    }
    let major = ellipse.width.max(ellipse.height);
    let minor = ellipse.width.min(ellipse.height);

    let z = 2.0 * radius_mm * intrinsics.focal_mean() / major;
    let x = -z * (ellipse.center[0] - intrinsics.cx) / intrinsics.fx;
    let y = z * (ellipse.center[1] - intrinsics.cy) / intrinsics.fy;
    let center = Vector3::new(x, y, z);

    let theta = (minor / major).clamp(0.0, 1.0).acos();
    let psi = (ellipse.angle + 90.0).to_radians();

    // Undo the off-axis viewing direction (weak perspective).
    let rot_y = Rotation3::from_axis_angle(&Vector3::y_axis(), x.atan2(z));
    let rot_x = Rotation3::from_axis_angle(&Vector3::x_axis(), -y.atan2(z));

    let pose = |t: f64| {
        let n = Vector3::new(t.sin() * psi.cos(), -t.sin() * psi.sin(), -t.cos());
        Limbus {
            center,
            normal: rot_x * (rot_y * n),
        }
    };
    Some([pose(theta), pose(-theta)])
}

/// Chosen limbus pose and the screen-plane gaze point (mm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeEstimate {
    pub limbus: Limbus,
    pub point_mm: [f64; 2],
    /// Gaze points of the `+theta` and `-theta` poses.
    pub candidates_mm: [[f64; 2]; 2],
    /// Index into `candidates_mm` of the chosen pose.
    pub chosen: usize,
}

/// Solve the gaze point for one full-frame limbus ellipse.
pub fn solve_gaze(
    ellipse: &Ellipse,
    intrinsics: &CameraIntrinsics,
    config: &GazeGeometryConfig,
) -> Option<GazeEstimate> {
    let limbuses = limbus_candidates(ellipse, intrinsics, config.limbus_radius_mm)?;
    let candidates_mm = [
        limbuses[0].screen_intersection()?,
        limbuses[1].screen_intersection()?,
    ];
    let chosen = config.disambiguation.select(&candidates_mm);
    Some(GazeEstimate {
        limbus: limbuses[chosen],
        point_mm: candidates_mm[chosen],
        candidates_mm,
        chosen,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> CameraIntrinsics {
        CameraIntrinsics {
            fx: 600.0,
            fy: 600.0,
            cx: 320.0,
            cy: 240.0,
        }
    }

    #[test]
    fn depth_from_apparent_size() {
        let e = Ellipse {
            center: [320.0, 240.0],
            width: 50.0,
            height: 50.0,
            angle: 0.0,
        };
        let [l, _] = limbus_candidates(&e, &camera(), 6.0).expect("candidates");
        assert_relative_eq!(l.center.z, 144.0, epsilon = 1e-9);
        assert_relative_eq!(l.center.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(l.normal.z, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn ambiguous_pair_at_principal_point() {
        let k = camera();
        let e = Ellipse {
            center: [k.cx, k.cy],
            width: 100.0,
            height: 86.6,
            angle: 0.0,
        };
        let est = solve_gaze(&e, &k, &GazeGeometryConfig::default()).expect("gaze");

        let z = 2.0 * 6.0 * 600.0 / 100.0;
        let tan_t = (0.866f64).acos().tan();
        let [plus, minus] = est.candidates_mm;
        assert_relative_eq!(plus[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(plus[1], -z * tan_t, epsilon = 1e-9);
        assert_relative_eq!(minus[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(minus[1], z * tan_t, epsilon = 1e-9);

        let d = |p: [f64; 2]| p[0].abs() + p[1].abs();
        let expected = if d(minus) < d(plus) { 1 } else { 0 };
        assert_eq!(est.chosen, expected);
        assert_eq!(est.point_mm, est.candidates_mm[est.chosen]);
    }

    #[test]
    fn off_center_picks_closest_candidate() {
        let k = camera();
        let e = Ellipse {
            center: [k.cx + 200.0, k.cy + 50.0],
            width: 80.0,
            height: 60.0,
            angle: 30.0,
        };
        let cfg = GazeGeometryConfig::default();
        let est = solve_gaze(&e, &k, &cfg).expect("gaze");
        let d = |p: [f64; 2]| p[0].abs() + p[1].abs();
        let [a, b] = est.candidates_mm;
        assert_ne!(a, b);
        assert_eq!(est.chosen, if d(b) < d(a) { 1 } else { 0 });

        let plus = solve_gaze(
            &e,
            &k,
            &GazeGeometryConfig {
                disambiguation: Disambiguation::PositiveTheta,
                ..cfg.clone()
            },
        )
        .expect("gaze");
        let minus = solve_gaze(
            &e,
            &k,
            &GazeGeometryConfig {
                disambiguation: Disambiguation::NegativeTheta,
                ..cfg
            },
        )
        .expect("gaze");
        assert_eq!(plus.point_mm, a);
        assert_eq!(minus.point_mm, b);
    }

    #[test]
    fn closest_policy_prefers_smaller_manhattan_distance() {
        let p = Disambiguation::ClosestToCenter;
        assert_eq!(p.select(&[[10.0, -5.0], [3.0, 4.0]]), 1);
        assert_eq!(p.select(&[[1.0, 1.0], [-2.0, 0.5]]), 0);
        assert_eq!(p.select(&[[0.0, -7.0], [0.0, 7.0]]), 0);
    }

    #[test]
    fn frontal_circle_looks_at_camera() {
        let k = camera();
        let e = Ellipse {
            center: [k.cx - 150.0, k.cy],
            width: 50.0,
            height: 50.0,
            angle: 0.0,
        };
        let est = solve_gaze(&e, &k, &GazeGeometryConfig::default()).expect("gaze");
        assert_relative_eq!(est.point_mm[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(est.point_mm[1], 0.0, epsilon = 1e-9);
        assert_relative_eq!(est.limbus.normal.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn solver_is_deterministic() {
        let e = Ellipse {
            center: [400.0, 300.0],
            width: 64.0,
            height: 51.0,
            angle: 112.0,
        };
        let a = solve_gaze(&e, &camera(), &GazeGeometryConfig::default());
        let b = solve_gaze(&e, &camera(), &GazeGeometryConfig::default());
        assert_eq!(a, b);
    }

    #[test]
    fn degenerate_inputs_yield_none() {
        let bad = Ellipse {
            center: [1.0, 1.0],
            width: 0.0,
            height: 0.0,
            angle: 0.0,
        };
        assert!(solve_gaze(&bad, &camera(), &GazeGeometryConfig::default()).is_none());
        let e = Ellipse { width: 40.0, height: 30.0, ..bad };
        let k = CameraIntrinsics { fx: 0.0, ..camera() };
        assert!(solve_gaze(&e, &k, &GazeGeometryConfig::default()).is_none());
    }

    #[test]
    fn disambiguation_serializes_snake_case() {
        let s = serde_json::to_string(&Disambiguation::ClosestToCenter).expect("json");
        assert_eq!(s, "\"closest_to_center\"");
    }
}
