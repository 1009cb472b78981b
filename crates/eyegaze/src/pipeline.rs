//! Per-frame driver tying the stages together.

use image::{imageops, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GazeConfig;
use crate::conic::{fit_limbus_ellipse, Ellipse, RansacConfig};
use crate::error::GazeError;
use crate::eye_center::locate_eye_center;
use crate::eyelid::{estimate_upper_eyelid, filter_below_eyelid, Parabola};
use crate::gaze::solve_gaze;
use crate::gradient::GradientField;
use crate::limbus::{find_limbus_candidates, PolarRemap};
use crate::raster::{crop_gray, crop_rgb};
use crate::region::Region;
use crate::smoothing::GazeSmoother;
use crate::specular::remove_specular;

/// A gaze point on the screen plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazePoint {
    /// Camera-centered screen-plane millimeters.
    pub mm: [f64; 2],
    /// Screen pixels.
    pub px: [f64; 2],
}

/// Everything measured for one eye in one frame. Positions are full-frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EyeGaze {
    /// Region cut from the eye pair.
    pub coarse_roi: Region,
    /// Eye center from gradient voting.
    pub center: [f64; 2],
    /// Square region around `center` used for the limbus.
    pub roi: Region,
    pub eyelid: Option<Parabola>,
    pub n_candidates: usize,
    /// Candidates left after the eyelid filter.
    pub n_filtered: usize,
    pub ellipse: Option<Ellipse>,
    pub n_inliers: usize,
    pub limbus_center_mm: Option<[f64; 3]>,
    pub limbus_normal: Option<[f64; 3]>,
    pub gaze: Option<GazePoint>,
}

/// Tracker output for one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameGaze {
    pub frame_index: u64,
    /// Image-left eye first. `None` when the eye regions left the frame.
    pub eyes: [Option<EyeGaze>; 2],
    /// Mean of the per-eye gaze points available this frame.
    pub gaze: Option<GazePoint>,
    /// Smoothed gaze; only advances on frames with a gaze point.
    pub smoothed: Option<GazePoint>,
}

impl FrameGaze {
    fn without_eyes(frame_index: u64) -> Self {
        Self {
            frame_index,
            eyes: [None, None],
            gaze: None,
            smoothed: None,
        }
    }
}

/// Stateful gaze tracker. Owns the polar sampling table and the smoother.
pub struct GazeTracker {
    config: GazeConfig,
    remap: PolarRemap,
    smoother: GazeSmoother,
    frame_index: u64,
}

impl GazeTracker {
    pub fn new(config: GazeConfig) -> Self {
        let remap = config.limbus.polar_remap();
        let smoother = GazeSmoother::from_config(&config.smoothing);
        Self {
            config,
            remap,
            smoother,
            frame_index: 0,
        }
    }

    pub fn config(&self) -> &GazeConfig {
        &self.config
    }

    /// Frames seen so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Forget the smoothing history.
    pub fn reset(&mut self) {
        self.smoother.reset();
    }

    /// Track one frame. Invalid frames are logged and yield `None`, as does
    /// a missing eye pair.
    pub fn track(
        &mut self,
        frame: &RgbImage,
        gray: &GrayImage,
        eye_pair: Option<Region>,
    ) -> Option<FrameGaze> {
        match self.try_track(frame, gray, eye_pair) {
            Ok(out) => out,
            Err(err) => {
                warn!(%err, "frame rejected");
                None
            }
        }
    }

    /// Track one frame, reporting contract violations as errors.
    ///
    /// `gray` is the grayscale (typically equalized) counterpart of `frame`;
    /// see [`crate::equalize_gray`].
    pub fn try_track(
        &mut self,
        frame: &RgbImage,
        gray: &GrayImage,
        eye_pair: Option<Region>,
    ) -> Result<Option<FrameGaze>, GazeError> {
        check_frames(frame, gray)?;
        let index = self.frame_index;
        self.frame_index += 1;

        let Some(pair) = eye_pair else {
            debug!(frame = index, "no eye pair");
            return Ok(None);
        };
        let (w, h) = frame.dimensions();
        if pair.is_empty() || !pair.fits_within(w, h) {
            debug!(frame = index, ?pair, "eye pair outside the frame");
            return Ok(Some(FrameGaze::without_eyes(index)));
        }

        let coarse = self.config.eye_split.split(&pair);
        if coarse.iter().any(Region::is_empty) {
            return Ok(Some(FrameGaze::without_eyes(index)));
        }

        // Specular-free copy of the frame; both stages below read from it.
        let mut working = frame.clone();
        let mut centers = [[0.0; 2]; 2];
        for (center, roi) in centers.iter_mut().zip(&coarse) {
            let cleaned = remove_specular(&crop_rgb(frame, roi), &self.config.specular);
            let c = locate_eye_center(&cleaned, &self.config.eye_center);
            *center = [c[0] + roi.x as f64, c[1] + roi.y as f64];
            imageops::replace(&mut working, &cleaned, roi.x as i64, roi.y as i64);
        }

        let eye_vec = [
            centers[0][0] - centers[1][0],
            centers[0][1] - centers[1][1],
        ];
        let radius = (eye_vec[0].hypot(eye_vec[1]) * self.config.eye_split.refined_roi_ratio) as u32;
        let rois = centers.map(|c| Region::around([c[0] as i32, c[1] as i32], radius));
        if radius == 0 || rois.iter().any(|r| !r.fits_within(w, h)) {
            debug!(frame = index, ?rois, "refined eye regions out of bounds");
            return Ok(Some(FrameGaze::without_eyes(index)));
        }

        let eyes = [0, 1].map(|i| {
            self.process_eye(
                EyeInput {
                    index: i,
                    coarse_roi: coarse[i],
                    center: centers[i],
                    roi: rois[i],
                    eye_vec,
                },
                &working,
                gray,
                index,
            )
        });

        let points: Vec<[f64; 2]> = eyes.iter().filter_map(|e| e.gaze).map(|g| g.mm).collect();
        let (gaze, smoothed) = if points.is_empty() {
            (None, None)
        } else {
            let n = points.len() as f64;
            let mean = points
                .iter()
                .fold([0.0, 0.0], |acc, p| [acc[0] + p[0] / n, acc[1] + p[1] / n]);
            let s = self.smoother.push(mean);
            (Some(self.gaze_point(mean)), Some(self.gaze_point(s)))
        };
        debug!(frame = index, ?gaze, ?smoothed, "frame tracked");

        let [e0, e1] = eyes;
        Ok(Some(FrameGaze {
            frame_index: index,
            eyes: [Some(e0), Some(e1)],
            gaze,
            smoothed,
        }))
    }

    fn gaze_point(&self, mm: [f64; 2]) -> GazePoint {
        GazePoint {
            mm,
            px: self.config.screen.mm_to_px(mm),
        }
    }

    fn process_eye(
        &self,
        eye: EyeInput,
        working: &RgbImage,
        gray: &GrayImage,
        frame_index: u64,
    ) -> EyeGaze {
        let cfg = &self.config;
        let origin = eye.roi.top_left();
        let color = crop_rgb(working, &eye.roi);

        let candidates = find_limbus_candidates(&color, &self.remap, &cfg.limbus);
        let eyelid = estimate_upper_eyelid(eye.center, eye.eye_vec, &color, &cfg.eyelid);
        let filtered = match &eyelid {
            Some(p) => filter_below_eyelid(&candidates, p, origin),
            None => candidates.clone(),
        };

        let gradients = GradientField::sobel(&crop_gray(gray, &eye.roi));
        let ransac = RansacConfig {
            seed: cfg
                .ransac
                .seed
                .wrapping_add(frame_index.wrapping_mul(2))
                .wrapping_add(eye.index as u64),
            ..cfg.ransac.clone()
        };
        let fit = fit_limbus_ellipse(&filtered, &gradients, &ransac);
        let ellipse = fit.ellipse.map(|e| e.translated(origin));

        let estimate = ellipse
            .as_ref()
            .and_then(|e| solve_gaze(e, &cfg.camera, &cfg.gaze));
        let mut gaze = estimate.map(|est| self.gaze_point(est.point_mm));
        if let (Some(g), Some(margin)) = (gaze, cfg.gaze.max_offscreen_fraction) {
            if !cfg.screen.contains_px(g.px, margin) {
                debug!(eye = eye.index, px = ?g.px, "gaze point far off screen, dropped");
                gaze = None;
            }
        }

        EyeGaze {
            coarse_roi: eye.coarse_roi,
            center: eye.center,
            roi: eye.roi,
            eyelid,
            n_candidates: candidates.len(),
            n_filtered: filtered.len(),
            ellipse,
            n_inliers: fit.inliers.len(),
            limbus_center_mm: estimate.map(|e| e.limbus.center.into()),
            limbus_normal: estimate.map(|e| e.limbus.normal.into()),
            gaze,
        }
    }
}

struct EyeInput {
    index: usize,
    coarse_roi: Region,
    center: [f64; 2],
    roi: Region,
    eye_vec: [f64; 2],
}

fn check_frames(frame: &RgbImage, gray: &GrayImage) -> Result<(), GazeError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(GazeError::EmptyImage { what: "color" });
    }
    if gray.width() == 0 || gray.height() == 0 {
        return Err(GazeError::EmptyImage { what: "grayscale" });
    }
    if frame.dimensions() != gray.dimensions() {
        return Err(GazeError::FrameSizeMismatch {
            color: frame.dimensions(),
            gray: gray.dimensions(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraIntrinsics;
    use crate::raster::equalize_gray;
    use crate::test_utils::draw_eyes;
    use approx::assert_relative_eq;

    const EYES: [[f32; 2]; 2] = [[170.0, 180.0], [470.0, 180.0]];
    const IRIS_RADIUS: f32 = 25.0;

    fn test_config() -> GazeConfig {
        GazeConfig {
            camera: CameraIntrinsics {
                fx: 600.0,
                fy: 600.0,
                cx: 320.0,
                cy: 180.0,
            },
            ..GazeConfig::default()
        }
    }

    fn synthetic_frame() -> (RgbImage, GrayImage) {
        let frame = draw_eyes(640, 360, &EYES, IRIS_RADIUS);
        let gray = equalize_gray(&frame);
        (frame, gray)
    }

    /// Two frontal irises on the principal row look straight at the camera,
    /// so the gaze lands near the screen-plane origin. The tolerance covers
    /// the sensitivity of `acos(minor / major)` for near-circular fits.
    #[test]
    fn synthetic_frame_recovers_gaze() {
        let (frame, gray) = synthetic_frame();
        let mut tracker = GazeTracker::new(test_config());
        let out = tracker
            .track(&frame, &gray, Some(Region::new(70, 130, 500, 100)))
            .expect("frame output");

        for (eye, truth) in out.eyes.iter().zip(EYES) {
            let eye = eye.as_ref().expect("eye processed");
            assert!((eye.center[0] - truth[0] as f64).abs() <= 8.0);
            assert!((eye.center[1] - truth[1] as f64).abs() <= 8.0);
            assert_eq!(eye.n_candidates, 240);
            assert!(eye.n_filtered >= 100, "filtered = {}", eye.n_filtered);

            let e = eye.ellipse.expect("ellipse");
            assert!((e.center[0] - truth[0] as f64).abs() <= 2.0, "{e:?}");
            assert!((e.center[1] - truth[1] as f64).abs() <= 2.0, "{e:?}");
            assert!((e.width - 2.0 * IRIS_RADIUS as f64).abs() <= 3.0, "{e:?}");

            let c = eye.limbus_center_mm.expect("limbus");
            assert!((c[2] - 144.0).abs() <= 10.0, "depth {}", c[2]);
            let g = eye.gaze.expect("gaze");
            assert!(g.mm[0].hypot(g.mm[1]) <= 60.0, "gaze {:?}", g.mm);
        }

        let gaze = out.gaze.expect("mean gaze");
        let smoothed = out.smoothed.expect("smoothed gaze");
        assert_relative_eq!(smoothed.mm[0], gaze.mm[0] / 5.0, epsilon = 1e-9);
        assert_relative_eq!(smoothed.mm[1], gaze.mm[1] / 5.0, epsilon = 1e-9);
        assert_eq!(tracker.frame_index(), 1);
    }

    #[test]
    fn tracking_is_repeatable() {
        let (frame, gray) = synthetic_frame();
        let pair = Some(Region::new(70, 130, 500, 100));
        let mut a = GazeTracker::new(test_config());
        let mut b = GazeTracker::new(test_config());
        let ra = a.track(&frame, &gray, pair).expect("a");
        let rb = b.track(&frame, &gray, pair).expect("b");
        assert_eq!(ra.gaze, rb.gaze);
    }

    #[test]
    fn reset_restarts_the_smoothing_warm_up() {
        let (frame, gray) = synthetic_frame();
        let pair = Some(Region::new(70, 130, 500, 100));
        let mut tracker = GazeTracker::new(test_config());

        let first = tracker.track(&frame, &gray, pair).expect("first");
        let second = tracker.track(&frame, &gray, pair).expect("second");
        let g1 = first.gaze.expect("first gaze");
        let g2 = second.gaze.expect("second gaze");
        let s2 = second.smoothed.expect("second smoothed");
        for k in 0..2 {
            let expected = (9.0 * g2.mm[k] + 8.0 * g1.mm[k]) / 45.0;
            assert_relative_eq!(s2.mm[k], expected, epsilon = 1e-9);
        }

        tracker.reset();
        let third = tracker.track(&frame, &gray, pair).expect("third");
        let g3 = third.gaze.expect("third gaze");
        let s3 = third.smoothed.expect("third smoothed");
        for k in 0..2 {
            assert_relative_eq!(s3.mm[k], g3.mm[k] / 5.0, epsilon = 1e-9);
        }
        assert_eq!(third.frame_index, 2);
    }

    #[test]
    fn missing_eye_pair_yields_none() {
        let (frame, gray) = synthetic_frame();
        let mut tracker = GazeTracker::new(test_config());
        assert!(tracker.track(&frame, &gray, None).is_none());
        assert_eq!(tracker.frame_index(), 1);
    }

    #[test]
    fn eyes_near_the_border_skip_both() {
        let frame = draw_eyes(640, 360, &[[170.0, 30.0], [470.0, 30.0]], IRIS_RADIUS);
        let gray = equalize_gray(&frame);
        let mut tracker = GazeTracker::new(test_config());
        let out = tracker
            .track(&frame, &gray, Some(Region::new(70, 0, 500, 60)))
            .expect("frame output");
        assert!(out.eyes.iter().all(Option::is_none));
        assert!(out.smoothed.is_none());
    }

    #[test]
    fn contract_violations_are_errors() {
        let (frame, _) = synthetic_frame();
        let mut tracker = GazeTracker::new(GazeConfig::default());
        let small = GrayImage::new(10, 10);
        let err = tracker.try_track(&frame, &small, None).unwrap_err();
        assert!(matches!(err, GazeError::FrameSizeMismatch { .. }));

        let empty = RgbImage::new(0, 0);
        let err = tracker
            .try_track(&empty, &GrayImage::new(0, 0), None)
            .unwrap_err();
        assert!(matches!(err, GazeError::EmptyImage { what: "color" }));
        assert!(tracker.track(&frame, &small, None).is_none());
    }

    #[test]
    fn offscreen_gate_drops_gaze() {
        let (frame, gray) = synthetic_frame();
        let mut cfg = test_config();
        // move the camera far outside the screen so every gaze point is off it
        cfg.screen.camera_offset_mm = [5000.0, 5000.0];
        cfg.gaze.max_offscreen_fraction = Some(0.1);
        let mut tracker = GazeTracker::new(cfg);
        let out = tracker
            .track(&frame, &gray, Some(Region::new(70, 130, 500, 100)))
            .expect("frame output");
        for eye in out.eyes.iter().flatten() {
            assert!(eye.ellipse.is_some());
            assert!(eye.gaze.is_none());
        }
        assert!(out.smoothed.is_none());
    }
}
