//! Camera intrinsics and the screen-plane model.

use serde::{Deserialize, Serialize};

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraIntrinsics {
    /// Focal length in x (pixels).
    pub fx: f64,
    /// Focal length in y (pixels).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
}

impl Default for CameraIntrinsics {
    /// Calibration of the ThinkPad Helix front camera at 1280×720.
    fn default() -> Self {
        Self {
            fx: 957.648052597,
            fy: 960.154605354,
            cx: 634.799023712,
            cy: 367.91715841,
        }
    }
}

impl CameraIntrinsics {
    /// Returns `true` when all values are finite and focal lengths non-zero.
    pub fn is_valid(self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    /// Mean focal length, used for depth from apparent size.
    pub fn focal_mean(self) -> f64 {
        0.5 * (self.fx + self.fy)
    }
}

/// Physical and pixel size of the screen, and where the camera sits on it.
///
/// Screen-plane millimeters have their origin at the camera center, x to the
/// right and y down. `camera_offset_mm` is the camera position measured from
/// the screen's top-left corner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScreenGeometry {
    pub size_mm: [f64; 2],
    pub size_px: [f64; 2],
    pub camera_offset_mm: [f64; 2],
}

impl Default for ScreenGeometry {
    fn default() -> Self {
        Self {
            size_mm: [256.0, 144.0],
            size_px: [1920.0, 1080.0],
            camera_offset_mm: [128.0, 155.0],
        }
    }
}

impl ScreenGeometry {
    /// Convert a camera-centered screen-plane point (mm) to screen pixels.
    pub fn mm_to_px(&self, mm: [f64; 2]) -> [f64; 2] {
        [
            (mm[0] + self.camera_offset_mm[0]) / self.size_mm[0] * self.size_px[0],
            (mm[1] + self.camera_offset_mm[1]) / self.size_mm[1] * self.size_px[1],
        ]
    }

    /// Whether `px` lies within `margin` (a fraction of the screen size) of
    /// the visible screen area.
    pub fn contains_px(&self, px: [f64; 2], margin: f64) -> bool {
        (0..2).all(|i| {
            let slack = self.size_px[i] * margin;
            px[i] >= -slack && px[i] <= self.size_px[i] + slack
        })
    }
}
