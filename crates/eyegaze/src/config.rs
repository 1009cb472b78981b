//! Tracker configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::camera::{CameraIntrinsics, ScreenGeometry};
use crate::conic::RansacConfig;
use crate::error::GazeError;
use crate::eye_center::EyeCenterConfig;
use crate::eyelid::EyelidConfig;
use crate::gaze::GazeGeometryConfig;
use crate::limbus::LimbusConfig;
use crate::region::Region;
use crate::smoothing::SmoothingConfig;
use crate::specular::SpecularConfig;

/// How the eye-pair rectangle is split into per-eye regions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeSplitConfig {
    /// Horizontal partition of the eye pair: skin, eye, nose bridge, eye, skin.
    pub part_ratios: [f64; 5],
    /// Refined ROI radius as a fraction of the inter-eye distance.
    pub refined_roi_ratio: f64,
}

impl Default for EyeSplitConfig {
    fn default() -> Self {
        Self {
            part_ratios: [0.05, 0.3, 0.3, 0.3, 0.05],
            refined_roi_ratio: 0.15,
        }
    }
}

impl EyeSplitConfig {
    /// Coarse regions of the image-left and image-right eye.
    pub fn split(&self, eye_pair: &Region) -> [Region; 2] {
        let w = eye_pair.width as f64;
        let r = &self.part_ratios;
        let region = |start: f64, len: f64| {
            Region::new(
                eye_pair.x + (w * start).round() as i32,
                eye_pair.y,
                (w * len).round() as u32,
                eye_pair.height,
            )
        };
        [
            region(r[0], r[1]),
            region(r[0] + r[1] + r[2], r[3]),
        ]
    }
}

/// Full tracker configuration. Every section falls back to its defaults when
/// missing from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    pub eye_split: EyeSplitConfig,
    pub eye_center: EyeCenterConfig,
    pub specular: SpecularConfig,
    pub limbus: LimbusConfig,
    pub eyelid: EyelidConfig,
    pub ransac: RansacConfig,
    pub camera: CameraIntrinsics,
    pub screen: ScreenGeometry,
    pub gaze: GazeGeometryConfig,
    pub smoothing: SmoothingConfig,
}

impl GazeConfig {
    pub fn from_json_str(s: &str) -> Result<Self, GazeError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, GazeError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn to_json_pretty(&self) -> Result<String, GazeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
