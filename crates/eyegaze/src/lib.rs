//! eyegaze: single-camera gaze estimation from the limbus ellipse.
//!
//! Each frame runs through these stages per eye:
//!
//! 1. **Specular** – bright corneal reflections are masked and inpainted.
//! 2. **Eye center** – gradient voting on a downscaled eye crop.
//! 3. **Limbus** – polar resampling plus a Gabor edge filter give one
//!    iris/sclera edge point per surveyed angle.
//! 4. **Eyelid** – a parabola through the eye corners and the upper eyelid
//!    drops candidates hidden by the lid.
//! 5. **Conic** – gradient-aware RANSAC ellipse fit.
//! 6. **Gaze** – limbus pose from the ellipse, ±θ disambiguation and the
//!    screen-plane intersection.
//! 7. **Smoothing** – weighted moving average over recent gaze points.
//!
//! [`GazeTracker`] drives all stages; the stage functions are public for
//! callers who only need part of the pipeline.

mod camera;
mod config;
pub mod conic;
mod error;
mod eye_center;
mod eyelid;
mod gaze;
mod gradient;
mod limbus;
mod pipeline;
mod raster;
mod region;
mod smoothing;
mod specular;

#[cfg(test)]
pub(crate) mod test_utils;

use std::path::Path;

use image::{GrayImage, RgbImage};

pub use camera::{CameraIntrinsics, ScreenGeometry};
pub use config::{EyeSplitConfig, GazeConfig};
pub use conic::{Ellipse, RansacConfig, RansacResult};
pub use error::GazeError;
pub use eye_center::{locate_eye_center, EyeCenterConfig};
pub use eyelid::{
    estimate_upper_eyelid, filter_below_eyelid, find_upper_eyelid_point, guess_eye_corners,
    EyelidConfig, Parabola,
};
pub use gaze::{
    limbus_candidates, solve_gaze, Disambiguation, GazeEstimate, GazeGeometryConfig, Limbus,
};
pub use gradient::GradientField;
pub use limbus::{find_limbus_candidates, GaborParams, LimbusConfig, PolarRemap};
pub use pipeline::{EyeGaze, FrameGaze, GazePoint, GazeTracker};
pub use raster::{equalize_gray, to_gray};
pub use region::Region;
pub use smoothing::{GazeSmoother, SmoothingConfig};
pub use specular::{remove_specular, specular_mask, SpecularConfig};

/// Load an image file as a color frame plus its equalized grayscale
/// counterpart, ready for [`GazeTracker::track`].
pub fn load_frame(path: &Path) -> Result<(RgbImage, GrayImage), GazeError> {
    let frame = image::open(path)?.to_rgb8();
    if frame.width() == 0 || frame.height() == 0 {
        return Err(GazeError::EmptyImage { what: "color" });
    }
    let gray = equalize_gray(&frame);
    Ok((frame, gray))
}
