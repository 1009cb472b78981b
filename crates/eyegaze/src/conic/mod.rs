//! Ellipse / conic fitting primitives.
//!
//! Implements:
//! - Least-squares conic fit on Hartley-normalized coordinates.
//! - Conversion between general conic coefficients and rotated-rectangle ellipses.
//! - Gradient-aware RANSAC used to fit the limbus.

mod fit;
mod ransac;
mod types;

pub use fit::{fit_conic_lsq, fit_ellipse};
pub use ransac::{fit_limbus_ellipse, SAMPLE_SIZE};
pub use types::{
    conic_to_ellipse, ellipse_to_conic, normalize_angle_deg, ConicCoeffs, Ellipse, RansacConfig,
    RansacResult,
};
