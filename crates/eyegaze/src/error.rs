use thiserror::Error;

/// Errors surfaced by configuration loading, frame I/O and frame contracts.
///
/// Per-frame detection failures are not errors; they show up as `None` or
/// empty results.
#[derive(Debug, Error)]
pub enum GazeError {
    #[error("{what} image is empty")]
    EmptyImage { what: &'static str },

    #[error("color frame is {color:?} but grayscale frame is {gray:?}")]
    FrameSizeMismatch { color: (u32, u32), gray: (u32, u32) },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}
