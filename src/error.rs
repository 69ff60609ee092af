use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced to the caller. Geometric misses are never errors;
/// they travel as `f64::MAX` distances inside the renderer.
#[derive(Debug, Error)]
pub enum RayError {
    #[error("script file not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("invalid scene: {0}")]
    Scene(String),

    #[error("film shape mismatch: {0:?} vs {1:?}")]
    FilmShapeMismatch(Vec<usize>, Vec<usize>),

    #[error("malformed film file: {0}")]
    FilmFormat(String),

    #[error("malformed model file {path}: {reason}")]
    ModelFormat { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl RayError {
    pub fn scene(msg: impl Into<String>) -> Self {
        RayError::Scene(msg.into())
    }
}
