// Error types for the emotion sampling core

use thiserror::Error;

/// Failure reported by the capture device
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("Camera unavailable: {0}")]
    Unavailable(String),

    #[error("Camera access denied")]
    AccessDenied,
}

/// Failure of the classifier's asset-loading step
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Model loading failed: {0}")]
pub struct ModelLoadError(pub String);

/// Per-frame classifier outcome that produced no probability vector
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("No face detected")]
    NoFaceDetected,

    #[error("Classification failed: {0}")]
    Failed(String),
}

/// Reasons a classifier's probability vector is rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VectorError {
    #[error("missing score for label '{0}'")]
    MissingLabel(&'static str),

    #[error("unknown label '{0}'")]
    UnknownLabel(String),

    #[error("score for '{label}' is not finite")]
    NotFinite { label: String },

    #[error("score {value} for '{label}' is outside [0, 1]")]
    OutOfRange { label: String, value: f32 },

    #[error("expected 7 or 8 logits, got {0}")]
    LogitCount(usize),
}

/// Main error type for the detector and its integration surface
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Camera is not active")]
    CameraInactive,

    #[error("Emotion models are still loading")]
    ModelLoading,

    #[error("Emotion models are unavailable: {0}")]
    ModelUnavailable(String),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for detector operations
pub type Result<T> = std::result::Result<T, DetectorError>;
