use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("insufficient calibration data: need {required} points, got {actual}")]
    InsufficientPoints { required: usize, actual: usize },
    #[error("calibration fit is singular")]
    SingularFit,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("models not ready: no classifier trained or loaded")]
    NotReady,
    #[error("inference failed in {model}: {reason}")]
    Inference { model: String, reason: String },
    #[error("training failed: {0}")]
    Training(String),
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("frame source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("frame source failed: {0}")]
    SourceFailed(String),
}

#[derive(Debug, Error)]
pub enum SystemError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error("no training data available")]
    NoTrainingData,
    #[error("bundle decode failed: {0}")]
    Bundle(#[from] serde_json::Error),
}
