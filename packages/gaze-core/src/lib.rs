#![deny(clippy::all)]

pub mod calibration;
pub mod config;
pub mod dataset;
pub mod ensemble;
pub mod error;
pub mod events;
pub mod features;
pub mod gaze;
pub mod geometry;
pub mod iris;
pub mod kalman;
pub mod matrix;
pub mod models;
pub mod pipeline;
pub mod sanitize;
pub mod signal;
pub mod stats;
pub mod system;
pub mod types;
pub mod vision;

// Re-exports of the main types
pub use calibration::{standard_targets, CalibrationConfig, CalibrationModel, CalibrationPoint};
pub use config::ScreeningConfig;
pub use dataset::{GazeRow, GroupLabel, LabeledSession, TrainingSet};
pub use ensemble::{
    screening_disclaimer, train_ensemble, EnsemblePredictor, ModelBundle, PredictionResult,
    PredictorConfig, RiskLevel, RiskThresholds, TrainingConfig, TrainingReport,
};
pub use error::{CalibrationError, ModelError, PipelineError, SystemError};
pub use events::{
    AdaptiveThresholdDetector, DetectorKind, EventCounters, EventDetector, FixedThresholdDetector,
    GazeEvent, OnlineEventTracker,
};
pub use features::{canonical_feature_names, FeatureExtractor, FeatureExtractorConfig, FeatureVector};
pub use iris::{IrisLocalizer, IrisLocalizerConfig};
pub use kalman::{GazeStateEstimator, KalmanConfig};
pub use models::{Classifier, ModelFamily, TrainedModel};
pub use pipeline::{
    Frame, FrameOutcome, FrameRead, FrameSource, LandmarkSource, ScreeningSession, SessionConfig,
    SessionSummary, StopReason,
};
pub use system::{SessionOutcome, SystemHandle};
pub use types::*;
