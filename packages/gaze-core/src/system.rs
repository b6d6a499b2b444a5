//! Caller-facing facade: owns the training data, the fitted ensemble, the
//! calibration and the gaze filter, and runs sessions end to end.

use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationModel;
use crate::config::ScreeningConfig;
use crate::dataset::TrainingSet;
use crate::ensemble::{train_ensemble, EnsemblePredictor, ModelBundle, PredictionResult, TrainingReport};
use crate::error::{ModelError, SystemError};
use crate::events::{step_velocities, EventDetector, FixedThresholdDetector};
use crate::features::{canonical_feature_names, FeatureExtractor, FeatureVector};
use crate::kalman::GazeStateEstimator;
use crate::pipeline::{live_calibrate, FrameSource, LandmarkSource, ScreeningSession, SessionSummary, StopReason};
use crate::types::{GazeSample, Point2, SessionBuffer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed {
        prediction: PredictionResult,
        features: FeatureVector,
        summary: SessionSummary,
    },
    InsufficientData {
        collected: usize,
        required: usize,
    },
}

#[derive(Debug)]
pub struct SystemHandle {
    config: ScreeningConfig,
    extractor: FeatureExtractor,
    training_data: TrainingSet,
    predictor: EnsemblePredictor,
    calibration: CalibrationModel,
    filter: GazeStateEstimator,
    last_report: Option<TrainingReport>,
}

impl SystemHandle {
    /// Handle over `training_data`; nothing is trained yet.
    pub fn initialize(training_data: TrainingSet, config: ScreeningConfig) -> Self {
        tracing::info!(
            subjects = training_data.len(),
            positives = training_data.positives(),
            "screening system initialised"
        );
        Self {
            extractor: FeatureExtractor::new(config.features.clone()),
            predictor: EnsemblePredictor::new(config.predictor.clone()),
            training_data,
            calibration: CalibrationModel::identity(),
            filter: GazeStateEstimator::new(config.session.kalman.clone()),
            last_report: None,
            config,
        }
    }

    /// Handle whose ensemble comes from a persisted bundle.
    pub fn with_bundle(bundle: ModelBundle, config: ScreeningConfig) -> Result<Self, SystemError> {
        let mut handle = Self::initialize(TrainingSet::default(), config);
        handle.predictor.install(bundle)?;
        Ok(handle)
    }

    pub fn config(&self) -> &ScreeningConfig {
        &self.config
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn is_ready(&self) -> bool {
        self.predictor.is_ready()
    }

    pub fn bundle(&self) -> Option<ModelBundle> {
        self.predictor.to_bundle()
    }

    pub fn last_report(&self) -> Option<&TrainingReport> {
        self.last_report.as_ref()
    }

    /// Extract features for every training subject, fit the ensemble and
    /// install it.
    pub fn train(&mut self) -> Result<TrainingReport, SystemError> {
        if self.training_data.is_empty() {
            return Err(SystemError::NoTrainingData);
        }

        let names = canonical_feature_names();
        let (features, labels) = self.training_data.extract_features(&self.extractor);
        let rows: Vec<Vec<f64>> = features.iter().map(|f| f.to_ordered(&names)).collect();

        let (bundle, report) = train_ensemble(&rows, &labels, names, &self.config.training)?;
        self.predictor.install(bundle)?;

        for model in &report.models {
            tracing::info!(model = %model.name, auc = model.auc, weight = model.weight, "ensemble member");
        }
        self.last_report = Some(report.clone());
        Ok(report)
    }

    pub fn calibration(&self) -> &CalibrationModel {
        &self.calibration
    }

    pub fn set_calibration(&mut self, calibration: CalibrationModel) {
        self.calibration = calibration;
    }

    pub fn tracking_filter(&self) -> &GazeStateEstimator {
        &self.filter
    }

    /// Re-initialise tracking for a new subject: the gaze filter goes back
    /// to its initial state and the calibration to identity.
    pub fn reinitialize_tracking(&mut self) {
        self.filter.reset();
        self.calibration = CalibrationModel::identity();
        tracing::info!("tracking re-initialised");
    }

    /// Run live calibration and keep the result for later sessions. The
    /// gaze filter warmed here carries into the next session.
    pub fn calibrate<S, L, H>(&mut self, source: &mut S, landmarks: &mut L, on_target: H) -> Result<&CalibrationModel, SystemError>
    where
        S: FrameSource + ?Sized,
        L: LandmarkSource + ?Sized,
        H: FnMut(usize, Point2),
    {
        self.calibration = live_calibrate(&self.config.session, source, landmarks, &mut self.filter, on_target)?;
        Ok(&self.calibration)
    }

    /// Capture for at most `max_duration_secs`, then extract features and
    /// predict.
    pub fn run_session<S, L>(
        &mut self,
        source: &mut S,
        landmarks: &mut L,
        max_duration_secs: f64,
        stop: &AtomicBool,
    ) -> Result<SessionOutcome, SystemError>
    where
        S: FrameSource + ?Sized,
        L: LandmarkSource + ?Sized,
    {
        let mut session_config = self.config.session.clone();
        session_config.max_duration_secs = max_duration_secs;
        let mut session = ScreeningSession::new(session_config, &self.calibration, &mut self.filter);
        session.run(source, landmarks, stop)?;
        let (buffer, summary) = session.finish();
        self.score_buffer(&buffer, summary)
    }

    /// Score an already recorded trace.
    pub fn score_recording(&self, samples: &[GazeSample]) -> Result<SessionOutcome, SystemError> {
        let summary = self.recorded_summary(samples);
        self.score_buffer(&SessionBuffer::from_samples(samples.to_vec()), summary)
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<PredictionResult, ModelError> {
        self.predictor.predict(features)
    }

    fn score_buffer(&self, buffer: &SessionBuffer, summary: SessionSummary) -> Result<SessionOutcome, SystemError> {
        let required = self.config.session.min_samples;
        if buffer.len() < required {
            tracing::warn!(collected = buffer.len(), required, "insufficient session data");
            return Ok(SessionOutcome::InsufficientData {
                collected: buffer.len(),
                required,
            });
        }

        let features = self.extractor.extract(buffer.samples());
        let prediction = self.predictor.predict(&features)?;
        tracing::info!(
            probability = prediction.probability,
            risk = %prediction.risk_level,
            "session scored"
        );
        Ok(SessionOutcome::Completed {
            prediction,
            features,
            summary,
        })
    }

    /// Live-style counts for a trace that was not captured by this process.
    fn recorded_summary(&self, samples: &[GazeSample]) -> SessionSummary {
        let detector = FixedThresholdDetector::new(self.config.session.live_detector.clone());
        let counters = detector.detect(samples, &step_velocities(samples));
        let buffer_duration = match (samples.first(), samples.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).max(0.0),
            _ => 0.0,
        };
        SessionSummary {
            samples: samples.len(),
            duration_secs: buffer_duration,
            frames_read: samples.len(),
            no_face_frames: 0,
            timeouts: 0,
            fixations: counters.fixations,
            saccades: counters.saccades,
            smooth_pursuits: counters.smooth_pursuits,
            completeness: if samples.is_empty() { 0.0 } else { 1.0 },
            stop_reason: Some(StopReason::EndOfStream),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::LabeledSession;
    use crate::ensemble::TrainingConfig;
    use crate::models::{ModelConfigs, ModelFamily, RandomForestConfig};

    fn trace(n: usize, speed: f64) -> Vec<GazeSample> {
        (0..n)
            .map(|i| {
                let t = i as f64 / 60.0;
                GazeSample::new(960.0 + speed * (t * 3.0).sin(), 540.0 + speed * (t * 2.0).cos(), t)
            })
            .collect()
    }

    fn quick_config() -> ScreeningConfig {
        let mut config = ScreeningConfig::default();
        config.training = TrainingConfig {
            families: vec![ModelFamily::RandomForest],
            models: ModelConfigs {
                random_forest: RandomForestConfig {
                    n_trees: 10,
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        };
        config.predictor.bootstrap_rounds = 50;
        config
    }

    fn training_set() -> TrainingSet {
        let sessions = (0..20)
            .map(|i| {
                let label = (i % 2) as u8;
                let speed = if label == 1 { 400.0 } else { 20.0 } + i as f64;
                LabeledSession {
                    subject_id: i,
                    label,
                    samples: trace(120, speed),
                }
            })
            .collect();
        TrainingSet::new(sessions)
    }

    #[test]
    fn test_train_without_data_fails() {
        let mut handle = SystemHandle::initialize(TrainingSet::default(), quick_config());
        assert!(matches!(handle.train(), Err(SystemError::NoTrainingData)));
    }

    #[test]
    fn test_predict_before_training_is_not_ready() {
        let handle = SystemHandle::initialize(training_set(), quick_config());
        assert!(!handle.is_ready());
        assert_eq!(
            handle.predict(&FeatureVector::zeros()).unwrap_err(),
            ModelError::NotReady
        );
    }

    #[test]
    fn test_train_then_score_recording() {
        let mut handle = SystemHandle::initialize(training_set(), quick_config());
        let report = handle.train().unwrap();
        assert_eq!(report.models.len(), 1);
        assert!(handle.is_ready());
        assert!(handle.last_report().is_some());

        match handle.score_recording(&trace(300, 410.0)).unwrap() {
            SessionOutcome::Completed {
                prediction,
                features,
                summary,
            } => {
                assert!((0.0..=1.0).contains(&prediction.probability));
                assert_eq!(features.len(), 20);
                assert_eq!(summary.samples, 300);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_short_recording_is_insufficient() {
        let mut handle = SystemHandle::initialize(training_set(), quick_config());
        handle.train().unwrap();
        assert_eq!(
            handle.score_recording(&trace(49, 10.0)).unwrap(),
            SessionOutcome::InsufficientData {
                collected: 49,
                required: 50
            }
        );
    }

    #[test]
    fn test_bundle_round_trip_through_handle() {
        let mut handle = SystemHandle::initialize(training_set(), quick_config());
        handle.train().unwrap();
        let bundle = handle.bundle().unwrap();
        let restored = SystemHandle::with_bundle(bundle, quick_config()).unwrap();
        let features = handle.extractor().extract(&trace(200, 30.0));
        let a = handle.predict(&features).unwrap();
        let b = restored.predict(&features).unwrap();
        assert!((a.probability - b.probability).abs() < 1e-12);
    }
}
