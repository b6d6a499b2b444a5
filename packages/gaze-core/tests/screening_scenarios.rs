//! End-to-end scenarios through the public API.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use image::{GrayImage, Rgb, RgbImage};

use gaze_core::ensemble::TrainingConfig;
use gaze_core::events::step_velocities;
use gaze_core::models::{GradientBoostingConfig, ModelConfigs, RandomForestConfig};
use gaze_core::{
    standard_targets, CalibrationConfig, CalibrationModel, CalibrationPoint, DetectorKind, EventDetector,
    FeatureExtractor, FeatureExtractorConfig, FeatureVector, FixedThresholdDetector, Frame, FrameRead,
    FrameSource, GazeSample, IrisLocalizer, LabeledSession, LandmarkSet, LandmarkSource, ModelError,
    ModelFamily, PipelineError, Point2, ScreenGeometry, ScreeningConfig, SessionOutcome, SystemHandle,
    TrainingSet, AdaptiveThresholdDetector,
};

const DT: f64 = 1.0 / 60.0;

// ============================================================================
// Fixtures
// ============================================================================

fn oscillating(n: usize, speed: f64) -> Vec<GazeSample> {
    let step = speed * DT;
    (0..n)
        .map(|i| {
            let x = if i % 2 == 0 { 800.0 } else { 800.0 + step };
            GazeSample::new(x, 450.0, i as f64 * DT)
        })
        .collect()
}

fn clusters_and_jumps() -> Vec<GazeSample> {
    let mut samples = Vec::new();
    let mut t = 0.0;
    for cluster in 0..8 {
        let x = 100.0 + cluster as f64 * (2000.0 * DT);
        for _ in 0..25 {
            samples.push(GazeSample::new(x, 300.0, t));
            t += DT;
        }
    }
    samples
}

fn wandering(n: usize, amplitude: f64, phase: f64) -> Vec<GazeSample> {
    (0..n)
        .map(|i| {
            let t = i as f64 * DT;
            GazeSample::new(
                960.0 + amplitude * (2.1 * t + phase).sin(),
                540.0 + amplitude * 0.6 * (1.3 * t).cos(),
                t,
            )
        })
        .collect()
}

fn quick_config() -> ScreeningConfig {
    let mut config = ScreeningConfig::default();
    config.training = TrainingConfig {
        families: vec![ModelFamily::RandomForest, ModelFamily::GradientBoosting],
        models: ModelConfigs {
            random_forest: RandomForestConfig {
                n_trees: 12,
                ..Default::default()
            },
            gradient_boosting: GradientBoostingConfig {
                n_rounds: 15,
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    };
    config.predictor.bootstrap_rounds = 100;
    config
}

fn trained_handle() -> SystemHandle {
    let sessions = (0..24)
        .map(|i| {
            let label = (i % 2) as u8;
            let amplitude = if label == 1 { 500.0 } else { 40.0 } + 3.0 * i as f64;
            LabeledSession {
                subject_id: i,
                label,
                samples: wandering(150, amplitude, i as f64 * 0.3),
            }
        })
        .collect();
    let mut handle = SystemHandle::initialize(TrainingSet::new(sessions), quick_config());
    handle.train().expect("training succeeds on separable sessions");
    handle
}

struct GrayCamera {
    remaining: usize,
    t: f64,
}

impl FrameSource for GrayCamera {
    fn read_frame(&mut self, _timeout: Duration) -> Result<FrameRead, PipelineError> {
        if self.remaining == 0 {
            return Ok(FrameRead::EndOfStream);
        }
        self.remaining -= 1;
        self.t += DT;
        Ok(FrameRead::Frame(Frame {
            image: RgbImage::from_pixel(160, 120, Rgb([120, 120, 120])),
            timestamp: self.t,
        }))
    }
}

struct FixedFace(LandmarkSet);

impl LandmarkSource for FixedFace {
    fn landmarks(&mut self, _frame: &Frame) -> Option<LandmarkSet> {
        Some(self.0.clone())
    }
}

fn face() -> FixedFace {
    let mut points = vec![Point2::new(0.5, 0.5); 478];
    for (eye, c) in [
        (gaze_core::gaze::Eye::Left, Point2::new(0.35, 0.4)),
        (gaze_core::gaze::Eye::Right, Point2::new(0.65, 0.4)),
    ] {
        for (k, &idx) in eye.contour().iter().enumerate() {
            let t = k as f64 / 16.0 * std::f64::consts::TAU;
            points[idx] = Point2::new(c.x + 0.05 * t.cos(), c.y + 0.02 * t.sin());
        }
        let corners = eye.corners();
        points[corners.inner] = Point2::new(c.x - 0.05, c.y);
        points[corners.outer] = Point2::new(c.x + 0.05, c.y);
        points[corners.top] = Point2::new(c.x, c.y - 0.02);
        points[corners.bottom] = Point2::new(c.x, c.y + 0.02);
    }
    FixedFace(LandmarkSet::new(points))
}

// ============================================================================
// Event scenarios
// ============================================================================

#[test]
fn constant_slow_oscillation_is_fixation_without_saccades() {
    let samples = oscillating(200, 100.0);
    for detector in [DetectorKind::Adaptive, DetectorKind::Fixed] {
        let extractor = FeatureExtractor::new(FeatureExtractorConfig {
            detector,
            ..Default::default()
        });
        let features = extractor.extract(&samples);
        assert!(features.get("fixation_count").unwrap() >= 1.0, "{detector:?}");
        assert_eq!(features.get("saccade_count"), Some(0.0), "{detector:?}");
    }
}

#[test]
fn clusters_with_fast_jumps_yield_both_event_kinds() {
    let samples = clusters_and_jumps();
    let velocities = step_velocities(&samples);
    let detectors: Vec<Box<dyn EventDetector>> = vec![
        Box::new(AdaptiveThresholdDetector::default()),
        Box::new(FixedThresholdDetector::default()),
    ];
    for detector in detectors {
        let counters = detector.detect(&samples, &velocities);
        assert!(counters.saccades > 0, "{}", detector.name());
        assert!(counters.fixations > 0, "{}", detector.name());
    }
}

// ============================================================================
// Prediction scenarios
// ============================================================================

#[test]
fn all_zero_features_give_well_formed_result() {
    let handle = trained_handle();
    let result = handle.predict(&FeatureVector::zeros()).unwrap();
    assert!((0.0..=1.0).contains(&result.probability));
    let (lo, hi) = result.confidence_interval;
    assert!(lo <= result.probability && result.probability <= hi);
    assert!((0.0..=1.0).contains(&result.model_agreement));
    assert_eq!(result.model_predictions.len(), 2);
    assert_eq!(result.recommendation, result.risk_level.recommendation());
}

#[test]
fn predict_without_models_reports_not_ready() {
    let handle = SystemHandle::initialize(TrainingSet::default(), quick_config());
    assert_eq!(
        handle.predict(&FeatureVector::zeros()).unwrap_err(),
        ModelError::NotReady
    );
}

#[test]
fn vigorous_and_calm_sessions_are_ranked() {
    let handle = trained_handle();
    let calm = handle.extractor().extract(&wandering(200, 45.0, 0.1));
    let vigorous = handle.extractor().extract(&wandering(200, 520.0, 0.1));
    let p_calm = handle.predict(&calm).unwrap().probability;
    let p_vigorous = handle.predict(&vigorous).unwrap().probability;
    assert!(p_vigorous > p_calm, "calm {p_calm} vigorous {p_vigorous}");
}

#[test]
fn persisted_bundle_scores_identically() {
    let handle = trained_handle();
    let json = handle.bundle().unwrap().to_json().unwrap();
    let bundle = gaze_core::ModelBundle::from_json(&json).unwrap();
    let restored = SystemHandle::with_bundle(bundle, quick_config()).unwrap();

    let features = handle.extractor().extract(&wandering(180, 200.0, 0.5));
    let a = handle.predict(&features).unwrap();
    let b = restored.predict(&features).unwrap();
    assert!((a.probability - b.probability).abs() < 1e-12);
    assert_eq!(a.risk_level, b.risk_level);
}

// ============================================================================
// Pipeline scenarios
// ============================================================================

#[test]
fn live_session_runs_end_to_end() {
    let mut handle = trained_handle();
    let mut camera = GrayCamera { remaining: 90, t: 0.0 };
    let outcome = handle
        .run_session(&mut camera, &mut face(), 120.0, &AtomicBool::new(false))
        .unwrap();
    match outcome {
        SessionOutcome::Completed { summary, features, .. } => {
            assert_eq!(summary.samples, 90);
            assert_eq!(features.len(), 20);
        }
        other => panic!("expected a completed session, got {other:?}"),
    }
}

#[test]
fn short_live_session_is_insufficient() {
    let mut handle = trained_handle();
    let mut camera = GrayCamera { remaining: 30, t: 0.0 };
    let outcome = handle
        .run_session(&mut camera, &mut face(), 120.0, &AtomicBool::new(false))
        .unwrap();
    assert_eq!(
        outcome,
        SessionOutcome::InsufficientData {
            collected: 30,
            required: 50
        }
    );
}

#[test]
fn tracking_filter_carries_across_calibration_and_sessions() {
    let mut handle = trained_handle();
    let mut camera = GrayCamera { remaining: 13 * 30, t: 0.0 };
    let mut shown = 0;
    handle.calibrate(&mut camera, &mut face(), |_, _| shown += 1).unwrap();
    assert_eq!(shown, 13);
    assert_eq!(handle.tracking_filter().update_count(), 13 * 30);

    for (run, expected) in [(1u64, 13 * 30 + 60), (2, 13 * 30 + 120)] {
        let mut camera = GrayCamera { remaining: 60, t: 0.0 };
        handle
            .run_session(&mut camera, &mut face(), 120.0, &AtomicBool::new(false))
            .unwrap();
        assert_eq!(handle.tracking_filter().update_count(), expected, "session {run}");
    }

    handle.reinitialize_tracking();
    assert_eq!(handle.tracking_filter().update_count(), 0);
    assert!(!handle.calibration().is_fitted());
}

#[test]
fn iris_degenerate_inputs_return_origin() {
    let localizer = IrisLocalizer::default();
    assert_eq!(localizer.localize(&GrayImage::new(0, 0)), Point2::ORIGIN);
    assert_eq!(localizer.localize(&GrayImage::new(40, 24)), Point2::ORIGIN);
}

#[test]
fn identity_calibration_round_trip() {
    let config = CalibrationConfig::default();
    let points: Vec<CalibrationPoint> = standard_targets(&ScreenGeometry::default(), 100.0)
        .into_iter()
        .map(|t| CalibrationPoint::new(t, vec![t]))
        .collect();
    let model = CalibrationModel::fit(&points, &config).unwrap();
    for p in [Point2::new(10.0, 10.0), Point2::new(960.0, 540.0), Point2::new(1900.0, 1000.0)] {
        assert!(model.apply(p).distance(&p) < 1e-4);
    }
}
