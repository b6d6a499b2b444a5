//! Frame-by-frame screening session: landmarks, iris localisation, gaze
//! mapping, Kalman smoothing, calibration and live event counting.
//!
//! Everything mutable lives in one [`ScreeningSession`] owned by the caller.
//! The Kalman filter is borrowed rather than owned: it belongs to the
//! tracker and carries its state across calibration and successive sessions.
//! Frames are processed strictly one at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::calibration::{standard_targets, CalibrationConfig, CalibrationModel, CalibrationPoint};
use crate::error::PipelineError;
use crate::events::{EventCounters, EventDetector, FixedThresholdConfig, FixedThresholdDetector, GazeEvent, OnlineEventTracker};
use crate::gaze::{extract_eye_region, Eye, GazeMapperConfig, GazeVectorMapper};
use crate::iris::{IrisLocalizer, IrisLocalizerConfig};
use crate::kalman::{GazeStateEstimator, KalmanConfig};
use crate::types::{GazeSample, LandmarkSet, Point2, ScreenGeometry, SessionBuffer, MIN_SESSION_SAMPLES};

// ==================== Collaborator interfaces ====================

#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Capture time in seconds on the source's clock.
    pub timestamp: f64,
}

#[derive(Debug, Clone)]
pub enum FrameRead {
    Frame(Frame),
    Timeout,
    EndOfStream,
}

/// Camera or recorded video. Reads must return within `timeout`.
pub trait FrameSource {
    fn read_frame(&mut self, timeout: Duration) -> Result<FrameRead, PipelineError>;
}

/// Face-mesh detector; `None` when no face is visible.
pub trait LandmarkSource {
    fn landmarks(&mut self, frame: &Frame) -> Option<LandmarkSet>;
}

// ==================== Configuration ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub max_duration_secs: f64,
    /// Upper bound on read attempts, timeouts included.
    pub max_frames: usize,
    pub frame_timeout_ms: u64,
    pub min_samples: usize,
    pub screen: ScreenGeometry,
    pub mapper: GazeMapperConfig,
    pub iris: IrisLocalizerConfig,
    pub kalman: KalmanConfig,
    pub live_detector: FixedThresholdConfig,
    pub calibration: CalibrationConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 120.0,
            max_frames: 7200,
            frame_timeout_ms: 100,
            min_samples: MIN_SESSION_SAMPLES,
            screen: ScreenGeometry::default(),
            mapper: GazeMapperConfig::default(),
            iris: IrisLocalizerConfig::default(),
            kalman: KalmanConfig::default(),
            live_detector: FixedThresholdConfig::default(),
            calibration: CalibrationConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

// ==================== Per-frame gaze ====================

/// Landmarks plus frame to an uncalibrated, unsmoothed screen point.
#[derive(Debug, Clone)]
pub struct FrameGazeEstimator {
    localizer: IrisLocalizer,
    mapper: GazeVectorMapper,
}

impl FrameGazeEstimator {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            localizer: IrisLocalizer::new(config.iris.clone()),
            mapper: GazeVectorMapper::new(config.mapper.clone(), config.screen),
        }
    }

    /// Iris centre of one eye in normalised frame coordinates.
    fn iris_center(&self, image: &RgbImage, landmarks: &LandmarkSet, eye: Eye) -> Option<Point2> {
        let region = extract_eye_region(image, landmarks, eye, self.mapper.config().eye_padding)?;
        let center = self.localizer.localize(&region.image);
        Some(region.to_normalized(center))
    }

    pub fn estimate(&self, frame: &Frame, landmarks: &LandmarkSet) -> Option<Point2> {
        let left = self.iris_center(&frame.image, landmarks, Eye::Left)?;
        let right = self.iris_center(&frame.image, landmarks, Eye::Right)?;
        self.mapper.map(landmarks, left, right)
    }
}

// ==================== Session ====================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// No landmarks; the filter is not advanced.
    NoFace,
    /// Face found but the eyes gave no usable measurement.
    NoMeasurement,
    Sample {
        sample: GazeSample,
        event: Option<GazeEvent>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    DurationElapsed,
    FrameLimit,
    EndOfStream,
    Stopped,
    SourceFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub samples: usize,
    pub duration_secs: f64,
    pub frames_read: usize,
    pub no_face_frames: usize,
    pub timeouts: usize,
    pub fixations: u32,
    pub saccades: u32,
    pub smooth_pursuits: u32,
    /// Samples per frame read.
    pub completeness: f64,
    pub stop_reason: Option<StopReason>,
}

/// State of one screening run. Owns the live event tracker and the sample
/// buffer; borrows the tracker's Kalman filter and the calibration fitted
/// beforehand.
#[derive(Debug)]
pub struct ScreeningSession<'c> {
    config: SessionConfig,
    estimator: FrameGazeEstimator,
    filter: &'c mut GazeStateEstimator,
    tracker: OnlineEventTracker,
    calibration: &'c CalibrationModel,
    buffer: SessionBuffer,
    start_time: Option<f64>,
    frames_read: usize,
    no_face_frames: usize,
    timeouts: usize,
    stop_reason: Option<StopReason>,
}

impl<'c> ScreeningSession<'c> {
    pub fn new(config: SessionConfig, calibration: &'c CalibrationModel, filter: &'c mut GazeStateEstimator) -> Self {
        let detector = FixedThresholdDetector::new(config.live_detector.clone());
        Self {
            estimator: FrameGazeEstimator::new(&config),
            filter,
            tracker: detector.tracker(&[]),
            calibration,
            buffer: SessionBuffer::new(),
            start_time: None,
            frames_read: 0,
            no_face_frames: 0,
            timeouts: 0,
            stop_reason: None,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn buffer(&self) -> &SessionBuffer {
        &self.buffer
    }

    pub fn live_counters(&self) -> &EventCounters {
        self.tracker.counters()
    }

    pub fn process_frame<L>(&mut self, frame: &Frame, landmarks: &mut L) -> FrameOutcome
    where
        L: LandmarkSource + ?Sized,
    {
        self.frames_read += 1;
        let start = *self.start_time.get_or_insert(frame.timestamp);

        let Some(points) = landmarks.landmarks(frame) else {
            self.no_face_frames += 1;
            tracing::trace!(frame = self.frames_read, "no face detected");
            return FrameOutcome::NoFace;
        };
        let Some(raw) = self.estimator.estimate(frame, &points) else {
            return FrameOutcome::NoMeasurement;
        };

        let smoothed = self.filter.update(raw);
        let screen = self.calibration.apply(smoothed);
        if !screen.is_finite() {
            return FrameOutcome::NoMeasurement;
        }

        let sample = GazeSample::new(screen.x, screen.y, frame.timestamp - start);
        self.buffer.push(sample);
        let event = self.tracker.push(sample);
        FrameOutcome::Sample { sample, event }
    }

    /// Read and process frames until the duration or frame budget runs out,
    /// the stream ends, or `stop` is raised. A source that fails before
    /// delivering any frame is an error; a later failure ends the capture.
    pub fn run<S, L>(&mut self, source: &mut S, landmarks: &mut L, stop: &AtomicBool) -> Result<StopReason, PipelineError>
    where
        S: FrameSource + ?Sized,
        L: LandmarkSource + ?Sized,
    {
        let started = Instant::now();
        let timeout = self.config.frame_timeout();
        let max_duration = self.config.max_duration_secs;
        tracing::info!(max_duration, max_frames = self.config.max_frames, "screening session started");

        let reason = loop {
            if stop.load(Ordering::Relaxed) {
                break StopReason::Stopped;
            }
            if self.frames_read + self.timeouts >= self.config.max_frames {
                break StopReason::FrameLimit;
            }
            if started.elapsed().as_secs_f64() >= max_duration {
                break StopReason::DurationElapsed;
            }

            match source.read_frame(timeout) {
                Ok(FrameRead::Frame(frame)) => {
                    let elapsed = self.start_time.map_or(0.0, |t| frame.timestamp - t);
                    if elapsed >= max_duration {
                        break StopReason::DurationElapsed;
                    }
                    self.process_frame(&frame, landmarks);
                }
                Ok(FrameRead::Timeout) => {
                    self.timeouts += 1;
                    tracing::debug!(timeouts = self.timeouts, "frame read timed out");
                }
                Ok(FrameRead::EndOfStream) => break StopReason::EndOfStream,
                Err(e) if self.frames_read == 0 => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "frame source failed, ending capture");
                    break StopReason::SourceFailed;
                }
            }
        };

        self.stop_reason = Some(reason);
        tracing::info!(
            samples = self.buffer.len(),
            frames = self.frames_read,
            reason = ?reason,
            "screening session ended"
        );
        Ok(reason)
    }

    /// Close any open fixation and hand back the samples.
    pub fn finish(mut self) -> (SessionBuffer, SessionSummary) {
        let counters = self.tracker.finish();
        let samples = self.buffer.len();
        let summary = SessionSummary {
            samples,
            duration_secs: self.buffer.duration(),
            frames_read: self.frames_read,
            no_face_frames: self.no_face_frames,
            timeouts: self.timeouts,
            fixations: counters.fixations,
            saccades: counters.saccades,
            smooth_pursuits: counters.smooth_pursuits,
            completeness: if self.frames_read == 0 {
                0.0
            } else {
                samples as f64 / self.frames_read as f64
            },
            stop_reason: self.stop_reason,
        };
        (self.buffer, summary)
    }
}

// ==================== Live calibration ====================

/// Walk the standard targets: call `on_target(index, target)` (showing the
/// target is the caller's job), then read up to `samples_per_point` frames
/// and keep the smoothed, uncalibrated gaze estimates. `filter` keeps its
/// state afterwards so the following session starts warm.
pub fn collect_calibration_points<S, L, H>(
    config: &SessionConfig,
    source: &mut S,
    landmarks: &mut L,
    filter: &mut GazeStateEstimator,
    mut on_target: H,
) -> Result<Vec<CalibrationPoint>, PipelineError>
where
    S: FrameSource + ?Sized,
    L: LandmarkSource + ?Sized,
    H: FnMut(usize, Point2),
{
    let estimator = FrameGazeEstimator::new(config);
    let timeout = config.frame_timeout();
    let targets = standard_targets(&config.screen, config.calibration.edge_inset);
    let mut points = Vec::with_capacity(targets.len());
    let mut any_frame = false;

    'targets: for (index, target) in targets.into_iter().enumerate() {
        on_target(index, target);
        let mut samples = Vec::with_capacity(config.calibration.samples_per_point);
        for _ in 0..config.calibration.samples_per_point {
            match source.read_frame(timeout) {
                Ok(FrameRead::Frame(frame)) => {
                    any_frame = true;
                    if let Some(raw) = landmarks
                        .landmarks(&frame)
                        .and_then(|lm| estimator.estimate(&frame, &lm))
                    {
                        samples.push(filter.update(raw));
                    }
                }
                Ok(FrameRead::Timeout) => {}
                Ok(FrameRead::EndOfStream) => {
                    points.push(CalibrationPoint::new(target, samples));
                    break 'targets;
                }
                Err(e) if !any_frame => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "frame source failed during calibration");
                    points.push(CalibrationPoint::new(target, samples));
                    break 'targets;
                }
            }
        }
        tracing::debug!(point = index, samples = samples.len(), "calibration target done");
        points.push(CalibrationPoint::new(target, samples));
    }

    Ok(points)
}

/// Collect calibration points and fit them, falling back to the identity
/// mapping when too few targets produced samples.
pub fn live_calibrate<S, L, H>(
    config: &SessionConfig,
    source: &mut S,
    landmarks: &mut L,
    filter: &mut GazeStateEstimator,
    on_target: H,
) -> Result<CalibrationModel, PipelineError>
where
    S: FrameSource + ?Sized,
    L: LandmarkSource + ?Sized,
    H: FnMut(usize, Point2),
{
    let points = collect_calibration_points(config, source, landmarks, filter, on_target)?;
    Ok(CalibrationModel::fit_or_identity(&points, &config.calibration))
}
