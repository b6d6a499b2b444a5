//! Fixation / saccade / smooth-pursuit classification.
//!
//! A single two-state machine (`NOT_FIXATING`, `FIXATING`) is driven by
//! per-sample velocities. The two detector strategies differ only in how the
//! velocity thresholds are chosen and in their fixation radius/dwell
//! constants:
//!
//! - [`AdaptiveThresholdDetector`]: thresholds from the session's own velocity
//!   distribution (median + k·IQR). Needs the whole session, so batch only.
//! - [`FixedThresholdDetector`]: constant thresholds, usable sample by sample
//!   during a live session through [`OnlineEventTracker`].
//!
//! Every processed velocity lands in exactly one of `fixation_samples`,
//! `saccades` or `smooth_pursuits`.

use serde::{Deserialize, Serialize};

use crate::stats::{iqr, median};
use crate::types::{GazeSample, Point2, MIN_TIME_STEP};

// ==================== Kinematics ====================

/// Euclidean step distance over elapsed time; a non-positive time step is
/// replaced by `MIN_TIME_STEP`.
#[inline]
pub fn velocity_between(prev: &GazeSample, cur: &GazeSample) -> f64 {
    let mut dt = cur.timestamp - prev.timestamp;
    if dt <= 0.0 {
        dt = MIN_TIME_STEP;
    }
    prev.position().distance(&cur.position()) / dt
}

/// Raw step velocities, `samples.len() - 1` of them.
pub fn step_velocities(samples: &[GazeSample]) -> Vec<f64> {
    samples
        .windows(2)
        .map(|w| velocity_between(&w[0], &w[1]))
        .collect()
}

// ==================== Parameters ====================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityThresholds {
    /// Velocities strictly below this are fixation samples (px/s).
    pub fixation: f64,
    /// Velocities strictly above this are saccade samples (px/s).
    pub saccade: f64,
}

/// How a fixation episode gets counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixationCounting {
    /// When the episode ends, if it lasted longer than the dwell time.
    OnExit,
    /// As soon as the dwell time is exceeded within the radius.
    OnDwell,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixationParams {
    /// Maximum distance from the anchor before the episode breaks (px).
    pub radius: f64,
    /// Minimum episode duration to count as a fixation (s).
    pub min_duration: f64,
    pub counting: FixationCounting,
}

// ==================== Counters ====================

/// Transient fixation-tracking sub-state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FixationState {
    pub is_in_fixation: bool,
    pub fixation_start_time: f64,
    pub fixation_start_pos: Point2,
    pub counted_fixation: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EventCounters {
    pub fixations: u32,
    pub saccades: u32,
    pub smooth_pursuits: u32,
    /// Velocity samples below the fixation threshold.
    pub fixation_samples: u32,
    pub state: FixationState,
}

impl EventCounters {
    /// Number of velocity samples classified so far.
    pub fn classified_samples(&self) -> u32 {
        self.fixation_samples + self.saccades + self.smooth_pursuits
    }

    pub fn smooth_pursuit_ratio(&self) -> f64 {
        let total = self.classified_samples();
        if total == 0 {
            0.0
        } else {
            self.smooth_pursuits as f64 / total as f64
        }
    }

    pub fn fixation_saccade_ratio(&self) -> f64 {
        self.fixations as f64 / self.saccades.max(1) as f64
    }
}

/// Per-sample classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GazeEvent {
    Fixation,
    Saccade,
    SmoothPursuit,
}

// ==================== State machine ====================

/// Session-scoped event state machine. Feed samples in order with
/// [`push`](Self::push) (velocity computed internally) or pre-computed
/// velocities with [`classify`](Self::classify); call
/// [`finish`](Self::finish) once at end of stream.
#[derive(Debug, Clone)]
pub struct OnlineEventTracker {
    thresholds: VelocityThresholds,
    params: FixationParams,
    counters: EventCounters,
    last_sample: Option<GazeSample>,
}

impl OnlineEventTracker {
    pub fn new(thresholds: VelocityThresholds, params: FixationParams) -> Self {
        Self {
            thresholds,
            params,
            counters: EventCounters::default(),
            last_sample: None,
        }
    }

    pub fn counters(&self) -> &EventCounters {
        &self.counters
    }

    pub fn thresholds(&self) -> VelocityThresholds {
        self.thresholds
    }

    /// Zero the counters and clear the fixation state.
    pub fn reset(&mut self) {
        self.counters = EventCounters::default();
        self.last_sample = None;
    }

    /// Classify `sample` against the previous one. The first sample of a
    /// session only primes the tracker.
    pub fn push(&mut self, sample: GazeSample) -> Option<GazeEvent> {
        let event = self
            .last_sample
            .map(|prev| velocity_between(&prev, &sample))
            .map(|velocity| self.classify(velocity, &sample));
        self.last_sample = Some(sample);
        event
    }

    pub fn classify(&mut self, velocity: f64, sample: &GazeSample) -> GazeEvent {
        let now = sample.timestamp;
        let pos = sample.position();

        if velocity < self.thresholds.fixation {
            self.counters.fixation_samples += 1;
            let state = self.counters.state;
            if !state.is_in_fixation {
                self.counters.state = FixationState {
                    is_in_fixation: true,
                    fixation_start_time: now,
                    fixation_start_pos: pos,
                    counted_fixation: false,
                };
            } else if pos.distance(&state.fixation_start_pos) > self.params.radius {
                self.close_fixation(now);
            } else if self.params.counting == FixationCounting::OnDwell
                && !state.counted_fixation
                && now - state.fixation_start_time > self.params.min_duration
            {
                self.counters.fixations += 1;
                self.counters.state.counted_fixation = true;
            }
            GazeEvent::Fixation
        } else if velocity > self.thresholds.saccade {
            self.counters.saccades += 1;
            self.close_fixation(now);
            GazeEvent::Saccade
        } else {
            self.counters.smooth_pursuits += 1;
            self.close_fixation(now);
            GazeEvent::SmoothPursuit
        }
    }

    /// Close an open episode at end of stream.
    pub fn finish(&mut self) -> EventCounters {
        let now = self
            .last_sample
            .map_or(self.counters.state.fixation_start_time, |s| s.timestamp);
        self.close_fixation(now);
        self.counters
    }

    /// Like [`finish`](Self::finish) when samples were fed via `classify`.
    pub fn finish_at(&mut self, timestamp: f64) -> EventCounters {
        self.close_fixation(timestamp);
        self.counters
    }

    fn close_fixation(&mut self, now: f64) {
        let state = self.counters.state;
        if !state.is_in_fixation {
            return;
        }
        if !state.counted_fixation && now - state.fixation_start_time > self.params.min_duration {
            self.counters.fixations += 1;
        }
        self.counters.state = FixationState::default();
    }
}

// ==================== Strategies ====================

/// Strategy interface shared by the batch and live detectors.
pub trait EventDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Thresholds for a session with the given velocity series.
    fn thresholds(&self, velocities: &[f64]) -> VelocityThresholds;

    fn fixation_params(&self) -> FixationParams;

    /// Fresh tracker for a session.
    fn tracker(&self, velocities: &[f64]) -> OnlineEventTracker {
        OnlineEventTracker::new(self.thresholds(velocities), self.fixation_params())
    }

    /// Classify a whole session. `velocities[i - 1]` is the velocity of
    /// `samples[i]`; only `min(samples.len() - 1, velocities.len())` samples
    /// are processed.
    fn detect(&self, samples: &[GazeSample], velocities: &[f64]) -> EventCounters {
        let mut tracker = self.tracker(velocities);
        if samples.len() < 2 {
            return *tracker.counters();
        }
        let steps = (samples.len() - 1).min(velocities.len());
        for i in 1..=steps {
            tracker.classify(velocities[i - 1], &samples[i]);
        }
        tracker.finish_at(samples[steps].timestamp)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveThresholdConfig {
    pub fixation_iqr_factor: f64,
    pub saccade_iqr_factor: f64,
    /// Lower bound on the IQR so a constant-velocity session still has
    /// distinct thresholds.
    pub min_iqr: f64,
    pub radius: f64,
    pub min_duration: f64,
}

impl Default for AdaptiveThresholdConfig {
    fn default() -> Self {
        Self {
            fixation_iqr_factor: 0.5,
            saccade_iqr_factor: 2.5,
            min_iqr: 1e-6,
            radius: 20.0,
            min_duration: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdaptiveThresholdDetector {
    config: AdaptiveThresholdConfig,
}

impl AdaptiveThresholdDetector {
    pub fn new(config: AdaptiveThresholdConfig) -> Self {
        Self { config }
    }
}

impl EventDetector for AdaptiveThresholdDetector {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn thresholds(&self, velocities: &[f64]) -> VelocityThresholds {
        let finite: Vec<f64> = velocities.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return VelocityThresholds {
                fixation: 0.0,
                saccade: 0.0,
            };
        }
        let med = median(&finite);
        let spread = iqr(&finite).max(self.config.min_iqr);
        VelocityThresholds {
            fixation: med + self.config.fixation_iqr_factor * spread,
            saccade: med + self.config.saccade_iqr_factor * spread,
        }
    }

    fn fixation_params(&self) -> FixationParams {
        FixationParams {
            radius: self.config.radius,
            min_duration: self.config.min_duration,
            counting: FixationCounting::OnExit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedThresholdConfig {
    pub fixation_velocity: f64,
    pub saccade_velocity: f64,
    pub radius: f64,
    pub min_duration: f64,
}

impl Default for FixedThresholdConfig {
    fn default() -> Self {
        Self {
            fixation_velocity: 1000.0,
            saccade_velocity: 1500.0,
            radius: 50.0,
            min_duration: 0.15,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixedThresholdDetector {
    config: FixedThresholdConfig,
}

impl FixedThresholdDetector {
    pub fn new(config: FixedThresholdConfig) -> Self {
        Self { config }
    }
}

impl EventDetector for FixedThresholdDetector {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn thresholds(&self, _velocities: &[f64]) -> VelocityThresholds {
        VelocityThresholds {
            fixation: self.config.fixation_velocity,
            saccade: self.config.saccade_velocity,
        }
    }

    fn fixation_params(&self) -> FixationParams {
        FixationParams {
            radius: self.config.radius,
            min_duration: self.config.min_duration,
            counting: FixationCounting::OnDwell,
        }
    }
}

/// Configuration-level choice of detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    #[default]
    Adaptive,
    Fixed,
}

impl DetectorKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "adaptive" => Some(Self::Adaptive),
            "fixed" => Some(Self::Fixed),
            _ => None,
        }
    }
}
