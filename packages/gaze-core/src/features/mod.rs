//! Session-level feature extraction.
//!
//! Turns an ordered gaze trace into a fixed set of named features grouped
//! into four families: kinematic statistics, event counts, scanpath shape
//! and spectral descriptors. Extraction is total: any degenerate
//! computation yields `0.0` for the affected feature.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::events::{
    step_velocities, AdaptiveThresholdDetector, DetectorKind, EventCounters, EventDetector,
    FixedThresholdDetector,
};
use crate::geometry::convex_hull_area;
use crate::sanitize::finite_or_zero;
use crate::signal::{detrend_endpoints, savgol_filter, welch_psd};
use crate::stats::{kurtosis, mean, shannon_entropy_bits, skewness, std_dev};
use crate::types::{GazeSample, ScreenGeometry, MIN_TIME_STEP};

// ==================== Feature names ====================

/// Canonical feature order; training fixes this as the model input layout.
pub const FEATURE_NAMES: [&str; 20] = [
    "mean_x",
    "mean_y",
    "std_x",
    "std_y",
    "mean_velocity",
    "velocity_std",
    "velocity_skewness",
    "velocity_kurtosis",
    "mean_acceleration",
    "acceleration_std",
    "fixation_count",
    "saccade_count",
    "smooth_pursuit_ratio",
    "fixation_saccade_ratio",
    "path_efficiency",
    "exploration_area",
    "scanpath_entropy",
    "x_spectral_entropy",
    "y_spectral_entropy",
    "dominant_frequency",
];

pub fn canonical_feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

// ==================== Feature vector ====================

/// Named feature values for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    values: BTreeMap<String, f64>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// All canonical features set to zero.
    pub fn zeros() -> Self {
        let mut v = Self::new();
        for name in FEATURE_NAMES {
            v.insert(name, 0.0);
        }
        v
    }

    pub fn insert(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Values laid out in `names` order; absent features are `0.0`.
    pub fn to_ordered(&self, names: &[String]) -> Vec<f64> {
        names
            .iter()
            .map(|name| self.values.get(name).copied().unwrap_or(0.0))
            .collect()
    }
}

impl FromIterator<(String, f64)> for FeatureVector {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

// ==================== Configuration ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureExtractorConfig {
    /// Sessions shorter than this produce an empty feature set.
    pub min_samples: usize,
    /// Spectral features need at least this many samples.
    pub min_spectral_samples: usize,
    pub velocity_window: usize,
    pub velocity_order: usize,
    pub acceleration_window: usize,
    pub acceleration_order: usize,
    pub histogram_bins: usize,
    pub screen: ScreenGeometry,
    pub detector: DetectorKind,
}

impl Default for FeatureExtractorConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            min_spectral_samples: 20,
            velocity_window: 7,
            velocity_order: 3,
            acceleration_window: 5,
            acceleration_order: 2,
            histogram_bins: 10,
            screen: ScreenGeometry::default(),
            detector: DetectorKind::Adaptive,
        }
    }
}

// ==================== Kinematics ====================

/// Velocity and acceleration series of a session.
#[derive(Debug, Clone, Default)]
pub struct Kinematics {
    /// Smoothed when long enough, otherwise raw.
    pub velocities: Vec<f64>,
    pub accelerations: Vec<f64>,
}

fn smooth_or_raw(series: Vec<f64>, window: usize, order: usize) -> Vec<f64> {
    if series.len() <= window {
        return series;
    }
    savgol_filter(&series, window, order).unwrap_or(series)
}

pub fn compute_kinematics(samples: &[GazeSample], config: &FeatureExtractorConfig) -> Kinematics {
    if samples.len() < 2 {
        return Kinematics::default();
    }
    let velocities = step_velocities(samples);

    let accelerations: Vec<f64> = velocities
        .windows(2)
        .zip(samples.windows(2).skip(1))
        .map(|(v, s)| {
            let mut dt = s[1].timestamp - s[0].timestamp;
            if dt <= 0.0 {
                dt = MIN_TIME_STEP;
            }
            (v[1] - v[0]) / dt
        })
        .collect();

    let accelerations = if velocities.len() > config.velocity_window {
        smooth_or_raw(accelerations, config.acceleration_window, config.acceleration_order)
    } else {
        accelerations
    };
    let velocities = smooth_or_raw(velocities, config.velocity_window, config.velocity_order);

    Kinematics {
        velocities,
        accelerations,
    }
}

// ==================== Extractor ====================

pub struct FeatureExtractor {
    config: FeatureExtractorConfig,
    detector: Box<dyn EventDetector>,
}

impl std::fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("config", &self.config)
            .field("detector", &self.detector.name())
            .finish()
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(FeatureExtractorConfig::default())
    }
}

impl FeatureExtractor {
    pub fn new(config: FeatureExtractorConfig) -> Self {
        let detector: Box<dyn EventDetector> = match config.detector {
            DetectorKind::Adaptive => Box::new(AdaptiveThresholdDetector::default()),
            DetectorKind::Fixed => Box::new(FixedThresholdDetector::default()),
        };
        Self { config, detector }
    }

    pub fn with_detector(mut self, detector: Box<dyn EventDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn config(&self) -> &FeatureExtractorConfig {
        &self.config
    }

    /// Features of one session, or an empty vector when the session has
    /// fewer than `min_samples` samples.
    pub fn extract(&self, samples: &[GazeSample]) -> FeatureVector {
        if samples.len() < self.config.min_samples.max(2) {
            return FeatureVector::new();
        }

        let kin = compute_kinematics(samples, &self.config);
        let xs: Vec<f64> = samples.iter().map(|s| s.x).collect();
        let ys: Vec<f64> = samples.iter().map(|s| s.y).collect();

        let mut out = FeatureVector::new();
        self.basic_features(&xs, &ys, &kin, &mut out);
        self.event_features(samples, &kin.velocities, &mut out);
        self.scanpath_features(samples, &mut out);
        self.spectral_features(samples, &xs, &ys, &mut out);

        for name in FEATURE_NAMES {
            let value = out.get(name).map_or(0.0, finite_or_zero);
            out.insert(name, value);
        }
        out
    }

    /// Event counters of a session using the configured detector.
    pub fn detect_events(&self, samples: &[GazeSample]) -> EventCounters {
        let kin = compute_kinematics(samples, &self.config);
        self.detector.detect(samples, &kin.velocities)
    }

    fn basic_features(&self, xs: &[f64], ys: &[f64], kin: &Kinematics, out: &mut FeatureVector) {
        out.insert("mean_x", mean(xs));
        out.insert("mean_y", mean(ys));
        out.insert("std_x", std_dev(xs));
        out.insert("std_y", std_dev(ys));

        let v = &kin.velocities;
        out.insert("mean_velocity", mean(v));
        out.insert("velocity_std", std_dev(v));
        out.insert("velocity_skewness", skewness(v));
        out.insert("velocity_kurtosis", kurtosis(v));

        let a = &kin.accelerations;
        out.insert("mean_acceleration", mean(a));
        out.insert("acceleration_std", std_dev(a));
    }

    fn event_features(&self, samples: &[GazeSample], velocities: &[f64], out: &mut FeatureVector) {
        let counters = if samples.len() < 3 {
            EventCounters::default()
        } else {
            self.detector.detect(samples, velocities)
        };
        out.insert("fixation_count", counters.fixations as f64);
        out.insert("saccade_count", counters.saccades as f64);
        out.insert("smooth_pursuit_ratio", counters.smooth_pursuit_ratio());
        out.insert("fixation_saccade_ratio", counters.fixation_saccade_ratio());
    }

    fn scanpath_features(&self, samples: &[GazeSample], out: &mut FeatureVector) {
        let points: Vec<_> = samples.iter().map(GazeSample::position).collect();

        let total_path: f64 = points.windows(2).map(|w| w[0].distance(&w[1])).sum();
        let efficiency = match (points.first(), points.last()) {
            (Some(first), Some(last)) if total_path > 0.0 => first.distance(last) / total_path,
            _ => 0.0,
        };
        out.insert("path_efficiency", efficiency);
        out.insert("exploration_area", convex_hull_area(&points));
        out.insert("scanpath_entropy", self.spatial_entropy(samples));
    }

    /// Shannon entropy (bits) of a `bins x bins` occupancy histogram over the
    /// screen. Points off screen are ignored; the right/bottom edges are
    /// inclusive.
    fn spatial_entropy(&self, samples: &[GazeSample]) -> f64 {
        let bins = self.config.histogram_bins.max(1);
        let (w, h) = (self.config.screen.width, self.config.screen.height);
        if w <= 0.0 || h <= 0.0 {
            return 0.0;
        }

        let bin_of = |value: f64, extent: f64| -> Option<usize> {
            if !(0.0..=extent).contains(&value) {
                return None;
            }
            let idx = (value / extent * bins as f64) as usize;
            Some(idx.min(bins - 1))
        };

        let mut counts = vec![0.0; bins * bins];
        for s in samples {
            if let (Some(bx), Some(by)) = (bin_of(s.x, w), bin_of(s.y, h)) {
                counts[bx * bins + by] += 1.0;
            }
        }
        shannon_entropy_bits(&counts)
    }

    fn spectral_features(&self, samples: &[GazeSample], xs: &[f64], ys: &[f64], out: &mut FeatureVector) {
        out.insert("x_spectral_entropy", 0.0);
        out.insert("y_spectral_entropy", 0.0);
        out.insert("dominant_frequency", 0.0);

        if samples.len() < self.config.min_spectral_samples {
            return;
        }
        let mean_dt = samples
            .windows(2)
            .map(|w| w[1].timestamp - w[0].timestamp)
            .sum::<f64>()
            / (samples.len() - 1) as f64;
        if !(mean_dt.is_finite() && mean_dt > 0.0) {
            return;
        }
        let fs = 1.0 / mean_dt;

        let (Some(psd_x), Some(psd_y)) = (
            welch_psd(&detrend_endpoints(xs), fs),
            welch_psd(&detrend_endpoints(ys), fs),
        ) else {
            return;
        };

        out.insert("x_spectral_entropy", psd_x.spectral_entropy());
        out.insert("y_spectral_entropy", psd_y.spectral_entropy());
        out.insert("dominant_frequency", psd_x.dominant_frequency());
    }
}
