//! Weighted ensemble over the classifier families: AUC-weighted blending,
//! inter-model agreement, a noise bootstrap interval and risk banding.

mod metrics;
mod training;

pub use metrics::{compute_auc, normalize_weights, stratified_split};
pub use training::{train_ensemble, ModelReport, TrainingConfig, TrainingReport};

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::features::FeatureVector;
use crate::models::{Classifier, StandardScaler, TrainedModel};
use crate::sanitize::{sanitize_feature_vector, sanitize_probability, sanitize_raw_features};
use crate::stats::{percentile, sample_standard_normal, std_dev};

/// Probability substituted for a model that fails to score.
pub const NEUTRAL_PROBABILITY: f64 = 0.5;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

pub const SCREENING_DISCLAIMER: &str = "This is a screening aid, not a diagnosis. \
Results must be reviewed by a qualified clinician alongside a comprehensive developmental evaluation.";

pub fn screening_disclaimer() -> &'static str {
    SCREENING_DISCLAIMER
}

// ==================== Risk ====================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Probabilities below this are low risk.
    pub low: f64,
    /// Probabilities at or above this are high risk.
    pub high: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self { low: 0.3, high: 0.6 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "LOW RISK")]
    Low,
    #[serde(rename = "MODERATE RISK")]
    Moderate,
    #[serde(rename = "HIGH RISK")]
    High,
}

impl RiskLevel {
    pub fn from_probability(p: f64, thresholds: &RiskThresholds) -> Self {
        if p < thresholds.low {
            RiskLevel::Low
        } else if p < thresholds.high {
            RiskLevel::Moderate
        } else {
            RiskLevel::High
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW RISK",
            RiskLevel::Moderate => "MODERATE RISK",
            RiskLevel::High => "HIGH RISK",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Continue routine developmental monitoring",
            RiskLevel::Moderate => "Consider developmental screening with pediatrician",
            RiskLevel::High => "Refer to autism specialist for comprehensive evaluation",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ==================== Result ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub probability: f64,
    /// 2.5th / 97.5th percentile of the bootstrap blends.
    pub confidence_interval: (f64, f64),
    pub uncertainty_std: f64,
    pub model_agreement: f64,
    pub model_predictions: BTreeMap<String, f64>,
    pub risk_level: RiskLevel,
    pub recommendation: String,
}

// ==================== Bundle ====================

/// Everything needed to score a feature vector; `models[i]` carries
/// `weights[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub feature_names: Vec<String>,
    pub scaler: StandardScaler,
    pub models: Vec<TrainedModel>,
    pub weights: Vec<f64>,
}

impl ModelBundle {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ==================== Predictor ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    pub bootstrap_rounds: usize,
    /// Standard deviation of the noise added to the standardised vector.
    pub noise_std: f64,
    pub seed: u64,
    pub risk: RiskThresholds,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            bootstrap_rounds: 1000,
            noise_std: 0.01,
            seed: 42,
            risk: RiskThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnsemblePredictor {
    config: PredictorConfig,
    feature_names: Vec<String>,
    scaler: Option<StandardScaler>,
    models: Vec<TrainedModel>,
    weights: Vec<f64>,
}

impl EnsemblePredictor {
    /// Predictor with no models; `predict` reports `NotReady` until a bundle
    /// is installed.
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn from_bundle(bundle: ModelBundle, config: PredictorConfig) -> Result<Self, ModelError> {
        let mut predictor = Self::new(config);
        predictor.install(bundle)?;
        Ok(predictor)
    }

    /// Replace the current models. Weights are renormalised if they drift
    /// from summing to one.
    pub fn install(&mut self, bundle: ModelBundle) -> Result<(), ModelError> {
        if bundle.models.len() != bundle.weights.len() {
            return Err(ModelError::Training(format!(
                "{} models but {} weights",
                bundle.models.len(),
                bundle.weights.len()
            )));
        }
        if bundle.scaler.dim() != bundle.feature_names.len() {
            return Err(ModelError::DimensionMismatch {
                expected: bundle.feature_names.len(),
                actual: bundle.scaler.dim(),
            });
        }

        let sum: f64 = bundle.weights.iter().sum();
        let weights = if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE
            || bundle.weights.iter().any(|w| !w.is_finite() || *w < 0.0)
        {
            tracing::warn!(sum, "bundle weights not normalised, renormalising");
            normalize_weights(&bundle.weights)
        } else {
            bundle.weights
        };

        tracing::info!(
            models = bundle.models.len(),
            features = bundle.feature_names.len(),
            "ensemble installed"
        );
        self.feature_names = bundle.feature_names;
        self.scaler = Some(bundle.scaler);
        self.models = bundle.models;
        self.weights = weights;
        Ok(())
    }

    pub fn to_bundle(&self) -> Option<ModelBundle> {
        let scaler = self.scaler.clone()?;
        if self.models.is_empty() {
            return None;
        }
        Some(ModelBundle {
            feature_names: self.feature_names.clone(),
            scaler,
            models: self.models.clone(),
            weights: self.weights.clone(),
        })
    }

    pub fn is_ready(&self) -> bool {
        self.scaler.is_some() && !self.models.is_empty()
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// `(model name, weight)` pairs.
    pub fn weights(&self) -> Vec<(&str, f64)> {
        self.models
            .iter()
            .zip(&self.weights)
            .map(|(m, &w)| (m.name(), w))
            .collect()
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<PredictionResult, ModelError> {
        let scaler = match &self.scaler {
            Some(s) if !self.models.is_empty() => s,
            _ => return Err(ModelError::NotReady),
        };

        let mut raw = features.to_ordered(&self.feature_names);
        sanitize_raw_features(&mut raw);
        let mut scaled = scaler.transform(&raw)?;
        sanitize_feature_vector(&mut scaled);

        let probs: Vec<f64> = self
            .models
            .iter()
            .map(|model| match model.predict_proba(&scaled) {
                Ok(p) => sanitize_probability(p),
                Err(e) => {
                    tracing::warn!(model = model.name(), error = %e, "inference failed, using neutral probability");
                    NEUTRAL_PROBABILITY
                }
            })
            .collect();
        let probability = sanitize_probability(self.blend(&probs));

        let uncertainty_std = std_dev(&probs);
        let model_agreement = 1.0 - uncertainty_std;
        let confidence_interval = self.bootstrap_interval(&scaled, probability);

        let risk_level = RiskLevel::from_probability(probability, &self.config.risk);
        let model_predictions = self
            .models
            .iter()
            .zip(&probs)
            .map(|(m, &p)| (m.name().to_string(), p))
            .collect();

        Ok(PredictionResult {
            probability,
            confidence_interval,
            uncertainty_std,
            model_agreement,
            model_predictions,
            risk_level,
            recommendation: risk_level.recommendation().to_string(),
        })
    }

    fn blend(&self, probs: &[f64]) -> f64 {
        probs.iter().zip(&self.weights).map(|(p, w)| p * w).sum()
    }

    /// Blend for a perturbed vector; failures fall back silently.
    fn blend_quiet(&self, scaled: &[f64]) -> f64 {
        let probs: Vec<f64> = self
            .models
            .iter()
            .map(|m| m.predict_proba(scaled).map_or(NEUTRAL_PROBABILITY, sanitize_probability))
            .collect();
        self.blend(&probs)
    }

    /// Percentile interval of blends over noisy copies of `scaled`, widened
    /// if needed so it always contains `point`.
    fn bootstrap_interval(&self, scaled: &[f64], point: f64) -> (f64, f64) {
        let rounds = self.config.bootstrap_rounds;
        if rounds == 0 {
            return (point, point);
        }
        let noise = self.config.noise_std;
        let seed = self.config.seed;

        let blends: Vec<f64> = (0..rounds)
            .into_par_iter()
            .map(|round| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(round as u64));
                let noisy: Vec<f64> = scaled
                    .iter()
                    .map(|v| v + noise * sample_standard_normal(&mut rng))
                    .collect();
                self.blend_quiet(&noisy)
            })
            .collect();

        let lo = sanitize_probability(percentile(&blends, 2.5));
        let hi = sanitize_probability(percentile(&blends, 97.5));
        (lo.min(point), hi.max(point))
    }
}

/// Verdict from mean gaze velocity alone: 1.0 above `threshold` px/s,
/// otherwise 0.0.
#[deprecated(note = "ignores the trained ensemble; use EnsemblePredictor::predict")]
pub fn legacy_vigorous_motion_verdict(features: &FeatureVector, threshold: f64) -> f64 {
    match features.get("mean_velocity") {
        Some(v) if v > threshold => 1.0,
        _ => 0.0,
    }
}

pub const LEGACY_VIGOROUS_THRESHOLD: f64 = 1000.0;
