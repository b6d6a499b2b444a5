use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::metrics::{compute_auc, normalize_weights, stratified_split};
use super::ModelBundle;
use crate::error::ModelError;
use crate::models::{Classifier, ModelConfigs, ModelFamily, StandardScaler, TrainedModel};
use crate::sanitize::{sanitize_feature_vector, sanitize_raw_features};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub families: Vec<ModelFamily>,
    pub models: ModelConfigs,
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            families: ModelFamily::DEFAULT_SET.to_vec(),
            models: ModelConfigs::default(),
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Drop or re-add the feed-forward network.
    pub fn with_neural_network(mut self, include: bool) -> Self {
        self.families.retain(|f| *f != ModelFamily::NeuralNetwork);
        if include {
            self.families.push(ModelFamily::NeuralNetwork);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReport {
    pub name: String,
    pub auc: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub models: Vec<ModelReport>,
    /// `(family name, reason)` for families that failed to train.
    pub failures: Vec<(String, String)>,
    pub train_size: usize,
    pub test_size: usize,
}

impl TrainingReport {
    pub fn auc_of(&self, name: &str) -> Option<f64> {
        self.models.iter().find(|m| m.name == name).map(|m| m.auc)
    }
}

/// Fit every configured family on a stratified split of `rows`, score each on
/// the held-out part and weight it by its AUC.
pub fn train_ensemble(
    rows: &[Vec<f64>],
    labels: &[u8],
    feature_names: Vec<String>,
    config: &TrainingConfig,
) -> Result<(ModelBundle, TrainingReport), ModelError> {
    if rows.is_empty() || rows.len() != labels.len() {
        return Err(ModelError::Training(format!(
            "{} feature rows vs {} labels",
            rows.len(),
            labels.len()
        )));
    }
    if let Some(bad) = rows.iter().find(|r| r.len() != feature_names.len()) {
        return Err(ModelError::DimensionMismatch {
            expected: feature_names.len(),
            actual: bad.len(),
        });
    }

    let clean: Vec<Vec<f64>> = rows
        .iter()
        .map(|r| {
            let mut r = r.clone();
            sanitize_raw_features(&mut r);
            r
        })
        .collect();

    let (train_idx, test_idx) = stratified_split(labels, config.test_fraction, config.seed);
    let train_raw: Vec<Vec<f64>> = train_idx.iter().map(|&i| clean[i].clone()).collect();
    let train_y: Vec<u8> = train_idx.iter().map(|&i| labels[i]).collect();

    let scaler = StandardScaler::fit(&train_raw)?;
    let scale = |raw: &Vec<f64>| -> Result<Vec<f64>, ModelError> {
        let mut scaled = scaler.transform(raw)?;
        sanitize_feature_vector(&mut scaled);
        Ok(scaled)
    };
    let train_x = train_raw.iter().map(scale).collect::<Result<Vec<_>, _>>()?;
    let test_x = test_idx
        .iter()
        .map(|&i| scale(&clean[i]))
        .collect::<Result<Vec<_>, _>>()?;
    let test_y: Vec<u8> = test_idx.iter().map(|&i| labels[i]).collect();

    tracing::info!(
        train = train_x.len(),
        test = test_x.len(),
        families = config.families.len(),
        "training ensemble"
    );

    // One independent fit per family; each writes only its own slot.
    let outcomes: Vec<(ModelFamily, Result<(TrainedModel, f64), ModelError>)> = config
        .families
        .par_iter()
        .map(|&family| {
            let fitted = TrainedModel::fit(family, &config.models, &train_x, &train_y, config.seed)
                .and_then(|model| {
                    let scores = test_x
                        .iter()
                        .map(|row| model.predict_proba(row))
                        .collect::<Result<Vec<f64>, _>>()?;
                    let auc = compute_auc(&scores, &test_y);
                    Ok((model, auc))
                });
            (family, fitted)
        })
        .collect();

    let mut models = Vec::new();
    let mut aucs = Vec::new();
    let mut failures = Vec::new();
    for (family, outcome) in outcomes {
        match outcome {
            Ok((model, auc)) => {
                tracing::info!(model = family.name(), auc, "model trained");
                models.push(model);
                aucs.push(auc);
            }
            Err(e) => {
                tracing::warn!(model = family.name(), error = %e, "model training failed, skipping");
                failures.push((family.name().to_string(), e.to_string()));
            }
        }
    }

    if models.is_empty() {
        return Err(ModelError::Training("no classifier could be trained".to_string()));
    }

    let weights = normalize_weights(&aucs);
    let report = TrainingReport {
        models: models
            .iter()
            .zip(aucs.iter().zip(&weights))
            .map(|(m, (&auc, &weight))| ModelReport {
                name: m.name().to_string(),
                auc,
                weight,
            })
            .collect(),
        failures,
        train_size: train_x.len(),
        test_size: test_x.len(),
    };

    let bundle = ModelBundle {
        feature_names,
        scaler,
        models,
        weights,
    };
    Ok((bundle, report))
}
