//! Binary classifier families behind one capability interface.
//!
//! Every family is trained on standardised feature rows with 0/1 labels and
//! answers `predict_proba` with the positive-class probability. Trained
//! models serialise through the tagged [`TrainedModel`] enum so a bundle can
//! hold any mix of them.

mod boosting;
mod forest;
mod mlp;
mod scaler;
mod svm;
mod tree;

pub use boosting::{GradientBoosting, GradientBoostingConfig};
pub use forest::{RandomForest, RandomForestConfig};
pub use mlp::{MlpClassifier, MlpConfig};
pub use scaler::StandardScaler;
pub use svm::{SvmClassifier, SvmConfig};
pub use tree::{DecisionTree, TreeParams};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Uniform scoring interface; the ensemble never looks past it.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    /// Positive-class probability for one standardised feature row.
    fn predict_proba(&self, features: &[f64]) -> Result<f64, ModelError>;
}

#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

pub(crate) fn check_input(model: &str, expected: usize, features: &[f64]) -> Result<(), ModelError> {
    if features.len() != expected {
        return Err(ModelError::Inference {
            model: model.to_string(),
            reason: ModelError::DimensionMismatch {
                expected,
                actual: features.len(),
            }
            .to_string(),
        });
    }
    if features.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::Inference {
            model: model.to_string(),
            reason: "non-finite input".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn check_training_set(x: &[Vec<f64>], y: &[u8]) -> Result<usize, ModelError> {
    if x.is_empty() || x.len() != y.len() {
        return Err(ModelError::Training(format!(
            "{} rows vs {} labels",
            x.len(),
            y.len()
        )));
    }
    let dim = x[0].len();
    if dim == 0 || x.iter().any(|row| row.len() != dim) {
        return Err(ModelError::Training("ragged or empty feature rows".to_string()));
    }
    Ok(dim)
}

// ==================== Families ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    RandomForest,
    GradientBoosting,
    Svm,
    NeuralNetwork,
}

impl ModelFamily {
    pub const DEFAULT_SET: [ModelFamily; 4] = [
        ModelFamily::RandomForest,
        ModelFamily::GradientBoosting,
        ModelFamily::Svm,
        ModelFamily::NeuralNetwork,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::RandomForest => "RandomForest",
            ModelFamily::GradientBoosting => "GradientBoosting",
            ModelFamily::Svm => "SVM",
            ModelFamily::NeuralNetwork => "NeuralNetwork",
        }
    }
}

/// Hyper-parameters of every family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfigs {
    pub random_forest: RandomForestConfig,
    pub gradient_boosting: GradientBoostingConfig,
    pub svm: SvmConfig,
    pub mlp: MlpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", content = "model")]
pub enum TrainedModel {
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
    Svm(SvmClassifier),
    NeuralNetwork(MlpClassifier),
}

impl TrainedModel {
    pub fn fit(
        family: ModelFamily,
        configs: &ModelConfigs,
        x: &[Vec<f64>],
        y: &[u8],
        seed: u64,
    ) -> Result<Self, ModelError> {
        Ok(match family {
            ModelFamily::RandomForest => {
                TrainedModel::RandomForest(RandomForest::fit(&configs.random_forest, x, y, seed)?)
            }
            ModelFamily::GradientBoosting => TrainedModel::GradientBoosting(GradientBoosting::fit(
                &configs.gradient_boosting,
                x,
                y,
            )?),
            ModelFamily::Svm => TrainedModel::Svm(SvmClassifier::fit(&configs.svm, x, y)?),
            ModelFamily::NeuralNetwork => {
                TrainedModel::NeuralNetwork(MlpClassifier::fit(&configs.mlp, x, y, seed)?)
            }
        })
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            TrainedModel::RandomForest(_) => ModelFamily::RandomForest,
            TrainedModel::GradientBoosting(_) => ModelFamily::GradientBoosting,
            TrainedModel::Svm(_) => ModelFamily::Svm,
            TrainedModel::NeuralNetwork(_) => ModelFamily::NeuralNetwork,
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            TrainedModel::RandomForest(m) => m,
            TrainedModel::GradientBoosting(m) => m,
            TrainedModel::Svm(m) => m,
            TrainedModel::NeuralNetwork(m) => m,
        }
    }
}

impl Classifier for TrainedModel {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64, ModelError> {
        self.inner().predict_proba(features)
    }
}
