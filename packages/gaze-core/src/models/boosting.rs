use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::tree::{DecisionTree, TreeParams};
use super::{check_input, check_training_set, sigmoid, Classifier};
use crate::error::ModelError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    pub n_rounds: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_rounds: 150,
            learning_rate: 0.1,
            max_depth: 6,
            min_samples_split: 5,
            min_samples_leaf: 1,
        }
    }
}

/// Log-loss gradient boosting with one Newton step per leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    init_score: f64,
    learning_rate: f64,
    trees: Vec<DecisionTree>,
    n_features: usize,
}

const PRIOR_CLAMP: f64 = 1e-6;

impl GradientBoosting {
    pub fn fit(config: &GradientBoostingConfig, x: &[Vec<f64>], y: &[u8]) -> Result<Self, ModelError> {
        let n_features = check_training_set(x, y)?;
        let n = x.len();
        let labels: Vec<f64> = y.iter().map(|&v| f64::from(v)).collect();

        let prior = (labels.iter().sum::<f64>() / n as f64).clamp(PRIOR_CLAMP, 1.0 - PRIOR_CLAMP);
        let init_score = (prior / (1.0 - prior)).ln();
        let mut scores = vec![init_score; n];

        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: None,
        };
        // Every candidate feature is scanned, so the generator is never drawn from.
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut trees = Vec::with_capacity(config.n_rounds);

        for _ in 0..config.n_rounds {
            let probs: Vec<f64> = scores.iter().map(|&s| sigmoid(s)).collect();
            let residuals: Vec<f64> = labels.iter().zip(&probs).map(|(y, p)| y - p).collect();
            let hessians: Vec<f64> = probs.iter().map(|p| p * (1.0 - p)).collect();

            let newton_step = |idx: &[usize]| {
                let num: f64 = idx.iter().map(|&i| residuals[i]).sum();
                let den: f64 = idx.iter().map(|&i| hessians[i]).sum();
                if den.abs() < 1e-12 {
                    0.0
                } else {
                    num / den
                }
            };

            let tree = DecisionTree::fit(x, &residuals, (0..n).collect(), &params, &mut rng, &newton_step);
            for (score, row) in scores.iter_mut().zip(x) {
                *score += config.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        tracing::debug!(rounds = trees.len(), init_score, "gradient boosting trained");
        Ok(Self {
            init_score,
            learning_rate: config.learning_rate,
            trees,
            n_features,
        })
    }

    pub fn raw_score(&self, features: &[f64]) -> f64 {
        self.init_score
            + self
                .trees
                .iter()
                .map(|t| self.learning_rate * t.predict(features))
                .sum::<f64>()
    }
}

impl Classifier for GradientBoosting {
    fn name(&self) -> &str {
        "GradientBoosting"
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64, ModelError> {
        check_input(self.name(), self.n_features, features)?;
        Ok(sigmoid(self.raw_score(features)))
    }
}
