use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::tree::{DecisionTree, TreeParams};
use super::{check_input, check_training_set, Classifier};
use crate::error::ModelError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: 15,
            min_samples_split: 5,
            min_samples_leaf: 2,
        }
    }
}

/// Bagged trees, sqrt(d) candidate features per node. The score is the
/// mean of the per-tree class-1 frequencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    pub fn fit(config: &RandomForestConfig, x: &[Vec<f64>], y: &[u8], seed: u64) -> Result<Self, ModelError> {
        let n_features = check_training_set(x, y)?;
        let n = x.len();
        let target: Vec<f64> = y.iter().map(|&v| f64::from(v)).collect();
        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: Some(((n_features as f64).sqrt() as usize).max(1)),
        };
        let class_share = |idx: &[usize]| {
            if idx.is_empty() {
                return 0.0;
            }
            idx.iter().map(|&i| target[i]).sum::<f64>() / idx.len() as f64
        };

        let trees: Vec<DecisionTree> = (0..config.n_trees.max(1))
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(t as u64));
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::fit(x, &target, bootstrap, &params, &mut rng, &class_share)
            })
            .collect();

        tracing::debug!(trees = trees.len(), n_features, "random forest trained");
        Ok(Self { trees, n_features })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForest {
    fn name(&self) -> &str {
        "RandomForest"
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64, ModelError> {
        check_input(self.name(), self.n_features, features)?;
        if self.trees.is_empty() {
            return Err(ModelError::NotReady);
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        Ok((sum / self.trees.len() as f64).clamp(0.0, 1.0))
    }
}
