use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{check_input, check_training_set, sigmoid, Classifier};
use crate::error::ModelError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpConfig {
    pub hidden_units: usize,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_units: 64,
            learning_rate: 1e-3,
            epochs: 20,
            batch_size: 32,
        }
    }
}

// ==================== Adam ====================

struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    m: Vec<f64>,
    v: Vec<f64>,
    t: i32,
}

impl Adam {
    fn new(lr: f64, size: usize) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            m: vec![0.0; size],
            v: vec![0.0; size],
            t: 0,
        }
    }

    fn step(&mut self, params: &mut [f64], grads: &[f64]) {
        self.t += 1;
        let bc1 = 1.0 - self.beta1.powi(self.t);
        let bc2 = 1.0 - self.beta2.powi(self.t);
        for k in 0..params.len() {
            let g = grads[k];
            self.m[k] = self.beta1 * self.m[k] + (1.0 - self.beta1) * g;
            self.v[k] = self.beta2 * self.v[k] + (1.0 - self.beta2) * g * g;
            let m_hat = self.m[k] / bc1;
            let v_hat = self.v[k] / bc2;
            params[k] -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}

// ==================== Network ====================

/// One hidden ReLU layer feeding a sigmoid unit, trained on binary
/// cross-entropy. Parameters live in one flat vector:
/// `[w1 (hidden x d) | b1 (hidden) | w2 (hidden) | b2]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpClassifier {
    params: Vec<f64>,
    hidden: usize,
    n_features: usize,
}

impl MlpClassifier {
    fn offsets(hidden: usize, d: usize) -> (usize, usize, usize, usize) {
        let b1 = hidden * d;
        let w2 = b1 + hidden;
        let b2 = w2 + hidden;
        (b1, w2, b2, b2 + 1)
    }

    pub fn fit(config: &MlpConfig, x: &[Vec<f64>], y: &[u8], seed: u64) -> Result<Self, ModelError> {
        let d = check_training_set(x, y)?;
        let hidden = config.hidden_units.max(1);
        let (b1_off, w2_off, b2_off, total) = Self::offsets(hidden, d);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        // Glorot uniform weights, zero biases
        let mut params = vec![0.0; total];
        let limit1 = (6.0 / (d + hidden) as f64).sqrt();
        for w in &mut params[..b1_off] {
            *w = rng.gen_range(-limit1..limit1);
        }
        let limit2 = (6.0 / (hidden + 1) as f64).sqrt();
        for w in &mut params[w2_off..b2_off] {
            *w = rng.gen_range(-limit2..limit2);
        }

        let mut model = Self {
            params,
            hidden,
            n_features: d,
        };
        let mut adam = Adam::new(config.learning_rate, total);
        let mut order: Vec<usize> = (0..x.len()).collect();
        let batch_size = config.batch_size.max(1);
        let mut grads = vec![0.0; total];
        let mut z1 = vec![0.0; hidden];

        for epoch in 0..config.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                grads.iter_mut().for_each(|g| *g = 0.0);
                let scale = 1.0 / batch.len() as f64;

                for &i in batch {
                    let row = &x[i];
                    let target = f64::from(y[i]);
                    let p = model.forward(row, &mut z1);
                    epoch_loss -= target * p.max(1e-12).ln() + (1.0 - target) * (1.0 - p).max(1e-12).ln();

                    let dz2 = (p - target) * scale;
                    grads[b2_off] += dz2;
                    for h in 0..hidden {
                        let a1 = z1[h].max(0.0);
                        grads[w2_off + h] += dz2 * a1;
                        if z1[h] > 0.0 {
                            let dz1 = dz2 * model.params[w2_off + h];
                            grads[b1_off + h] += dz1;
                            let w_row = &mut grads[h * d..(h + 1) * d];
                            for (g, &xv) in w_row.iter_mut().zip(row) {
                                *g += dz1 * xv;
                            }
                        }
                    }
                }
                adam.step(&mut model.params, &grads);
            }

            tracing::trace!(epoch, loss = epoch_loss / x.len() as f64, "mlp epoch");
        }

        tracing::debug!(hidden, epochs = config.epochs, "neural network trained");
        Ok(model)
    }

    /// Forward pass; fills `z1` with hidden pre-activations.
    fn forward(&self, row: &[f64], z1: &mut [f64]) -> f64 {
        let d = self.n_features;
        let (b1_off, w2_off, b2_off, _) = Self::offsets(self.hidden, d);
        let mut out = self.params[b2_off];
        for h in 0..self.hidden {
            let w_row = &self.params[h * d..(h + 1) * d];
            let z = w_row.iter().zip(row).map(|(w, v)| w * v).sum::<f64>() + self.params[b1_off + h];
            z1[h] = z;
            out += self.params[w2_off + h] * z.max(0.0);
        }
        sigmoid(out)
    }
}

impl Classifier for MlpClassifier {
    fn name(&self) -> &str {
        "NeuralNetwork"
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64, ModelError> {
        check_input(self.name(), self.n_features, features)?;
        let mut z1 = vec![0.0; self.hidden];
        Ok(self.forward(features, &mut z1))
    }
}
