//! RBF-kernel C-SVM trained by SMO with second-order working-set
//! selection, plus Platt scaling of the decision values.

use serde::{Deserialize, Serialize};

use super::{check_input, check_training_set, sigmoid, Classifier};
use crate::error::ModelError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmConfig {
    pub c: f64,
    /// Kernel width; `None` uses 1 / (d * var(X)).
    pub gamma: Option<f64>,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            gamma: None,
            tolerance: 1e-3,
            max_iterations: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmClassifier {
    support_vectors: Vec<Vec<f64>>,
    /// alpha_i * y_i per support vector.
    dual_coefs: Vec<f64>,
    rho: f64,
    gamma: f64,
    platt_a: f64,
    platt_b: f64,
    n_features: usize,
}

const TAU: f64 = 1e-12;

#[inline]
fn rbf(a: &[f64], b: &[f64], gamma: f64) -> f64 {
    let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    (-gamma * d2).exp()
}

fn scale_gamma(x: &[Vec<f64>], dim: usize) -> f64 {
    let count = (x.len() * dim) as f64;
    let mean = x.iter().flatten().sum::<f64>() / count;
    let var = x.iter().flatten().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count;
    if var > 0.0 {
        1.0 / (dim as f64 * var)
    } else {
        1.0
    }
}

// ==================== SMO ====================

struct DualSolution {
    alpha: Vec<f64>,
    rho: f64,
    iterations: usize,
}

fn solve_dual(kernel: &[f64], y: &[f64], c: f64, eps: f64, max_iter: usize) -> DualSolution {
    let n = y.len();
    let k = |i: usize, j: usize| kernel[i * n + j];
    let mut alpha = vec![0.0; n];
    let mut grad = vec![-1.0; n];

    let is_upper = |a: f64| a >= c;
    let is_lower = |a: f64| a <= 0.0;

    let mut iterations = 0;
    while iterations < max_iter {
        // Working set: i maximises -y G over I_up, j minimises the second-order gain over I_low.
        let mut g_max = f64::NEG_INFINITY;
        let mut i_sel = None;
        for t in 0..n {
            let in_up = if y[t] > 0.0 { !is_upper(alpha[t]) } else { !is_lower(alpha[t]) };
            if in_up && -y[t] * grad[t] >= g_max {
                g_max = -y[t] * grad[t];
                i_sel = Some(t);
            }
        }
        let Some(i) = i_sel else { break };

        let mut g_max2 = f64::NEG_INFINITY;
        let mut obj_min = f64::INFINITY;
        let mut j_sel = None;
        for t in 0..n {
            let in_low = if y[t] > 0.0 { !is_lower(alpha[t]) } else { !is_upper(alpha[t]) };
            if !in_low {
                continue;
            }
            let yg = y[t] * grad[t];
            if yg >= g_max2 {
                g_max2 = yg;
            }
            let b = g_max + yg;
            if b > 0.0 {
                let mut a = k(i, i) + k(t, t) - 2.0 * k(i, t);
                if a <= 0.0 {
                    a = TAU;
                }
                let obj = -(b * b) / a;
                if obj <= obj_min {
                    obj_min = obj;
                    j_sel = Some(t);
                }
            }
        }

        if g_max + g_max2 < eps {
            break;
        }
        let Some(j) = j_sel else { break };
        iterations += 1;

        let old_i = alpha[i];
        let old_j = alpha[j];
        let q_ij = y[i] * y[j] * k(i, j);

        if y[i] != y[j] {
            let mut quad = k(i, i) + k(j, j) + 2.0 * q_ij;
            if quad <= 0.0 {
                quad = TAU;
            }
            let delta = (-grad[i] - grad[j]) / quad;
            let diff = alpha[i] - alpha[j];
            alpha[i] += delta;
            alpha[j] += delta;
            if diff > 0.0 {
                if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = diff;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = -diff;
            }
            if diff > 0.0 {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = c - diff;
                }
            } else if alpha[j] > c {
                alpha[j] = c;
                alpha[i] = c + diff;
            }
        } else {
            let mut quad = k(i, i) + k(j, j) - 2.0 * q_ij;
            if quad <= 0.0 {
                quad = TAU;
            }
            let delta = (grad[i] - grad[j]) / quad;
            let sum = alpha[i] + alpha[j];
            alpha[i] -= delta;
            alpha[j] += delta;
            if sum > c {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = sum - c;
                }
            } else if alpha[j] < 0.0 {
                alpha[j] = 0.0;
                alpha[i] = sum;
            }
            if sum > c {
                if alpha[j] > c {
                    alpha[j] = c;
                    alpha[i] = sum - c;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = sum;
            }
        }

        let d_i = alpha[i] - old_i;
        let d_j = alpha[j] - old_j;
        for t in 0..n {
            grad[t] += y[t] * (y[i] * k(t, i) * d_i + y[j] * k(t, j) * d_j);
        }
    }

    if iterations >= max_iter {
        tracing::warn!(iterations, "svm solver hit the iteration cap");
    }

    // Offset from free vectors, or the midpoint of the feasible interval.
    let mut ub = f64::INFINITY;
    let mut lb = f64::NEG_INFINITY;
    let mut free_sum = 0.0;
    let mut free_count = 0usize;
    for t in 0..n {
        let yg = y[t] * grad[t];
        if is_upper(alpha[t]) {
            if y[t] < 0.0 {
                ub = ub.min(yg);
            } else {
                lb = lb.max(yg);
            }
        } else if is_lower(alpha[t]) {
            if y[t] > 0.0 {
                ub = ub.min(yg);
            } else {
                lb = lb.max(yg);
            }
        } else {
            free_sum += yg;
            free_count += 1;
        }
    }
    let rho = if free_count > 0 {
        free_sum / free_count as f64
    } else if ub.is_finite() && lb.is_finite() {
        (ub + lb) / 2.0
    } else if ub.is_finite() {
        ub
    } else if lb.is_finite() {
        lb
    } else {
        0.0
    };

    DualSolution {
        alpha,
        rho,
        iterations,
    }
}

// ==================== Platt scaling ====================

/// Fits P(y=1 | f) = 1 / (1 + exp(A f + B)) by Newton's method with
/// backtracking on regularised targets.
fn platt_fit(decision: &[f64], y: &[f64]) -> (f64, f64) {
    let prior1 = y.iter().filter(|&&v| v > 0.0).count() as f64;
    let prior0 = y.len() as f64 - prior1;
    let hi = (prior1 + 1.0) / (prior1 + 2.0);
    let lo = 1.0 / (prior0 + 2.0);
    let targets: Vec<f64> = y.iter().map(|&v| if v > 0.0 { hi } else { lo }).collect();

    let objective = |a: f64, b: f64| -> f64 {
        decision
            .iter()
            .zip(&targets)
            .map(|(&f, &t)| {
                let z = f * a + b;
                if z >= 0.0 {
                    t * z + (-z).exp().ln_1p()
                } else {
                    (t - 1.0) * z + z.exp().ln_1p()
                }
            })
            .sum()
    };

    let mut a = 0.0;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(a, b);

    for _ in 0..100 {
        let (mut h11, mut h22, mut h21, mut g1, mut g2) = (1e-12, 1e-12, 0.0, 0.0, 0.0);
        for (&f, &t) in decision.iter().zip(&targets) {
            let z = f * a + b;
            let p = sigmoid(-z);
            let q = 1.0 - p;
            let d2 = p * q;
            h11 += f * f * d2;
            h22 += d2;
            h21 += f * d2;
            let d1 = t - p;
            g1 += f * d1;
            g2 += d1;
        }
        if g1.abs() < 1e-5 && g2.abs() < 1e-5 {
            break;
        }

        let det = h11 * h22 - h21 * h21;
        let da = -(h22 * g1 - h21 * g2) / det;
        let db = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * da + g2 * db;

        let mut step = 1.0;
        while step >= 1e-10 {
            let new_a = a + step * da;
            let new_b = b + step * db;
            let new_f = objective(new_a, new_b);
            if new_f < fval + 1e-4 * step * gd {
                a = new_a;
                b = new_b;
                fval = new_f;
                break;
            }
            step /= 2.0;
        }
        if step < 1e-10 {
            tracing::debug!("platt line search stalled");
            break;
        }
    }
    (a, b)
}

// ==================== Classifier ====================

impl SvmClassifier {
    pub fn fit(config: &SvmConfig, x: &[Vec<f64>], y: &[u8]) -> Result<Self, ModelError> {
        let n_features = check_training_set(x, y)?;
        let positives = y.iter().filter(|&&v| v == 1).count();
        if positives == 0 || positives == y.len() {
            return Err(ModelError::Training("SVM needs samples of both classes".to_string()));
        }

        let n = x.len();
        let gamma = config.gamma.unwrap_or_else(|| scale_gamma(x, n_features));
        let signs: Vec<f64> = y.iter().map(|&v| if v == 1 { 1.0 } else { -1.0 }).collect();

        let mut kernel = vec![0.0; n * n];
        for i in 0..n {
            for j in i..n {
                let v = rbf(&x[i], &x[j], gamma);
                kernel[i * n + j] = v;
                kernel[j * n + i] = v;
            }
        }

        let solution = solve_dual(&kernel, &signs, config.c, config.tolerance, config.max_iterations);

        let mut support_vectors = Vec::new();
        let mut dual_coefs = Vec::new();
        for (idx, &a) in solution.alpha.iter().enumerate() {
            if a > 0.0 {
                support_vectors.push(x[idx].clone());
                dual_coefs.push(a * signs[idx]);
            }
        }

        let decision: Vec<f64> = (0..n)
            .map(|i| {
                solution
                    .alpha
                    .iter()
                    .enumerate()
                    .filter(|(_, &a)| a > 0.0)
                    .map(|(j, &a)| a * signs[j] * kernel[i * n + j])
                    .sum::<f64>()
                    - solution.rho
            })
            .collect();
        let (platt_a, platt_b) = platt_fit(&decision, &signs);

        tracing::debug!(
            support_vectors = support_vectors.len(),
            iterations = solution.iterations,
            gamma,
            "svm trained"
        );

        Ok(Self {
            support_vectors,
            dual_coefs,
            rho: solution.rho,
            gamma,
            platt_a,
            platt_b,
            n_features,
        })
    }

    pub fn decision_function(&self, features: &[f64]) -> f64 {
        self.support_vectors
            .iter()
            .zip(&self.dual_coefs)
            .map(|(sv, coef)| coef * rbf(sv, features, self.gamma))
            .sum::<f64>()
            - self.rho
    }

    pub fn support_vector_count(&self) -> usize {
        self.support_vectors.len()
    }
}

impl Classifier for SvmClassifier {
    fn name(&self) -> &str {
        "SVM"
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64, ModelError> {
        check_input(self.name(), self.n_features, features)?;
        let f = self.decision_function(features);
        Ok(sigmoid(-(self.platt_a * f + self.platt_b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_data::blobs;

    #[test]
    fn test_scale_gamma() {
        let x = vec![vec![1.0, -1.0], vec![-1.0, 1.0]];
        // var = 1 over 4 entries, d = 2
        assert!((scale_gamma(&x, 2) - 0.5).abs() < 1e-12);
        assert_eq!(scale_gamma(&[vec![3.0, 3.0]], 2), 1.0);
    }

    #[test]
    fn test_two_point_problem_has_symmetric_margin() {
        let x = vec![vec![-1.0], vec![1.0]];
        let y = vec![0, 1];
        let svm = SvmClassifier::fit(&SvmConfig::default(), &x, &y).unwrap();
        assert_eq!(svm.support_vector_count(), 2);
        assert!(svm.decision_function(&[0.0]).abs() < 1e-9);
        assert!(svm.decision_function(&[1.0]) > 0.0);
        assert!(svm.decision_function(&[-1.0]) < 0.0);
    }

    #[test]
    fn test_separable_blobs() {
        let (x, y) = blobs(30, 2, 4.0, 17);
        let svm = SvmClassifier::fit(&SvmConfig::default(), &x, &y).unwrap();
        let correct = x
            .iter()
            .zip(&y)
            .filter(|(row, &label)| (svm.decision_function(row) > 0.0) == (label == 1))
            .count();
        assert_eq!(correct, x.len());
        let hi = svm.predict_proba(&[2.0, 2.0]).unwrap();
        let lo = svm.predict_proba(&[-2.0, -2.0]).unwrap();
        assert!(hi > 0.5 && lo < 0.5);
    }

    #[test]
    fn test_single_class_is_rejected() {
        let x = vec![vec![0.0], vec![1.0]];
        assert!(matches!(
            SvmClassifier::fit(&SvmConfig::default(), &x, &[1, 1]),
            Err(ModelError::Training(_))
        ));
    }

    #[test]
    fn test_platt_is_monotone() {
        let decision = [-2.0, -1.0, -0.5, 0.5, 1.0, 2.0];
        let y = [-1.0, -1.0, 1.0, -1.0, 1.0, 1.0];
        let (a, b) = platt_fit(&decision, &y);
        assert!(a < 0.0);
        let p = |f: f64| sigmoid(-(a * f + b));
        assert!(p(1.5) > p(-1.5));
    }
}
