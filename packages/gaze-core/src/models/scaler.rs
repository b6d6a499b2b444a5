use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Per-column standardisation with population standard deviation. Constant
/// columns get a unit scale so they map to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, ModelError> {
        let Some(first) = rows.first() else {
            return Err(ModelError::Training("cannot fit scaler on zero rows".to_string()));
        };
        let d = first.len();
        if rows.iter().any(|r| r.len() != d) {
            return Err(ModelError::Training("ragged feature rows".to_string()));
        }
        let n = rows.len() as f64;

        let mut means = vec![0.0; d];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut scales = vec![0.0; d];
        for row in rows {
            for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (v - m) * (v - m);
            }
        }
        for s in &mut scales {
            let std = (*s / n).sqrt();
            *s = if std > 0.0 && std.is_finite() { std } else { 1.0 };
        }

        Ok(Self { means, scales })
    }

    pub fn dim(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>, ModelError> {
        if row.len() != self.dim() {
            return Err(ModelError::DimensionMismatch {
                expected: self.dim(),
                actual: row.len(),
            });
        }
        Ok(row
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standardises_columns() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        assert_eq!(scaler.means, vec![2.0, 5.0]);
        assert_eq!(scaler.scales, vec![1.0, 1.0]);
        assert_eq!(scaler.transform(&[3.0, 5.0]).unwrap(), vec![1.0, 0.0]);
        assert_eq!(scaler.transform(&[1.0, 7.0]).unwrap(), vec![-1.0, 2.0]);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(StandardScaler::fit(&[]).is_err());
        let scaler = StandardScaler::fit(&[vec![1.0]]).unwrap();
        assert_eq!(
            scaler.transform(&[1.0, 2.0]),
            Err(ModelError::DimensionMismatch {
                expected: 1,
                actual: 2
            })
        );
    }
}
