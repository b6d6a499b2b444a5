//! Row-major flat-slice linear algebra.
//!
//! Matrices are `&[f64]` with explicit dimensions; an `r x c` matrix stores
//! element `(i, j)` at `i * c + j`. Everything here is sized for the small
//! systems the gaze pipeline solves (6x6 Kalman covariance, 6-column
//! calibration design, Savitzky-Golay windows).

use crate::types::EPSILON;

/// Identity matrix of size `d x d`.
pub fn identity(d: usize) -> Vec<f64> {
    let mut m = vec![0.0; d * d];
    for i in 0..d {
        m[i * d + i] = 1.0;
    }
    m
}

/// `A (n x m) * B (m x p)`.
pub fn mat_mul(a: &[f64], b: &[f64], n: usize, m: usize, p: usize) -> Vec<f64> {
    let mut out = vec![0.0; n * p];
    for i in 0..n {
        for k in 0..m {
            let a_ik = a[i * m + k];
            if a_ik == 0.0 {
                continue;
            }
            for j in 0..p {
                out[i * p + j] += a_ik * b[k * p + j];
            }
        }
    }
    out
}

/// Transpose of an `rows x cols` matrix.
pub fn transpose(a: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let mut out = vec![0.0; rows * cols];
    for i in 0..rows {
        for j in 0..cols {
            out[j * rows + i] = a[i * cols + j];
        }
    }
    out
}

/// Element-wise `A + B`.
pub fn mat_add(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b.iter()).map(|(&x, &y)| x + y).collect()
}

/// Element-wise `A - B`.
pub fn mat_sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b.iter()).map(|(&x, &y)| x - y).collect()
}

/// `A (rows x cols) * x`.
pub fn mat_vec_mul(a: &[f64], x: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let mut result = vec![0.0; rows];
    for i in 0..rows {
        for j in 0..cols {
            result[i] += a[i * cols + j] * x[j];
        }
    }
    result
}

/// Dot product.
pub fn dot_product(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
}

/// Inverse of a 2x2 matrix, `None` when singular.
pub fn invert_2x2(m: &[f64]) -> Option<[f64; 4]> {
    let det = m[0] * m[3] - m[1] * m[2];
    if det.abs() < EPSILON || !det.is_finite() {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([m[3] * inv_det, -m[1] * inv_det, -m[2] * inv_det, m[0] * inv_det])
}

/// Cholesky decomposition `A = L * L^T` of a symmetric positive definite
/// matrix. Returns `None` if a pivot is not positive.
pub fn cholesky_decompose(a: &[f64], d: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; d * d];

    for i in 0..d {
        for j in 0..=i {
            let mut sum = a[i * d + j];
            for k in 0..j {
                sum -= l[i * d + k] * l[j * d + k];
            }

            if i == j {
                if sum <= EPSILON {
                    return None;
                }
                l[i * d + i] = sum.sqrt();
            } else {
                l[i * d + j] = sum / l[j * d + j];
            }
        }
    }

    Some(l)
}

/// Solve `A * x = b` given the Cholesky factor `L` of `A`.
pub fn solve_cholesky(l: &[f64], b: &[f64], d: usize) -> Vec<f64> {
    let y = solve_triangular_lower(l, b, d);
    solve_triangular_upper_transpose(l, &y, d)
}

/// Forward substitution `L * x = b`.
pub fn solve_triangular_lower(l: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut x = vec![0.0; n];

    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * n + j] * x[j];
        }

        let diag = l[i * n + i];
        x[i] = if diag.abs() > EPSILON { sum / diag } else { 0.0 };
    }

    x
}

/// Back substitution `L^T * x = b`.
fn solve_triangular_upper_transpose(l: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut x = vec![0.0; n];

    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            // L^T[i,j] = L[j,i]
            sum -= l[j * n + i] * x[j];
        }

        let diag = l[i * n + i];
        x[i] = if diag.abs() > EPSILON { sum / diag } else { 0.0 };
    }

    x
}

/// Least-squares solution of `A x ≈ b` for `A` of shape `rows x cols`
/// (`rows >= cols`) via Householder QR.
///
/// Columns are scaled to unit norm before factorisation so design matrices
/// mixing pixel-squared and constant terms stay well conditioned; the
/// returned coefficients are in the original column units. Returns `None`
/// when the system is rank deficient.
pub fn least_squares(a: &[f64], b: &[f64], rows: usize, cols: usize) -> Option<Vec<f64>> {
    if rows < cols || cols == 0 || a.len() != rows * cols || b.len() != rows {
        return None;
    }

    let mut scales = vec![1.0; cols];
    for (j, scale) in scales.iter_mut().enumerate() {
        let norm = (0..rows).map(|i| a[i * cols + j].powi(2)).sum::<f64>().sqrt();
        if norm > EPSILON {
            *scale = norm;
        }
    }

    let mut r: Vec<f64> = (0..rows * cols).map(|idx| a[idx] / scales[idx % cols]).collect();
    let mut qtb = b.to_vec();

    for k in 0..cols {
        let norm_x = (k..rows).map(|i| r[i * cols + k].powi(2)).sum::<f64>().sqrt();
        if norm_x < EPSILON {
            return None;
        }

        let x0 = r[k * cols + k];
        let alpha = if x0 >= 0.0 { -norm_x } else { norm_x };

        let mut v: Vec<f64> = (k..rows).map(|i| r[i * cols + k]).collect();
        v[0] -= alpha;
        let v_norm_sq: f64 = v.iter().map(|x| x * x).sum();
        if v_norm_sq < EPSILON * EPSILON {
            continue;
        }

        for j in k..cols {
            let proj: f64 = v
                .iter()
                .enumerate()
                .map(|(offset, vi)| vi * r[(k + offset) * cols + j])
                .sum();
            let factor = 2.0 * proj / v_norm_sq;
            for (offset, vi) in v.iter().enumerate() {
                r[(k + offset) * cols + j] -= factor * vi;
            }
        }

        let proj: f64 = v
            .iter()
            .enumerate()
            .map(|(offset, vi)| vi * qtb[k + offset])
            .sum();
        let factor = 2.0 * proj / v_norm_sq;
        for (offset, vi) in v.iter().enumerate() {
            qtb[k + offset] -= factor * vi;
        }
    }

    let max_diag = (0..cols)
        .map(|i| r[i * cols + i].abs())
        .fold(0.0_f64, f64::max);
    let tolerance = max_diag * 1e-12 * rows as f64;

    let mut x = vec![0.0; cols];
    for i in (0..cols).rev() {
        let diag = r[i * cols + i];
        if diag.abs() <= tolerance {
            return None;
        }
        let mut sum = qtb[i];
        for j in (i + 1)..cols {
            sum -= r[i * cols + j] * x[j];
        }
        x[i] = sum / diag;
    }

    for (xi, scale) in x.iter_mut().zip(scales.iter()) {
        *xi /= scale;
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

/// Ridge-regularised least squares `(AᵀA + λI) x = Aᵀb` on unit-norm
/// columns. Usable when `A` is rank deficient (including `rows < cols`),
/// where it approaches the minimum-norm solution as `lambda` shrinks.
pub fn ridge_least_squares(
    a: &[f64],
    b: &[f64],
    rows: usize,
    cols: usize,
    lambda: f64,
) -> Option<Vec<f64>> {
    if cols == 0 || a.len() != rows * cols || b.len() != rows || lambda <= 0.0 {
        return None;
    }

    let mut scales = vec![1.0; cols];
    for (j, scale) in scales.iter_mut().enumerate() {
        let norm = (0..rows).map(|i| a[i * cols + j].powi(2)).sum::<f64>().sqrt();
        if norm > EPSILON {
            *scale = norm;
        }
    }
    let scaled: Vec<f64> = (0..rows * cols).map(|idx| a[idx] / scales[idx % cols]).collect();

    let at = transpose(&scaled, rows, cols);
    let mut normal = mat_mul(&at, &scaled, cols, rows, cols);
    for i in 0..cols {
        normal[i * cols + i] += lambda;
    }
    let rhs = mat_vec_mul(&at, b, cols, rows);

    let l = cholesky_decompose(&normal, cols)?;
    let mut x = solve_cholesky(&l, &rhs, cols);
    for (xi, scale) in x.iter_mut().zip(scales.iter()) {
        *xi /= scale;
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}
