//! Second-degree polynomial mapping from raw gaze estimates to screen
//! coordinates, fitted from multi-point calibration.

use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;
use crate::matrix::{dot_product, least_squares, ridge_least_squares};
use crate::stats::median;
use crate::types::{Point2, ScreenGeometry};

pub const MIN_CALIBRATION_POINTS: usize = 5;
const TERMS: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Distance of the outer targets from the screen edge (pixels).
    pub edge_inset: f64,
    /// Frames read per target during live calibration.
    pub samples_per_point: usize,
    pub min_points: usize,
    /// Regularisation used only when the design matrix is rank deficient.
    pub ridge_lambda: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            edge_inset: 100.0,
            samples_per_point: 30,
            min_points: MIN_CALIBRATION_POINTS,
            ridge_lambda: 1e-8,
        }
    }
}

/// The 13-point layout: four inset corners, centre, four edge mid-points and
/// four quarter points.
pub fn standard_targets(screen: &ScreenGeometry, inset: f64) -> Vec<Point2> {
    let w = screen.width;
    let h = screen.height;
    let half_w = (w / 2.0).floor();
    let half_h = (h / 2.0).floor();
    let quarter_w = (w / 4.0).floor();
    let quarter_h = (h / 4.0).floor();
    let three_quarter_w = (3.0 * w / 4.0).floor();
    let three_quarter_h = (3.0 * h / 4.0).floor();

    vec![
        Point2::new(inset, inset),
        Point2::new(w - inset, inset),
        Point2::new(inset, h - inset),
        Point2::new(w - inset, h - inset),
        Point2::new(half_w, half_h),
        Point2::new(half_w, inset),
        Point2::new(half_w, h - inset),
        Point2::new(inset, half_h),
        Point2::new(w - inset, half_h),
        Point2::new(quarter_w, quarter_h),
        Point2::new(three_quarter_w, quarter_h),
        Point2::new(quarter_w, three_quarter_h),
        Point2::new(three_quarter_w, three_quarter_h),
    ]
}

/// Raw gaze samples collected while the subject looked at `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub target: Point2,
    pub samples: Vec<Point2>,
}

impl CalibrationPoint {
    pub fn new(target: Point2, samples: Vec<Point2>) -> Self {
        Self { target, samples }
    }

    /// Per-axis median of the finite samples.
    pub fn raw_estimate(&self) -> Option<Point2> {
        let (xs, ys): (Vec<f64>, Vec<f64>) = self
            .samples
            .iter()
            .filter(|p| p.is_finite())
            .map(|p| (p.x, p.y))
            .unzip();
        if xs.is_empty() {
            return None;
        }
        Some(Point2::new(median(&xs), median(&ys)))
    }
}

#[inline]
fn poly_terms(p: Point2) -> [f64; TERMS] {
    [p.x * p.x, p.y * p.y, p.x * p.y, p.x, p.y, 1.0]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFit {
    pub coeffs_x: [f64; TERMS],
    pub coeffs_y: [f64; TERMS],
    /// Root-mean-square residual over the fitted points (pixels).
    pub rms_error: f64,
    pub points_used: usize,
}

/// Raw-to-screen mapping. Unfitted models pass points through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationModel {
    fit: Option<CalibrationFit>,
}

impl CalibrationModel {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }

    pub fn fit_details(&self) -> Option<&CalibrationFit> {
        self.fit.as_ref()
    }

    /// Fit from calibration points. Points without samples are dropped
    /// before the minimum-count check.
    pub fn fit(points: &[CalibrationPoint], config: &CalibrationConfig) -> Result<Self, CalibrationError> {
        let pairs: Vec<(Point2, Point2)> = points
            .iter()
            .filter_map(|p| p.raw_estimate().map(|raw| (p.target, raw)))
            .collect();
        Self::fit_pairs(&pairs, config)
    }

    /// Fit from `(target, raw)` pairs.
    pub fn fit_pairs(pairs: &[(Point2, Point2)], config: &CalibrationConfig) -> Result<Self, CalibrationError> {
        let required = config.min_points.max(1);
        if pairs.len() < required {
            return Err(CalibrationError::InsufficientPoints {
                required,
                actual: pairs.len(),
            });
        }

        let rows = pairs.len();
        let mut design = Vec::with_capacity(rows * TERMS);
        let mut tx = Vec::with_capacity(rows);
        let mut ty = Vec::with_capacity(rows);
        for (target, raw) in pairs {
            design.extend_from_slice(&poly_terms(*raw));
            tx.push(target.x);
            ty.push(target.y);
        }

        let solve = |rhs: &[f64]| {
            least_squares(&design, rhs, rows, TERMS)
                .or_else(|| ridge_least_squares(&design, rhs, rows, TERMS, config.ridge_lambda))
        };
        let cx = solve(&tx).ok_or(CalibrationError::SingularFit)?;
        let cy = solve(&ty).ok_or(CalibrationError::SingularFit)?;

        let mut coeffs_x = [0.0; TERMS];
        let mut coeffs_y = [0.0; TERMS];
        coeffs_x.copy_from_slice(&cx);
        coeffs_y.copy_from_slice(&cy);

        let mut model = Self {
            fit: Some(CalibrationFit {
                coeffs_x,
                coeffs_y,
                rms_error: 0.0,
                points_used: rows,
            }),
        };

        let sq_sum: f64 = pairs
            .iter()
            .map(|(target, raw)| {
                let mapped = model.apply(*raw);
                let dx = mapped.x - target.x;
                let dy = mapped.y - target.y;
                dx * dx + dy * dy
            })
            .sum();
        let rms_error = (sq_sum / rows as f64).sqrt();
        if let Some(fit) = model.fit.as_mut() {
            fit.rms_error = rms_error;
        }

        tracing::info!(points = rows, rms_error, "calibration fitted");
        Ok(model)
    }

    /// Fit, or fall back to the identity mapping with a warning.
    pub fn fit_or_identity(points: &[CalibrationPoint], config: &CalibrationConfig) -> Self {
        match Self::fit(points, config) {
            Ok(model) => model,
            Err(e) => {
                tracing::warn!(error = %e, "calibration unavailable, running uncalibrated");
                Self::identity()
            }
        }
    }

    pub fn apply(&self, raw: Point2) -> Point2 {
        match &self.fit {
            Some(fit) => {
                let terms = poly_terms(raw);
                Point2::new(
                    dot_product(&terms, &fit.coeffs_x),
                    dot_product(&terms, &fit.coeffs_y),
                )
            }
            None => raw,
        }
    }
}
