//! Sub-pixel iris centre localisation on a grayscale eye crop.
//!
//! Three independent estimators run on the equalised, blurred crop and their
//! results are blended with fixed preference weights. When none of them
//! produces a centre the chain falls back to the dark-mass moment centroid
//! and finally to the geometric centre of the crop.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::types::{Point2, EPSILON};
use crate::vision::{
    canny, edge_contours, equalize_histogram, fit_ellipse_center, gaussian_blur_5x5,
    hough_circle_center, largest_contour, sobel, weighted_centroid, Gradients,
};

// ==================== Configuration ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrisLocalizerConfig {
    pub canny_low: f64,
    pub canny_high: f64,
    /// Minimum accumulator votes for a Hough circle.
    pub hough_min_votes: u32,
    pub ellipse_weight: f64,
    pub gradient_weight: f64,
    pub hough_weight: f64,
}

impl Default for IrisLocalizerConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            hough_min_votes: 30,
            ellipse_weight: 1.0,
            gradient_weight: 1.2,
            hough_weight: 0.8,
        }
    }
}

// ==================== Estimators ====================

/// Independent centre estimators, tried in the listed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IrisEstimator {
    EllipseFit,
    GradientCentroid,
    HoughCircle,
}

impl IrisEstimator {
    pub const ALL: [IrisEstimator; 3] = [
        IrisEstimator::EllipseFit,
        IrisEstimator::GradientCentroid,
        IrisEstimator::HoughCircle,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            IrisEstimator::EllipseFit => "ellipse",
            IrisEstimator::GradientCentroid => "gradient",
            IrisEstimator::HoughCircle => "hough",
        }
    }

    fn weight(&self, config: &IrisLocalizerConfig) -> f64 {
        match self {
            IrisEstimator::EllipseFit => config.ellipse_weight,
            IrisEstimator::GradientCentroid => config.gradient_weight,
            IrisEstimator::HoughCircle => config.hough_weight,
        }
    }

    fn estimate(&self, region: &PreparedRegion) -> Option<Point2> {
        match self {
            IrisEstimator::EllipseFit => {
                let contours = edge_contours(&region.edges, region.width, region.height);
                let largest = largest_contour(&contours)?;
                fit_ellipse_center(largest)
            }
            IrisEstimator::GradientCentroid => {
                weighted_centroid(&region.gradients.magnitudes(), region.width)
            }
            IrisEstimator::HoughCircle => {
                let min_radius = region.height / 8;
                let max_radius = region.height / 3;
                hough_circle_center(
                    &region.gradients,
                    &region.edges,
                    min_radius,
                    max_radius,
                    region.hough_min_votes,
                )
            }
        }
    }
}

/// Preprocessed crop shared by every estimator.
struct PreparedRegion {
    width: usize,
    height: usize,
    blurred: GrayImage,
    gradients: Gradients,
    edges: Vec<bool>,
    hough_min_votes: u32,
}

// ==================== Result ====================

/// Which stage of the fallback chain produced the centre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrisSource {
    /// Weighted blend of the estimators that returned a result.
    Blended(Vec<IrisEstimator>),
    MomentCentroid,
    GeometricCenter,
    /// Empty crop or one with no intensity at all.
    Degenerate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrisEstimate {
    /// Centre in crop pixel coordinates.
    pub center: Point2,
    pub source: IrisSource,
}

// ==================== Localizer ====================

#[derive(Debug, Clone)]
pub struct IrisLocalizer {
    config: IrisLocalizerConfig,
    estimators: Vec<IrisEstimator>,
}

impl Default for IrisLocalizer {
    fn default() -> Self {
        Self::new(IrisLocalizerConfig::default())
    }
}

impl IrisLocalizer {
    pub fn new(config: IrisLocalizerConfig) -> Self {
        Self {
            config,
            estimators: IrisEstimator::ALL.to_vec(),
        }
    }

    /// Restrict or reorder the estimators that participate in the blend.
    pub fn with_estimators(mut self, estimators: Vec<IrisEstimator>) -> Self {
        self.estimators = estimators;
        self
    }

    pub fn config(&self) -> &IrisLocalizerConfig {
        &self.config
    }

    pub fn localize(&self, region: &GrayImage) -> Point2 {
        self.localize_detailed(region).center
    }

    pub fn localize_detailed(&self, region: &GrayImage) -> IrisEstimate {
        let (w, h) = region.dimensions();
        if w == 0 || h == 0 || region.as_raw().iter().all(|&v| v == 0) {
            return IrisEstimate {
                center: Point2::ORIGIN,
                source: IrisSource::Degenerate,
            };
        }

        let prepared = self.prepare(region);

        let mut used = Vec::with_capacity(self.estimators.len());
        let (mut sx, mut sy, mut total) = (0.0, 0.0, 0.0);
        for estimator in &self.estimators {
            let Some(center) = estimator.estimate(&prepared).filter(Point2::is_finite) else {
                continue;
            };
            let weight = estimator.weight(&self.config);
            sx += weight * center.x;
            sy += weight * center.y;
            total += weight;
            used.push(*estimator);
        }

        if total > EPSILON {
            return IrisEstimate {
                center: Point2::new(sx / total, sy / total),
                source: IrisSource::Blended(used),
            };
        }

        // Plain intensity moments of the blurred crop.
        let mass: Vec<f64> = prepared.blurred.as_raw().iter().map(|&v| v as f64).collect();
        if let Some(center) = weighted_centroid(&mass, prepared.width) {
            return IrisEstimate {
                center,
                source: IrisSource::MomentCentroid,
            };
        }

        IrisEstimate {
            center: Point2::new(w as f64 / 2.0, h as f64 / 2.0),
            source: IrisSource::GeometricCenter,
        }
    }

    fn prepare(&self, region: &GrayImage) -> PreparedRegion {
        let equalized = equalize_histogram(region);
        let blurred = gaussian_blur_5x5(&equalized);
        let gradients = sobel(&blurred);
        let edges = canny(&gradients, self.config.canny_low, self.config.canny_high);
        PreparedRegion {
            width: blurred.width() as usize,
            height: blurred.height() as usize,
            blurred,
            gradients,
            edges,
            hough_min_votes: self.config.hough_min_votes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn pupil_image(w: u32, h: u32, cx: f64, cy: f64, r: f64) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let d = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt();
            if d <= r {
                Luma([15u8])
            } else {
                Luma([210u8])
            }
        })
    }

    #[test]
    fn test_empty_region_returns_origin() {
        let localizer = IrisLocalizer::default();
        let empty = GrayImage::new(0, 0);
        assert_eq!(localizer.localize(&empty), Point2::ORIGIN);
    }

    #[test]
    fn test_all_zero_region_returns_origin() {
        let localizer = IrisLocalizer::default();
        let black = GrayImage::new(30, 20);
        let estimate = localizer.localize_detailed(&black);
        assert_eq!(estimate.center, Point2::ORIGIN);
        assert_eq!(estimate.source, IrisSource::Degenerate);
    }

    #[test]
    fn test_saturated_region_uses_moment_centroid() {
        let localizer = IrisLocalizer::default();
        let white = GrayImage::from_pixel(30, 20, Luma([255u8]));
        let estimate = localizer.localize_detailed(&white);
        assert_eq!(estimate.source, IrisSource::MomentCentroid);
        assert!((estimate.center.x - 14.5).abs() < 1e-9);
        assert!((estimate.center.y - 9.5).abs() < 1e-9);
    }

    #[test]
    fn test_moment_fallback_weights_by_intensity() {
        let localizer = IrisLocalizer::default().with_estimators(Vec::new());
        let img = GrayImage::from_fn(40, 20, |x, _| if x < 20 { Luma([10u8]) } else { Luma([200u8]) });
        let estimate = localizer.localize_detailed(&img);
        assert_eq!(estimate.source, IrisSource::MomentCentroid);
        assert!(estimate.center.x > 25.0, "x={}", estimate.center.x);
        assert!((estimate.center.y - 9.5).abs() < 0.5);
    }

    #[test]
    fn test_uniform_gray_uses_moment_centroid() {
        let localizer = IrisLocalizer::default();
        let gray = GrayImage::from_pixel(11, 7, Luma([100u8]));
        let estimate = localizer.localize_detailed(&gray);
        assert_eq!(estimate.source, IrisSource::MomentCentroid);
        assert!((estimate.center.x - 5.0).abs() < 1e-9);
        assert!((estimate.center.y - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_dark_disc_is_located() {
        let localizer = IrisLocalizer::default();
        let img = pupil_image(60, 40, 34.0, 19.0, 8.0);
        let estimate = localizer.localize_detailed(&img);
        assert!(matches!(estimate.source, IrisSource::Blended(_)));
        assert!((estimate.center.x - 34.0).abs() < 3.0, "x={}", estimate.center.x);
        assert!((estimate.center.y - 19.0).abs() < 3.0, "y={}", estimate.center.y);
    }

    #[test]
    fn test_single_estimator_weight_renormalises() {
        let localizer =
            IrisLocalizer::default().with_estimators(vec![IrisEstimator::GradientCentroid]);
        let img = pupil_image(40, 40, 20.0, 20.0, 7.0);
        let estimate = localizer.localize_detailed(&img);
        assert_eq!(
            estimate.source,
            IrisSource::Blended(vec![IrisEstimator::GradientCentroid])
        );
        assert!((estimate.center.x - 20.0).abs() < 1e-6);
        assert!((estimate.center.y - 20.0).abs() < 1e-6);
    }
}
