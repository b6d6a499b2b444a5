//! Eye geometry from face-mesh landmarks, eye-region cropping, and the
//! iris-offset to screen-point mapping.

use image::{imageops, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::types::{LandmarkSet, Point2, ScreenGeometry, EPSILON};

// ==================== Landmark indices ====================

// Face mesh eye contours (16 points per eye)
pub const LEFT_EYE_CONTOUR: [usize; 16] = [
    33, 7, 163, 144, 145, 153, 154, 155, 133, 173, 157, 158, 159, 160, 161, 246,
];
pub const RIGHT_EYE_CONTOUR: [usize; 16] = [
    362, 382, 381, 380, 374, 373, 390, 249, 263, 466, 388, 387, 386, 385, 384, 398,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EyeCornerIndices {
    pub inner: usize,
    pub outer: usize,
    pub top: usize,
    pub bottom: usize,
}

pub const LEFT_EYE_CORNERS: EyeCornerIndices = EyeCornerIndices {
    inner: 133,
    outer: 33,
    top: 159,
    bottom: 145,
};
pub const RIGHT_EYE_CORNERS: EyeCornerIndices = EyeCornerIndices {
    inner: 362,
    outer: 263,
    top: 386,
    bottom: 374,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn contour(&self) -> &'static [usize; 16] {
        match self {
            Eye::Left => &LEFT_EYE_CONTOUR,
            Eye::Right => &RIGHT_EYE_CONTOUR,
        }
    }

    pub fn corners(&self) -> EyeCornerIndices {
        match self {
            Eye::Left => LEFT_EYE_CORNERS,
            Eye::Right => RIGHT_EYE_CORNERS,
        }
    }
}

// ==================== Eye geometry ====================

/// Corner and lid landmarks of one eye in normalised frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeGeometry {
    pub inner: Point2,
    pub outer: Point2,
    pub top: Point2,
    pub bottom: Point2,
}

impl EyeGeometry {
    pub fn from_landmarks(landmarks: &LandmarkSet, eye: Eye) -> Option<Self> {
        let idx = eye.corners();
        Some(Self {
            inner: landmarks.get(idx.inner)?,
            outer: landmarks.get(idx.outer)?,
            top: landmarks.get(idx.top)?,
            bottom: landmarks.get(idx.bottom)?,
        })
    }

    /// Mean of the four points.
    pub fn center(&self) -> Point2 {
        Point2::new(
            (self.inner.x + self.outer.x + self.top.x + self.bottom.x) / 4.0,
            (self.inner.y + self.outer.y + self.top.y + self.bottom.y) / 4.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.outer.distance(&self.inner)
    }

    pub fn height(&self) -> f64 {
        self.top.distance(&self.bottom)
    }
}

// ==================== Eye region ====================

/// Grayscale eye crop that remembers where it came from in the frame.
#[derive(Debug, Clone)]
pub struct EyeRegion {
    pub image: GrayImage,
    pub origin_x: u32,
    pub origin_y: u32,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl EyeRegion {
    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Crop pixel coordinates to normalised frame coordinates.
    pub fn to_normalized(&self, point: Point2) -> Point2 {
        if self.frame_width == 0 || self.frame_height == 0 {
            return Point2::ORIGIN;
        }
        Point2::new(
            (point.x + self.origin_x as f64) / self.frame_width as f64,
            (point.y + self.origin_y as f64) / self.frame_height as f64,
        )
    }
}

/// Bounding box of the eye contour, padded by `padding` pixels and clamped
/// to the frame. `None` when a contour landmark is missing.
pub fn extract_eye_region(
    frame: &RgbImage,
    landmarks: &LandmarkSet,
    eye: Eye,
    padding: u32,
) -> Option<EyeRegion> {
    let (fw, fh) = frame.dimensions();
    let mut x_min = i64::MAX;
    let mut y_min = i64::MAX;
    let mut x_max = i64::MIN;
    let mut y_max = i64::MIN;

    for &idx in eye.contour() {
        let p = landmarks.get(idx)?;
        if !p.is_finite() {
            return None;
        }
        let x = (p.x * fw as f64) as i64;
        let y = (p.y * fh as f64) as i64;
        x_min = x_min.min(x);
        y_min = y_min.min(y);
        x_max = x_max.max(x);
        y_max = y_max.max(y);
    }

    let pad = padding as i64;
    let x0 = (x_min - pad).clamp(0, fw as i64) as u32;
    let y0 = (y_min - pad).clamp(0, fh as i64) as u32;
    let x1 = (x_max + pad).clamp(0, fw as i64) as u32;
    let y1 = (y_max + pad).clamp(0, fh as i64) as u32;

    let width = x1.saturating_sub(x0);
    let height = y1.saturating_sub(y0);
    let crop = imageops::crop_imm(frame, x0, y0, width, height).to_image();

    Some(EyeRegion {
        image: imageops::grayscale(&crop),
        origin_x: x0,
        origin_y: y0,
        frame_width: fw,
        frame_height: fh,
    })
}

// ==================== Gaze mapping ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazeMapperConfig {
    /// Fraction of the screen extent reached by a unit normalised offset.
    pub projection_gain: f64,
    /// Padding around the eye contour when cropping (pixels).
    pub eye_padding: u32,
}

impl Default for GazeMapperConfig {
    fn default() -> Self {
        Self {
            projection_gain: 0.4,
            eye_padding: 20,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GazeVectorMapper {
    config: GazeMapperConfig,
    screen: ScreenGeometry,
}

impl GazeVectorMapper {
    pub fn new(config: GazeMapperConfig, screen: ScreenGeometry) -> Self {
        Self { config, screen }
    }

    pub fn config(&self) -> &GazeMapperConfig {
        &self.config
    }

    pub fn screen(&self) -> ScreenGeometry {
        self.screen
    }

    /// Iris offset from the eye centre divided by eye width/height. `None`
    /// for a collapsed eye.
    pub fn gaze_vector(&self, geometry: &EyeGeometry, iris: Point2) -> Option<Point2> {
        let width = geometry.width();
        let height = geometry.height();
        if width <= EPSILON || height <= EPSILON {
            return None;
        }
        let center = geometry.center();
        Some(Point2::new(
            (iris.x - center.x) / width,
            (iris.y - center.y) / height,
        ))
    }

    pub fn project(&self, normalized: Point2) -> Point2 {
        let gain = self.config.projection_gain;
        Point2::new(
            self.screen.width / 2.0 + normalized.x * self.screen.width * gain,
            self.screen.height / 2.0 + normalized.y * self.screen.height * gain,
        )
    }

    /// Screen point for one eye; `iris` is in normalised frame coordinates.
    pub fn eye_screen_point(&self, landmarks: &LandmarkSet, eye: Eye, iris: Point2) -> Option<Point2> {
        let geometry = EyeGeometry::from_landmarks(landmarks, eye)?;
        let vector = self.gaze_vector(&geometry, iris)?;
        Some(self.project(vector))
    }

    /// Average of both eyes' screen points; `None` unless both eyes map.
    pub fn map(&self, landmarks: &LandmarkSet, left_iris: Point2, right_iris: Point2) -> Option<Point2> {
        let left = self.eye_screen_point(landmarks, Eye::Left, left_iris)?;
        let right = self.eye_screen_point(landmarks, Eye::Right, right_iris)?;
        Some(left.midpoint(&right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 478 points with both eyes laid out as axis-aligned diamonds.
    fn synthetic_landmarks() -> LandmarkSet {
        let mut points = vec![Point2::new(0.5, 0.5); 478];
        let eyes = [
            (Eye::Left, Point2::new(0.35, 0.4)),
            (Eye::Right, Point2::new(0.65, 0.4)),
        ];
        for (eye, c) in eyes {
            for (k, &idx) in eye.contour().iter().enumerate() {
                let t = k as f64 / 16.0 * std::f64::consts::TAU;
                points[idx] = Point2::new(c.x + 0.05 * t.cos(), c.y + 0.02 * t.sin());
            }
            let corners = eye.corners();
            points[corners.inner] = Point2::new(c.x - 0.05, c.y);
            points[corners.outer] = Point2::new(c.x + 0.05, c.y);
            points[corners.top] = Point2::new(c.x, c.y - 0.02);
            points[corners.bottom] = Point2::new(c.x, c.y + 0.02);
        }
        LandmarkSet::new(points)
    }

    #[test]
    fn test_centered_iris_maps_to_screen_center() {
        let landmarks = synthetic_landmarks();
        let mapper = GazeVectorMapper::default();
        let p = mapper
            .map(&landmarks, Point2::new(0.35, 0.4), Point2::new(0.65, 0.4))
            .unwrap();
        assert!((p.x - 960.0).abs() < 1e-9);
        assert!((p.y - 540.0).abs() < 1e-9);
    }

    #[test]
    fn test_offset_iris_projects_with_gain() {
        let landmarks = synthetic_landmarks();
        let mapper = GazeVectorMapper::default();
        // Offset of a quarter eye width to the right
        let p = mapper
            .eye_screen_point(&landmarks, Eye::Left, Point2::new(0.375, 0.4))
            .unwrap();
        assert!((p.x - (960.0 + 0.25 * 1920.0 * 0.4)).abs() < 1e-6);
    }

    #[test]
    fn test_collapsed_eye_yields_none() {
        let mut points = synthetic_landmarks().points().to_vec();
        points[LEFT_EYE_CORNERS.top] = points[LEFT_EYE_CORNERS.bottom];
        let landmarks = LandmarkSet::new(points);
        let mapper = GazeVectorMapper::default();
        assert!(mapper
            .map(&landmarks, Point2::new(0.35, 0.4), Point2::new(0.65, 0.4))
            .is_none());
    }

    #[test]
    fn test_missing_landmarks_yield_none() {
        let landmarks = LandmarkSet::new(vec![Point2::new(0.5, 0.5); 100]);
        let mapper = GazeVectorMapper::default();
        assert!(mapper.map(&landmarks, Point2::ORIGIN, Point2::ORIGIN).is_none());
        let frame = RgbImage::new(64, 48);
        assert!(extract_eye_region(&frame, &landmarks, Eye::Left, 20).is_none());
    }

    #[test]
    fn test_eye_region_keeps_origin() {
        let landmarks = synthetic_landmarks();
        let frame = RgbImage::new(640, 480);
        let region = extract_eye_region(&frame, &landmarks, Eye::Right, 20).unwrap();
        // contour x spans 0.60..0.70 of 640 px, y spans 0.38..0.42 of 480 px
        assert!((363..=364).contains(&region.origin_x));
        assert!(!region.is_empty());
        let back = region.to_normalized(Point2::new(10.0, 0.0));
        let expected = (region.origin_x as f64 + 10.0) / 640.0;
        assert!((back.x - expected).abs() < 1e-12);
    }

    #[test]
    fn test_region_clamped_to_frame() {
        let mut points = vec![Point2::new(0.0, 0.0); 478];
        for &idx in Eye::Left.contour() {
            points[idx] = Point2::new(0.01, 0.01);
        }
        let frame = RgbImage::new(100, 100);
        let region =
            extract_eye_region(&frame, &LandmarkSet::new(points), Eye::Left, 20).unwrap();
        assert_eq!(region.origin_x, 0);
        assert_eq!(region.origin_y, 0);
        assert_eq!(region.image.width(), 21);
    }
}
