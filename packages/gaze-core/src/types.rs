use serde::{Deserialize, Serialize};

// ==================== Constants ====================

/// Numerical stability floor shared by every module.
pub const EPSILON: f64 = 1e-10;

/// Substitute for a zero time step between two samples (seconds).
pub const MIN_TIME_STEP: f64 = 1e-6;

/// Nominal camera frame interval (seconds).
pub const NOMINAL_FRAME_DT: f64 = 1.0 / 60.0;

/// Default screen extent in pixels.
pub const DEFAULT_SCREEN_WIDTH: f64 = 1920.0;
pub const DEFAULT_SCREEN_HEIGHT: f64 = 1080.0;

/// Minimum number of samples a session needs before it is scored.
pub const MIN_SESSION_SAMPLES: usize = 50;

// ==================== Geometry ====================

/// 2-D point. Normalised landmark space, image pixels or screen pixels
/// depending on where it comes from.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const ORIGIN: Point2 = Point2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn distance(&self, other: &Point2) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(&self, other: &Point2) -> Point2 {
        Point2::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point2 {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Screen extent used for gaze projection and spatial histograms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenGeometry {
    pub width: f64,
    pub height: f64,
}

impl Default for ScreenGeometry {
    fn default() -> Self {
        Self {
            width: DEFAULT_SCREEN_WIDTH,
            height: DEFAULT_SCREEN_HEIGHT,
        }
    }
}

impl ScreenGeometry {
    pub fn center(&self) -> Point2 {
        Point2::new(self.width / 2.0, self.height / 2.0)
    }
}

// ==================== Per-frame data ====================

/// Normalised facial landmarks for one frame, indexed by the face-mesh
/// topology (478 points with refined iris landmarks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandmarkSet {
    points: Vec<Point2>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point2>) -> Self {
        Self { points }
    }

    pub fn get(&self, index: usize) -> Option<Point2> {
        self.points.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point2] {
        &self.points
    }
}

// ==================== Session data ====================

/// One calibrated gaze sample in screen pixels; `timestamp` is seconds
/// since session start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    pub x: f64,
    pub y: f64,
    pub timestamp: f64,
}

impl GazeSample {
    pub const fn new(x: f64, y: f64, timestamp: f64) -> Self {
        Self { x, y, timestamp }
    }

    pub fn position(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

/// Ordered, append-only gaze samples of one screening run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionBuffer {
    samples: Vec<GazeSample>,
}

impl SessionBuffer {
    pub fn new() -> Self {
        Self {
            samples: Vec::with_capacity(7200),
        }
    }

    pub fn from_samples(samples: Vec<GazeSample>) -> Self {
        Self { samples }
    }

    pub fn push(&mut self, sample: GazeSample) {
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[GazeSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Elapsed time between first and last sample.
    pub fn duration(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).max(0.0),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < EPSILON);
    }

    #[test]
    fn test_session_buffer_duration() {
        let mut buffer = SessionBuffer::new();
        assert_eq!(buffer.duration(), 0.0);
        buffer.push(GazeSample::new(0.0, 0.0, 1.0));
        buffer.push(GazeSample::new(1.0, 1.0, 3.5));
        assert_eq!(buffer.len(), 2);
        assert!((buffer.duration() - 2.5).abs() < EPSILON);
    }

    #[test]
    fn test_landmark_set_out_of_range() {
        let set = LandmarkSet::new(vec![Point2::new(0.5, 0.5)]);
        assert!(set.get(0).is_some());
        assert!(set.get(468).is_none());
    }
}
