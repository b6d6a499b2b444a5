//! Classical grayscale operators used by the iris localizer.
//!
//! Borders are handled by reflect-101 (`gfedcb|abcdefgh|gfedcba`).
//! Gradients, edge maps and accumulators are row-major `Vec`s sized
//! `width * height`.

use image::GrayImage;

use crate::geometry::convex_hull_area;
use crate::matrix::least_squares;
use crate::types::{Point2, EPSILON};

#[inline]
fn reflect101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let mut i = i;
    while i < 0 || i >= n {
        if i < 0 {
            i = -i;
        }
        if i >= n {
            i = 2 * n - 2 - i;
        }
    }
    i as usize
}

/// Histogram equalisation through the cumulative distribution. A
/// single-valued image is returned unchanged.
pub fn equalize_histogram(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    let raw = img.as_raw();
    let total = raw.len();
    if total == 0 {
        return img.clone();
    }

    let mut hist = [0usize; 256];
    for &v in raw {
        hist[v as usize] += 1;
    }

    if hist.iter().any(|&count| count == total) {
        return img.clone();
    }

    let mut lut = [0u8; 256];
    let first_nonzero = hist.iter().position(|&c| c > 0).unwrap_or(0);
    let cdf_min = hist[first_nonzero];
    let denom = (total - cdf_min) as f64;
    let mut cdf = 0usize;
    for (level, &count) in hist.iter().enumerate() {
        cdf += count;
        if level < first_nonzero {
            continue;
        }
        let scaled = (cdf - cdf_min) as f64 * 255.0 / denom;
        lut[level] = scaled.round().clamp(0.0, 255.0) as u8;
    }

    let data: Vec<u8> = raw.iter().map(|&v| lut[v as usize]).collect();
    GrayImage::from_raw(w, h, data).unwrap_or_else(|| img.clone())
}

/// 5x5 Gaussian blur with the binomial kernel `[1 4 6 4 1] / 16`.
pub fn gaussian_blur_5x5(img: &GrayImage) -> GrayImage {
    const KERNEL: [f64; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];
    let (w, h) = img.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    let raw = img.as_raw();
    if raw.is_empty() {
        return img.clone();
    }

    let mut horizontal = vec![0.0; wu * hu];
    for y in 0..hu {
        for x in 0..wu {
            let mut acc = 0.0;
            for (k, weight) in KERNEL.iter().enumerate() {
                let sx = reflect101(x as isize + k as isize - 2, wu);
                acc += weight * raw[y * wu + sx] as f64;
            }
            horizontal[y * wu + x] = acc;
        }
    }

    let mut data = vec![0u8; wu * hu];
    for y in 0..hu {
        for x in 0..wu {
            let mut acc = 0.0;
            for (k, weight) in KERNEL.iter().enumerate() {
                let sy = reflect101(y as isize + k as isize - 2, hu);
                acc += weight * horizontal[sy * wu + x];
            }
            data[y * wu + x] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }

    GrayImage::from_raw(w, h, data).unwrap_or_else(|| img.clone())
}

/// Horizontal and vertical 3x3 Sobel responses.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub width: usize,
    pub height: usize,
    pub gx: Vec<f64>,
    pub gy: Vec<f64>,
}

impl Gradients {
    pub fn magnitude(&self, idx: usize) -> f64 {
        (self.gx[idx] * self.gx[idx] + self.gy[idx] * self.gy[idx]).sqrt()
    }

    pub fn magnitudes(&self) -> Vec<f64> {
        (0..self.gx.len()).map(|i| self.magnitude(i)).collect()
    }
}

pub fn sobel(img: &GrayImage) -> Gradients {
    let (w, h) = img.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    let raw = img.as_raw();
    let mut gx = vec![0.0; wu * hu];
    let mut gy = vec![0.0; wu * hu];

    for y in 0..hu {
        for x in 0..wu {
            let px = |dx: isize, dy: isize| -> f64 {
                let sx = reflect101(x as isize + dx, wu);
                let sy = reflect101(y as isize + dy, hu);
                raw[sy * wu + sx] as f64
            };
            gx[y * wu + x] = (px(1, -1) + 2.0 * px(1, 0) + px(1, 1))
                - (px(-1, -1) + 2.0 * px(-1, 0) + px(-1, 1));
            gy[y * wu + x] = (px(-1, 1) + 2.0 * px(0, 1) + px(1, 1))
                - (px(-1, -1) + 2.0 * px(0, -1) + px(1, -1));
        }
    }

    Gradients {
        width: wu,
        height: hu,
        gx,
        gy,
    }
}

/// Canny edge map: L1 gradient magnitude, 4-direction non-maximum
/// suppression, hysteresis between `low` and `high`.
pub fn canny(gradients: &Gradients, low: f64, high: f64) -> Vec<bool> {
    let (w, h) = (gradients.width, gradients.height);
    let n = w * h;
    let mag: Vec<f64> = (0..n)
        .map(|i| gradients.gx[i].abs() + gradients.gy[i].abs())
        .collect();

    let at = |x: isize, y: isize| -> f64 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0.0
        } else {
            mag[y as usize * w + x as usize]
        }
    };

    // 0 = suppressed, 1 = weak, 2 = strong
    let mut class = vec![0u8; n];
    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            let m = mag[idx];
            if m <= low {
                continue;
            }
            let angle = gradients.gy[idx].atan2(gradients.gx[idx]).to_degrees();
            let angle = if angle < 0.0 { angle + 180.0 } else { angle };
            let (dx, dy): (isize, isize) = if !(22.5..157.5).contains(&angle) {
                (1, 0)
            } else if angle < 67.5 {
                (1, 1)
            } else if angle < 112.5 {
                (0, 1)
            } else {
                (-1, 1)
            };
            let (xi, yi) = (x as isize, y as isize);
            if m >= at(xi + dx, yi + dy) && m > at(xi - dx, yi - dy) {
                class[idx] = if m > high { 2 } else { 1 };
            }
        }
    }

    let mut edges = vec![false; n];
    let mut stack: Vec<usize> = (0..n).filter(|&i| class[i] == 2).collect();
    for &i in &stack {
        edges[i] = true;
    }
    while let Some(idx) = stack.pop() {
        let (x, y) = ((idx % w) as isize, (idx / w) as isize);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let nidx = ny as usize * w + nx as usize;
                if class[nidx] == 1 && !edges[nidx] {
                    edges[nidx] = true;
                    stack.push(nidx);
                }
            }
        }
    }

    edges
}

/// 8-connected edge components as pixel-centre point lists.
pub fn edge_contours(edges: &[bool], width: usize, height: usize) -> Vec<Vec<Point2>> {
    let mut visited = vec![false; edges.len()];
    let mut contours = Vec::new();

    for start in 0..edges.len() {
        if !edges[start] || visited[start] {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![start];
        visited[start] = true;
        while let Some(idx) = stack.pop() {
            let (x, y) = (idx % width, idx / width);
            component.push(Point2::new(x as f64, y as f64));
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    let (nx, ny) = (x as isize + dx, y as isize + dy);
                    if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                        continue;
                    }
                    let nidx = ny as usize * width + nx as usize;
                    if edges[nidx] && !visited[nidx] {
                        visited[nidx] = true;
                        stack.push(nidx);
                    }
                }
            }
        }
        contours.push(component);
    }

    contours
}

/// Contour enclosing the largest hull area; point count breaks ties.
pub fn largest_contour(contours: &[Vec<Point2>]) -> Option<&Vec<Point2>> {
    contours.iter().max_by(|a, b| {
        let area_a = convex_hull_area(a);
        let area_b = convex_hull_area(b);
        area_a
            .partial_cmp(&area_b)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.len().cmp(&b.len()))
    })
}

/// Centre of the least-squares conic `a x² + b xy + c y² + d x + e y = 1`
/// through `points`, or `None` if fewer than five points are given or the
/// conic is not an ellipse.
pub fn fit_ellipse_center(points: &[Point2]) -> Option<Point2> {
    if points.len() < 5 {
        return None;
    }
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;

    let mut design = Vec::with_capacity(points.len() * 5);
    for p in points {
        let (x, y) = (p.x - cx, p.y - cy);
        design.extend_from_slice(&[x * x, x * y, y * y, x, y]);
    }
    let rhs = vec![1.0; points.len()];
    let coeffs = least_squares(&design, &rhs, points.len(), 5)?;
    let (a, b, c, d, e) = (coeffs[0], coeffs[1], coeffs[2], coeffs[3], coeffs[4]);

    let discriminant = b * b - 4.0 * a * c;
    if discriminant >= -EPSILON {
        return None;
    }

    // Gradient of the conic vanishes at the centre:
    // [2a b; b 2c] [x y]^T = [-d -e]^T
    let det = 4.0 * a * c - b * b;
    let x0 = (-2.0 * c * d + b * e) / det;
    let y0 = (b * d - 2.0 * a * e) / det;
    let center = Point2::new(x0 + cx, y0 + cy);
    if center.is_finite() {
        Some(center)
    } else {
        None
    }
}

/// Gradient-direction circle voting. Every edge pixel votes along both
/// directions of its gradient for radii in `[min_radius, max_radius]`; the
/// accumulator peak (refined by its 3x3 weighted centroid) is returned if it
/// collects at least `min_votes`.
pub fn hough_circle_center(
    gradients: &Gradients,
    edges: &[bool],
    min_radius: usize,
    max_radius: usize,
    min_votes: u32,
) -> Option<Point2> {
    let (w, h) = (gradients.width, gradients.height);
    if w == 0 || h == 0 || max_radius == 0 || min_radius > max_radius {
        return None;
    }

    let mut acc = vec![0u32; w * h];
    for (idx, &is_edge) in edges.iter().enumerate() {
        if !is_edge {
            continue;
        }
        let mag = gradients.magnitude(idx);
        if mag < EPSILON {
            continue;
        }
        let (ux, uy) = (gradients.gx[idx] / mag, gradients.gy[idx] / mag);
        let (x, y) = ((idx % w) as f64, (idx / w) as f64);
        for r in min_radius.max(1)..=max_radius {
            for sign in [-1.0, 1.0] {
                let vx = (x + sign * ux * r as f64).round();
                let vy = (y + sign * uy * r as f64).round();
                if vx < 0.0 || vy < 0.0 || vx >= w as f64 || vy >= h as f64 {
                    continue;
                }
                acc[vy as usize * w + vx as usize] += 1;
            }
        }
    }

    let (peak_idx, &peak_votes) = acc.iter().enumerate().max_by_key(|&(_, &v)| v)?;
    if peak_votes < min_votes.max(1) {
        return None;
    }

    let (px, py) = ((peak_idx % w) as isize, (peak_idx / w) as isize);
    let (mut sx, mut sy, mut total) = (0.0, 0.0, 0.0);
    for dy in -1..=1 {
        for dx in -1..=1 {
            let (nx, ny) = (px + dx, py + dy);
            if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                continue;
            }
            let votes = acc[ny as usize * w + nx as usize] as f64;
            sx += votes * nx as f64;
            sy += votes * ny as f64;
            total += votes;
        }
    }
    if total <= 0.0 {
        return None;
    }
    Some(Point2::new(sx / total, sy / total))
}

/// Weighted centroid of a non-negative weight field; `None` on zero mass.
pub fn weighted_centroid(weights: &[f64], width: usize) -> Option<Point2> {
    if width == 0 {
        return None;
    }
    let (mut m00, mut m10, mut m01) = (0.0, 0.0, 0.0);
    for (idx, &weight) in weights.iter().enumerate() {
        if weight <= 0.0 {
            continue;
        }
        m00 += weight;
        m10 += weight * (idx % width) as f64;
        m01 += weight * (idx / width) as f64;
    }
    if m00 <= EPSILON {
        return None;
    }
    Some(Point2::new(m10 / m00, m01 / m00))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn disc_image(size: u32, cx: f64, cy: f64, radius: f64) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let d = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt();
            if d <= radius {
                Luma([20u8])
            } else {
                Luma([200u8])
            }
        })
    }

    #[test]
    fn test_reflect101() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(2, 5), 2);
        assert_eq!(reflect101(3, 1), 0);
    }

    #[test]
    fn test_equalize_stretches_range() {
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([100 + x as u8]));
        let eq = equalize_histogram(&img);
        assert_eq!(eq.get_pixel(0, 0)[0], 0);
        assert_eq!(eq.get_pixel(3, 0)[0], 255);
    }

    #[test]
    fn test_equalize_constant_image_unchanged() {
        let img = GrayImage::from_pixel(5, 5, Luma([77u8]));
        assert_eq!(equalize_histogram(&img), img);
    }

    #[test]
    fn test_blur_constant_is_identity() {
        let img = GrayImage::from_pixel(8, 6, Luma([90u8]));
        assert_eq!(gaussian_blur_5x5(&img), img);
    }

    #[test]
    fn test_sobel_flat_is_zero() {
        let img = GrayImage::from_pixel(6, 6, Luma([50u8]));
        let g = sobel(&img);
        assert!(g.gx.iter().chain(g.gy.iter()).all(|v| *v == 0.0));
    }

    #[test]
    fn test_canny_finds_disc_boundary() {
        let img = disc_image(40, 20.0, 20.0, 8.0);
        let g = sobel(&img);
        let edges = canny(&g, 50.0, 150.0);
        assert!(edges.iter().any(|&e| e));
        // Interior and far background stay edge-free
        assert!(!edges[20 * 40 + 20]);
        assert!(!edges[2 * 40 + 2]);
    }

    #[test]
    fn test_ellipse_fit_recovers_center() {
        let points: Vec<Point2> = (0..36)
            .map(|i| {
                let t = i as f64 * std::f64::consts::PI / 18.0;
                Point2::new(15.0 + 6.0 * t.cos(), 12.0 + 4.0 * t.sin())
            })
            .collect();
        let c = fit_ellipse_center(&points).unwrap();
        assert!((c.x - 15.0).abs() < 1e-6);
        assert!((c.y - 12.0).abs() < 1e-6);
    }

    #[test]
    fn test_ellipse_fit_needs_five_points() {
        let points = vec![Point2::new(0.0, 0.0); 4];
        assert!(fit_ellipse_center(&points).is_none());
    }

    #[test]
    fn test_hough_locates_disc() {
        let img = disc_image(48, 22.0, 26.0, 9.0);
        let g = sobel(&img);
        let edges = canny(&g, 50.0, 150.0);
        let c = hough_circle_center(&g, &edges, 6, 16, 10).unwrap();
        assert!((c.x - 22.0).abs() < 2.0, "x={}", c.x);
        assert!((c.y - 26.0).abs() < 2.0, "y={}", c.y);
    }

    #[test]
    fn test_weighted_centroid() {
        let mut weights = vec![0.0; 9];
        weights[4] = 1.0;
        let c = weighted_centroid(&weights, 3).unwrap();
        assert_eq!(c, Point2::new(1.0, 1.0));
        assert!(weighted_centroid(&[0.0; 9], 3).is_none());
    }
}
