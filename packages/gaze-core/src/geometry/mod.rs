use crate::types::{Point2, EPSILON};

fn cross(o: &Point2, a: &Point2, b: &Point2) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Convex hull (counter-clockwise, no repeated endpoint) by Andrew's monotone
/// chain. Returns `None` for fewer than three non-collinear points.
pub fn convex_hull(points: &[Point2]) -> Option<Vec<Point2>> {
    let mut pts: Vec<Point2> = points.iter().copied().filter(|p| p.is_finite()).collect();
    if pts.len() < 3 {
        return None;
    }
    pts.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
    });
    pts.dedup();
    if pts.len() < 3 {
        return None;
    }

    let mut lower: Vec<Point2> = Vec::with_capacity(pts.len());
    for p in &pts {
        while lower.len() >= 2 && cross(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(*p);
    }

    let mut upper: Vec<Point2> = Vec::with_capacity(pts.len());
    for p in pts.iter().rev() {
        while upper.len() >= 2 && cross(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(*p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);

    if lower.len() < 3 {
        return None;
    }
    Some(lower)
}

/// Shoelace area of a simple polygon.
pub fn polygon_area(polygon: &[Point2]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0;
    for i in 0..polygon.len() {
        let a = &polygon[i];
        let b = &polygon[(i + 1) % polygon.len()];
        twice_area += a.x * b.y - b.x * a.y;
    }
    (twice_area / 2.0).abs()
}

/// Area of the convex hull of `points`; `0.0` when the hull is degenerate.
pub fn convex_hull_area(points: &[Point2]) -> f64 {
    match convex_hull(points) {
        Some(hull) => {
            let area = polygon_area(&hull);
            if area > EPSILON {
                area
            } else {
                0.0
            }
        }
        None => 0.0,
    }
}
