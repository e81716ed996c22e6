use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Distance reported for points that can never count toward a shape match.
pub const UNMATCHED: f64 = f64::INFINITY;

/// Fewer sampled points than this is treated as an insufficient gesture.
pub const MIN_TRACE_SAMPLES: usize = 10;

/// Match threshold is this multiple of the outline's line width.
pub const LINE_WIDTH_TOLERANCE: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<(f64, f64)> for Point {
    fn from(v: (f64, f64)) -> Self {
        Point { x: v.0, y: v.1 }
    }
}

/// Outline a trace drill asks the user to follow.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle {
        center: Point,
        radius: f64,
    },
    /// Axis-aligned, `origin` is the top-left corner.
    Square {
        origin: Point,
        size: f64,
    },
    Triangle {
        vertices: [Point; 3],
    },
    Star {
        center: Point,
        points: u32,
        inner_radius: f64,
        outer_radius: f64,
    },
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Circle { .. } => "circle",
            Shape::Square { .. } => "square",
            Shape::Triangle { .. } => "triangle",
            Shape::Star { .. } => "star",
        }
    }
}

pub fn mean(data: &[f64]) -> Option<f64> {
    match data.len() {
        0 => None,
        count => Some(data.iter().sum::<f64>() / count as f64),
    }
}

/// Euclidean distance from `point` to the closest point of segment `a-b`.
///
/// A zero-length segment degrades to the distance to `a`.
pub fn distance_to_segment(point: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;

    if len_sq == 0.0 {
        return point.distance(&a);
    }

    let t = (((point.x - a.x) * dx + (point.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    point.distance(&Point::new(a.x + t * dx, a.y + t * dy))
}

/// Minimum segment distance over consecutive pairs of `points`.
///
/// Returns [`UNMATCHED`] when fewer than two points are given.
pub fn distance_to_polyline(point: Point, points: &[Point]) -> f64 {
    points
        .iter()
        .tuple_windows()
        .map(|(a, b)| distance_to_segment(point, *a, *b))
        .fold(UNMATCHED, f64::min)
}

/// Distance from `point` to the outline of `shape`.
///
/// Squares only match from inside their bounding box and stars use a radial
/// band between the inner and outer radius widened by `threshold`; both
/// return [`UNMATCHED`] when the point falls outside.
pub fn distance_to_shape(point: Point, shape: &Shape, threshold: f64) -> f64 {
    match shape {
        Shape::Circle { center, radius } => (point.distance(center) - radius).abs(),
        Shape::Square { origin, size } => {
            let inside = point.x >= origin.x
                && point.x <= origin.x + size
                && point.y >= origin.y
                && point.y <= origin.y + size;
            if !inside {
                return UNMATCHED;
            }
            [
                (point.y - origin.y).abs(),
                (point.y - (origin.y + size)).abs(),
                (point.x - origin.x).abs(),
                (point.x - (origin.x + size)).abs(),
            ]
            .into_iter()
            .fold(UNMATCHED, f64::min)
        }
        Shape::Triangle { vertices } => {
            let [a, b, c] = *vertices;
            distance_to_polyline(point, &[a, b, c, a])
        }
        Shape::Star {
            center,
            inner_radius,
            outer_radius,
            ..
        } => {
            let radial = point.distance(center);
            if radial >= inner_radius - threshold && radial <= outer_radius + threshold {
                0.0
            } else {
                UNMATCHED
            }
        }
    }
}

/// Percentage (0-100) of `sampled` points lying within tolerance of the
/// outline. Gestures shorter than [`MIN_TRACE_SAMPLES`] score 0.
pub fn shape_match_rate(sampled: &[Point], shape: &Shape, line_width: f64) -> f64 {
    if sampled.len() < MIN_TRACE_SAMPLES {
        return 0.0;
    }

    let threshold = line_width * LINE_WIDTH_TOLERANCE;
    let matched = sampled
        .iter()
        .filter(|p| distance_to_shape(**p, shape, threshold) < threshold)
        .count();

    matched as f64 / sampled.len() as f64 * 100.0
}
