//! Slider curve construction.
//!
//! Every curve kind is first normalized into piecewise bezier anchors, then
//! flattened into a polyline with cumulative arc lengths. Positions along the
//! slider are resolved by walking that polyline.

use std::f64::consts::TAU;

use crate::file::beatmap::SliderCurveType;
use crate::point::Point;

/// Presets of bezier anchors approximating a unit circle arc up to
/// `max_angle` radians. The smallest preset covering the arc is shrunk onto
/// it by iterated convergence.
#[derive(Clone, Debug)]
struct CirclePreset<const N: usize> {
    max_angle: f64,
    points: [Point; N],
}

#[allow(clippy::unreadable_literal)]
const PRESET_3: CirclePreset<3> = CirclePreset {
    max_angle: 0.4993379862754501,
    points: [
        Point::new(1.0, 0.0),
        Point::new(1.0, 0.2549893626632736),
        Point::new(0.8778997558480327, 0.47884446188920726),
    ],
};

#[allow(clippy::unreadable_literal)]
const PRESET_4: CirclePreset<4> = CirclePreset {
    max_angle: 1.7579419829169447,
    points: [
        Point::new(1.0, 0.0),
        Point::new(1.0, 0.6263026),
        Point::new(0.42931178, 1.0990661),
        Point::new(-0.18605515, 0.9825393),
    ],
};

#[allow(clippy::unreadable_literal)]
const PRESET_5: CirclePreset<5> = CirclePreset {
    max_angle: 3.1385246920140215,
    points: [
        Point::new(1.0, 0.0),
        Point::new(1.0, 0.87084764),
        Point::new(0.002304826, 1.5033062),
        Point::new(-0.9973236, 0.8739115),
        Point::new(-0.9999953, 0.0030679568),
    ],
};

#[allow(clippy::unreadable_literal)]
const PRESET_6: CirclePreset<6> = CirclePreset {
    max_angle: 5.69720464620727,
    points: [
        Point::new(1.0, 0.0),
        Point::new(1.0, 1.4137783),
        Point::new(-1.4305235, 2.0779421),
        Point::new(-2.3410065, -0.94017583),
        Point::new(0.05132711, -1.7309346),
        Point::new(0.8331702, -0.5530167),
    ],
};

#[allow(clippy::unreadable_literal)]
const PRESET_7: CirclePreset<7> = CirclePreset {
    max_angle: TAU,
    points: [
        Point::new(1.0, 0.0),
        Point::new(1.0, 1.2447058),
        Point::new(-0.8526471, 2.118367),
        Point::new(-2.6211002, 7.854936_e-06),
        Point::new(-0.8526448, -2.118357),
        Point::new(1.0, -1.2447058),
        Point::new(1.0, 0.0),
    ],
};

fn is_close(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}

#[derive(Clone, Copy, Debug, Default)]
struct CircleArcProperties {
    theta_start: f64,
    theta_range: f64,
    direction: f64,
    radius: f64,
    center: Point,
}

fn get_circle_arc_properties(points: [Point; 3]) -> Option<CircleArcProperties> {
    let [a, b, c] = points;

    // Degenerate (collinear) perfect curves fall back to their raw points.
    if is_close(
        0.0,
        (b.y - a.y).mul_add(c.x - a.x, -(b.x - a.x) * (c.y - a.y)),
        f64::EPSILON,
    ) {
        return None;
    }

    let d = 2.0 * c.x.mul_add((a - b).y, a.x.mul_add((b - c).y, b.x * (c - a).y));

    let a_sq = a.dot(a);
    let b_sq = b.dot(b);
    let c_sq = c.dot(c);

    let center = Point {
        x: c_sq.mul_add((a - b).y, a_sq.mul_add((b - c).y, b_sq * (c - a).y)),
        y: c_sq.mul_add((b - a).x, a_sq.mul_add((c - b).x, b_sq * (a - c).x)),
    };
    let center = center / d;

    let da = a - center;
    let dc = c - center;

    let radius = da.len();

    let theta_start = da.y.atan2(da.x);
    let theta_end = {
        let theta_end = dc.y.atan2(dc.x);
        // turn as many times as necessary so that theta_end >= theta_start
        TAU.mul_add(((theta_start - theta_end) / TAU).ceil(), theta_end)
    };

    let mut theta_range = theta_end - theta_start;
    let mut direction = 1.0;

    // Decide in which direction to draw the circle, depending on which side of AC B lies.
    let ortho_a_to_c = c - a;
    let ortho_a_to_c = Point {
        x: ortho_a_to_c.y,
        y: -ortho_a_to_c.x,
    };

    if ortho_a_to_c.dot(b - a) < 0.0 {
        direction = -direction;
        theta_range = TAU - theta_range;
    }

    Some(CircleArcProperties {
        theta_start,
        theta_range,
        direction,
        radius,
        center,
    })
}

fn circle_to_bezier_anchors(points: [Point; 3]) -> Vec<Point> {
    let Some(cs) = get_circle_arc_properties(points) else {
        return points.to_vec();
    };

    let (mut arc, mut arc_len) = if PRESET_3.max_angle >= cs.theta_range {
        (PRESET_3.points.to_vec(), PRESET_3.max_angle)
    } else if PRESET_4.max_angle >= cs.theta_range {
        (PRESET_4.points.to_vec(), PRESET_4.max_angle)
    } else if PRESET_5.max_angle >= cs.theta_range {
        (PRESET_5.points.to_vec(), PRESET_5.max_angle)
    } else if PRESET_6.max_angle >= cs.theta_range {
        (PRESET_6.points.to_vec(), PRESET_6.max_angle)
    } else {
        (PRESET_7.points.to_vec(), PRESET_7.max_angle)
    };

    // converge on arc length of theta range
    let n = arc.len() - 1;
    let mut tf = cs.theta_range / arc_len;

    #[allow(clippy::while_float)]
    while (tf - 1.0).abs() > 0.000_001 {
        for j in 0..n {
            for i in ((j + 1)..=n).rev() {
                arc[i] = arc[i] * tf + arc[i - 1] * (1.0 - tf);
            }
        }

        let last_point = arc[arc.len() - 1];
        arc_len = last_point.y.atan2(last_point.x);
        if arc_len < 0.0 {
            arc_len += TAU;
        }
        tf = cs.theta_range / arc_len;
    }

    // adjust rotation, radius and position
    let rot_a = Point {
        x: cs.theta_start.cos(),
        y: -cs.theta_start.sin() * cs.direction,
    } * cs.radius;

    let rot_b = Point {
        x: cs.theta_start.sin(),
        y: cs.theta_start.cos() * cs.direction,
    } * cs.radius;

    for point in &mut arc {
        *point = Point {
            x: rot_a.dot(*point),
            y: rot_b.dot(*point),
        } + cs.center;
    }

    let last = arc.len() - 1;
    arc[0] = points[0];
    arc[last] = points[2];

    arc
}

/// Converts a catmull chain into cubic bezier segments, one per chord, with
/// ghost endpoints past both ends.
fn catmull_to_segments(points: &[Point]) -> Vec<Vec<Point>> {
    if points.len() < 2 {
        return Vec::new();
    }

    let mut segments = Vec::new();
    for i in 0..(points.len() - 1) {
        let v1 = points[i.saturating_sub(1)];
        let v2 = points[i];
        let v3 = points[i + 1];
        let v4 = points.get(i + 2).copied().unwrap_or(v3 + v3 - v2);

        segments.push(vec![
            v2,
            (-v1 + v2 * 6.0 + v3) / 6.0,
            (-v4 + v3 * 6.0 + v2) / 6.0,
            v3,
        ]);
    }

    segments
}

/// Splits bezier control points into segments at consecutive duplicates.
fn bezier_segments(points: &[Point]) -> Vec<Vec<Point>> {
    let mut segments = Vec::new();
    let mut current: Vec<Point> = Vec::new();

    for &point in points {
        if let Some(&last) = current.last() {
            if last == point {
                if current.len() > 1 {
                    segments.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            }
        }
        current.push(point);
    }

    if current.len() > 1 {
        segments.push(current);
    }

    segments
}

/// Evaluates one bezier segment of arbitrary degree at `t`.
fn bezier_at(anchors: &[Point], t: f64) -> Point {
    let mut buffer = anchors.to_vec();
    let n = buffer.len();

    for j in 1..n {
        for i in 0..(n - j) {
            buffer[i] = buffer[i].lerp(buffer[i + 1], t);
        }
    }

    buffer[0]
}

/// Flattened slider path with cumulative arc lengths.
///
/// The walk distance of a position query is taken against the slider's
/// nominal pixel length, clamped onto the real flattened length, matching
/// how the legacy client treats over- and under-long paths.
#[derive(Clone, Debug)]
pub struct SliderCurve {
    path: Vec<Point>,
    cumulative: Vec<f64>,
    pixel_length: f64,
}

impl SliderCurve {
    #[must_use]
    pub fn build(curve_type: SliderCurveType, control_points: &[Point], pixel_length: f64) -> Self {
        let segments = match curve_type {
            SliderCurveType::Linear => control_points
                .windows(2)
                .map(<[Point]>::to_vec)
                .collect(),
            SliderCurveType::PerfectCurve => match <[Point; 3]>::try_from(control_points) {
                Ok(points) => vec![circle_to_bezier_anchors(points)],
                // Anything but exactly 3 points degrades to a plain bezier.
                Err(_) => bezier_segments(control_points),
            },
            SliderCurveType::Catmull => catmull_to_segments(control_points),
            SliderCurveType::Bezier => bezier_segments(control_points),
        };

        let mut path = Vec::new();
        for anchors in &segments {
            if anchors.len() < 2 {
                continue;
            }

            let steps = (anchors.len() * 16).clamp(8, 192);
            let start = if path.is_empty() { 0 } else { 1 };
            for i in start..=steps {
                path.push(bezier_at(anchors, i as f64 / steps as f64));
            }
        }

        if path.is_empty() {
            let anchor = control_points.first().copied().unwrap_or_default();
            path = vec![anchor, anchor];
        }

        let mut cumulative = Vec::with_capacity(path.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for pair in path.windows(2) {
            total += pair[0].distance(pair[1]);
            cumulative.push(total);
        }

        Self {
            path,
            cumulative,
            pixel_length: pixel_length.abs(),
        }
    }

    /// Real arc length of the flattened path.
    #[must_use]
    pub fn length(&self) -> f64 {
        *self.cumulative.last().unwrap_or(&0.0)
    }

    /// Position after walking `progress` (in `[0, 1]`) of the nominal pixel
    /// length along the path.
    #[must_use]
    pub fn position_at(&self, progress: f64) -> Point {
        let target = (progress.clamp(0.0, 1.0) * self.pixel_length).min(self.length());

        let index = self
            .cumulative
            .partition_point(|&d| d < target)
            .clamp(1, self.path.len() - 1);

        let span = self.cumulative[index] - self.cumulative[index - 1];
        if span <= f64::EPSILON {
            return self.path[index];
        }

        let t = (target - self.cumulative[index - 1]) / span;
        self.path[index - 1].lerp(self.path[index], t)
    }

    #[must_use]
    pub fn end_position(&self) -> Point {
        self.position_at(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_path_walks_by_distance() {
        let points = [Point::new(0.0, 0.0), Point::new(100.0, 0.0)];
        let curve = SliderCurve::build(SliderCurveType::Linear, &points, 100.0);

        assert!((curve.length() - 100.0).abs() < 1e-9);
        assert_eq!(curve.position_at(0.0), Point::new(0.0, 0.0));
        assert_eq!(curve.position_at(0.5), Point::new(50.0, 0.0));
        assert_eq!(curve.end_position(), Point::new(100.0, 0.0));
    }

    #[test]
    fn short_nominal_length_stops_early() {
        let points = [Point::new(0.0, 0.0), Point::new(100.0, 0.0)];
        let curve = SliderCurve::build(SliderCurveType::Linear, &points, 50.0);

        assert_eq!(curve.end_position(), Point::new(50.0, 0.0));
    }

    #[test]
    fn long_nominal_length_clamps_to_path_end() {
        let points = [Point::new(0.0, 0.0), Point::new(100.0, 0.0)];
        let curve = SliderCurve::build(SliderCurveType::Linear, &points, 400.0);

        assert_eq!(curve.end_position(), Point::new(100.0, 0.0));
    }

    #[test]
    fn perfect_curve_passes_through_endpoints() {
        let points = [
            Point::new(0.0, 0.0),
            Point::new(50.0, 50.0),
            Point::new(100.0, 0.0),
        ];
        let curve = SliderCurve::build(SliderCurveType::PerfectCurve, &points, 160.0);

        assert!(curve.position_at(0.0).distance(points[0]) < 1e-6);
        // A half-circle through these points is ~157px long, so the walk
        // ends close to the last anchor.
        assert!(curve.end_position().distance(points[2]) < 5.0);
    }

    #[test]
    fn collinear_perfect_curve_degrades_gracefully() {
        let points = [
            Point::new(0.0, 0.0),
            Point::new(50.0, 0.0),
            Point::new(100.0, 0.0),
        ];
        let curve = SliderCurve::build(SliderCurveType::PerfectCurve, &points, 100.0);

        assert!((curve.length() - 100.0).abs() < 1.0);
        assert!(curve.end_position().distance(points[2]) < 1.0);
    }

    #[test]
    fn duplicate_anchor_splits_bezier() {
        let points = [
            Point::new(0.0, 0.0),
            Point::new(50.0, 0.0),
            Point::new(50.0, 0.0),
            Point::new(50.0, 50.0),
        ];
        let curve = SliderCurve::build(SliderCurveType::Bezier, &points, 100.0);

        assert!((curve.length() - 100.0).abs() < 1e-6);
        assert!(curve.position_at(0.5).distance(Point::new(50.0, 0.0)) < 1e-6);
    }

    #[test]
    fn degenerate_identical_points_yield_a_fixed_position() {
        let points = [Point::new(30.0, 40.0), Point::new(30.0, 40.0)];
        let curve = SliderCurve::build(SliderCurveType::Linear, &points, 100.0);

        assert_eq!(curve.length(), 0.0);
        assert_eq!(curve.position_at(0.7), Point::new(30.0, 40.0));
    }
}
