//! Pure-arithmetic geometry helpers: circle fitting from a contour,
//! subjective HSV distance, and orb-radius-to-distance conversion.

use crate::core::Hsv;

/// A 2-D point in frame pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn dist_squared(&self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Euclidean distance between two points, with `f64::EPSILON` never needed
/// here (callers add the epsilon themselves where they divide by a
/// distance; see [`crate::tracker`]).
pub fn distance(a: Point, b: Point) -> f64 {
    a.dist_squared(b).sqrt()
}

/// Result of fitting a circle to a contour.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
}

/// Estimates a circle from a contour by finding the two most distant points
/// among a uniform subsample of at most ~20 points, then taking their
/// midpoint as center and half their distance as radius.
///
/// Mirrors `psmove_tracker_estimate_circle_from_contour`: subsamples every
/// `max(1, n/20)`-th point and compares all pairs within that subsample;
/// the first pair achieving the maximum squared distance wins ties.
///
/// Returns `None` if `points` has fewer than 2 elements.
pub fn estimate_circle_from_contour(points: &[Point]) -> Option<Circle> {
    if points.len() < 2 {
        return None;
    }
    let step = std::cmp::max(1, points.len() / 20);
    let sample: Vec<Point> = points.iter().step_by(step).copied().collect();

    let mut best_d = -1.0f64;
    let mut best_pair = (sample[0], sample[0]);
    for i in 0..sample.len() {
        for j in (i + 1)..sample.len() {
            let d = sample[i].dist_squared(sample[j]);
            if d > best_d {
                best_d = d;
                best_pair = (sample[i], sample[j]);
            }
        }
    }

    let (m1, m2) = best_pair;
    Some(Circle {
        center: Point::new(0.5 * (m1.x + m2.x), 0.5 * (m1.y + m2.y)),
        radius: best_d.max(0.0).sqrt() / 2.0,
    })
}

/// Subjective HSV distance: hue weighted double relative to saturation and
/// value. Matches `psmove_tracker_hsvcolor_diff`.
pub fn hsv_distance(a: Hsv, b: Hsv) -> f64 {
    (a.h - b.h).abs() + 0.5 * (a.s - b.s).abs() + 0.5 * (a.v - b.v).abs()
}

/// Converts an observed blob diameter (in pixels) to a physical distance
/// (in millimeters), mirroring `psmove_tracker_calculate_distance`'s pinhole
/// approximation:
///
/// `distance = focal_length * real_diameter * user_factor / (pixel_diameter * pixel_height / 100 + eps)`
pub fn estimate_distance_mm(
    blob_diameter_px: f64,
    cam_focal_length: f64,
    cam_pixel_height: f64,
    orb_diameter_mm: f64,
    user_factor: f64,
) -> f64 {
    (cam_focal_length * orb_diameter_mm * user_factor)
        / (blob_diameter_px * cam_pixel_height / 100.0 + f64::EPSILON)
}
