//! Planar geometry helpers shared by every simulation mode.
//!
//! All coordinates are in arena pixels with the origin at the top-left
//! corner, x growing right and y growing down.

use serde::{Deserialize, Serialize};

/// Clamp `value` into the inclusive range `[lo, hi]`.
#[must_use]
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

/// Euclidean distance between two points.
#[must_use]
pub fn distance(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    (ax - bx).hypot(ay - by)
}

/// Axis-aligned rectangle used for static obstacles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    #[must_use]
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Closest point on this rectangle to `(px, py)`.
    #[must_use]
    pub fn nearest_point(&self, px: f64, py: f64) -> (f64, f64) {
        (
            clamp(px, self.x, self.x + self.w),
            clamp(py, self.y, self.y + self.h),
        )
    }
}

/// True when the circle at `(cx, cy)` with `radius` overlaps `rect`.
#[must_use]
pub fn circle_rect_intersects(cx: f64, cy: f64, radius: f64, rect: &Rect) -> bool {
    let (nx, ny) = rect.nearest_point(cx, cy);
    let dx = cx - nx;
    let dy = cy - ny;
    dx * dx + dy * dy <= radius * radius
}

/// Which velocity component a rectangle resolution zeroed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedAxis {
    X,
    Y,
}

/// Push a circle out of a rectangle along the shallower axis.
///
/// Returns the corrected center and the axis that was resolved, or `None`
/// when there was no overlap to begin with.
#[must_use]
pub fn resolve_circle_rect(
    cx: f64,
    cy: f64,
    radius: f64,
    rect: &Rect,
) -> Option<(f64, f64, ResolvedAxis)> {
    if !circle_rect_intersects(cx, cy, radius, rect) {
        return None;
    }

    let (nx, ny) = rect.nearest_point(cx, cy);
    let dx = cx - nx;
    let dy = cy - ny;

    if dx.abs() > dy.abs() {
        let push = if dx >= 0.0 { radius } else { -radius };
        Some((nx + push, cy, ResolvedAxis::X))
    } else {
        let push = if dy >= 0.0 { radius } else { -radius };
        Some((cx, ny + push, ResolvedAxis::Y))
    }
}

/// Resolve an overlap between a moving circle and a stationary one.
///
/// Only the caller's position is adjusted; the other center stays put.
/// Returns the corrected position and whether a correction was applied.
/// A degenerate zero-distance pair is pushed apart along the x axis.
#[must_use]
pub fn resolve_circle_overlap(
    desired_x: f64,
    desired_y: f64,
    other_x: f64,
    other_y: f64,
    min_dist: f64,
) -> (f64, f64, bool) {
    let dx = desired_x - other_x;
    let dy = desired_y - other_y;
    let dist = (dx * dx + dy * dy).sqrt();

    if dist < 0.001 {
        return (other_x + min_dist, desired_y, true);
    }
    if dist >= min_dist {
        return (desired_x, desired_y, false);
    }

    let overlap = min_dist - dist;
    let nx = dx / dist;
    let ny = dy / dist;
    (desired_x + nx * overlap, desired_y + ny * overlap, true)
}

/// Normalize a vector to unit length; zero vectors are returned unchanged.
#[must_use]
pub fn normalize(x: f64, y: f64) -> (f64, f64) {
    let mag = x.hypot(y);
    if mag <= f64::EPSILON {
        (0.0, 0.0)
    } else {
        (x / mag, y / mag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp(5.0, 0.0, 10.0), 5.0);
        assert_eq!(clamp(-1.0, 0.0, 10.0), 0.0);
        assert_eq!(clamp(11.0, 0.0, 10.0), 10.0);
    }

    #[test]
    fn distance_is_symmetric() {
        assert!((distance(0.0, 0.0, 3.0, 4.0) - 5.0).abs() < 1e-9);
        assert!((distance(3.0, 4.0, 0.0, 0.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn circle_rect_overlap_detection() {
        let rect = Rect::new(100.0, 100.0, 50.0, 50.0);
        assert!(circle_rect_intersects(95.0, 125.0, 10.0, &rect));
        assert!(circle_rect_intersects(125.0, 125.0, 5.0, &rect));
        assert!(!circle_rect_intersects(80.0, 125.0, 10.0, &rect));
    }

    #[test]
    fn circle_rect_resolution_pushes_out_along_shallow_axis() {
        let rect = Rect::new(100.0, 100.0, 200.0, 40.0);
        // Approaching from the left edge: push along x.
        let (x, _y, axis) = resolve_circle_rect(98.0, 120.0, 10.0, &rect).unwrap();
        assert_eq!(axis, ResolvedAxis::X);
        assert!(x <= 90.0 + 1e-9);
        // Approaching from above the wide face: push along y.
        let (_x, y, axis) = resolve_circle_rect(200.0, 98.0, 10.0, &rect).unwrap();
        assert_eq!(axis, ResolvedAxis::Y);
        assert!(y <= 90.0 + 1e-9);
    }

    #[test]
    fn circle_rect_resolution_no_overlap_is_none() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(resolve_circle_rect(100.0, 100.0, 5.0, &rect).is_none());
    }

    #[test]
    fn overlap_resolution_separates_centers() {
        let (x, y, corrected) = resolve_circle_overlap(400.0, 400.0, 400.0, 400.0, 44.0);
        assert!(corrected);
        assert!(distance(x, y, 400.0, 400.0) >= 44.0 - 1e-9);
    }

    #[test]
    fn overlap_resolution_leaves_distant_circles_alone() {
        let (x, y, corrected) = resolve_circle_overlap(0.0, 0.0, 100.0, 0.0, 44.0);
        assert!(!corrected);
        assert_eq!((x, y), (0.0, 0.0));
    }

    #[test]
    fn normalize_zero_vector() {
        assert_eq!(normalize(0.0, 0.0), (0.0, 0.0));
    }

    proptest! {
        #[test]
        fn resolved_overlap_always_meets_min_distance(
            dx in -40.0f64..40.0,
            dy in -40.0f64..40.0,
            min_dist in 1.0f64..120.0,
        ) {
            let (ox, oy) = (500.0, 500.0);
            let (x, y, _) = resolve_circle_overlap(ox + dx, oy + dy, ox, oy, min_dist);
            prop_assert!(distance(x, y, ox, oy) >= min_dist - 1e-6);
        }

        #[test]
        fn clamp_result_within_range(v in -1e6f64..1e6, lo in -100.0f64..0.0, hi in 0.0f64..100.0) {
            let c = clamp(v, lo, hi);
            prop_assert!(c >= lo && c <= hi);
        }
    }
}
