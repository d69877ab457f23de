//! Fair spawn allocation.
//!
//! Placement tries random samples first, then a grid walk, and finally
//! clamps the requested position into bounds. A join is never rejected for
//! lack of a clear seat.

use crate::geometry::clamp;

/// Admissible spawn rectangle for a circle of the caller's radius.
#[derive(Debug, Clone, Copy)]
pub struct SpawnArea {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl SpawnArea {
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.max_x <= self.min_x || self.max_y <= self.min_y
    }
}

/// Find a clear spawn position.
///
/// Samples `attempts` random candidates, then walks a grid at `grid_step`.
/// Returns `None` when nothing in the area passes `is_clear`; the caller
/// falls back to clamping the requested position.
pub fn allocate_spawn(
    area: SpawnArea,
    attempts: u32,
    grid_step: f64,
    mut is_clear: impl FnMut(f64, f64) -> bool,
) -> Option<(f64, f64)> {
    if area.is_degenerate() {
        return None;
    }

    for _ in 0..attempts {
        let x = area.min_x + fastrand::f64() * (area.max_x - area.min_x);
        let y = area.min_y + fastrand::f64() * (area.max_y - area.min_y);
        if is_clear(x, y) {
            return Some((x, y));
        }
    }

    let step = grid_step.max(1.0);
    let mut y = area.min_y;
    while y <= area.max_y {
        let mut x = area.min_x;
        while x <= area.max_x {
            if is_clear(x, y) {
                return Some((x, y));
            }
            x += step;
        }
        y += step;
    }

    None
}

/// Last-resort placement: clamp the requested position into the area.
#[must_use]
pub fn clamp_into_area(area: SpawnArea, x: f64, y: f64) -> (f64, f64) {
    (
        clamp(x, area.min_x, area.max_x),
        clamp(y, area.min_y, area.max_y),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::distance;

    fn area() -> SpawnArea {
        SpawnArea {
            min_x: 50.0,
            max_x: 950.0,
            min_y: 50.0,
            max_y: 550.0,
        }
    }

    #[test]
    fn open_area_spawns_on_first_samples() {
        let spot = allocate_spawn(area(), 80, 40.0, |_, _| true).unwrap();
        assert!(spot.0 >= 50.0 && spot.0 <= 950.0);
        assert!(spot.1 >= 50.0 && spot.1 <= 550.0);
    }

    #[test]
    fn grid_walk_finds_the_single_clear_cell() {
        // Only positions near (50, 50) are clear; random samples are very
        // unlikely to land there, the grid walk starts there.
        let spot = allocate_spawn(area(), 5, 40.0, |x, y| {
            distance(x, y, 50.0, 50.0) < 1.0
        });
        assert_eq!(spot, Some((50.0, 50.0)));
    }

    #[test]
    fn fully_blocked_area_returns_none() {
        assert_eq!(allocate_spawn(area(), 20, 100.0, |_, _| false), None);
    }

    #[test]
    fn degenerate_area_returns_none() {
        let bad = SpawnArea {
            min_x: 500.0,
            max_x: 400.0,
            min_y: 50.0,
            max_y: 550.0,
        };
        assert_eq!(allocate_spawn(bad, 20, 40.0, |_, _| true), None);
    }

    #[test]
    fn clamp_fallback_stays_in_area() {
        let (x, y) = clamp_into_area(area(), -100.0, 9000.0);
        assert_eq!((x, y), (50.0, 550.0));
    }

    #[test]
    fn avoids_occupied_seats() {
        // One occupant in the middle; allocation must keep min distance.
        let occupied = (500.0, 300.0);
        let min_dist = 76.0; // 2 * radius + padding
        let spot = allocate_spawn(area(), 80, 40.0, |x, y| {
            distance(x, y, occupied.0, occupied.1) >= min_dist
        })
        .unwrap();
        assert!(distance(spot.0, spot.1, occupied.0, occupied.1) >= min_dist);
    }
}
