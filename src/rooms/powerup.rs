//! Power-up subsystem: spawn cadence, placement, pickup detection.
//!
//! Effects are applied by the owning room (they touch mode-specific player
//! fields); this module owns the entity, the cadence bookkeeping and the
//! clear-spot placement shared by the modes that spawn power-ups.

use crate::geometry::distance;
use crate::protocol::{PowerUpKind, PowerUpView};

/// Minimum spacing between two spawned power-ups.
const SPAWN_CLEARANCE: f64 = 50.0;

/// One power-up waiting on the floor.
#[derive(Debug, Clone)]
pub struct PowerUp {
    pub id: String,
    pub kind: PowerUpKind,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub spawned_at: f64,
}

impl PowerUp {
    #[must_use]
    pub fn view(&self) -> PowerUpView {
        PowerUpView {
            id: self.id.clone(),
            kind: self.kind,
            x: self.x,
            y: self.y,
            radius: self.radius,
        }
    }
}

/// Cadence + population bookkeeping for one room.
#[derive(Debug, Clone)]
pub struct PowerUpSpawner {
    pub next_spawn_at: f64,
    pub seq: u64,
    interval: f64,
    max_population: usize,
    kinds: Vec<PowerUpKind>,
    radius: f64,
}

impl PowerUpSpawner {
    #[must_use]
    pub fn new(interval: f64, max_population: usize, kinds: Vec<PowerUpKind>, radius: f64) -> Self {
        Self {
            next_spawn_at: 0.0,
            seq: 0,
            interval,
            max_population,
            kinds,
            radius,
        }
    }

    pub fn reset(&mut self, now: f64, warmup: f64) {
        self.next_spawn_at = now + warmup;
        self.seq = 0;
    }

    /// Spawn one power-up if the cadence allows and the population ceiling
    /// is not reached. Picks the first clear configured spot, else a random
    /// one. Returns the spawned power-up for broadcast.
    pub fn try_spawn(
        &mut self,
        now: f64,
        existing: &[PowerUp],
        spots: &[(f64, f64)],
    ) -> Option<PowerUp> {
        if now < self.next_spawn_at {
            return None;
        }
        self.next_spawn_at = now + self.interval;

        if existing.len() >= self.max_population || spots.is_empty() || self.kinds.is_empty() {
            return None;
        }

        let mut shuffled: Vec<(f64, f64)> = spots.to_vec();
        fastrand::shuffle(&mut shuffled);
        let chosen = shuffled
            .iter()
            .find(|(sx, sy)| {
                existing
                    .iter()
                    .all(|p| distance(*sx, *sy, p.x, p.y) >= SPAWN_CLEARANCE)
            })
            .or_else(|| shuffled.first())
            .copied()?;

        let kind = self.kinds[fastrand::usize(..self.kinds.len())];
        self.seq += 1;
        Some(PowerUp {
            id: format!("pow_{}", self.seq),
            kind,
            x: chosen.0,
            y: chosen.1,
            radius: self.radius,
            spawned_at: now,
        })
    }
}

/// Index of the first power-up a player circle touches, if any.
#[must_use]
pub fn pickup_index(powerups: &[PowerUp], px: f64, py: f64, player_radius: f64) -> Option<usize> {
    powerups
        .iter()
        .position(|p| distance(px, py, p.x, p.y) <= player_radius + p.radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawner() -> PowerUpSpawner {
        PowerUpSpawner::new(
            7.0,
            2,
            vec![PowerUpKind::Heal, PowerUpKind::Speed],
            18.0,
        )
    }

    const SPOTS: &[(f64, f64)] = &[(100.0, 100.0), (300.0, 100.0), (500.0, 100.0)];

    #[test]
    fn respects_cadence() {
        let mut s = spawner();
        s.reset(0.0, 2.0);
        assert!(s.try_spawn(1.0, &[], SPOTS).is_none());
        let first = s.try_spawn(2.5, &[], SPOTS);
        assert!(first.is_some());
        // Cadence pushed out by the interval.
        assert!(s.try_spawn(3.0, &[], SPOTS).is_none());
        assert!(s.try_spawn(9.6, &[], SPOTS).is_some());
    }

    #[test]
    fn respects_population_ceiling() {
        let mut s = spawner();
        s.reset(0.0, 0.0);
        let a = s.try_spawn(0.0, &[], SPOTS).unwrap();
        let b = s.try_spawn(8.0, &[a.clone()], SPOTS).unwrap();
        assert!(s.try_spawn(16.0, &[a, b], SPOTS).is_none());
    }

    #[test]
    fn avoids_occupied_spots() {
        let mut s = spawner();
        s.reset(0.0, 0.0);
        let occupied: Vec<PowerUp> = SPOTS[..2]
            .iter()
            .enumerate()
            .map(|(i, (x, y))| PowerUp {
                id: format!("pow_{i}"),
                kind: PowerUpKind::Heal,
                x: *x,
                y: *y,
                radius: 18.0,
                spawned_at: 0.0,
            })
            .collect();
        let spawned = s.try_spawn(0.0, &occupied, SPOTS).unwrap();
        assert_eq!((spawned.x, spawned.y), SPOTS[2]);
    }

    #[test]
    fn pickup_detection_uses_combined_radius() {
        let pows = vec![PowerUp {
            id: "pow_1".into(),
            kind: PowerUpKind::Ammo,
            x: 100.0,
            y: 100.0,
            radius: 18.0,
            spawned_at: 0.0,
        }];
        assert_eq!(pickup_index(&pows, 130.0, 100.0, 22.0), Some(0));
        assert_eq!(pickup_index(&pows, 150.0, 100.0, 22.0), None);
    }
}
