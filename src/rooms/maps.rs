//! KOZ arena layouts and map rotation.
//!
//! Four handcrafted layouts rotate between matches; the queue reshuffles
//! when exhausted and never repeats the same map back-to-back.

use crate::protocol::{MapView, PointView};
use crate::rooms::Obstacle;

/// One arena layout: cosmetics, zone seed, obstacles and spawn tables.
#[derive(Debug, Clone)]
pub struct ArenaMap {
    pub id: &'static str,
    pub name: &'static str,
    pub theme: &'static str,
    pub biome: &'static str,
    pub flavor: &'static str,
    pub preview_color: &'static str,
    pub zone: (f64, f64, f64),
    pub core: (f64, f64),
    pub obstacles: Vec<Obstacle>,
    pub spawn_points: Vec<(f64, f64)>,
    pub powerup_spawns: Vec<(f64, f64)>,
}

impl ArenaMap {
    #[must_use]
    pub fn view(&self, width: f64, height: f64) -> MapView {
        MapView {
            id: self.id.to_string(),
            name: self.name.to_string(),
            theme: self.theme.to_string(),
            biome: self.biome.to_string(),
            flavor: self.flavor.to_string(),
            preview_color: self.preview_color.to_string(),
            width,
            height,
            zone: PointView {
                x: self.zone.0,
                y: self.zone.1,
            },
            zone_radius: self.zone.2,
            core: PointView {
                x: self.core.0,
                y: self.core.1,
            },
        }
    }
}

/// Shuffled rotation over the map pool.
#[derive(Debug)]
pub struct MapRotation {
    pool: Vec<ArenaMap>,
    queue: Vec<ArenaMap>,
    current: ArenaMap,
}

impl MapRotation {
    /// Build the rotation for an arena of the given dimensions and pick an
    /// initial map at random.
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        let pool = map_pool(width, height);
        let mut queue: Vec<ArenaMap> = pool.clone();
        fastrand::shuffle(&mut queue);
        let current = queue.remove(0);
        Self {
            pool,
            queue,
            current,
        }
    }

    #[must_use]
    pub fn current(&self) -> &ArenaMap {
        &self.current
    }

    /// Advance to the next map, reshuffling when the queue runs dry.
    pub fn advance(&mut self) -> &ArenaMap {
        if self.queue.is_empty() {
            self.queue = self.pool.clone();
            fastrand::shuffle(&mut self.queue);
            // No immediate repeat after a reshuffle.
            if self.queue.len() > 1 && self.queue[0].id == self.current.id {
                let head = self.queue.remove(0);
                self.queue.push(head);
            }
        }
        self.current = self.queue.remove(0);
        &self.current
    }
}

fn map_pool(width: f64, height: f64) -> Vec<ArenaMap> {
    let cx = width / 2.0;
    let cy = height / 2.0;

    vec![
        ArenaMap {
            id: "core-crucible",
            name: "Core Crucible",
            theme: "nebula-night",
            biome: "Control Grid",
            flavor: "Balanced lanes with mirrored cover around center.",
            preview_color: "#79d9ff",
            zone: (cx, cy, 1260.0),
            core: (cx, cy),
            obstacles: vec![
                Obstacle::solid("wall_tl", 820.0, 640.0, 680.0, 120.0),
                Obstacle::solid("wall_tr", 2700.0, 640.0, 680.0, 120.0),
                Obstacle::solid("wall_bl", 820.0, 2040.0, 680.0, 120.0),
                Obstacle::solid("wall_br", 2700.0, 2040.0, 680.0, 120.0),
                Obstacle::solid("pillar_l", 1490.0, 1150.0, 140.0, 500.0),
                Obstacle::solid("pillar_r", 2570.0, 1150.0, 140.0, 500.0),
                Obstacle::solid("mid_top", 1880.0, 840.0, 440.0, 110.0),
                Obstacle::solid("mid_bot", 1880.0, 1850.0, 440.0, 110.0),
            ],
            spawn_points: vec![
                (560.0, 560.0),
                (2100.0, 420.0),
                (3640.0, 560.0),
                (560.0, 1400.0),
                (3640.0, 1400.0),
                (560.0, 2240.0),
                (2100.0, 2380.0),
                (3640.0, 2240.0),
                (1180.0, 980.0),
                (3020.0, 980.0),
                (1180.0, 1820.0),
                (3020.0, 1820.0),
            ],
            powerup_spawns: vec![
                (1050.0, 1050.0),
                (2100.0, 1040.0),
                (3150.0, 1050.0),
                (1050.0, 1760.0),
                (2100.0, 1760.0),
                (3150.0, 1760.0),
                (1570.0, 1400.0),
                (2630.0, 1400.0),
            ],
        },
        ArenaMap {
            id: "dune-circuit",
            name: "Dune Circuit",
            theme: "sunset-dunes",
            biome: "Outpost Ruins",
            flavor: "Wide side lanes with risky mid choke crossfire.",
            preview_color: "#ffbe6b",
            zone: (cx, cy, 1240.0),
            core: (cx, cy),
            obstacles: vec![
                Obstacle::solid("dune_top_l", 540.0, 520.0, 860.0, 130.0),
                Obstacle::solid("dune_top_r", 2800.0, 520.0, 860.0, 130.0),
                Obstacle::solid("dune_bot_l", 540.0, 2150.0, 860.0, 130.0),
                Obstacle::solid("dune_bot_r", 2800.0, 2150.0, 860.0, 130.0),
                Obstacle::solid("dune_mid_l", 1570.0, 930.0, 170.0, 930.0),
                Obstacle::solid("dune_mid_r", 2460.0, 930.0, 170.0, 930.0),
                Obstacle::solid("dune_lane_top", 1870.0, 780.0, 460.0, 100.0),
                Obstacle::solid("dune_lane_bot", 1870.0, 1920.0, 460.0, 100.0),
                Obstacle::solid("dune_cut_top", 1960.0, 1120.0, 280.0, 90.0),
                Obstacle::solid("dune_cut_bot", 1960.0, 1600.0, 280.0, 90.0),
            ],
            spawn_points: vec![
                (500.0, 480.0),
                (2100.0, 380.0),
                (3700.0, 480.0),
                (500.0, 1400.0),
                (3700.0, 1400.0),
                (500.0, 2320.0),
                (2100.0, 2420.0),
                (3700.0, 2320.0),
                (1150.0, 960.0),
                (3050.0, 960.0),
                (1150.0, 1840.0),
                (3050.0, 1840.0),
            ],
            powerup_spawns: vec![
                (980.0, 980.0),
                (2100.0, 930.0),
                (3220.0, 980.0),
                (980.0, 1820.0),
                (2100.0, 1870.0),
                (3220.0, 1820.0),
                (1580.0, 1400.0),
                (2620.0, 1400.0),
            ],
        },
        ArenaMap {
            id: "neon-split",
            name: "Neon Split",
            theme: "neon-grid",
            biome: "Cyber Junction",
            flavor: "Tight center split with flank portals on both sides.",
            preview_color: "#8ac7ff",
            zone: (cx, cy, 1180.0),
            core: (cx, cy),
            obstacles: vec![
                Obstacle::solid("neon_gate_l", 760.0, 680.0, 220.0, 1440.0),
                Obstacle::solid("neon_gate_r", 3220.0, 680.0, 220.0, 1440.0),
                Obstacle::solid("neon_top_bar", 1320.0, 620.0, 1560.0, 120.0),
                Obstacle::solid("neon_bot_bar", 1320.0, 2060.0, 1560.0, 120.0),
                Obstacle::solid("neon_center_v", 1990.0, 980.0, 220.0, 840.0),
                Obstacle::solid("neon_center_h", 1680.0, 1290.0, 840.0, 220.0),
                Obstacle::solid("neon_inner_tl", 1440.0, 980.0, 220.0, 180.0),
                Obstacle::solid("neon_inner_tr", 2540.0, 980.0, 220.0, 180.0),
                Obstacle::solid("neon_inner_bl", 1440.0, 1620.0, 220.0, 180.0),
                Obstacle::solid("neon_inner_br", 2540.0, 1620.0, 220.0, 180.0),
            ],
            spawn_points: vec![
                (600.0, 520.0),
                (2100.0, 430.0),
                (3600.0, 520.0),
                (600.0, 1400.0),
                (3600.0, 1400.0),
                (600.0, 2280.0),
                (2100.0, 2370.0),
                (3600.0, 2280.0),
                (1280.0, 860.0),
                (2920.0, 860.0),
                (1280.0, 1940.0),
                (2920.0, 1940.0),
            ],
            powerup_spawns: vec![
                (1000.0, 760.0),
                (2100.0, 760.0),
                (3200.0, 760.0),
                (1000.0, 2040.0),
                (2100.0, 2040.0),
                (3200.0, 2040.0),
                (1560.0, 1400.0),
                (2640.0, 1400.0),
            ],
        },
        ArenaMap {
            id: "wild-bastion",
            name: "Wild Bastion",
            theme: "jungle-monsoon",
            biome: "Overgrown Fortress",
            flavor: "Ringed center and broken lanes reward rotations.",
            preview_color: "#8ff1b7",
            zone: (cx, cy, 1260.0),
            core: (cx, cy),
            obstacles: vec![
                Obstacle::solid("wild_top_l", 700.0, 500.0, 640.0, 140.0),
                Obstacle::solid("wild_top_m", 1820.0, 500.0, 560.0, 130.0),
                Obstacle::solid("wild_top_r", 2860.0, 500.0, 640.0, 140.0),
                Obstacle::solid("wild_mid_l", 920.0, 900.0, 170.0, 730.0),
                Obstacle::solid("wild_mid_r", 3110.0, 900.0, 170.0, 730.0),
                Obstacle::solid("wild_ring_top", 1710.0, 980.0, 780.0, 120.0),
                Obstacle::solid("wild_ring_bot", 1710.0, 1700.0, 780.0, 120.0),
                Obstacle::solid("wild_ring_l", 1710.0, 1100.0, 120.0, 600.0),
                Obstacle::solid("wild_ring_r", 2370.0, 1100.0, 120.0, 600.0),
                Obstacle::solid("wild_bot_l", 700.0, 2160.0, 640.0, 140.0),
                Obstacle::solid("wild_bot_m", 1820.0, 2160.0, 560.0, 130.0),
                Obstacle::solid("wild_bot_r", 2860.0, 2160.0, 640.0, 140.0),
            ],
            spawn_points: vec![
                (520.0, 620.0),
                (2100.0, 400.0),
                (3680.0, 620.0),
                (520.0, 1400.0),
                (3680.0, 1400.0),
                (520.0, 2180.0),
                (2100.0, 2440.0),
                (3680.0, 2180.0),
                (1240.0, 1140.0),
                (2960.0, 1140.0),
                (1240.0, 1660.0),
                (2960.0, 1660.0),
            ],
            powerup_spawns: vec![
                (900.0, 1040.0),
                (2100.0, 930.0),
                (3300.0, 1040.0),
                (900.0, 1760.0),
                (2100.0, 1870.0),
                (3300.0, 1760.0),
                (1500.0, 1400.0),
                (2700.0, 1400.0),
            ],
        },
    ]
}
