//! Per-mode gameplay tuning: capacities, cadences, arena dimensions, the
//! weapon table and the power-up effect table.
//!
//! Everything here is a design parameter; the compiled defaults match the
//! live balance and any field can be overridden from the config file.

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::protocol::{HeroClass, PowerUpKind, WeaponKind};

/// Root gameplay configuration.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct GameConfig {
    pub boss: BossTuning,
    pub pvp: PvpTuning,
    pub koz: KozTuning,
    pub slither: SlitherTuning,
    pub weapons: WeaponTable,
    pub powerups: PowerUpTable,
}

/// One weapon archetype's projectile parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WeaponSpec {
    /// Projectile speed (px/s).
    pub speed: f64,
    /// Base damage per hit.
    pub damage: f64,
    /// Seconds between shots.
    pub cooldown: f64,
    /// Projectile radius (px).
    pub radius: f64,
    /// Seconds before the projectile expires.
    pub lifetime: f64,
    /// Angular offsets (radians) fired per shot; one projectile each.
    pub spread: SmallVec<[f64; 3]>,
    /// Extra targets a projectile may pass through after the first hit.
    pub pierce: u32,
    /// Arena-boundary reflections before the projectile is destroyed.
    pub bounces: u32,
    /// Splash radius (0 disables splash).
    pub splash: f64,
    /// Render color hint forwarded to clients.
    pub color: String,
}

/// The four weapon archetypes.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct WeaponTable {
    pub bulwark_disc: WeaponSpec,
    pub arcane_orb: WeaponSpec,
    pub piercing_arrow: WeaponSpec,
    pub rage_axe: WeaponSpec,
}

impl WeaponTable {
    #[must_use]
    pub fn spec(&self, kind: WeaponKind) -> &WeaponSpec {
        match kind {
            WeaponKind::BulwarkDisc => &self.bulwark_disc,
            WeaponKind::ArcaneOrb => &self.arcane_orb,
            WeaponKind::PiercingArrow => &self.piercing_arrow,
            WeaponKind::RageAxe => &self.rage_axe,
        }
    }
}

impl Default for WeaponTable {
    fn default() -> Self {
        Self {
            bulwark_disc: WeaponSpec {
                speed: 880.0,
                damage: 23.0,
                cooldown: 0.44,
                radius: 7.0,
                lifetime: 1.55,
                spread: smallvec![0.0],
                pierce: 0,
                bounces: 1,
                splash: 0.0,
                color: "#7ed3ff".to_string(),
            },
            arcane_orb: WeaponSpec {
                speed: 760.0,
                damage: 29.0,
                cooldown: 0.56,
                radius: 9.0,
                lifetime: 1.50,
                spread: smallvec![-0.08, 0.08],
                pierce: 0,
                bounces: 0,
                splash: 70.0,
                color: "#ffa76d".to_string(),
            },
            piercing_arrow: WeaponSpec {
                speed: 1080.0,
                damage: 20.0,
                cooldown: 0.33,
                radius: 5.0,
                lifetime: 1.30,
                spread: smallvec![0.0],
                pierce: 1,
                bounces: 0,
                splash: 0.0,
                color: "#87ffd5".to_string(),
            },
            rage_axe: WeaponSpec {
                speed: 700.0,
                damage: 34.0,
                cooldown: 0.60,
                radius: 10.0,
                lifetime: 1.35,
                spread: smallvec![0.0],
                pierce: 0,
                bounces: 0,
                splash: 34.0,
                color: "#ffcb6a".to_string(),
            },
        }
    }
}

/// Timed-effect and amount tuning for power-ups.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PowerUpTable {
    pub pickup_radius: f64,
    pub heal_amount: i32,
    pub speed_multiplier: f64,
    pub speed_duration_secs: f64,
    pub shield_duration_secs: f64,
    /// Fraction of incoming damage that still lands while shielded.
    pub shield_damage_factor: f64,
    pub rapid_fire_cooldown_factor: f64,
    pub rapid_fire_duration_secs: f64,
    pub damage_multiplier: f64,
    pub damage_duration_secs: f64,
    pub vision_ping_duration_secs: f64,
}

impl Default for PowerUpTable {
    fn default() -> Self {
        Self {
            pickup_radius: 18.0,
            heal_amount: 38,
            speed_multiplier: 1.35,
            speed_duration_secs: 5.0,
            shield_duration_secs: 5.5,
            shield_damage_factor: 0.58,
            rapid_fire_cooldown_factor: 0.68,
            rapid_fire_duration_secs: 5.0,
            damage_multiplier: 1.3,
            damage_duration_secs: 6.0,
            vision_ping_duration_secs: 4.0,
        }
    }
}

/// Per-hero base movement speed (px/s).
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct HeroSpeeds {
    pub knight: f64,
    pub wizard: f64,
    pub archer: f64,
    pub warrior: f64,
}

impl HeroSpeeds {
    #[must_use]
    pub fn for_hero(&self, hero: HeroClass) -> f64 {
        match hero {
            HeroClass::Knight => self.knight,
            HeroClass::Wizard => self.wizard,
            HeroClass::Archer => self.archer,
            HeroClass::Warrior => self.warrior,
        }
    }
}

impl Default for HeroSpeeds {
    fn default() -> Self {
        Self {
            knight: 312.0,
            wizard: 302.0,
            archer: 332.0,
            warrior: 296.0,
        }
    }
}

/// Boss Battle tuning.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct BossTuning {
    pub capacity: usize,
    pub player_radius: f64,
    pub boss_radius: f64,
    pub default_width: f64,
    pub default_height: f64,
    pub default_top: f64,
    pub default_boss_health: f64,
    pub spawn_attempts: u32,
    pub spawn_padding: f64,
    pub spawn_grid_step: f64,
    /// Light housekeeping cadence (power-up spawns).
    pub tick_hz: u32,
    pub powerup_interval_secs: f64,
    pub max_powerups: usize,
    pub powerup_kinds: Vec<PowerUpKind>,
}

impl Default for BossTuning {
    fn default() -> Self {
        Self {
            capacity: 10,
            player_radius: 35.0,
            boss_radius: 70.0,
            default_width: 1100.0,
            default_height: 600.0,
            default_top: 200.0,
            default_boss_health: 1000.0,
            spawn_attempts: 80,
            spawn_padding: 24.0,
            spawn_grid_step: 40.0,
            tick_hz: 5,
            powerup_interval_secs: 10.0,
            max_powerups: 4,
            powerup_kinds: vec![
                PowerUpKind::Heal,
                PowerUpKind::Shield,
                PowerUpKind::RapidFire,
                PowerUpKind::Ammo,
            ],
        }
    }
}

/// PVP Arena tuning.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PvpTuning {
    pub capacity: usize,
    pub player_radius: f64,
    pub arena_width: f64,
    pub arena_height: f64,
    pub default_lives: i64,
    pub spawn_left_x: f64,
    pub spawn_right_x: f64,
    pub spawn_y: f64,
}

impl Default for PvpTuning {
    fn default() -> Self {
        Self {
            capacity: 2,
            player_radius: 28.0,
            arena_width: 800.0,
            arena_height: 600.0,
            default_lives: 5,
            spawn_left_x: 100.0,
            spawn_right_x: 700.0,
            spawn_y: 300.0,
        }
    }
}

/// King-of-the-Zone tuning.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct KozTuning {
    pub tick_hz: u32,
    pub snapshot_hz: u32,
    pub map_width: f64,
    pub map_height: f64,
    pub player_radius: f64,
    pub min_players_to_start: usize,
    pub max_active_players: usize,
    pub countdown_secs: f64,
    pub match_duration_secs: f64,
    pub results_secs: f64,
    pub min_zone_radius: f64,
    pub shrink_interval_secs: f64,
    pub shrink_duration_secs: f64,
    /// Radius shed per shrink cycle.
    pub shrink_step: f64,
    /// Maximum drift distance as a fraction of the post-shrink radius.
    pub zone_drift_frac: f64,
    /// Padding keeping the zone disk inside the arena.
    pub zone_margin: f64,
    pub storm_damage: f64,
    pub storm_tick_secs: f64,
    /// HP regenerated per storm tick while inside the zone.
    pub zone_regen: i32,
    pub respawn_secs: f64,
    pub score_target: i64,
    pub kill_score: i64,
    pub core_score_per_second: i64,
    pub core_radius: f64,
    pub core_drop_cooldown_secs: f64,
    pub overclock_charge_per_second: f64,
    pub overclock_duration_secs: f64,
    pub overclock_speed_mult: f64,
    pub overclock_damage_mult: f64,
    pub overclock_spread: Vec<f64>,
    pub max_powerups: usize,
    pub powerup_spawn_secs: f64,
    pub powerup_kinds: Vec<PowerUpKind>,
    pub max_hp: i32,
    pub ammo_max: u32,
    pub ammo_regen_secs: f64,
    pub max_projectiles_per_room: usize,
    /// Acceleration blend rate (per second) toward the target velocity.
    pub accel_rate: f64,
    /// Velocity decay rate (per second) with no input held.
    pub friction_rate: f64,
    pub hero_speeds: HeroSpeeds,
}

impl Default for KozTuning {
    fn default() -> Self {
        Self {
            tick_hz: 30,
            snapshot_hz: 15,
            map_width: 4200.0,
            map_height: 2800.0,
            player_radius: 22.0,
            min_players_to_start: 4,
            max_active_players: 12,
            countdown_secs: 10.0,
            match_duration_secs: 180.0,
            results_secs: 12.0,
            min_zone_radius: 360.0,
            shrink_interval_secs: 24.0,
            shrink_duration_secs: 6.0,
            shrink_step: 200.0,
            zone_drift_frac: 0.35,
            zone_margin: 60.0,
            storm_damage: 8.0,
            storm_tick_secs: 1.0,
            zone_regen: 2,
            respawn_secs: 3.0,
            score_target: 70,
            kill_score: 10,
            core_score_per_second: 1,
            core_radius: 20.0,
            core_drop_cooldown_secs: 0.8,
            overclock_charge_per_second: 26.0,
            overclock_duration_secs: 6.0,
            overclock_speed_mult: 1.20,
            overclock_damage_mult: 1.15,
            overclock_spread: vec![-0.16, 0.0, 0.16],
            max_powerups: 6,
            powerup_spawn_secs: 7.0,
            powerup_kinds: vec![
                PowerUpKind::Heal,
                PowerUpKind::Speed,
                PowerUpKind::Shield,
                PowerUpKind::Damage,
                PowerUpKind::Ammo,
            ],
            max_hp: 100,
            ammo_max: 3,
            ammo_regen_secs: 0.9,
            max_projectiles_per_room: 96,
            accel_rate: 16.0,
            friction_rate: 10.0,
            hero_speeds: HeroSpeeds::default(),
        }
    }
}

/// Slither arena tuning.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SlitherTuning {
    pub tick_hz: u32,
    pub snapshot_hz: u32,
    pub leaderboard_interval_secs: f64,
    pub width: f64,
    pub height: f64,
    pub capacity: usize,
    pub min_players_to_start: usize,
    pub match_duration_secs: f64,
    pub ending_secs: f64,
    pub start_length: u32,
    pub min_length: u32,
    pub base_speed: f64,
    pub boost_multiplier: f64,
    pub boost_burn_per_second: f64,
    pub boost_mini_orb_interval: f64,
    pub head_radius: f64,
    pub orb_pickup_radius: f64,
    pub min_orbs: usize,
    pub max_orbs: usize,
    pub kill_bonus: i64,
    pub survival_bonus_per_second: i64,
    /// Cap on orbs dropped by one death.
    pub death_orb_cap: usize,
    pub colors: Vec<String>,
}

impl Default for SlitherTuning {
    fn default() -> Self {
        Self {
            tick_hz: 25,
            snapshot_hz: 12,
            leaderboard_interval_secs: 0.5,
            width: 4800.0,
            height: 3000.0,
            capacity: 24,
            min_players_to_start: 1,
            match_duration_secs: 300.0,
            ending_secs: 12.0,
            start_length: 16,
            min_length: 8,
            base_speed: 175.0,
            boost_multiplier: 1.55,
            boost_burn_per_second: 4.2,
            boost_mini_orb_interval: 0.14,
            head_radius: 11.0,
            orb_pickup_radius: 19.0,
            min_orbs: 320,
            max_orbs: 1200,
            kill_bonus: 25,
            survival_bonus_per_second: 1,
            death_orb_cap: 40,
            colors: vec![
                "#56d8ff".to_string(),
                "#ffb457".to_string(),
                "#94f88f".to_string(),
                "#ff7e9f".to_string(),
                "#bfa7ff".to_string(),
                "#ffd86f".to_string(),
                "#67f0d2".to_string(),
                "#8ec5ff".to_string(),
                "#ff9d6e".to_string(),
                "#d2ff7a".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weapon_table_matches_balance_sheet() {
        let table = WeaponTable::default();
        assert_eq!(table.spec(WeaponKind::PiercingArrow).pierce, 1);
        assert_eq!(table.spec(WeaponKind::BulwarkDisc).bounces, 1);
        assert_eq!(table.spec(WeaponKind::ArcaneOrb).spread.len(), 2);
        assert!(table.spec(WeaponKind::RageAxe).splash > 0.0);
        assert!((table.spec(WeaponKind::PiercingArrow).cooldown - 0.33).abs() < 1e-9);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let cfg: KozTuning = serde_json::from_str(r#"{"score_target": 120}"#).unwrap();
        assert_eq!(cfg.score_target, 120);
        assert_eq!(cfg.tick_hz, 30);
        assert_eq!(cfg.max_active_players, 12);
    }

    #[test]
    fn hero_speeds_lookup() {
        let speeds = HeroSpeeds::default();
        assert!(speeds.for_hero(HeroClass::Archer) > speeds.for_hero(HeroClass::Warrior));
    }
}
