//! Configuration validation.

use thiserror::Error;

use super::Config;

/// Aggregated configuration problems, one per line.
#[derive(Debug, Error)]
#[error("{issues}")]
pub struct InvalidConfig {
    issues: String,
}

/// Validate gameplay and transport settings. Collects every problem rather
/// than stopping at the first.
pub fn validate_config(cfg: &Config) -> Result<(), InvalidConfig> {
    let mut issues: Vec<String> = Vec::new();

    if cfg.server.max_message_size < 1024 {
        issues.push("server.max_message_size must be at least 1024 bytes".to_string());
    }
    if cfg.server.send_queue_capacity == 0 {
        issues.push("server.send_queue_capacity must be nonzero".to_string());
    }
    if cfg.server.chat.max_length == 0 || cfg.server.chat.max_length > 2000 {
        issues.push("server.chat.max_length must be in 1..=2000".to_string());
    }

    for (label, hz) in [
        ("game.koz.tick_hz", cfg.game.koz.tick_hz),
        ("game.slither.tick_hz", cfg.game.slither.tick_hz),
        ("game.boss.tick_hz", cfg.game.boss.tick_hz),
    ] {
        if !(1..=120).contains(&hz) {
            issues.push(format!("{label} must be in 1..=120, got {hz}"));
        }
    }
    if cfg.game.koz.snapshot_hz == 0 || cfg.game.koz.snapshot_hz > cfg.game.koz.tick_hz {
        issues.push("game.koz.snapshot_hz must be in 1..=tick_hz".to_string());
    }
    if cfg.game.slither.snapshot_hz == 0 || cfg.game.slither.snapshot_hz > cfg.game.slither.tick_hz
    {
        issues.push("game.slither.snapshot_hz must be in 1..=tick_hz".to_string());
    }

    if cfg.game.pvp.capacity != 2 {
        issues.push("game.pvp.capacity must be exactly 2".to_string());
    }
    for (label, capacity) in [
        ("game.boss.capacity", cfg.game.boss.capacity),
        ("game.koz.max_active_players", cfg.game.koz.max_active_players),
        ("game.slither.capacity", cfg.game.slither.capacity),
    ] {
        if capacity == 0 {
            issues.push(format!("{label} must be nonzero"));
        }
    }
    if cfg.game.koz.min_players_to_start > cfg.game.koz.max_active_players {
        issues.push("game.koz.min_players_to_start exceeds max_active_players".to_string());
    }
    if !(24..=32).contains(&cfg.game.slither.capacity) {
        issues.push("game.slither.capacity must be in 24..=32".to_string());
    }

    if cfg.game.koz.min_zone_radius <= 0.0 {
        issues.push("game.koz.min_zone_radius must be positive".to_string());
    }
    if cfg.game.koz.shrink_step <= 0.0 {
        issues.push("game.koz.shrink_step must be positive".to_string());
    }
    if !(0.0..1.0).contains(&cfg.game.koz.zone_drift_frac) {
        issues.push("game.koz.zone_drift_frac must be in [0, 1)".to_string());
    }

    for (label, spec) in [
        ("bulwark_disc", &cfg.game.weapons.bulwark_disc),
        ("arcane_orb", &cfg.game.weapons.arcane_orb),
        ("piercing_arrow", &cfg.game.weapons.piercing_arrow),
        ("rage_axe", &cfg.game.weapons.rage_axe),
    ] {
        if spec.cooldown <= 0.0 {
            issues.push(format!("game.weapons.{label}.cooldown must be positive"));
        }
        if spec.lifetime <= 0.0 {
            issues.push(format!("game.weapons.{label}.lifetime must be positive"));
        }
        if spec.spread.is_empty() {
            issues.push(format!("game.weapons.{label}.spread must not be empty"));
        }
    }

    if cfg.game.slither.min_length == 0 || cfg.game.slither.min_length > cfg.game.slither.start_length
    {
        issues.push("game.slither.min_length must be in 1..=start_length".to_string());
    }
    if cfg.game.slither.min_orbs > cfg.game.slither.max_orbs {
        issues.push("game.slither.min_orbs exceeds max_orbs".to_string());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(InvalidConfig {
            issues: issues.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn bad_tick_rate_is_rejected() {
        let mut cfg = Config::default();
        cfg.game.koz.tick_hz = 0;
        let err = validate_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("game.koz.tick_hz"));
    }

    #[test]
    fn pvp_capacity_is_pinned_to_two() {
        let mut cfg = Config::default();
        cfg.game.pvp.capacity = 4;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn multiple_issues_are_collected() {
        let mut cfg = Config::default();
        cfg.game.koz.tick_hz = 0;
        cfg.game.slither.capacity = 2;
        let err = validate_config(&cfg).unwrap_err().to_string();
        assert!(err.contains("tick_hz"));
        assert!(err.contains("slither.capacity"));
    }
}
