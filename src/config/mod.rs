//! Configuration module.
//!
//! Provides configuration management with support for:
//! - JSON configuration files
//! - Environment variable overrides
//! - Sensible compiled defaults
//!
//! # Module Structure
//!
//! - [`types`]: Root `Config` struct
//! - [`server`]: Transport and chat behavior (queue sizes, rate limits)
//! - [`game`]: Per-mode gameplay tuning, weapon and power-up tables
//! - [`logging`]: Logging configuration
//! - [`loader`]: Configuration loading functions
//! - [`validation`]: Configuration validation functions
//! - [`defaults`]: Default value functions

pub mod defaults;
pub mod game;
pub mod loader;
pub mod logging;
pub mod server;
pub mod types;
pub mod validation;

pub use game::{
    BossTuning, GameConfig, HeroSpeeds, KozTuning, PowerUpTable, PvpTuning, SlitherTuning,
    WeaponSpec, WeaponTable,
};
pub use loader::load;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use server::{ChatLimitsConfig, JoinRateConfig, ServerConfig};
pub use types::Config;
pub use validation::{validate_config, InvalidConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();

        assert_eq!(config.port, 3570);
        assert_eq!(config.server.max_message_size, 65536);
        assert_eq!(config.server.chat.max_length, 280);
        assert_eq!(config.server.join_rate.max_attempts, 20);

        assert_eq!(config.game.boss.capacity, 10);
        assert_eq!(config.game.pvp.capacity, 2);
        assert_eq!(config.game.koz.max_active_players, 12);
        assert_eq!(config.game.koz.tick_hz, 30);
        assert_eq!(config.game.koz.snapshot_hz, 15);
        assert_eq!(config.game.slither.capacity, 24);

        assert_eq!(config.logging.dir, "logs");
        assert_eq!(config.logging.filename, "server.log");
        assert_eq!(config.logging.rotation, "daily");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.port, deserialized.port);
        assert_eq!(
            config.game.koz.score_target,
            deserialized.game.koz.score_target
        );
        assert_eq!(
            config.server.chat.max_messages,
            deserialized.server.chat.max_messages
        );
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::Info.to_string(), "info");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }
}
