//! Root configuration types.

use serde::{Deserialize, Serialize};

use super::defaults::default_port;
use super::game::GameConfig;
use super::logging::LoggingConfig;
use super::server::ServerConfig;

/// Root configuration struct.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            server: ServerConfig::default(),
            game: GameConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
