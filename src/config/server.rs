//! Transport and chat behavior configuration.

use serde::{Deserialize, Serialize};

use super::defaults::{
    default_chat_max_length, default_chat_max_messages, default_chat_window_secs,
    default_cors_origins, default_join_window_secs, default_max_events_per_second,
    default_max_join_attempts, default_max_message_size, default_send_failure_streak,
    default_send_queue_capacity,
};

/// Server behavior configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Maximum inbound frame size in bytes; larger frames are dropped.
    pub max_message_size: usize,
    /// Per-connection outbound queue capacity before frames are dropped.
    pub send_queue_capacity: usize,
    /// Consecutive dropped frames before a subscriber is disconnected.
    pub send_failure_streak: u32,
    /// Inbound event ceiling per connection per second.
    pub max_events_per_second: u32,
    /// Comma-separated allowed CORS origins, or "*" for permissive.
    pub cors_origins: String,
    /// Chat rate limiting and content limits.
    pub chat: ChatLimitsConfig,
    /// Join-attempt rate limiting.
    pub join_rate: JoinRateConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            send_queue_capacity: default_send_queue_capacity(),
            send_failure_streak: default_send_failure_streak(),
            max_events_per_second: default_max_events_per_second(),
            cors_origins: default_cors_origins(),
            chat: ChatLimitsConfig::default(),
            join_rate: JoinRateConfig::default(),
        }
    }
}

/// Chat limits, consolidated here rather than scattered as constants.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ChatLimitsConfig {
    /// Rate-limit window (seconds).
    pub window_secs: u64,
    /// Messages allowed per sender per window.
    pub max_messages: u32,
    /// Maximum message content length in characters.
    pub max_length: usize,
}

impl Default for ChatLimitsConfig {
    fn default() -> Self {
        Self {
            window_secs: default_chat_window_secs(),
            max_messages: default_chat_max_messages(),
            max_length: default_chat_max_length(),
        }
    }
}

/// Join-attempt rate limiting.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct JoinRateConfig {
    /// Rate-limit window (seconds).
    pub window_secs: u64,
    /// Join attempts allowed per connection per window.
    pub max_attempts: u32,
}

impl Default for JoinRateConfig {
    fn default() -> Self {
        Self {
            window_secs: default_join_window_secs(),
            max_attempts: default_max_join_attempts(),
        }
    }
}
