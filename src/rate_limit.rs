//! Windowed per-connection rate limiting for chat sends and join attempts.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

use crate::protocol::ConnId;

/// Rate limiting configuration for one action class.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// Actions allowed per window.
    pub max_actions: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_actions: 6,
            window: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
struct WindowEntry {
    actions: u32,
    window_start: Instant,
}

impl WindowEntry {
    fn new() -> Self {
        Self {
            actions: 0,
            window_start: Instant::now(),
        }
    }

    fn maybe_reset(&mut self, config: &WindowConfig) {
        if self.window_start.elapsed() >= config.window {
            self.actions = 0;
            self.window_start = Instant::now();
        }
    }

    fn try_action(&mut self, config: &WindowConfig) -> bool {
        self.maybe_reset(config);
        if self.actions < config.max_actions {
            self.actions += 1;
            true
        } else {
            false
        }
    }

    fn time_until_reset(&self, config: &WindowConfig) -> Duration {
        config.window.saturating_sub(self.window_start.elapsed())
    }
}

/// Action rejected; retry after the window resets.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Rate limit exceeded. Try again in {} seconds.", retry_after.as_secs())]
pub struct RateLimitExceeded {
    pub retry_after: Duration,
}

/// Per-connection sliding-window limiter.
pub struct ActionRateLimiter {
    config: WindowConfig,
    entries: Arc<RwLock<HashMap<ConnId, WindowEntry>>>,
}

impl ActionRateLimiter {
    #[must_use]
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Check whether an action is allowed for `conn` and record it.
    pub async fn check(&self, conn: &ConnId) -> Result<(), RateLimitExceeded> {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(*conn).or_insert_with(WindowEntry::new);

        if entry.try_action(&self.config) {
            Ok(())
        } else {
            Err(RateLimitExceeded {
                retry_after: entry.time_until_reset(&self.config),
            })
        }
    }

    /// Forget a disconnected sender.
    pub async fn forget(&self, conn: &ConnId) {
        self.entries.write().await.remove(conn);
    }

    /// Clean up entries idle for longer than two windows.
    pub async fn cleanup_old_entries(&self) {
        let mut entries = self.entries.write().await;
        let threshold = self.config.window * 2;
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.window_start) < threshold);
    }

    /// Spawn a background task that periodically prunes idle entries.
    pub fn start_cleanup_task(self: Arc<Self>) {
        let limiter = Arc::clone(&self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.config.window);
            loop {
                interval.tick().await;
                limiter.cleanup_old_entries().await;
            }
        });
    }
}
