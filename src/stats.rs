//! Match statistics sink.
//!
//! The core records one summary per completed match. Recording must never
//! block a room: summaries are pushed onto an unbounded queue and drained by
//! a background task. Durable persistence (SQL, leaderboards) is an
//! external collaborator behind the [`StatsSink`] trait.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::protocol::{GameMode, PowerUpKind, UserId};

/// Per-player line of a completed match.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerMatchStats {
    pub user_id: Option<UserId>,
    pub name: String,
    pub score: i64,
    pub kills: u32,
    pub deaths: u32,
    pub damage_dealt: f64,
    pub bullets_fired: u64,
    pub bullets_hit: u64,
    pub powerups_collected: Vec<PowerUpKind>,
}

/// Append-only record of one completed match.
#[derive(Debug, Clone)]
pub struct MatchSummary {
    pub mode: GameMode,
    pub room_id: String,
    /// Why the match ended: "score_target", "time_limit", "boss_defeated",
    /// "knockout", "abandoned".
    pub reason: String,
    pub duration_secs: f64,
    pub players: Vec<PlayerMatchStats>,
}

/// Non-blocking destination for match summaries. Called at most once per
/// match per room, after the room lock has been released.
pub trait StatsSink: Send + Sync {
    fn record_match_end(&self, summary: MatchSummary);
}

/// Production sink: queues summaries and logs them from a background task.
/// A deployment with persistence swaps the drain side for a writer.
pub struct QueuedStatsSink {
    tx: mpsc::UnboundedSender<MatchSummary>,
}

impl QueuedStatsSink {
    /// Spawn the drain task on the current runtime and return the sink.
    #[must_use]
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<MatchSummary>();
        tokio::spawn(async move {
            while let Some(summary) = rx.recv().await {
                tracing::info!(
                    mode = %summary.mode,
                    room_id = %summary.room_id,
                    reason = %summary.reason,
                    duration_secs = summary.duration_secs,
                    players = summary.players.len(),
                    "Match summary recorded"
                );
            }
        });
        Self { tx }
    }
}

impl StatsSink for QueuedStatsSink {
    fn record_match_end(&self, summary: MatchSummary) {
        if self.tx.send(summary).is_err() {
            tracing::warn!("Stats drain task is gone; dropping match summary");
        }
    }
}

/// Test sink that keeps every summary in memory.
#[derive(Default)]
pub struct MemoryStatsSink {
    summaries: Mutex<Vec<MatchSummary>>,
}

impl MemoryStatsSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn recorded(&self) -> Vec<MatchSummary> {
        self.summaries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl StatsSink for MemoryStatsSink {
    fn record_match_end(&self, summary: MatchSummary) {
        if let Ok(mut guard) = self.summaries.lock() {
            guard.push(summary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_accumulates() {
        let sink = MemoryStatsSink::new();
        sink.record_match_end(MatchSummary {
            mode: GameMode::Koz,
            room_id: "koz_1".into(),
            reason: "score_target".into(),
            duration_secs: 101.5,
            players: vec![],
        });
        let recorded = sink.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].reason, "score_target");
    }

    #[tokio::test]
    async fn queued_sink_does_not_block() {
        let sink = QueuedStatsSink::spawn();
        for _ in 0..64 {
            sink.record_match_end(MatchSummary {
                mode: GameMode::Slither,
                room_id: "slither_1".into(),
                reason: "time_limit".into(),
                duration_secs: 300.0,
                players: vec![],
            });
        }
    }
}
