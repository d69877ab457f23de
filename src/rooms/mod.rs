//! Room state machines, one module per game mode, plus the pieces they
//! share: addressed event collection, killfeed, obstacles and the
//! simulation trait driven by the scheduler.
//!
//! Rooms never touch sockets. A handler or tick mutates room state under
//! the room lock and records addressed events in an [`Outbox`]; the caller
//! flushes the outbox through the connection hub *after* releasing the
//! lock, so a slow subscriber can never stall a tick.

pub mod boss;
pub mod koz;
pub mod maps;
pub mod powerup;
pub mod projectile;
pub mod pvp;
pub mod slither;
pub mod spawn;

use std::collections::VecDeque;

use crate::geometry::Rect;
use crate::protocol::{ConnId, GameMode, KillfeedEntry, ObstacleView, ServerEvent};
use crate::stats::MatchSummary;

/// Upper bound on a single simulation step; protects against scheduler
/// stalls producing teleport-sized integrations.
pub const MAX_TICK_DELTA: f64 = 0.12;

/// Identifies one room across the registry, hub groups and scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomKey {
    pub mode: GameMode,
    pub room_id: String,
}

impl RoomKey {
    #[must_use]
    pub fn new(mode: GameMode, room_id: impl Into<String>) -> Self {
        Self {
            mode,
            room_id: room_id.into(),
        }
    }

    /// Broadcast group for the room's members.
    #[must_use]
    pub fn group(&self) -> String {
        format!("{}:{}", self.mode, self.room_id)
    }

    /// Broadcast group for a mode's pre-match lobby.
    #[must_use]
    pub fn lobby_group(mode: GameMode) -> String {
        format!("{mode}:lobby")
    }
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.mode, self.room_id)
    }
}

/// Who should receive an outbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every member of the room.
    Room,
    /// Every member of the room except one connection.
    RoomExcept(ConnId),
    /// A single connection.
    One(ConnId),
    /// Every member of a mode lobby.
    Lobby(GameMode),
    /// Every member of a mode lobby except one connection.
    LobbyExcept(GameMode, ConnId),
}

/// Events and side effects collected while a room lock is held.
#[derive(Default)]
pub struct Outbox {
    pub events: Vec<(Audience, ServerEvent)>,
    pub summaries: Vec<MatchSummary>,
}

impl Outbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room(&mut self, event: ServerEvent) {
        self.events.push((Audience::Room, event));
    }

    pub fn room_except(&mut self, skip: ConnId, event: ServerEvent) {
        self.events.push((Audience::RoomExcept(skip), event));
    }

    pub fn one(&mut self, conn: ConnId, event: ServerEvent) {
        self.events.push((Audience::One(conn), event));
    }

    pub fn lobby(&mut self, mode: GameMode, event: ServerEvent) {
        self.events.push((Audience::Lobby(mode), event));
    }

    pub fn lobby_except(&mut self, mode: GameMode, skip: ConnId, event: ServerEvent) {
        self.events.push((Audience::LobbyExcept(mode, skip), event));
    }

    pub fn summary(&mut self, summary: MatchSummary) {
        self.summaries.push(summary);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.summaries.is_empty()
    }
}

/// A room state the scheduler can advance on a fixed cadence.
pub trait Simulated: Send + 'static {
    /// Advance the simulation. `now` is seconds since server start, `dt`
    /// is already clamped to [`MAX_TICK_DELTA`].
    fn step(&mut self, now: f64, dt: f64, out: &mut Outbox);

    /// Number of attached connections; zero retires the room.
    fn occupant_count(&self) -> usize;
}

/// Static obstacle placed by a map layout.
#[derive(Debug, Clone)]
pub struct Obstacle {
    pub id: String,
    pub rect: Rect,
    pub destructible: bool,
    pub hp: i32,
}

impl Obstacle {
    #[must_use]
    pub fn solid(id: impl Into<String>, x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            id: id.into(),
            rect: Rect::new(x, y, w, h),
            destructible: false,
            hp: 0,
        }
    }

    #[must_use]
    pub fn view(&self) -> ObstacleView {
        ObstacleView {
            id: self.id.clone(),
            x: self.rect.x,
            y: self.rect.y,
            w: self.rect.w,
            h: self.rect.h,
            destructible: self.destructible,
            hp: self.hp,
        }
    }
}

/// Ring buffer of recent kills, capped at `KILLFEED_CAP` entries.
pub const KILLFEED_CAP: usize = 10;

#[derive(Debug, Default)]
pub struct Killfeed {
    entries: VecDeque<KillfeedEntry>,
    seq: u64,
}

impl Killfeed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Record a kill and return the entry for immediate broadcast.
    pub fn push(
        &mut self,
        killer: Option<(ConnId, &str)>,
        target: (ConnId, &str),
        reason: &str,
        now: f64,
    ) -> KillfeedEntry {
        self.seq += 1;
        let entry = KillfeedEntry {
            id: self.seq,
            killer_conn: killer.map(|(conn, _)| conn),
            killer_name: killer.map_or_else(|| "Storm".to_string(), |(_, name)| name.to_string()),
            target_conn: target.0,
            target_name: target.1.to_string(),
            reason: reason.to_string(),
            time: now,
        };
        self.entries.push_back(entry.clone());
        while self.entries.len() > KILLFEED_CAP {
            self.entries.pop_front();
        }
        entry
    }

    /// Most recent `n` entries, oldest first.
    #[must_use]
    pub fn tail(&self, n: usize) -> Vec<KillfeedEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_key_groups() {
        let key = RoomKey::new(GameMode::Koz, "7");
        assert_eq!(key.group(), "koz:7");
        assert_eq!(RoomKey::lobby_group(GameMode::Boss), "boss:lobby");
    }

    #[test]
    fn outbox_collects_addressed_events() {
        let mut out = Outbox::new();
        let conn = ConnId::new_v4();
        out.room(ServerEvent::Pong);
        out.one(conn, ServerEvent::Pong);
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.events[1].0, Audience::One(conn));
    }

    #[test]
    fn killfeed_caps_and_tails() {
        let mut feed = Killfeed::new();
        let victim = ConnId::new_v4();
        for i in 0..15 {
            feed.push(None, (victim, "v"), "storm", f64::from(i));
        }
        assert_eq!(feed.entries.len(), KILLFEED_CAP);
        let tail = feed.tail(6);
        assert_eq!(tail.len(), 6);
        assert_eq!(tail.last().unwrap().id, 15);
        assert_eq!(tail.first().unwrap().id, 10);
    }

    #[test]
    fn killfeed_storm_kill_has_no_killer() {
        let mut feed = Killfeed::new();
        let entry = feed.push(None, (ConnId::new_v4(), "prey"), "storm", 1.0);
        assert_eq!(entry.killer_conn, None);
        assert_eq!(entry.killer_name, "Storm");
    }
}
