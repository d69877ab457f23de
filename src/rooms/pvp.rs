//! PVP Arena: 1-vs-1 rooms with a ready handshake.
//!
//! Fully event-driven: moves are clamped and separated on arrival, shots
//! are relayed to the opponent, and hits are lives-based. `battle_start`
//! fires exactly once per ready handshake; a knockout or a departure ends
//! the battle.

use std::collections::{HashMap, HashSet};

use crate::config::PvpTuning;
use crate::geometry::{clamp, resolve_circle_overlap};
use crate::protocol::{
    ConnId, HeroClass, MatchEndPayload, PvpPlayerView, PvpRoomStatePayload, ScoreboardEntry,
    ServerEvent, UserId,
};
use crate::rooms::{Outbox, RoomKey};
use crate::stats::{MatchSummary, PlayerMatchStats};

#[derive(Debug, Clone)]
pub struct PvpPlayer {
    pub conn: ConnId,
    pub user_id: Option<UserId>,
    pub name: String,
    pub character: HeroClass,
    pub bullets: i64,
    pub lives: i64,
    pub x: f64,
    pub y: f64,
    pub player_number: u8,
    pub bullets_fired: u64,
    pub bullets_hit: u64,
}

/// Full authoritative state of one PVP room.
pub struct PvpState {
    pub key: RoomKey,
    tuning: PvpTuning,
    players: HashMap<ConnId, PvpPlayer>,
    order: Vec<ConnId>,
    ready: HashSet<ConnId>,
    battle_active: bool,
    battle_started_at: f64,
}

impl PvpState {
    #[must_use]
    pub fn new(key: RoomKey, tuning: PvpTuning) -> Self {
        Self {
            key,
            tuning,
            players: HashMap::new(),
            order: Vec::new(),
            ready: HashSet::new(),
            battle_active: false,
            battle_started_at: 0.0,
        }
    }

    #[must_use]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.tuning.capacity
    }

    #[must_use]
    pub fn battle_active(&self) -> bool {
        self.battle_active
    }

    #[must_use]
    pub fn contains(&self, conn: &ConnId) -> bool {
        self.players.contains_key(conn)
    }

    /// Mid-match joins are not allowed once the battle runs.
    #[must_use]
    pub fn accepts_joins(&self) -> bool {
        !self.is_full() && !self.battle_active
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Seat a player. Player 1 spawns on the left, player 2 on the right.
    /// Returns the seat number and the pre-existing opponent, if any.
    pub fn join(
        &mut self,
        conn: ConnId,
        user_id: Option<UserId>,
        name: String,
        character: HeroClass,
        bullets: i64,
        lives: Option<i64>,
    ) -> Option<(u8, Option<PvpPlayerView>)> {
        if self.players.contains_key(&conn) {
            let number = self.players[&conn].player_number;
            return Some((number, self.opponent_view(&conn)));
        }
        if !self.accepts_joins() {
            return None;
        }

        let existing_opponent = self.opponent_view(&conn);
        let player_number = (self.order.len() + 1) as u8;
        let x = if player_number == 1 {
            self.tuning.spawn_left_x
        } else {
            self.tuning.spawn_right_x
        };

        self.players.insert(
            conn,
            PvpPlayer {
                conn,
                user_id,
                name,
                character,
                bullets,
                lives: lives.unwrap_or(self.tuning.default_lives).max(1),
                x,
                y: self.tuning.spawn_y,
                player_number,
                bullets_fired: 0,
                bullets_hit: 0,
            },
        );
        self.order.push(conn);

        Some((player_number, existing_opponent))
    }

    /// Remove a connection, deactivating a running battle. Idempotent;
    /// returns the removed name.
    pub fn leave(&mut self, conn: &ConnId) -> Option<String> {
        let player = self.players.remove(conn)?;
        self.order.retain(|c| c != conn);
        self.ready.remove(conn);
        if self.battle_active {
            self.battle_active = false;
            self.ready.clear();
        }
        Some(player.name)
    }

    // ------------------------------------------------------------------
    // Ready handshake
    // ------------------------------------------------------------------

    /// Mark a player ready. When both seats are filled and ready, the
    /// battle starts and `battle_start` broadcasts exactly once.
    pub fn ready(&mut self, conn: &ConnId, now: f64, out: &mut Outbox) {
        if !self.players.contains_key(conn) {
            return;
        }
        self.ready.insert(*conn);

        if !self.battle_active
            && self.ready.len() >= self.tuning.capacity
            && self.players.len() >= self.tuning.capacity
        {
            self.battle_active = true;
            self.battle_started_at = now;
            out.room(ServerEvent::BattleStart {
                message: "Battle starting!".to_string(),
                player1: self.seat_view(0),
                player2: self.seat_view(1),
            });
        }
    }

    // ------------------------------------------------------------------
    // Movement and combat
    // ------------------------------------------------------------------

    /// Clamp and separate one movement request; returns the authoritative
    /// position.
    pub fn move_player(&mut self, conn: &ConnId, x: f64, y: f64) -> Option<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        if !self.players.contains_key(conn) {
            return None;
        }

        let r = self.tuning.player_radius;
        let (min_x, max_x) = (r, self.tuning.arena_width - r);
        let (min_y, max_y) = (r, self.tuning.arena_height - r);
        let mut desired_x = clamp(x, min_x, max_x);
        let mut desired_y = clamp(y, min_y, max_y);

        let min_dist = r * 2.0;
        let others: Vec<(f64, f64)> = self
            .players
            .values()
            .filter(|p| p.conn != *conn)
            .map(|p| (p.x, p.y))
            .collect();
        for (ox, oy) in others {
            let (rx, ry, _) = resolve_circle_overlap(desired_x, desired_y, ox, oy, min_dist);
            desired_x = rx;
            desired_y = ry;
        }

        desired_x = clamp(desired_x, min_x, max_x);
        desired_y = clamp(desired_y, min_y, max_y);

        if let Some(player) = self.players.get_mut(conn) {
            player.x = desired_x;
            player.y = desired_y;
        }
        Some((desired_x, desired_y))
    }

    /// Count one fired bullet for the shooter.
    pub fn record_shot(&mut self, conn: &ConnId) -> bool {
        match self.players.get_mut(conn) {
            Some(player) => {
                player.bullets_fired += 1;
                true
            }
            None => false,
        }
    }

    /// A hit lands on the shooter's opponent. On knockout the battle ends
    /// and a match summary is recorded.
    pub fn hit_opponent(&mut self, conn: &ConnId, now: f64, out: &mut Outbox) {
        if !self.battle_active || !self.players.contains_key(conn) {
            return;
        }
        let Some(opponent_conn) = self.opponent_of(conn) else {
            return;
        };

        if let Some(shooter) = self.players.get_mut(conn) {
            shooter.bullets_hit += 1;
        }
        let (name, lives) = {
            let Some(opponent) = self.players.get_mut(&opponent_conn) else {
                return;
            };
            opponent.lives = (opponent.lives - 1).max(0);
            (opponent.name.clone(), opponent.lives)
        };

        out.room(ServerEvent::PlayerDamaged {
            conn_id: opponent_conn,
            name,
            lives,
        });

        if lives == 0 {
            self.finish_battle(conn, &opponent_conn, now, out);
        }
    }

    fn finish_battle(&mut self, winner: &ConnId, loser: &ConnId, now: f64, out: &mut Outbox) {
        self.battle_active = false;
        self.ready.clear();

        out.room(ServerEvent::PlayerDied {
            conn_id: *loser,
            killer: Some(*winner),
            reason: "knockout".to_string(),
            respawn_in: 0.0,
        });

        let results: Vec<ScoreboardEntry> = [winner, loser]
            .iter()
            .filter_map(|conn| self.players.get(conn))
            .map(|p| ScoreboardEntry {
                conn_id: p.conn,
                name: p.name.clone(),
                avatar: String::new(),
                hero: p.character,
                score: p.lives,
                kills: u32::from(p.lives > 0),
                deaths: u32::from(p.lives == 0),
                core_seconds: 0,
            })
            .collect();
        let payload = MatchEndPayload {
            reason: "knockout".to_string(),
            winner: results.first().cloned(),
            results,
            reset_in: 0,
            map: None,
        };
        out.room(ServerEvent::MatchEnd(Box::new(payload)));

        out.summary(MatchSummary {
            mode: self.key.mode,
            room_id: self.key.room_id.clone(),
            reason: "knockout".to_string(),
            duration_secs: now - self.battle_started_at,
            players: self
                .players
                .values()
                .map(|p| PlayerMatchStats {
                    user_id: p.user_id,
                    name: p.name.clone(),
                    score: p.lives,
                    kills: u32::from(p.lives > 0),
                    deaths: u32::from(p.lives == 0),
                    damage_dealt: 0.0,
                    bullets_fired: p.bullets_fired,
                    bullets_hit: p.bullets_hit,
                    powerups_collected: Vec::new(),
                })
                .collect(),
        });
    }

    /// Advisory client stat report; relayed to the opponent.
    pub fn update_stats(
        &mut self,
        conn: &ConnId,
        bullets: Option<i64>,
        lives: Option<i64>,
    ) -> Option<(i64, i64)> {
        let player = self.players.get_mut(conn)?;
        if let Some(bullets) = bullets {
            player.bullets = bullets.max(0);
        }
        if let Some(lives) = lives {
            player.lives = lives.max(0);
        }
        Some((player.bullets, player.lives))
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    fn opponent_of(&self, conn: &ConnId) -> Option<ConnId> {
        self.players.keys().find(|c| *c != conn).copied()
    }

    #[must_use]
    pub fn opponent_view(&self, conn: &ConnId) -> Option<PvpPlayerView> {
        self.opponent_of(conn)
            .and_then(|c| self.players.get(&c))
            .map(Self::player_view)
    }

    #[must_use]
    pub fn opponent_conn(&self, conn: &ConnId) -> Option<ConnId> {
        self.opponent_of(conn)
    }

    fn player_view(player: &PvpPlayer) -> PvpPlayerView {
        PvpPlayerView {
            conn_id: player.conn,
            username: player.name.clone(),
            character: player.character,
            bullets: player.bullets,
            lives: player.lives,
            x: player.x,
            y: player.y,
            player_number: player.player_number,
        }
    }

    #[must_use]
    pub fn view_of(&self, conn: &ConnId) -> Option<PvpPlayerView> {
        self.players.get(conn).map(Self::player_view)
    }

    fn seat_view(&self, index: usize) -> Option<PvpPlayerView> {
        self.order
            .get(index)
            .and_then(|conn| self.players.get(conn))
            .map(Self::player_view)
    }

    #[must_use]
    pub fn room_state_payload(&self, conn: &ConnId) -> Option<PvpRoomStatePayload> {
        let player = self.players.get(conn)?;
        Some(PvpRoomStatePayload {
            room_id: self.key.room_id.clone(),
            player_count: self.players.len(),
            player_number: player.player_number,
            battle_active: self.battle_active,
            opponent: self.opponent_view(conn),
        })
    }

    #[must_use]
    pub fn match_ready_views(&self) -> (Option<PvpPlayerView>, Option<PvpPlayerView>) {
        (self.seat_view(0), self.seat_view(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::distance;
    use crate::protocol::GameMode;

    fn new_room() -> PvpState {
        PvpState::new(RoomKey::new(GameMode::Pvp, "1"), PvpTuning::default())
    }

    fn join_pair(room: &mut PvpState) -> (ConnId, ConnId) {
        let a = ConnId::new_v4();
        let b = ConnId::new_v4();
        let (n1, opp) = room
            .join(a, None, "alpha".into(), HeroClass::Knight, 30, None)
            .unwrap();
        assert_eq!(n1, 1);
        assert!(opp.is_none());
        let (n2, opp) = room
            .join(b, None, "beta".into(), HeroClass::Wizard, 30, None)
            .unwrap();
        assert_eq!(n2, 2);
        assert_eq!(opp.unwrap().username, "alpha");
        (a, b)
    }

    fn events_of<'a>(out: &'a Outbox, name: &str) -> Vec<&'a ServerEvent> {
        out.events
            .iter()
            .filter(|(_, ev)| {
                serde_json::to_value(ev)
                    .map(|v| v["type"] == name)
                    .unwrap_or(false)
            })
            .map(|(_, ev)| ev)
            .collect()
    }

    #[test]
    fn pairing_assigns_seats_and_sides() {
        let mut room = new_room();
        let (a, b) = join_pair(&mut room);
        assert_eq!(room.players[&a].x, 100.0);
        assert_eq!(room.players[&b].x, 700.0);
        assert!(room.is_full());
    }

    #[test]
    fn third_join_is_refused() {
        let mut room = new_room();
        join_pair(&mut room);
        let c = ConnId::new_v4();
        assert!(room
            .join(c, None, "gamma".into(), HeroClass::Archer, 30, None)
            .is_none());
    }

    #[test]
    fn battle_starts_exactly_once_when_both_ready() {
        let mut room = new_room();
        let (a, b) = join_pair(&mut room);

        let mut out = Outbox::new();
        room.ready(&a, 1.0, &mut out);
        assert!(events_of(&out, "battle_start").is_empty());
        room.ready(&b, 1.5, &mut out);
        assert_eq!(events_of(&out, "battle_start").len(), 1);
        assert!(room.battle_active());

        // Repeated ready does not restart.
        let mut out = Outbox::new();
        room.ready(&a, 2.0, &mut out);
        assert!(events_of(&out, "battle_start").is_empty());
    }

    #[test]
    fn mid_battle_room_refuses_joins() {
        let mut room = new_room();
        let (a, b) = join_pair(&mut room);
        let mut out = Outbox::new();
        room.ready(&a, 1.0, &mut out);
        room.ready(&b, 1.0, &mut out);
        assert!(!room.accepts_joins());
        // One leaves mid-battle: battle deactivates, seat frees up.
        room.leave(&a);
        assert!(!room.battle_active());
        assert!(room.accepts_joins());
    }

    #[test]
    fn knockout_ends_battle_and_records_summary() {
        let mut room = new_room();
        let (a, b) = join_pair(&mut room);
        let mut out = Outbox::new();
        room.ready(&a, 1.0, &mut out);
        room.ready(&b, 1.0, &mut out);

        let mut out = Outbox::new();
        for _ in 0..5 {
            room.hit_opponent(&a, 2.0, &mut out);
        }
        assert_eq!(room.players[&b].lives, 0);
        assert!(!room.battle_active());
        assert_eq!(events_of(&out, "player_died").len(), 1);
        assert_eq!(events_of(&out, "match_end").len(), 1);
        assert_eq!(out.summaries.len(), 1);
        assert_eq!(out.summaries[0].reason, "knockout");

        // Hits after the knockout are ignored (battle inactive).
        let mut out = Outbox::new();
        room.hit_opponent(&a, 3.0, &mut out);
        assert!(out.events.is_empty());
    }

    #[test]
    fn hit_requires_active_battle() {
        let mut room = new_room();
        let (a, _b) = join_pair(&mut room);
        let mut out = Outbox::new();
        room.hit_opponent(&a, 1.0, &mut out);
        assert!(out.events.is_empty());
    }

    #[test]
    fn movement_separates_the_pair() {
        let mut room = new_room();
        let (a, b) = join_pair(&mut room);
        room.move_player(&a, 400.0, 300.0, ).unwrap();
        let (bx, by) = room.move_player(&b, 400.0, 300.0).unwrap();
        let pa = &room.players[&a];
        assert!(
            distance(pa.x, pa.y, bx, by) >= room.tuning.player_radius * 2.0 - 1e-6
        );
    }

    #[test]
    fn rejoin_returns_existing_seat() {
        let mut room = new_room();
        let (a, _b) = join_pair(&mut room);
        let (number, opponent) = room
            .join(a, None, "alpha".into(), HeroClass::Knight, 30, None)
            .unwrap();
        assert_eq!(number, 1);
        assert_eq!(opponent.unwrap().username, "beta");
        assert_eq!(room.player_count(), 2);
    }

    #[test]
    fn leave_is_idempotent() {
        let mut room = new_room();
        let (a, _b) = join_pair(&mut room);
        assert_eq!(room.leave(&a).as_deref(), Some("alpha"));
        assert!(room.leave(&a).is_none());
        assert_eq!(room.player_count(), 1);
    }
}
