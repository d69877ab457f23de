//! Slither: endless segment-body arena.
//!
//! Snakes advance head-first at a fixed cadence; boosting trades body
//! length for speed and leaves an orb trail. Death comes from walls, other
//! bodies, or losing a head-to-head. Matches run on a timer with a short
//! ending phase before the arena reseeds.

use std::collections::{HashMap, VecDeque};

use crate::config::SlitherTuning;
use crate::geometry::{distance, normalize};
use crate::protocol::{
    ArenaBoundsView, ConnId, LeaderboardEntry, MatchEndPayload, MatchPhase, OrbView, PlayerRole,
    PointView, ScoreboardEntry, ServerEvent, SlitherPlayerView, SlitherRoomStatePayload,
    SlitherSnapshot, UserId,
};
use crate::rooms::{Outbox, RoomKey, Simulated};
use crate::stats::{MatchSummary, PlayerMatchStats};

/// Cap on serialized body segments per player per snapshot.
const MAX_SNAPSHOT_SEGMENTS: usize = 80;
/// Spawn keeps this margin from the arena walls.
const SPAWN_WALL_MARGIN: f64 = 200.0;

#[derive(Debug, Clone)]
pub struct SlitherPlayer {
    pub conn: ConnId,
    pub user_id: Option<UserId>,
    pub name: String,
    pub color: String,
    pub party_id: Option<String>,
    pub segments: VecDeque<(f64, f64)>,
    pub direction: (f64, f64),
    pub pending_direction: (f64, f64),
    pub length: f64,
    pub alive: bool,
    pub ready: bool,
    pub boost_active: bool,
    pub boost_burn_accum: f64,
    pub boost_drop_accum: f64,
    pub score: i64,
    pub kills: u32,
    pub orbs_collected: u32,
    pub died_at: f64,
    pub joined_at: f64,
    pub spectating: Option<ConnId>,
}

#[derive(Debug, Clone)]
struct Orb {
    id: String,
    x: f64,
    y: f64,
    value: u32,
}

/// Full authoritative state of one slither arena.
pub struct SlitherState {
    pub key: RoomKey,
    tuning: SlitherTuning,
    phase: MatchPhase,
    players: HashMap<ConnId, SlitherPlayer>,
    orbs: Vec<Orb>,
    orb_seq: u64,
    match_end_at: Option<f64>,
    ending_end_at: Option<f64>,
    match_started_at: f64,
    next_snapshot_at: f64,
    next_leaderboard_at: f64,
    next_survival_tick: f64,
    snapshot_seq: u64,
    color_cursor: usize,
}

impl SlitherState {
    #[must_use]
    pub fn new(key: RoomKey, tuning: SlitherTuning) -> Self {
        let mut state = Self {
            key,
            tuning,
            phase: MatchPhase::Lobby,
            players: HashMap::new(),
            orbs: Vec::new(),
            orb_seq: 0,
            match_end_at: None,
            ending_end_at: None,
            match_started_at: 0.0,
            next_snapshot_at: 0.0,
            next_leaderboard_at: 0.0,
            next_survival_tick: 0.0,
            snapshot_seq: 0,
            color_cursor: 0,
        };
        state.ensure_orb_floor();
        state
    }

    #[must_use]
    pub fn phase(&self) -> MatchPhase {
        self.phase
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
    pub fn player(&self, conn: &ConnId) -> Option<&SlitherPlayer> {
        self.players.get(conn)
    }

    fn alive_ids(&self) -> Vec<ConnId> {
        let mut ids: Vec<ConnId> = self
            .players
            .values()
            .filter(|p| p.alive)
            .map(|p| p.conn)
            .collect();
        ids.sort();
        ids
    }

    fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.alive).count()
    }

    fn next_color(&mut self) -> String {
        if self.tuning.colors.is_empty() {
            return "#ffffff".to_string();
        }
        let color = self.tuning.colors[self.color_cursor % self.tuning.colors.len()].clone();
        self.color_cursor += 1;
        color
    }

    fn random_spawn(&self) -> (f64, f64) {
        let x = SPAWN_WALL_MARGIN + fastrand::f64() * (self.tuning.width - 2.0 * SPAWN_WALL_MARGIN);
        let y =
            SPAWN_WALL_MARGIN + fastrand::f64() * (self.tuning.height - 2.0 * SPAWN_WALL_MARGIN);
        (x, y)
    }

    fn build_segments(
        head: (f64, f64),
        direction: (f64, f64),
        length: usize,
    ) -> VecDeque<(f64, f64)> {
        let spacing = 6.0;
        (0..length)
            .map(|i| {
                (
                    head.0 - direction.0 * spacing * i as f64,
                    head.1 - direction.1 * spacing * i as f64,
                )
            })
            .collect()
    }

    fn revive(&mut self, conn: &ConnId, now: f64) {
        let spawn = self.random_spawn();
        let start_length = self.tuning.start_length as usize;
        if let Some(player) = self.players.get_mut(conn) {
            let direction = {
                let (dx, dy) = normalize(fastrand::f64() - 0.5, fastrand::f64() - 0.5);
                if dx == 0.0 && dy == 0.0 {
                    (1.0, 0.0)
                } else {
                    (dx, dy)
                }
            };
            player.segments = Self::build_segments(spawn, direction, start_length);
            player.direction = direction;
            player.pending_direction = direction;
            player.length = f64::from(self.tuning.start_length);
            player.alive = true;
            player.boost_active = false;
            player.boost_burn_accum = 0.0;
            player.boost_drop_accum = 0.0;
            player.score = 0;
            player.kills = 0;
            player.orbs_collected = 0;
            player.died_at = 0.0;
            player.spectating = None;
            player.joined_at = player.joined_at.max(now);
        }
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Seat a connection. Joining a running match spawns live; joining the
    /// ending phase waits for the reseed as a spectator.
    #[allow(clippy::too_many_arguments)]
    pub fn join(
        &mut self,
        conn: ConnId,
        user_id: Option<UserId>,
        name: String,
        party_id: Option<String>,
        now: f64,
    ) -> PlayerRole {
        if self.players.contains_key(&conn) {
            return if self.players[&conn].alive {
                PlayerRole::Player
            } else {
                PlayerRole::Spectator
            };
        }

        let color = self.next_color();
        self.players.insert(
            conn,
            SlitherPlayer {
                conn,
                user_id,
                name,
                color,
                party_id,
                segments: VecDeque::new(),
                direction: (1.0, 0.0),
                pending_direction: (1.0, 0.0),
                length: f64::from(self.tuning.start_length),
                alive: false,
                ready: true,
                boost_active: false,
                boost_burn_accum: 0.0,
                boost_drop_accum: 0.0,
                score: 0,
                kills: 0,
                orbs_collected: 0,
                died_at: 0.0,
                joined_at: now,
                spectating: None,
            },
        );

        match self.phase {
            MatchPhase::Lobby | MatchPhase::Active => {
                self.revive(&conn, now);
                PlayerRole::Player
            }
            _ => PlayerRole::Spectator,
        }
    }

    /// Remove a connection, dropping its body as orbs mid-match.
    pub fn leave(&mut self, conn: &ConnId, _now: f64) -> Option<String> {
        let player = self.players.remove(conn)?;
        if player.alive && self.phase == MatchPhase::Active {
            self.drop_death_orbs(&player);
        }
        Some(player.name)
    }

    /// `play_again`: revive mid-match, or queue for the next reseed.
    pub fn play_again(&mut self, conn: &ConnId, now: f64) {
        match self.phase {
            MatchPhase::Active => {
                if self.players.get(conn).is_some_and(|p| !p.alive) {
                    self.revive(conn, now);
                }
            }
            _ => {
                if let Some(player) = self.players.get_mut(conn) {
                    player.ready = true;
                }
            }
        }
    }

    /// Steering input: desired unit direction plus the boost flag.
    pub fn update_input(&mut self, conn: &ConnId, dir_x: f64, dir_y: f64, boost: bool) {
        let Some(player) = self.players.get_mut(conn) else {
            return;
        };
        if !player.alive {
            return;
        }
        if dir_x.is_finite() && dir_y.is_finite() {
            let (nx, ny) = normalize(dir_x, dir_y);
            if nx != 0.0 || ny != 0.0 {
                player.pending_direction = (nx, ny);
            }
        }
        player.boost_active = boost;
    }

    // ------------------------------------------------------------------
    // Orbs
    // ------------------------------------------------------------------

    fn spawn_orb(&mut self, x: f64, y: f64, value: u32) {
        if self.orbs.len() >= self.tuning.max_orbs {
            return;
        }
        self.orb_seq += 1;
        self.orbs.push(Orb {
            id: format!("orb_{}", self.orb_seq),
            x: x.clamp(0.0, self.tuning.width),
            y: y.clamp(0.0, self.tuning.height),
            value: value.max(1),
        });
    }

    fn ensure_orb_floor(&mut self) {
        while self.orbs.len() < self.tuning.min_orbs {
            let x = fastrand::f64() * self.tuning.width;
            let y = fastrand::f64() * self.tuning.height;
            self.spawn_orb(x, y, 1);
        }
    }

    fn drop_death_orbs(&mut self, player: &SlitherPlayer) {
        let step = (player.segments.len() / self.tuning.death_orb_cap.max(1)).max(1);
        let spots: Vec<(f64, f64)> = player
            .segments
            .iter()
            .step_by(step)
            .take(self.tuning.death_orb_cap)
            .copied()
            .collect();
        for (x, y) in spots {
            self.spawn_orb(x, y, 1);
        }
    }

    fn step_orb_pickups(&mut self) {
        let alive = self.alive_ids();
        if alive.is_empty() || self.orbs.is_empty() {
            return;
        }

        let heads: Vec<(ConnId, f64, f64)> = alive
            .iter()
            .filter_map(|conn| {
                self.players
                    .get(conn)
                    .and_then(|p| p.segments.front().map(|h| (*conn, h.0, h.1)))
            })
            .collect();

        let pickup_radius = self.tuning.orb_pickup_radius;
        let mut kept = Vec::with_capacity(self.orbs.len());
        let mut credits: Vec<(ConnId, u32)> = Vec::new();
        for orb in self.orbs.drain(..) {
            match heads
                .iter()
                .find(|(_, hx, hy)| distance(*hx, *hy, orb.x, orb.y) <= pickup_radius)
            {
                Some((conn, _, _)) => credits.push((*conn, orb.value)),
                None => kept.push(orb),
            }
        }
        self.orbs = kept;

        for (conn, value) in credits {
            if let Some(player) = self.players.get_mut(&conn) {
                player.score += 1;
                player.orbs_collected += 1;
                player.length += (f64::from(value) * 0.55).max(1.0);
            }
        }
    }

    // ------------------------------------------------------------------
    // Movement and deaths
    // ------------------------------------------------------------------

    fn boosted_speed(&mut self, conn: &ConnId, dt: f64) -> f64 {
        let base = self.tuning.base_speed;
        let min_length = f64::from(self.tuning.min_length);
        let burn_rate = self.tuning.boost_burn_per_second;
        let mini_interval = self.tuning.boost_mini_orb_interval;
        let mult = self.tuning.boost_multiplier;

        let (speed, tail_orbs) = {
            let Some(player) = self.players.get_mut(conn) else {
                return base;
            };
            if !player.boost_active {
                return base;
            }
            if player.length <= min_length {
                player.boost_active = false;
                return base;
            }

            let mut tail_orbs: Vec<(f64, f64)> = Vec::new();
            player.boost_burn_accum += burn_rate * dt;
            player.boost_drop_accum += dt;

            while player.boost_burn_accum >= 1.0 && player.length > min_length {
                player.boost_burn_accum -= 1.0;
                player.length -= 1.0;
                if let Some(tail) = player.segments.back() {
                    tail_orbs.push(*tail);
                }
            }
            if player.boost_drop_accum >= mini_interval {
                player.boost_drop_accum = 0.0;
                if let Some(tail) = player.segments.back() {
                    tail_orbs.push(*tail);
                }
            }
            (base * mult, tail_orbs)
        };

        for (x, y) in tail_orbs {
            self.spawn_orb(x, y, 1);
        }
        speed
    }

    /// Move heads, shift bodies, and collect deaths (victim, reason,
    /// killer).
    fn step_move(&mut self, dt: f64) -> Vec<(ConnId, &'static str, Option<ConnId>)> {
        let mut deaths: Vec<(ConnId, &'static str, Option<ConnId>)> = Vec::new();
        let (width, height) = (self.tuning.width, self.tuning.height);
        let min_length = self.tuning.min_length as usize;

        for conn in self.alive_ids() {
            let speed = self.boosted_speed(&conn, dt);
            let Some(player) = self.players.get_mut(&conn) else {
                continue;
            };
            player.direction = player.pending_direction;
            let Some(&(hx, hy)) = player.segments.front() else {
                continue;
            };
            let nx = hx + player.direction.0 * speed * dt;
            let ny = hy + player.direction.1 * speed * dt;
            player.segments.push_front((nx, ny));

            let target_len = (player.length.round() as usize).max(min_length);
            while player.segments.len() > target_len {
                player.segments.pop_back();
            }
            while player.segments.len() < target_len {
                if let Some(&tail) = player.segments.back() {
                    player.segments.push_back(tail);
                } else {
                    break;
                }
            }

            if nx <= 0.0 || ny <= 0.0 || nx >= width || ny >= height {
                deaths.push((conn, "wall", None));
            }
        }

        // Head to body.
        let head_radius = self.tuning.head_radius;
        let alive = self.alive_ids();
        for conn in &alive {
            let Some(&(hx, hy)) = self.players.get(conn).and_then(|p| p.segments.front()) else {
                continue;
            };
            'outer: for other in &alive {
                if other == conn {
                    continue;
                }
                let Some(other_player) = self.players.get(other) else {
                    continue;
                };
                // Skip the first points so head-to-head resolves separately.
                for seg in other_player.segments.iter().skip(2) {
                    if distance(hx, hy, seg.0, seg.1) <= head_radius {
                        deaths.push((*conn, "body", Some(*other)));
                        break 'outer;
                    }
                }
            }
        }

        // Head to head: the longer snake survives; a tie kills both.
        for i in 0..alive.len() {
            for j in (i + 1)..alive.len() {
                let (a, b) = (alive[i], alive[j]);
                let (Some(pa), Some(pb)) = (self.players.get(&a), self.players.get(&b)) else {
                    continue;
                };
                let (Some(&ha), Some(&hb)) = (pa.segments.front(), pb.segments.front()) else {
                    continue;
                };
                if distance(ha.0, ha.1, hb.0, hb.1) > head_radius * 2.0 {
                    continue;
                }
                if pa.length > pb.length {
                    deaths.push((b, "head_to_head", Some(a)));
                } else if pb.length > pa.length {
                    deaths.push((a, "head_to_head", Some(b)));
                } else {
                    deaths.push((a, "head_to_head", None));
                    deaths.push((b, "head_to_head", None));
                }
            }
        }

        deaths
    }

    fn resolve_deaths(
        &mut self,
        deaths: Vec<(ConnId, &'static str, Option<ConnId>)>,
        now: f64,
        out: &mut Outbox,
    ) {
        let mut seen: Vec<ConnId> = Vec::new();
        for (victim, reason, killer) in deaths {
            if seen.contains(&victim) {
                continue;
            }
            seen.push(victim);

            if !self.players.get(&victim).is_some_and(|p| p.alive) {
                continue;
            }

            if let Some(killer_conn) = killer.filter(|k| *k != victim) {
                if let Some(killer_player) = self.players.get_mut(&killer_conn) {
                    killer_player.kills += 1;
                    killer_player.score += self.tuning.kill_bonus;
                }
            }

            let dropped = self.players.get(&victim).cloned();
            if let Some(player) = dropped {
                self.drop_death_orbs(&player);
            }
            if let Some(player) = self.players.get_mut(&victim) {
                player.alive = false;
                player.died_at = now;
                player.boost_active = false;
                player.ready = false;
            }

            out.room(ServerEvent::PlayerDied {
                conn_id: victim,
                killer,
                reason: reason.to_string(),
                respawn_in: 0.0,
            });
        }
    }

    fn update_spectator_targets(&mut self) {
        let alive = self.alive_ids();
        let fallback = alive.first().copied();
        for player in self.players.values_mut() {
            if player.alive {
                player.spectating = None;
                continue;
            }
            let valid = player
                .spectating
                .is_some_and(|target| alive.contains(&target));
            if !valid {
                player.spectating = fallback.filter(|t| *t != player.conn);
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn start_match(&mut self, now: f64, out: &mut Outbox) {
        self.phase = MatchPhase::Active;
        self.match_started_at = now;
        self.match_end_at = Some(now + self.tuning.match_duration_secs);
        self.ending_end_at = None;
        self.orbs.clear();
        self.orb_seq = 0;
        self.ensure_orb_floor();
        self.next_survival_tick = now + 1.0;

        let ready: Vec<ConnId> = self
            .players
            .values()
            .filter(|p| p.ready)
            .map(|p| p.conn)
            .collect();
        for conn in ready {
            self.revive(&conn, now);
        }

        out.room(ServerEvent::MatchStart(Box::new(
            crate::protocol::MatchStartPayload {
                state: self.phase,
                time_left: self.tuning.match_duration_secs.ceil() as u32,
                started_at: now,
                score_target: 0,
                map: self.map_placeholder(),
            },
        )));
    }

    fn map_placeholder(&self) -> crate::protocol::MapView {
        crate::protocol::MapView {
            id: "open-drift".to_string(),
            name: "Open Drift".to_string(),
            theme: "deep-current".to_string(),
            biome: "Open Water".to_string(),
            flavor: "Unbounded feeding grounds; only the walls bite.".to_string(),
            preview_color: "#56d8ff".to_string(),
            width: self.tuning.width,
            height: self.tuning.height,
            zone: PointView {
                x: self.tuning.width / 2.0,
                y: self.tuning.height / 2.0,
            },
            zone_radius: 0.0,
            core: PointView {
                x: self.tuning.width / 2.0,
                y: self.tuning.height / 2.0,
            },
        }
    }

    fn end_match(&mut self, reason: &str, now: f64, out: &mut Outbox) {
        if self.phase != MatchPhase::Active {
            return;
        }
        self.phase = MatchPhase::Results;
        self.ending_end_at = Some(now + self.tuning.ending_secs);

        let results: Vec<ScoreboardEntry> = {
            let mut entries: Vec<ScoreboardEntry> = self
                .players
                .values()
                .map(|p| ScoreboardEntry {
                    conn_id: p.conn,
                    name: p.name.clone(),
                    avatar: String::new(),
                    hero: crate::protocol::HeroClass::Knight,
                    score: p.score,
                    kills: p.kills,
                    deaths: u32::from(!p.alive),
                    core_seconds: 0,
                })
                .collect();
            entries.sort_by(|a, b| (b.score, b.kills).cmp(&(a.score, a.kills)));
            entries
        };

        let payload = MatchEndPayload {
            reason: reason.to_string(),
            winner: results.first().cloned(),
            results,
            reset_in: self.tuning.ending_secs.ceil() as u32,
            map: None,
        };
        out.room(ServerEvent::MatchEnd(Box::new(payload)));

        out.summary(MatchSummary {
            mode: self.key.mode,
            room_id: self.key.room_id.clone(),
            reason: reason.to_string(),
            duration_secs: now - self.match_started_at,
            players: self
                .players
                .values()
                .map(|p| PlayerMatchStats {
                    user_id: p.user_id,
                    name: p.name.clone(),
                    score: p.score,
                    kills: p.kills,
                    deaths: u32::from(!p.alive),
                    damage_dealt: 0.0,
                    bullets_fired: 0,
                    bullets_hit: 0,
                    powerups_collected: Vec::new(),
                })
                .collect(),
        });
    }

    fn reset_after_ending(&mut self, now: f64, out: &mut Outbox) {
        self.phase = MatchPhase::Lobby;
        self.match_end_at = None;
        self.ending_end_at = None;
        for player in self.players.values_mut() {
            player.ready = true;
            player.alive = false;
        }
        // With players waiting the next step starts a fresh match at once.
        if self
            .players
            .values()
            .filter(|p| p.ready)
            .count()
            >= self.tuning.min_players_to_start
        {
            self.start_match(now, out);
        }
    }

    fn step_survival_score(&mut self, now: f64) {
        while self.next_survival_tick <= now {
            let bonus = self.tuning.survival_bonus_per_second;
            for player in self.players.values_mut() {
                if player.alive {
                    player.score += bonus;
                }
            }
            self.next_survival_tick += 1.0;
        }
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    #[must_use]
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self
            .players
            .values()
            .map(|p| LeaderboardEntry {
                conn_id: p.conn,
                name: p.name.clone(),
                score: p.score,
                kills: p.kills,
                length: p.length,
                alive: p.alive,
            })
            .collect();
        entries.sort_by(|a, b| (b.score, b.kills).cmp(&(a.score, a.kills)));
        entries.truncate(10);
        entries
    }

    fn time_left(&self, now: f64) -> u32 {
        self.match_end_at
            .map(|end| (end - now).max(0.0).ceil() as u32)
            .unwrap_or(0)
    }

    #[must_use]
    pub fn room_state_payload(
        &self,
        conn: ConnId,
        role: PlayerRole,
        now: f64,
    ) -> SlitherRoomStatePayload {
        SlitherRoomStatePayload {
            conn_id: conn,
            room_id: self.key.room_id.clone(),
            role,
            state: self.phase,
            time_left: self.time_left(now),
            tick_rate: self.tuning.tick_hz,
            bounds: ArenaBoundsView {
                width: self.tuning.width,
                height: self.tuning.height,
            },
            color: self
                .players
                .get(&conn)
                .map(|p| p.color.clone())
                .unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn snapshot(&mut self, now: f64) -> SlitherSnapshot {
        self.snapshot_seq += 1;
        SlitherSnapshot {
            seq: self.snapshot_seq,
            server_time: now,
            room_id: self.key.room_id.clone(),
            state: self.phase,
            time_left: self.time_left(now),
            bounds: ArenaBoundsView {
                width: self.tuning.width,
                height: self.tuning.height,
            },
            alive_count: self.alive_count(),
            players: self
                .players
                .values()
                .map(|p| SlitherPlayerView {
                    conn_id: p.conn,
                    name: p.name.clone(),
                    color: p.color.clone(),
                    alive: p.alive,
                    spectator: !p.alive,
                    score: p.score,
                    kills: p.kills,
                    length: p.length,
                    boost_active: p.boost_active,
                    segments: p
                        .segments
                        .iter()
                        .take(MAX_SNAPSHOT_SEGMENTS)
                        .map(|(x, y)| PointView { x: *x, y: *y })
                        .collect(),
                    spectating: p.spectating,
                })
                .collect(),
            orbs: self
                .orbs
                .iter()
                .map(|o| OrbView {
                    id: o.id.clone(),
                    x: o.x,
                    y: o.y,
                    value: o.value,
                })
                .collect(),
        }
    }
}

impl Simulated for SlitherState {
    fn step(&mut self, now: f64, dt: f64, out: &mut Outbox) {
        match self.phase {
            MatchPhase::Lobby => {
                let waiting = self.players.values().filter(|p| p.ready).count();
                if waiting >= self.tuning.min_players_to_start {
                    self.start_match(now, out);
                }
            }
            MatchPhase::Active => {
                let deaths = self.step_move(dt);
                self.resolve_deaths(deaths, now, out);
                self.step_orb_pickups();
                self.ensure_orb_floor();
                self.step_survival_score(now);
                self.update_spectator_targets();

                if self.match_end_at.is_some_and(|end| now >= end) {
                    self.end_match("time_limit", now, out);
                }
            }
            MatchPhase::Results => {
                if self.ending_end_at.is_some_and(|end| now >= end) {
                    self.reset_after_ending(now, out);
                }
            }
            _ => {}
        }

        if now >= self.next_snapshot_at {
            self.next_snapshot_at = now + 1.0 / f64::from(self.tuning.snapshot_hz);
            let snapshot = self.snapshot(now);
            out.room(ServerEvent::ArenaState(Box::new(snapshot)));
        }
        if now >= self.next_leaderboard_at {
            self.next_leaderboard_at = now + self.tuning.leaderboard_interval_secs;
            out.room(ServerEvent::LeaderboardUpdate {
                entries: self.leaderboard(),
            });
        }
    }

    fn occupant_count(&self) -> usize {
        self.players.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::GameMode;

    fn new_arena() -> SlitherState {
        SlitherState::new(RoomKey::new(GameMode::Slither, "1"), SlitherTuning::default())
    }

    fn join_one(arena: &mut SlitherState, name: &str) -> ConnId {
        let conn = ConnId::new_v4();
        arena.join(conn, None, name.to_string(), None, 0.0);
        conn
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
    fn first_joiner_starts_the_match() {
        let mut arena = new_arena();
        let conn = join_one(&mut arena, "solo");
        let mut out = Outbox::new();
        arena.step(0.1, 0.04, &mut out);
        assert_eq!(arena.phase(), MatchPhase::Active);
        assert_eq!(events_of(&out, "match_start").len(), 1);
        assert!(arena.player(&conn).unwrap().alive);
    }

    #[test]
    fn orb_floor_is_maintained() {
        let arena = new_arena();
        assert!(arena.orbs.len() >= arena.tuning.min_orbs);
    }

    #[test]
    fn orb_pickup_grows_and_scores() {
        let mut arena = new_arena();
        let conn = join_one(&mut arena, "eater");
        let mut out = Outbox::new();
        arena.step(0.1, 0.04, &mut out);

        // Plant an orb right on the head.
        let head = *arena.player(&conn).unwrap().segments.front().unwrap();
        arena.orbs.clear();
        arena.spawn_orb(head.0, head.1, 1);
        let before_len = arena.player(&conn).unwrap().length;

        arena.step_orb_pickups();
        let p = arena.player(&conn).unwrap();
        assert_eq!(p.orbs_collected, 1);
        assert!(p.length > before_len);
        assert!(p.score >= 1);
    }

    #[test]
    fn wall_collision_kills() {
        let mut arena = new_arena();
        let conn = join_one(&mut arena, "wallrider");
        let mut out = Outbox::new();
        arena.step(0.1, 0.04, &mut out);

        // Aim the head at the left wall from point blank range.
        if let Some(p) = arena.players.get_mut(&conn) {
            let head = (1.0, 1500.0);
            p.segments = SlitherState::build_segments(head, (1.0, 0.0), 16);
            p.direction = (-1.0, 0.0);
            p.pending_direction = (-1.0, 0.0);
        }
        let mut out = Outbox::new();
        arena.step(0.2, 0.04, &mut out);
        assert!(!arena.player(&conn).unwrap().alive);
        let died = events_of(&out, "player_died");
        assert_eq!(died.len(), 1);
        if let ServerEvent::PlayerDied { reason, killer, .. } = died[0] {
            assert_eq!(reason, "wall");
            assert_eq!(*killer, None);
        }
    }

    #[test]
    fn head_to_head_longer_snake_wins() {
        let mut arena = new_arena();
        let a = join_one(&mut arena, "long");
        let b = join_one(&mut arena, "short");
        let mut out = Outbox::new();
        arena.step(0.1, 0.04, &mut out);

        if let Some(p) = arena.players.get_mut(&a) {
            p.segments = SlitherState::build_segments((2000.0, 1500.0), (1.0, 0.0), 30);
            p.length = 30.0;
            p.direction = (0.0, 0.0);
            p.pending_direction = (0.0, 0.0);
        }
        if let Some(p) = arena.players.get_mut(&b) {
            p.segments = SlitherState::build_segments((2010.0, 1500.0), (-1.0, 0.0), 16);
            p.length = 16.0;
            p.direction = (0.0, 0.0);
            p.pending_direction = (0.0, 0.0);
        }

        let deaths = arena.step_move(0.0001);
        let mut out = Outbox::new();
        arena.resolve_deaths(deaths, 1.0, &mut out);

        assert!(arena.player(&a).unwrap().alive);
        let loser = arena.player(&b).unwrap();
        assert!(!loser.alive);
        let winner = arena.player(&a).unwrap();
        assert_eq!(winner.kills, 1);
        assert_eq!(winner.score, arena.tuning.kill_bonus);
    }

    #[test]
    fn body_collision_kills_the_rammer() {
        let mut arena = new_arena();
        let a = join_one(&mut arena, "rammer");
        let b = join_one(&mut arena, "wall-of-flesh");
        let mut out = Outbox::new();
        arena.step(0.1, 0.04, &mut out);

        // b's body crosses a's path; a's head lands on b's mid-body.
        if let Some(p) = arena.players.get_mut(&b) {
            p.segments = SlitherState::build_segments((2000.0, 1500.0), (0.0, 1.0), 30);
            p.length = 30.0;
            p.direction = (0.0, 0.0);
            p.pending_direction = (0.0, 0.0);
        }
        let mid = *arena.player(&b).unwrap().segments.get(10).unwrap();
        if let Some(p) = arena.players.get_mut(&a) {
            p.segments = SlitherState::build_segments((mid.0 - 1.0, mid.1), (1.0, 0.0), 16);
            p.direction = (0.0, 0.0);
            p.pending_direction = (0.0, 0.0);
        }

        let deaths = arena.step_move(0.0001);
        let mut out = Outbox::new();
        arena.resolve_deaths(deaths, 1.0, &mut out);
        assert!(!arena.player(&a).unwrap().alive);
        assert!(arena.player(&b).unwrap().alive);
        assert_eq!(arena.player(&b).unwrap().kills, 1);
    }

    #[test]
    fn boost_burns_length_and_drops_orbs() {
        let mut arena = new_arena();
        let conn = join_one(&mut arena, "burner");
        let mut out = Outbox::new();
        arena.step(0.1, 0.04, &mut out);

        if let Some(p) = arena.players.get_mut(&conn) {
            p.length = 20.0;
            p.boost_active = true;
        }
        let orbs_before = arena.orbs.len();
        // One second of boosting burns ~4 length.
        let speed = arena.boosted_speed(&conn, 1.0);
        assert!(speed > arena.tuning.base_speed);
        let p = arena.player(&conn).unwrap();
        assert!(p.length < 20.0 - 3.0);
        assert!(arena.orbs.len() > orbs_before);
    }

    #[test]
    fn boost_cancels_at_minimum_length() {
        let mut arena = new_arena();
        let conn = join_one(&mut arena, "tiny");
        let mut out = Outbox::new();
        arena.step(0.1, 0.04, &mut out);
        if let Some(p) = arena.players.get_mut(&conn) {
            p.length = f64::from(arena.tuning.min_length);
            p.boost_active = true;
        }
        let speed = arena.boosted_speed(&conn, 0.1);
        assert!((speed - arena.tuning.base_speed).abs() < f64::EPSILON);
        assert!(!arena.player(&conn).unwrap().boost_active);
    }

    #[test]
    fn match_timer_ends_and_reseeds() {
        let mut arena = new_arena();
        let conn = join_one(&mut arena, "stayer");
        let mut out = Outbox::new();
        arena.step(0.1, 0.04, &mut out);
        assert_eq!(arena.phase(), MatchPhase::Active);

        // Jump past the match end.
        let mut out = Outbox::new();
        arena.step(301.0, 0.04, &mut out);
        assert_eq!(arena.phase(), MatchPhase::Results);
        assert_eq!(events_of(&out, "match_end").len(), 1);
        assert_eq!(out.summaries.len(), 1);

        // Past the ending phase: reseeds and immediately restarts.
        let mut out = Outbox::new();
        arena.step(301.0 + 13.0, 0.04, &mut out);
        assert_eq!(arena.phase(), MatchPhase::Active);
        assert!(arena.player(&conn).unwrap().alive);
    }

    #[test]
    fn survival_bonus_accrues_per_second() {
        let mut arena = new_arena();
        let conn = join_one(&mut arena, "survivor");
        let mut out = Outbox::new();
        arena.step(0.1, 0.04, &mut out);

        // Park in the middle so no wall death interferes.
        if let Some(p) = arena.players.get_mut(&conn) {
            p.segments = SlitherState::build_segments((2400.0, 1500.0), (1.0, 0.0), 16);
            p.pending_direction = (1.0, 0.0);
        }
        let mut now = 0.1;
        for _ in 0..(25 * 5) {
            let mut out = Outbox::new();
            now += 0.04;
            arena.step(now, 0.04, &mut out);
        }
        // Five seconds alive: at least 4 survival points (orbs add more).
        assert!(arena.player(&conn).unwrap().score >= 4);
    }

    #[test]
    fn snapshot_and_leaderboard_cadences() {
        let mut arena = new_arena();
        join_one(&mut arena, "watcher");
        let mut out = Outbox::new();
        arena.step(0.1, 0.04, &mut out);
        assert!(!events_of(&out, "arena_state").is_empty());
        assert!(!events_of(&out, "leaderboard_update").is_empty());

        // Immediately after, neither cadence refires.
        let mut out = Outbox::new();
        arena.step(0.11, 0.01, &mut out);
        assert!(events_of(&out, "arena_state").is_empty());
        assert!(events_of(&out, "leaderboard_update").is_empty());
    }

    #[test]
    fn leave_mid_match_drops_orbs() {
        let mut arena = new_arena();
        let conn = join_one(&mut arena, "quitter");
        let mut out = Outbox::new();
        arena.step(0.1, 0.04, &mut out);
        arena.orbs.clear();
        assert!(arena.leave(&conn, 1.0).is_some());
        assert!(!arena.orbs.is_empty());
        assert!(arena.leave(&conn, 1.0).is_none());
    }

    #[test]
    fn dead_player_can_rejoin_the_fray() {
        let mut arena = new_arena();
        let conn = join_one(&mut arena, "phoenix");
        let mut out = Outbox::new();
        arena.step(0.1, 0.04, &mut out);
        if let Some(p) = arena.players.get_mut(&conn) {
            p.alive = false;
            p.died_at = 1.0;
        }
        arena.play_again(&conn, 2.0);
        assert!(arena.player(&conn).unwrap().alive);
        assert_eq!(arena.player(&conn).unwrap().score, 0);
    }
}
