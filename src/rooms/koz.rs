//! King-of-the-Zone: fixed-tick arena simulation.
//!
//! A room advances at `tick_hz` whenever it has occupants. Each step runs
//! the lifecycle state machine, then (while ACTIVE) movement integration,
//! collision resolution, storm damage, projectiles, power-ups, core/score
//! accounting and the win check, and finally the snapshot cadence.

use std::collections::HashMap;

use crate::config::{KozTuning, PowerUpTable, WeaponTable};
use crate::geometry::{clamp, distance, normalize, resolve_circle_overlap, resolve_circle_rect};
use crate::protocol::{
    ConnId, CoreView, HeroClass, InputAxes, KozLobbyPlayer, KozPlayerView, KozRoomStatePayload,
    KozSnapshot, LobbyStatePayload, MatchEndPayload, MatchPhase, MatchStartPayload,
    MatchStatePayload, PlayerRole, PowerUpKind, RejectReason, ScoreboardEntry, ServerEvent,
    SnapshotMatchInfo, StormView, UserId, WeaponKind, ZoneView,
};
use crate::rooms::maps::MapRotation;
use crate::rooms::powerup::{pickup_index, PowerUp, PowerUpSpawner};
use crate::rooms::projectile::{step_projectiles, Projectile, TargetCircle};
use crate::rooms::{Killfeed, Obstacle, Outbox, RoomKey, Simulated};
use crate::stats::{MatchSummary, PlayerMatchStats};

/// One connection's state inside a KOZ room.
#[derive(Debug, Clone)]
pub struct KozPlayer {
    pub conn: ConnId,
    pub user_id: Option<UserId>,
    pub name: String,
    pub avatar: String,
    pub hero: HeroClass,
    pub weapon: WeaponKind,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub hp: i32,
    pub max_hp: i32,
    pub ammo: u32,
    pub next_ammo_at: f64,
    pub last_shot_at: f64,
    pub alive: bool,
    pub respawn_at: f64,
    pub storm_tick_at: f64,
    pub speed_until: f64,
    pub shield_until: f64,
    pub damage_until: f64,
    pub rapid_until: f64,
    pub vision_until: f64,
    pub score: i64,
    pub kills: u32,
    pub deaths: u32,
    pub core_seconds: u32,
    pub overclock_meter: f64,
    pub overclock_until: f64,
    pub spectator: bool,
    pub input: InputAxes,
    pub joined_at: f64,
    pub bullets_fired: u64,
    pub bullets_hit: u64,
    pub damage_dealt: f64,
    pub powerups_collected: Vec<PowerUpKind>,
}

#[derive(Debug, Clone)]
struct Zone {
    x: f64,
    y: f64,
    radius: f64,
    target_radius: f64,
    radius_before_shrink: f64,
    shrink_start: f64,
    shrink_end: f64,
    next_shrink_at: f64,
    drift_from: (f64, f64),
    drift_target: (f64, f64),
    finale_announced: bool,
}

#[derive(Debug, Clone)]
struct Core {
    x: f64,
    y: f64,
    radius: f64,
    held_by: Option<ConnId>,
    drop_unlock_at: f64,
}

/// Full authoritative state of one KOZ room.
pub struct KozState {
    pub key: RoomKey,
    tuning: KozTuning,
    weapons: WeaponTable,
    powerup_table: PowerUpTable,
    phase: MatchPhase,
    players: HashMap<ConnId, KozPlayer>,
    countdown_end_at: Option<f64>,
    results_end_at: Option<f64>,
    match_end_at: Option<f64>,
    match_started_at: f64,
    time_left: f64,
    zone: Zone,
    core: Core,
    obstacles: Vec<Obstacle>,
    spawn_points: Vec<(f64, f64)>,
    powerup_spawn_points: Vec<(f64, f64)>,
    projectiles: HashMap<String, Projectile>,
    projectile_seq: u64,
    powerups: Vec<PowerUp>,
    powerup_spawner: PowerUpSpawner,
    killfeed: Killfeed,
    maps: MapRotation,
    last_countdown_sent: i64,
    next_score_tick: f64,
    next_snapshot_at: f64,
    next_match_state_at: f64,
    snapshot_seq: u64,
}

impl KozState {
    #[must_use]
    pub fn new(
        key: RoomKey,
        tuning: KozTuning,
        weapons: WeaponTable,
        powerup_table: PowerUpTable,
        now: f64,
    ) -> Self {
        let maps = MapRotation::new(tuning.map_width, tuning.map_height);
        let map = maps.current();
        let zone = Zone {
            x: map.zone.0,
            y: map.zone.1,
            radius: map.zone.2,
            target_radius: map.zone.2,
            radius_before_shrink: map.zone.2,
            shrink_start: 0.0,
            shrink_end: 0.0,
            next_shrink_at: now + tuning.shrink_interval_secs,
            drift_from: (map.zone.0, map.zone.1),
            drift_target: (map.zone.0, map.zone.1),
            finale_announced: false,
        };
        let core = Core {
            x: map.core.0,
            y: map.core.1,
            radius: tuning.core_radius,
            held_by: None,
            drop_unlock_at: 0.0,
        };
        let obstacles = map.obstacles.clone();
        let spawn_points = map.spawn_points.clone();
        let powerup_spawn_points = map.powerup_spawns.clone();
        let powerup_spawner = PowerUpSpawner::new(
            tuning.powerup_spawn_secs,
            tuning.max_powerups,
            tuning.powerup_kinds.clone(),
            powerup_table.pickup_radius,
        );
        let time_left = tuning.match_duration_secs;

        Self {
            key,
            tuning,
            weapons,
            powerup_table,
            phase: MatchPhase::Lobby,
            players: HashMap::new(),
            countdown_end_at: None,
            results_end_at: None,
            match_end_at: None,
            match_started_at: 0.0,
            time_left,
            zone,
            core,
            obstacles,
            spawn_points,
            powerup_spawn_points,
            projectiles: HashMap::new(),
            projectile_seq: 0,
            powerups: Vec::new(),
            powerup_spawner,
            killfeed: Killfeed::new(),
            maps,
            last_countdown_sent: -1,
            next_score_tick: 0.0,
            next_snapshot_at: 0.0,
            next_match_state_at: 0.0,
            snapshot_seq: 0,
        }
    }

    #[must_use]
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    #[must_use]
    pub fn player(&self, conn: &ConnId) -> Option<&KozPlayer> {
        self.players.get(conn)
    }

    #[must_use]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Non-spectator occupants; the number capacity checks count.
    #[must_use]
    pub fn active_player_count(&self) -> usize {
        self.active_count()
    }

    fn active_ids(&self) -> Vec<ConnId> {
        let mut ids: Vec<ConnId> = self
            .players
            .values()
            .filter(|p| !p.spectator)
            .map(|p| p.conn)
            .collect();
        ids.sort();
        ids
    }

    fn active_count(&self) -> usize {
        self.players.values().filter(|p| !p.spectator).count()
    }

    fn spawn_point(&self, index: usize) -> (f64, f64) {
        if self.spawn_points.is_empty() {
            return (self.zone.x, self.zone.y);
        }
        self.spawn_points[index % self.spawn_points.len()]
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Place or refresh a connection. Mid-match joiners become spectators
    /// when the match is running or the active roster is full.
    pub fn join(
        &mut self,
        conn: ConnId,
        user_id: Option<UserId>,
        name: String,
        avatar: String,
        hero: HeroClass,
        weapon: WeaponKind,
        now: f64,
        out: &mut Outbox,
    ) -> PlayerRole {
        if self.active_count() == 0 && matches!(self.phase, MatchPhase::Active | MatchPhase::Results)
        {
            self.reset_to_lobby(now, out);
        }

        if self.players.contains_key(&conn) {
            let active = self.active_count();
            let promote_spot = (matches!(self.phase, MatchPhase::Lobby | MatchPhase::Countdown)
                && active < self.tuning.max_active_players)
                .then(|| self.spawn_point(active));
            if let Some(player) = self.players.get_mut(&conn) {
                player.name = name;
                player.avatar = avatar;
                player.hero = hero;
                player.weapon = weapon;
                if player.spectator {
                    if let Some((sx, sy)) = promote_spot {
                        player.spectator = false;
                        player.alive = false;
                        player.x = sx;
                        player.y = sy;
                    }
                }
            }
            return self.role_of(&conn);
        }

        let active = self.active_count();
        let spectator = matches!(self.phase, MatchPhase::Active | MatchPhase::Results)
            || active >= self.tuning.max_active_players;
        let (x, y) = if spectator {
            (self.zone.x, self.zone.y)
        } else {
            self.spawn_point(active)
        };

        self.players.insert(
            conn,
            KozPlayer {
                conn,
                user_id,
                name,
                avatar,
                hero,
                weapon,
                x,
                y,
                vx: 0.0,
                vy: 0.0,
                hp: self.tuning.max_hp,
                max_hp: self.tuning.max_hp,
                ammo: self.tuning.ammo_max,
                next_ammo_at: now + self.tuning.ammo_regen_secs,
                last_shot_at: 0.0,
                alive: !spectator,
                respawn_at: 0.0,
                storm_tick_at: now + self.tuning.storm_tick_secs,
                speed_until: 0.0,
                shield_until: 0.0,
                damage_until: 0.0,
                rapid_until: 0.0,
                vision_until: 0.0,
                score: 0,
                kills: 0,
                deaths: 0,
                core_seconds: 0,
                overclock_meter: 0.0,
                overclock_until: 0.0,
                spectator,
                input: InputAxes::default(),
                joined_at: now,
                bullets_fired: 0,
                bullets_hit: 0,
                damage_dealt: 0.0,
                powerups_collected: Vec::new(),
            },
        );

        if spectator {
            PlayerRole::Spectator
        } else {
            PlayerRole::Player
        }
    }

    fn role_of(&self, conn: &ConnId) -> PlayerRole {
        if self.players.get(conn).is_some_and(|p| p.spectator) {
            PlayerRole::Spectator
        } else {
            PlayerRole::Player
        }
    }

    /// Remove a connection. Drops the core at their last position with a
    /// short pickup cooldown. Idempotent.
    pub fn leave(&mut self, conn: &ConnId, now: f64) -> Option<String> {
        let player = self.players.remove(conn)?;

        if self.core.held_by == Some(*conn) {
            self.drop_core(player.x, player.y, now);
        }

        Some(player.name)
    }

    /// `play_again`: opt a spectator back into the next match.
    pub fn promote_if_possible(&mut self, conn: &ConnId) {
        if !matches!(self.phase, MatchPhase::Lobby | MatchPhase::Countdown) {
            return;
        }
        if self.active_count() >= self.tuning.max_active_players {
            return;
        }
        if let Some(player) = self.players.get_mut(conn) {
            player.spectator = false;
        }
    }

    pub fn update_input(&mut self, conn: &ConnId, axes: InputAxes) {
        if let Some(player) = self.players.get_mut(conn) {
            if !player.spectator {
                player.input = axes;
            }
        }
    }

    // ------------------------------------------------------------------
    // Shooting
    // ------------------------------------------------------------------

    /// Validate and spawn projectile(s) for a shoot request.
    pub fn handle_shoot(
        &mut self,
        conn: &ConnId,
        aim_x: f64,
        aim_y: f64,
        now: f64,
    ) -> Result<Vec<Projectile>, RejectReason> {
        if self.phase != MatchPhase::Active {
            return Err(RejectReason::Inactive);
        }
        let Some(player) = self.players.get(conn) else {
            return Err(RejectReason::NotInRoom);
        };
        if player.spectator {
            return Err(RejectReason::Spectator);
        }
        if !player.alive {
            return Err(RejectReason::Dead);
        }

        let spec = self.weapons.spec(player.weapon);
        let mut cooldown = spec.cooldown;
        if player.rapid_until > now {
            cooldown *= self.powerup_table.rapid_fire_cooldown_factor;
        }
        if now - player.last_shot_at < cooldown {
            return Err(RejectReason::Cooldown);
        }
        if player.ammo == 0 {
            return Err(RejectReason::Ammo);
        }

        let dx = aim_x - player.x;
        let dy = aim_y - player.y;
        if dx.hypot(dy) <= 0.001 || !dx.is_finite() || !dy.is_finite() {
            return Err(RejectReason::Aim);
        }

        let overclocked = player.overclock_until > now;
        let offsets: &[f64] = if overclocked {
            &self.tuning.overclock_spread
        } else {
            &spec.spread
        };
        if self.projectiles.len() + offsets.len() > self.tuning.max_projectiles_per_room {
            return Err(RejectReason::Busy);
        }

        let mut damage_mult = 1.0;
        if player.damage_until > now {
            damage_mult *= self.powerup_table.damage_multiplier;
        }
        if overclocked {
            damage_mult *= self.tuning.overclock_damage_mult;
        }

        let base_angle = dy.atan2(dx);
        let origin = (player.x, player.y);
        let player_name = player.name.clone();
        let weapon = player.weapon;
        let player_radius = self.tuning.player_radius;

        let mut spawned = Vec::with_capacity(offsets.len());
        for offset in offsets {
            let angle = base_angle + offset;
            let spawn_distance = player_radius + spec.radius + 6.0;
            let sx = origin.0 + angle.cos() * spawn_distance;
            let sy = origin.1 + angle.sin() * spawn_distance;

            self.projectile_seq += 1;
            let projectile = Projectile::from_weapon(
                format!("pr_{}", self.projectile_seq),
                *conn,
                player_name.clone(),
                (sx, sy),
                angle,
                weapon,
                spec,
                damage_mult,
            );
            spawned.push(projectile.clone());
            self.projectiles.insert(projectile.id.clone(), projectile);
        }

        let shots = spawned.len() as u64;
        if let Some(player) = self.players.get_mut(conn) {
            player.last_shot_at = now;
            player.ammo -= 1;
            if player.ammo < self.tuning.ammo_max && player.next_ammo_at < now {
                player.next_ammo_at = now + self.tuning.ammo_regen_secs;
            }
            player.bullets_fired += shots;
        }

        Ok(spawned)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn evaluate_fsm(&mut self, now: f64, out: &mut Outbox) {
        let active = self.active_count();

        if active == 0 && matches!(self.phase, MatchPhase::Active | MatchPhase::Results) {
            self.reset_to_lobby(now, out);
            return;
        }

        match self.phase {
            MatchPhase::Lobby => {
                if active >= self.tuning.min_players_to_start {
                    self.phase = MatchPhase::Countdown;
                    let seconds = self.tuning.countdown_secs;
                    self.countdown_end_at = Some(now + seconds);
                    self.last_countdown_sent = seconds.ceil() as i64;
                    out.room(ServerEvent::CountdownStart {
                        seconds: seconds.ceil() as u32,
                        min_players: self.tuning.min_players_to_start,
                    });
                }
            }
            MatchPhase::Countdown => {
                if active < self.tuning.min_players_to_start {
                    self.phase = MatchPhase::Lobby;
                    self.countdown_end_at = None;
                    self.last_countdown_sent = -1;
                    out.room(ServerEvent::CountdownCancelled {
                        reason: "players_dropped".to_string(),
                        active_players: active,
                        min_players: self.tuning.min_players_to_start,
                    });
                    return;
                }

                let end = self.countdown_end_at.unwrap_or(now);
                let remaining = ((end - now).max(0.0)).ceil() as i64;
                if remaining != self.last_countdown_sent {
                    self.last_countdown_sent = remaining;
                    out.room(ServerEvent::CountdownStart {
                        seconds: remaining.max(0) as u32,
                        min_players: self.tuning.min_players_to_start,
                    });
                }
                if remaining <= 0 {
                    self.start_match(now, out);
                }
            }
            MatchPhase::Active => {
                if let Some(end) = self.match_end_at {
                    self.time_left = (end - now).max(0.0);
                }
            }
            MatchPhase::Results => {
                if self.results_end_at.is_some_and(|end| now >= end) {
                    self.reset_to_lobby(now, out);
                }
            }
            MatchPhase::Reset => {}
        }
    }

    fn reset_zone(&mut self, now: f64) {
        let map = self.maps.current();
        self.zone = Zone {
            x: map.zone.0,
            y: map.zone.1,
            radius: map.zone.2,
            target_radius: map.zone.2,
            radius_before_shrink: map.zone.2,
            shrink_start: 0.0,
            shrink_end: 0.0,
            next_shrink_at: now + self.tuning.shrink_interval_secs,
            drift_from: (map.zone.0, map.zone.1),
            drift_target: (map.zone.0, map.zone.1),
            finale_announced: false,
        };
    }

    fn start_match(&mut self, now: f64, out: &mut Outbox) {
        self.phase = MatchPhase::Active;
        self.countdown_end_at = None;
        self.results_end_at = None;
        self.last_countdown_sent = -1;

        self.projectiles.clear();
        self.projectile_seq = 0;
        self.powerups.clear();
        self.powerup_spawner.reset(now, 2.0);
        self.killfeed.clear();

        self.match_started_at = now;
        self.match_end_at = Some(now + self.tuning.match_duration_secs);
        self.time_left = self.tuning.match_duration_secs;

        self.reset_zone(now);

        let map = self.maps.current();
        self.core.x = map.core.0;
        self.core.y = map.core.1;
        self.core.held_by = None;
        self.core.drop_unlock_at = now + 1.0;

        let active_ids = self.active_ids();
        for (index, conn) in active_ids.iter().enumerate() {
            let (sx, sy) = self.spawn_point(index);
            if let Some(player) = self.players.get_mut(conn) {
                player.x = sx;
                player.y = sy;
                player.vx = 0.0;
                player.vy = 0.0;
                player.hp = player.max_hp;
                player.alive = true;
                player.respawn_at = 0.0;
                player.score = 0;
                player.kills = 0;
                player.deaths = 0;
                player.core_seconds = 0;
                player.ammo = self.tuning.ammo_max;
                player.next_ammo_at = now + self.tuning.ammo_regen_secs;
                player.storm_tick_at = now + self.tuning.storm_tick_secs;
                player.speed_until = 0.0;
                player.shield_until = 0.0;
                player.damage_until = 0.0;
                player.rapid_until = 0.0;
                player.vision_until = 0.0;
                player.overclock_meter = 0.0;
                player.overclock_until = 0.0;
                player.bullets_fired = 0;
                player.bullets_hit = 0;
                player.damage_dealt = 0.0;
                player.powerups_collected.clear();
            }
        }
        for player in self.players.values_mut() {
            if player.spectator {
                player.alive = false;
            }
        }

        self.next_score_tick = now + 1.0;
        self.next_snapshot_at = now;
        self.next_match_state_at = now;

        let map_view = self.maps.current().view(self.tuning.map_width, self.tuning.map_height);
        out.room(ServerEvent::MatchStart(Box::new(MatchStartPayload {
            state: self.phase,
            time_left: self.time_left.ceil() as u32,
            started_at: now,
            score_target: self.tuning.score_target,
            map: map_view,
        })));
    }

    fn finish_match(&mut self, now: f64, reason: &str, out: &mut Outbox) {
        if self.phase != MatchPhase::Active {
            return;
        }

        self.phase = MatchPhase::Results;
        self.results_end_at = Some(now + self.tuning.results_secs);
        self.match_end_at = Some(now);
        self.time_left = 0.0;

        let results = self.scoreboard_entries();
        let winner = results.first().cloned();
        let payload = MatchEndPayload {
            reason: reason.to_string(),
            winner,
            results: results.clone(),
            reset_in: self.tuning.results_secs.ceil() as u32,
            map: Some(
                self.maps
                    .current()
                    .view(self.tuning.map_width, self.tuning.map_height),
            ),
        };
        out.room(ServerEvent::MatchEnd(Box::new(payload.clone())));
        out.room(ServerEvent::Results(Box::new(payload)));

        out.summary(MatchSummary {
            mode: self.key.mode,
            room_id: self.key.room_id.clone(),
            reason: reason.to_string(),
            duration_secs: now - self.match_started_at,
            players: self
                .players
                .values()
                .filter(|p| !p.spectator)
                .map(|p| PlayerMatchStats {
                    user_id: p.user_id,
                    name: p.name.clone(),
                    score: p.score,
                    kills: p.kills,
                    deaths: p.deaths,
                    damage_dealt: p.damage_dealt,
                    bullets_fired: p.bullets_fired,
                    bullets_hit: p.bullets_hit,
                    powerups_collected: p.powerups_collected.clone(),
                })
                .collect(),
        });
    }

    fn reset_to_lobby(&mut self, now: f64, out: &mut Outbox) {
        self.phase = MatchPhase::Reset;
        out.room(ServerEvent::MatchState(Box::new(self.match_state_payload(now))));

        self.phase = MatchPhase::Lobby;
        self.countdown_end_at = None;
        self.results_end_at = None;
        self.match_end_at = None;
        self.last_countdown_sent = -1;
        self.time_left = self.tuning.match_duration_secs;

        self.projectiles.clear();
        self.powerups.clear();
        self.killfeed.clear();

        self.maps.advance();
        let map = self.maps.current();
        self.obstacles = map.obstacles.clone();
        self.spawn_points = map.spawn_points.clone();
        self.powerup_spawn_points = map.powerup_spawns.clone();
        self.reset_zone(now);

        let (core_x, core_y) = self.maps.current().core;
        self.core.x = core_x;
        self.core.y = core_y;
        self.core.held_by = None;
        self.core.drop_unlock_at = now + self.tuning.core_drop_cooldown_secs;

        self.promote_spectators();

        let active_ids = self.active_ids();
        for (index, conn) in active_ids.iter().enumerate() {
            let (sx, sy) = self.spawn_point(index);
            if let Some(player) = self.players.get_mut(conn) {
                player.x = sx;
                player.y = sy;
                player.vx = 0.0;
                player.vy = 0.0;
                player.alive = false;
                player.score = 0;
                player.kills = 0;
                player.deaths = 0;
                player.core_seconds = 0;
                player.ammo = self.tuning.ammo_max;
                player.overclock_meter = 0.0;
                player.overclock_until = 0.0;
            }
        }

        out.room(ServerEvent::MatchState(Box::new(self.match_state_payload(now))));
        out.room(ServerEvent::LobbyState(Box::new(self.lobby_payload(now))));
    }

    fn promote_spectators(&mut self) {
        let mut active = self.active_count();
        if active >= self.tuning.max_active_players {
            return;
        }

        let mut spectators: Vec<(f64, ConnId)> = self
            .players
            .values()
            .filter(|p| p.spectator)
            .map(|p| (p.joined_at, p.conn))
            .collect();
        spectators.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        for (_, conn) in spectators {
            if active >= self.tuning.max_active_players {
                break;
            }
            if let Some(player) = self.players.get_mut(&conn) {
                player.spectator = false;
                active += 1;
            }
        }
    }

    // ------------------------------------------------------------------
    // Simulation steps
    // ------------------------------------------------------------------

    fn speed_multiplier(&self, player: &KozPlayer, now: f64) -> f64 {
        let mut mult = 1.0;
        if player.speed_until > now {
            mult *= self.powerup_table.speed_multiplier;
        }
        if player.overclock_until > now {
            mult *= self.tuning.overclock_speed_mult;
        }
        mult
    }

    fn step_movement(&mut self, now: f64, dt: f64) {
        let width = self.tuning.map_width;
        let height = self.tuning.map_height;
        let radius = self.tuning.player_radius;
        let accel_rate = self.tuning.accel_rate;
        let friction_rate = self.tuning.friction_rate;

        let speeds: HashMap<ConnId, f64> = self
            .players
            .values()
            .map(|p| {
                (
                    p.conn,
                    self.tuning.hero_speeds.for_hero(p.hero) * self.speed_multiplier(p, now),
                )
            })
            .collect();

        for player in self.players.values_mut() {
            if player.spectator || !player.alive {
                continue;
            }

            let speed = speeds.get(&player.conn).copied().unwrap_or(300.0);
            let axis_x = f64::from(i8::from(player.input.right) - i8::from(player.input.left));
            let axis_y = f64::from(i8::from(player.input.down) - i8::from(player.input.up));
            let (nx, ny) = normalize(axis_x, axis_y);

            let target_vx = nx * speed;
            let target_vy = ny * speed;
            let blend = (accel_rate * dt).min(1.0);
            player.vx += (target_vx - player.vx) * blend;
            player.vy += (target_vy - player.vy) * blend;

            if nx == 0.0 && ny == 0.0 {
                let friction = (1.0 - friction_rate * dt).max(0.0);
                player.vx *= friction;
                player.vy *= friction;
            }

            player.x += player.vx * dt;
            player.y += player.vy * dt;

            // Bounds clamp, then obstacle resolution along the shallow axis.
            player.x = clamp(player.x, radius, width - radius);
            player.y = clamp(player.y, radius, height - radius);
            for obstacle in &self.obstacles {
                if let Some((rx, ry, axis)) =
                    resolve_circle_rect(player.x, player.y, radius, &obstacle.rect)
                {
                    player.x = clamp(rx, radius, width - radius);
                    player.y = clamp(ry, radius, height - radius);
                    match axis {
                        crate::geometry::ResolvedAxis::X => player.vx = 0.0,
                        crate::geometry::ResolvedAxis::Y => player.vy = 0.0,
                    }
                }
            }
        }
    }

    /// Pairwise separation, ordered by connection id for determinism. The
    /// faster of an overlapping pair is treated as the mover and pushed out.
    fn resolve_player_overlaps(&mut self) {
        let min_dist = self.tuning.player_radius * 2.0;
        let width = self.tuning.map_width;
        let height = self.tuning.map_height;
        let radius = self.tuning.player_radius;

        let mut ids: Vec<ConnId> = self
            .players
            .values()
            .filter(|p| p.alive && !p.spectator)
            .map(|p| p.conn)
            .collect();
        ids.sort();

        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let (a, b) = (ids[i], ids[j]);
                let (ax, ay, a_speed) = {
                    let p = &self.players[&a];
                    (p.x, p.y, p.vx.hypot(p.vy))
                };
                let (bx, by, b_speed) = {
                    let p = &self.players[&b];
                    (p.x, p.y, p.vx.hypot(p.vy))
                };
                if distance(ax, ay, bx, by) >= min_dist {
                    continue;
                }

                let mover = if a_speed > b_speed { a } else { b };
                let (anchor_x, anchor_y) = if mover == a { (bx, by) } else { (ax, ay) };
                let (mx, my) = if mover == a { (ax, ay) } else { (bx, by) };
                let (px, py, _) = resolve_circle_overlap(mx, my, anchor_x, anchor_y, min_dist);
                if let Some(player) = self.players.get_mut(&mover) {
                    player.x = clamp(px, radius, width - radius);
                    player.y = clamp(py, radius, height - radius);
                }
            }
        }
    }

    fn step_zone(&mut self, now: f64, out: &mut Outbox) {
        if self.zone.shrink_end > now {
            let start = self.zone.shrink_start;
            let end = self.zone.shrink_end;
            let progress = if end > start {
                clamp((now - start) / (end - start), 0.0, 1.0)
            } else {
                1.0
            };
            self.zone.radius = self.zone.radius_before_shrink
                + (self.zone.target_radius - self.zone.radius_before_shrink) * progress;
            self.zone.x =
                self.zone.drift_from.0 + (self.zone.drift_target.0 - self.zone.drift_from.0) * progress;
            self.zone.y =
                self.zone.drift_from.1 + (self.zone.drift_target.1 - self.zone.drift_from.1) * progress;
            return;
        }

        if self.zone.shrink_end != 0.0 && now >= self.zone.shrink_end {
            // Shrink cycle completes exactly once.
            self.zone.radius = self.zone.target_radius;
            self.zone.x = self.zone.drift_target.0;
            self.zone.y = self.zone.drift_target.1;
            self.zone.shrink_start = 0.0;
            self.zone.shrink_end = 0.0;
            self.zone.next_shrink_at = now + self.tuning.shrink_interval_secs;
            out.room(ServerEvent::ZoneEvent {
                kind: "shrink_end".to_string(),
                zone: self.zone_view(),
                duration: None,
            });
            if self.zone.radius <= self.tuning.min_zone_radius && !self.zone.finale_announced {
                self.zone.finale_announced = true;
                out.room(ServerEvent::ZoneEvent {
                    kind: "finale".to_string(),
                    zone: self.zone_view(),
                    duration: None,
                });
            }
            return;
        }

        if self.zone.next_shrink_at <= now && self.zone.radius > self.tuning.min_zone_radius {
            let from_radius = self.zone.radius;
            let to_radius = (from_radius - self.tuning.shrink_step).max(self.tuning.min_zone_radius);
            self.zone.radius_before_shrink = from_radius;
            self.zone.target_radius = to_radius;
            self.zone.shrink_start = now;
            self.zone.shrink_end = now + self.tuning.shrink_duration_secs;
            self.zone.drift_from = (self.zone.x, self.zone.y);
            self.zone.drift_target = self.pick_drift_target(to_radius);

            out.room(ServerEvent::ZoneEvent {
                kind: "shrink_start".to_string(),
                zone: ZoneView {
                    x: self.zone.x,
                    y: self.zone.y,
                    radius: self.zone.radius,
                    target_radius: Some(to_radius),
                },
                duration: Some(self.tuning.shrink_duration_secs),
            });
        }
    }

    /// New zone center: random drift capped so the previous center stays
    /// inside the shrunk disk, constrained to the padded arena interior.
    fn pick_drift_target(&self, to_radius: f64) -> (f64, f64) {
        let max_drift = self.tuning.zone_drift_frac * to_radius;
        let angle = fastrand::f64() * std::f64::consts::TAU;
        let dist = fastrand::f64() * max_drift;
        let margin = self.tuning.zone_margin;
        let min_x = to_radius + margin;
        let max_x = self.tuning.map_width - to_radius - margin;
        let min_y = to_radius + margin;
        let max_y = self.tuning.map_height - to_radius - margin;

        let tx = self.zone.x + angle.cos() * dist;
        let ty = self.zone.y + angle.sin() * dist;
        if min_x > max_x || min_y > max_y {
            return (self.zone.x, self.zone.y);
        }
        (clamp(tx, min_x, max_x), clamp(ty, min_y, max_y))
    }

    fn zone_view(&self) -> ZoneView {
        ZoneView {
            x: self.zone.x,
            y: self.zone.y,
            radius: self.zone.radius,
            target_radius: None,
        }
    }

    fn step_storm(&mut self, now: f64, out: &mut Outbox) {
        let zone = (self.zone.x, self.zone.y, self.zone.radius);
        let storm_damage = self.tuning.storm_damage;
        let tick = self.tuning.storm_tick_secs;
        let regen = self.tuning.zone_regen;

        let ids: Vec<ConnId> = self
            .players
            .values()
            .filter(|p| p.alive && !p.spectator)
            .map(|p| p.conn)
            .collect();

        for conn in ids {
            let (outside, due) = {
                let Some(player) = self.players.get(&conn) else {
                    continue;
                };
                let dist = distance(player.x, player.y, zone.0, zone.1);
                (dist > zone.2, player.storm_tick_at <= now)
            };

            if outside && due {
                self.apply_damage(&conn, None, storm_damage, "storm", None, now, out);
                if let Some(player) = self.players.get_mut(&conn) {
                    player.storm_tick_at = now + tick;
                }
            } else if !outside {
                if due {
                    if let Some(player) = self.players.get_mut(&conn) {
                        if player.hp < player.max_hp {
                            player.hp = (player.hp + regen).min(player.max_hp);
                        }
                        player.storm_tick_at = now + tick;
                    }
                }
            }
        }
    }

    fn maybe_respawn(&mut self, now: f64) {
        let active_ids = self.active_ids();
        let spawn_count = self.spawn_points.len().max(1);

        for conn in active_ids {
            let due = {
                let Some(p) = self.players.get(&conn) else {
                    continue;
                };
                !p.alive && !p.spectator && p.respawn_at != 0.0 && p.respawn_at <= now
            };
            if !due {
                continue;
            }
            let (sx, sy) = self.spawn_point(fastrand::usize(..spawn_count));
            if let Some(player) = self.players.get_mut(&conn) {
                player.x = sx;
                player.y = sy;
                player.vx = 0.0;
                player.vy = 0.0;
                player.hp = player.max_hp;
                player.alive = true;
                player.respawn_at = 0.0;
                player.ammo = self.tuning.ammo_max;
                player.next_ammo_at = now + self.tuning.ammo_regen_secs;
                player.storm_tick_at = now + self.tuning.storm_tick_secs;
            }
        }
    }

    fn step_ammo(&mut self, now: f64) {
        let ammo_max = self.tuning.ammo_max;
        let regen = self.tuning.ammo_regen_secs;
        for player in self.players.values_mut() {
            if player.spectator || !player.alive {
                continue;
            }
            while player.ammo < ammo_max && player.next_ammo_at <= now {
                player.ammo += 1;
                player.next_ammo_at += regen;
            }
        }
    }

    fn step_projectiles(&mut self, now: f64, dt: f64, out: &mut Outbox) {
        let targets: Vec<TargetCircle> = self
            .players
            .values()
            .filter(|p| p.alive && !p.spectator)
            .map(|p| TargetCircle {
                conn: p.conn,
                x: p.x,
                y: p.y,
                radius: self.tuning.player_radius,
            })
            .collect();

        let outcome = step_projectiles(
            &mut self.projectiles,
            &mut self.obstacles,
            &targets,
            (self.tuning.map_width, self.tuning.map_height),
            dt,
        );

        for hit in outcome.hits {
            self.apply_damage(
                &hit.target,
                Some(hit.owner),
                hit.damage,
                "projectile",
                Some(hit.projectile_id.clone()),
                now,
                out,
            );
            if let Some(shooter) = self.players.get_mut(&hit.owner) {
                shooter.bullets_hit += 1;
            }
            for (victim, damage) in hit.splash {
                self.apply_damage(
                    &victim,
                    Some(hit.owner),
                    damage,
                    "splash",
                    Some(hit.projectile_id.clone()),
                    now,
                    out,
                );
            }
        }

        if !outcome.removed.is_empty() {
            out.room(ServerEvent::ProjectileRemoved {
                ids: outcome.removed,
            });
        }
    }

    /// Single damage funnel: shield first, then hp, then death resolution.
    /// Storm damage passes `attacker = None` and never credits a kill.
    #[allow(clippy::too_many_arguments)]
    fn apply_damage(
        &mut self,
        target: &ConnId,
        attacker: Option<ConnId>,
        damage: f64,
        reason: &str,
        projectile_id: Option<String>,
        now: f64,
        out: &mut Outbox,
    ) {
        let (final_damage, hp, died, target_name, tx, ty) = {
            let Some(player) = self.players.get_mut(target) else {
                return;
            };
            if !player.alive {
                return;
            }

            let mut final_damage = damage.max(1.0);
            if player.shield_until > now {
                final_damage = (final_damage * self.powerup_table.shield_damage_factor).max(1.0);
            }
            let final_damage = final_damage.round().max(1.0);
            player.hp = (player.hp - final_damage as i32).max(0);
            let died = player.hp == 0;
            (
                final_damage,
                player.hp,
                died,
                player.name.clone(),
                player.x,
                player.y,
            )
        };

        let combat_attacker = attacker.filter(|a| a != target);
        if let Some(shooter) = combat_attacker.and_then(|a| self.players.get_mut(&a)) {
            shooter.damage_dealt += final_damage;
        }

        out.room(ServerEvent::PlayerHit {
            target: *target,
            attacker: combat_attacker,
            damage: final_damage,
            hp,
            reason: reason.to_string(),
            projectile_id,
        });

        if !died {
            return;
        }

        if let Some(player) = self.players.get_mut(target) {
            player.alive = false;
            player.deaths += 1;
            player.respawn_at = now + self.tuning.respawn_secs;
        }

        // Storm finishes attribute no kill, even mid-firefight.
        let killer = if reason == "storm" { None } else { combat_attacker };
        let killer_name = killer.and_then(|k| self.players.get(&k).map(|p| p.name.clone()));
        if let Some(k) = killer {
            if let Some(shooter) = self.players.get_mut(&k) {
                shooter.kills += 1;
                shooter.score += self.tuning.kill_score;
            }
        }

        if self.core.held_by == Some(*target) {
            self.drop_core(tx, ty, now);
            out.room(ServerEvent::ControlChanged {
                kind: "core_drop".to_string(),
                conn_id: Some(*target),
                duration: None,
            });
        }

        let entry = self.killfeed.push(
            killer.zip(killer_name.as_deref()),
            (*target, &target_name),
            reason,
            now,
        );

        out.room(ServerEvent::PlayerDied {
            conn_id: *target,
            killer,
            reason: reason.to_string(),
            respawn_in: self.tuning.respawn_secs,
        });
        out.room(ServerEvent::Killfeed(entry));
    }

    fn drop_core(&mut self, x: f64, y: f64, now: f64) {
        self.core.held_by = None;
        self.core.x = clamp(x, 30.0, self.tuning.map_width - 30.0);
        self.core.y = clamp(y, 30.0, self.tuning.map_height - 30.0);
        self.core.drop_unlock_at = now + self.tuning.core_drop_cooldown_secs;
    }

    fn step_powerups(&mut self, now: f64, out: &mut Outbox) {
        if let Some(spawned) =
            self.powerup_spawner
                .try_spawn(now, &self.powerups, &self.powerup_spawn_points)
        {
            out.room(ServerEvent::PowerupSpawned(spawned.view()));
            self.powerups.push(spawned);
        }

        let ids: Vec<ConnId> = self
            .players
            .values()
            .filter(|p| p.alive && !p.spectator)
            .map(|p| p.conn)
            .collect();

        for conn in ids {
            let Some((px, py)) = self.players.get(&conn).map(|p| (p.x, p.y)) else {
                continue;
            };
            let Some(index) = pickup_index(&self.powerups, px, py, self.tuning.player_radius)
            else {
                continue;
            };
            let powerup = self.powerups.remove(index);
            self.apply_powerup_effect(&conn, powerup.kind, now);
            let name = self
                .players
                .get(&conn)
                .map(|p| p.name.clone())
                .unwrap_or_default();
            out.room(ServerEvent::PowerupCollected {
                id: powerup.id,
                kind: powerup.kind,
                by: conn,
                username: name,
            });
        }
    }

    fn apply_powerup_effect(&mut self, conn: &ConnId, kind: PowerUpKind, now: f64) {
        let table = self.powerup_table.clone();
        let ammo_max = self.tuning.ammo_max;
        let regen = self.tuning.ammo_regen_secs;
        let Some(player) = self.players.get_mut(conn) else {
            return;
        };

        match kind {
            PowerUpKind::Heal => {
                player.hp = (player.hp + table.heal_amount).min(player.max_hp);
            }
            PowerUpKind::Speed => {
                player.speed_until = player.speed_until.max(now + table.speed_duration_secs);
            }
            PowerUpKind::Shield => {
                player.shield_until = player.shield_until.max(now + table.shield_duration_secs);
            }
            PowerUpKind::RapidFire => {
                player.rapid_until = player.rapid_until.max(now + table.rapid_fire_duration_secs);
            }
            PowerUpKind::Damage => {
                player.damage_until = player.damage_until.max(now + table.damage_duration_secs);
            }
            PowerUpKind::Ammo => {
                player.ammo = ammo_max;
                player.next_ammo_at = now + regen;
            }
            PowerUpKind::VisionPing => {
                player.vision_until = player.vision_until.max(now + table.vision_ping_duration_secs);
            }
        }
        player.powerups_collected.push(kind);
    }

    fn step_core(&mut self, now: f64, dt: f64, out: &mut Outbox) {
        if let Some(holder_conn) = self.core.held_by {
            let holder_ok = self
                .players
                .get(&holder_conn)
                .is_some_and(|p| p.alive && !p.spectator);

            if holder_ok {
                let overclock_duration = self.tuning.overclock_duration_secs;
                let charge = self.tuning.overclock_charge_per_second;
                if let Some(holder) = self.players.get_mut(&holder_conn) {
                    self.core.x = holder.x;
                    self.core.y = holder.y;
                    holder.overclock_meter = (holder.overclock_meter + charge * dt).min(100.0);
                    if holder.overclock_meter >= 100.0 && holder.overclock_until <= now {
                        holder.overclock_until = now + overclock_duration;
                        holder.overclock_meter = 0.0;
                        out.room(ServerEvent::ControlChanged {
                            kind: "overclock".to_string(),
                            conn_id: Some(holder_conn),
                            duration: Some(overclock_duration),
                        });
                    }
                }
                return;
            }

            let (cx, cy) = (self.core.x, self.core.y);
            self.drop_core(cx, cy, now);
            out.room(ServerEvent::ControlChanged {
                kind: "core_drop".to_string(),
                conn_id: Some(holder_conn),
                duration: None,
            });
        }

        if now < self.core.drop_unlock_at {
            return;
        }

        let pickup_range = self.tuning.player_radius + self.core.radius;
        let new_holder = self
            .players
            .values()
            .filter(|p| p.alive && !p.spectator)
            .find(|p| distance(p.x, p.y, self.core.x, self.core.y) <= pickup_range)
            .map(|p| p.conn);

        if let Some(conn) = new_holder {
            self.core.held_by = Some(conn);
            out.room(ServerEvent::ControlChanged {
                kind: "core_pickup".to_string(),
                conn_id: Some(conn),
                duration: None,
            });
        }
    }

    fn step_score(&mut self, now: f64) {
        while self.next_score_tick <= now {
            if let Some(holder_conn) = self.core.held_by {
                if let Some(holder) = self.players.get_mut(&holder_conn) {
                    if holder.alive && !holder.spectator {
                        holder.score += self.tuning.core_score_per_second;
                        holder.core_seconds += 1;
                    }
                }
            }
            self.next_score_tick += 1.0;
        }
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    fn scoreboard_entries(&self) -> Vec<ScoreboardEntry> {
        let mut entries: Vec<ScoreboardEntry> = self
            .players
            .values()
            .filter(|p| !p.spectator)
            .map(|p| ScoreboardEntry {
                conn_id: p.conn,
                name: p.name.clone(),
                avatar: p.avatar.clone(),
                hero: p.hero,
                score: p.score,
                kills: p.kills,
                deaths: p.deaths,
                core_seconds: p.core_seconds,
            })
            .collect();
        entries.sort_by(|a, b| {
            (b.score, b.kills, a.deaths).cmp(&(a.score, a.kills, b.deaths))
        });
        entries
    }

    fn countdown_remaining(&self, now: f64) -> u32 {
        if self.phase == MatchPhase::Countdown {
            if let Some(end) = self.countdown_end_at {
                return ((end - now).max(0.0)).ceil() as u32;
            }
        }
        0
    }

    fn next_shrink_in(&self, now: f64) -> u32 {
        if self.phase != MatchPhase::Active {
            return 0;
        }
        if self.zone.shrink_end > now {
            ((self.zone.shrink_end - now).max(0.0)).ceil() as u32
        } else {
            ((self.zone.next_shrink_at - now).max(0.0)).ceil() as u32
        }
    }

    #[must_use]
    pub fn lobby_payload(&self, now: f64) -> LobbyStatePayload {
        let mut players: Vec<KozLobbyPlayer> = self
            .players
            .values()
            .map(|p| KozLobbyPlayer {
                conn_id: p.conn,
                name: p.name.clone(),
                avatar: p.avatar.clone(),
                hero: p.hero,
                weapon_type: p.weapon,
                spectator: p.spectator,
            })
            .collect();
        players.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

        LobbyStatePayload {
            state: self.phase,
            room_id: self.key.room_id.clone(),
            min_players: self.tuning.min_players_to_start,
            active_players: self.active_count(),
            spectators: self.players.values().filter(|p| p.spectator).count(),
            countdown: self.countdown_remaining(now),
            map: self
                .maps
                .current()
                .view(self.tuning.map_width, self.tuning.map_height),
            players,
        }
    }

    #[must_use]
    pub fn match_state_payload(&self, now: f64) -> MatchStatePayload {
        MatchStatePayload {
            state: self.phase,
            time_left: self.time_left.max(0.0).ceil() as u32,
            countdown: self.countdown_remaining(now),
            next_shrink_in: self.next_shrink_in(now),
            zone_radius: self.zone.radius,
            min_players: self.tuning.min_players_to_start,
            active_players: self.active_count(),
            map: self
                .maps
                .current()
                .view(self.tuning.map_width, self.tuning.map_height),
        }
    }

    #[must_use]
    pub fn room_state_payload(&self, conn: ConnId, role: PlayerRole, now: f64) -> KozRoomStatePayload {
        KozRoomStatePayload {
            conn_id: conn,
            role,
            room_id: self.key.room_id.clone(),
            width: self.tuning.map_width,
            height: self.tuning.map_height,
            tick_rate: self.tuning.tick_hz,
            snapshot_rate: self.tuning.snapshot_hz,
            min_players: self.tuning.min_players_to_start,
            active_players: self.active_count(),
            lobby: self.lobby_payload(now),
        }
    }

    #[must_use]
    pub fn snapshot(&mut self, now: f64) -> KozSnapshot {
        self.snapshot_seq += 1;
        let players: Vec<KozPlayerView> = self
            .players
            .values()
            .map(|p| KozPlayerView {
                conn_id: p.conn,
                name: p.name.clone(),
                avatar: p.avatar.clone(),
                hero: p.hero,
                weapon_type: p.weapon,
                x: p.x,
                y: p.y,
                vx: p.vx,
                vy: p.vy,
                hp: p.hp,
                max_hp: p.max_hp,
                ammo: p.ammo,
                alive: p.alive,
                score: p.score,
                kills: p.kills,
                deaths: p.deaths,
                spectator: p.spectator,
                last_input_seq: p.input.seq,
                overclock_meter: p.overclock_meter,
                overclock_active: p.overclock_until > now,
                core_holder: self.core.held_by == Some(p.conn),
            })
            .collect();

        KozSnapshot {
            seq: self.snapshot_seq,
            server_time: now,
            room_id: self.key.room_id.clone(),
            map: self
                .maps
                .current()
                .view(self.tuning.map_width, self.tuning.map_height),
            match_info: SnapshotMatchInfo {
                state: self.phase,
                time_left: self.time_left.max(0.0).ceil() as u32,
                countdown: self.countdown_remaining(now),
                next_shrink_in: self.next_shrink_in(now),
                score_target: self.tuning.score_target,
                min_players: self.tuning.min_players_to_start,
                active_players: self.active_count(),
            },
            zone: self.zone_view(),
            storm: StormView {
                damage: self.tuning.storm_damage,
                tick_seconds: self.tuning.storm_tick_secs,
            },
            core: CoreView {
                x: self.core.x,
                y: self.core.y,
                radius: self.core.radius,
                held_by: self.core.held_by,
            },
            players,
            projectiles: self.projectiles.values().map(Projectile::view).collect(),
            powerups: self.powerups.iter().map(PowerUp::view).collect(),
            obstacles: self.obstacles.iter().map(Obstacle::view).collect(),
            scoreboard: self.scoreboard_entries(),
            killfeed: self.killfeed.tail(6),
        }
    }
}

impl Simulated for KozState {
    fn step(&mut self, now: f64, dt: f64, out: &mut Outbox) {
        self.evaluate_fsm(now, out);

        if self.phase == MatchPhase::Active {
            if let Some(end) = self.match_end_at {
                self.time_left = (end - now).max(0.0);
            }

            self.step_zone(now, out);
            self.maybe_respawn(now);
            self.step_ammo(now);
            self.step_movement(now, dt);
            self.resolve_player_overlaps();
            self.step_storm(now, out);
            self.step_projectiles(now, dt, out);
            self.step_powerups(now, out);
            self.step_core(now, dt, out);
            self.step_score(now);

            let leader_score = self
                .scoreboard_entries()
                .first()
                .map_or(0, |entry| entry.score);
            if leader_score >= self.tuning.score_target {
                self.finish_match(now, "score_target", out);
            } else if self.time_left <= 0.0 {
                self.finish_match(now, "time_limit", out);
            }
        }

        if now >= self.next_snapshot_at {
            self.next_snapshot_at = now + 1.0 / f64::from(self.tuning.snapshot_hz);
            let snapshot = self.snapshot(now);
            if !snapshot.projectiles.is_empty() {
                out.room(ServerEvent::ProjectilePositions {
                    projectiles: snapshot.projectiles.clone(),
                });
            }
            out.room(ServerEvent::Snapshot(Box::new(snapshot)));
        }

        if now >= self.next_match_state_at {
            self.next_match_state_at = now + 1.0;
            out.room(ServerEvent::MatchState(Box::new(self.match_state_payload(now))));
            out.room(ServerEvent::LobbyState(Box::new(self.lobby_payload(now))));
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

    fn new_room() -> KozState {
        KozState::new(
            RoomKey::new(GameMode::Koz, "1"),
            KozTuning::default(),
            WeaponTable::default(),
            PowerUpTable::default(),
            0.0,
        )
    }

    fn join_n(room: &mut KozState, n: usize, now: f64) -> Vec<ConnId> {
        let mut out = Outbox::new();
        (0..n)
            .map(|i| {
                let conn = ConnId::new_v4();
                room.join(
                    conn,
                    None,
                    format!("p{i}"),
                    String::new(),
                    HeroClass::Knight,
                    WeaponKind::BulwarkDisc,
                    now,
                    &mut out,
                );
                conn
            })
            .collect()
    }

    fn start_active_match(room: &mut KozState) -> Vec<ConnId> {
        let conns = join_n(room, 4, 0.0);
        let mut out = Outbox::new();
        room.step(0.1, 0.03, &mut out); // LOBBY -> COUNTDOWN
        assert_eq!(room.phase(), MatchPhase::Countdown);
        room.step(10.2, 0.03, &mut out); // countdown expiry -> ACTIVE
        assert_eq!(room.phase(), MatchPhase::Active);
        conns
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
    fn lobby_counts_down_then_starts() {
        let mut room = new_room();
        let _conns = start_active_match(&mut room);
        assert_eq!(room.phase(), MatchPhase::Active);
    }

    #[test]
    fn countdown_cancels_when_players_drop() {
        let mut room = new_room();
        let conns = join_n(&mut room, 4, 0.0);
        let mut out = Outbox::new();
        room.step(0.1, 0.03, &mut out);
        assert_eq!(room.phase(), MatchPhase::Countdown);

        room.leave(&conns[0], 0.5);
        let mut out = Outbox::new();
        room.step(0.6, 0.03, &mut out);
        assert_eq!(room.phase(), MatchPhase::Lobby);
        assert_eq!(events_of(&out, "countdown_cancelled").len(), 1);
    }

    #[test]
    fn thirteenth_joiner_is_spectator() {
        let mut room = new_room();
        let mut out = Outbox::new();
        join_n(&mut room, 12, 0.0);
        let extra = ConnId::new_v4();
        let role = room.join(
            extra,
            None,
            "late".into(),
            String::new(),
            HeroClass::Archer,
            WeaponKind::PiercingArrow,
            0.0,
            &mut out,
        );
        assert_eq!(role, PlayerRole::Spectator);
    }

    #[test]
    fn mid_match_joiner_is_spectator() {
        let mut room = new_room();
        start_active_match(&mut room);
        let mut out = Outbox::new();
        let late = ConnId::new_v4();
        let role = room.join(
            late,
            None,
            "late".into(),
            String::new(),
            HeroClass::Wizard,
            WeaponKind::ArcaneOrb,
            11.0,
            &mut out,
        );
        assert_eq!(role, PlayerRole::Spectator);
    }

    #[test]
    fn shoot_respects_cooldown_and_ammo() {
        let mut room = new_room();
        let conns = start_active_match(&mut room);
        let shooter = conns[0];

        let aim = {
            let p = room.player(&shooter).unwrap();
            (p.x + 100.0, p.y)
        };

        assert!(room.handle_shoot(&shooter, aim.0, aim.1, 11.0).is_ok());
        assert_eq!(
            room.handle_shoot(&shooter, aim.0, aim.1, 11.1),
            Err(RejectReason::Cooldown)
        );
        // Drain remaining ammo past the cooldown each time.
        assert!(room.handle_shoot(&shooter, aim.0, aim.1, 11.6).is_ok());
        assert!(room.handle_shoot(&shooter, aim.0, aim.1, 12.1).is_ok());
        assert_eq!(
            room.handle_shoot(&shooter, aim.0, aim.1, 12.6),
            Err(RejectReason::Ammo)
        );
    }

    #[test]
    fn shoot_rejections_for_state() {
        let mut room = new_room();
        let conns = join_n(&mut room, 2, 0.0);
        // Not ACTIVE yet.
        assert_eq!(
            room.handle_shoot(&conns[0], 10.0, 10.0, 0.1),
            Err(RejectReason::Inactive)
        );

        let mut room = new_room();
        let conns = start_active_match(&mut room);
        let stranger = ConnId::new_v4();
        assert_eq!(
            room.handle_shoot(&stranger, 10.0, 10.0, 11.0),
            Err(RejectReason::NotInRoom)
        );
        // Zero-length aim vector.
        let p = room.player(&conns[0]).unwrap();
        let (px, py) = (p.x, p.y);
        assert_eq!(
            room.handle_shoot(&conns[0], px, py, 11.0),
            Err(RejectReason::Aim)
        );
    }

    #[test]
    fn zone_shrinks_by_step_and_keeps_old_center_inside() {
        let mut room = new_room();
        start_active_match(&mut room);
        let initial_radius = room.zone.radius;
        let initial_center = (room.zone.x, room.zone.y);

        // Run past the first shrink interval + duration.
        let mut now = 10.2;
        let mut shrink_end_seen = false;
        let mut out_all = Vec::new();
        while now < 10.2 + 24.0 + 6.5 {
            let mut out = Outbox::new();
            room.step(now, 1.0 / 30.0, &mut out);
            for (_, ev) in out.events {
                out_all.push(ev);
            }
            now += 1.0 / 30.0;
        }
        for ev in &out_all {
            if let ServerEvent::ZoneEvent { kind, zone, .. } = ev {
                if kind == "shrink_end" {
                    shrink_end_seen = true;
                    let expected =
                        (initial_radius - room.tuning.shrink_step).max(room.tuning.min_zone_radius);
                    assert!((zone.radius - expected).abs() < 1e-6);
                    // Drift cap keeps the previous center inside the disk.
                    let d = distance(initial_center.0, initial_center.1, zone.x, zone.y);
                    assert!(d < zone.radius);
                }
            }
        }
        assert!(shrink_end_seen, "expected a shrink_end zone event");
        assert!(room.zone.radius <= initial_radius - room.tuning.shrink_step + 1e-6);
    }

    #[test]
    fn storm_damages_outside_and_regenerates_inside() {
        let mut room = new_room();
        let conns = start_active_match(&mut room);
        let victim = conns[0];

        // Park the victim far outside the zone.
        if let Some(p) = room.players.get_mut(&victim) {
            p.x = 30.0;
            p.y = 30.0;
            p.storm_tick_at = 11.0;
        }
        let mut out = Outbox::new();
        room.step(11.1, 1.0 / 30.0, &mut out);
        let hp_after = room.player(&victim).unwrap().hp;
        assert_eq!(hp_after, 100 - 8);
        assert_eq!(events_of(&out, "player_hit").len(), 1);

        // Bring them inside; the next storm tick regenerates.
        if let Some(p) = room.players.get_mut(&victim) {
            p.x = room.zone.x;
            p.y = room.zone.y;
            p.input = InputAxes::default();
            p.storm_tick_at = 12.0;
        }
        let mut out = Outbox::new();
        room.step(12.1, 1.0 / 30.0, &mut out);
        assert_eq!(room.player(&victim).unwrap().hp, 100 - 8 + 2);
    }

    #[test]
    fn storm_kill_attributes_no_killer() {
        let mut room = new_room();
        let conns = start_active_match(&mut room);
        let victim = conns[0];
        if let Some(p) = room.players.get_mut(&victim) {
            p.x = 30.0;
            p.y = 30.0;
            p.hp = 5;
            p.storm_tick_at = 11.0;
        }
        let mut out = Outbox::new();
        room.step(11.1, 1.0 / 30.0, &mut out);

        let died = events_of(&out, "player_died");
        assert_eq!(died.len(), 1);
        if let ServerEvent::PlayerDied { killer, reason, .. } = died[0] {
            assert_eq!(*killer, None);
            assert_eq!(reason, "storm");
        }
        // Nobody's kill counter moved.
        assert!(room.players.values().all(|p| p.kills == 0));
    }

    #[test]
    fn projectile_kill_scores_and_drops_core() {
        let mut room = new_room();
        let conns = start_active_match(&mut room);
        let (shooter, victim) = (conns[0], conns[1]);

        // Hand the victim the core and line them up.
        room.core.held_by = Some(victim);
        if let Some(p) = room.players.get_mut(&victim) {
            p.hp = 10;
            p.x = 600.0;
            p.y = 600.0;
        }
        if let Some(p) = room.players.get_mut(&shooter) {
            p.x = 500.0;
            p.y = 600.0;
        }
        // Move everyone else away so splash or overlap cannot interfere.
        for conn in &conns[2..] {
            if let Some(p) = room.players.get_mut(conn) {
                p.x = 3900.0;
                p.y = 2600.0;
            }
        }

        let spawned = room.handle_shoot(&shooter, 700.0, 600.0, 11.0).unwrap();
        assert_eq!(spawned.len(), 1);

        let mut out = Outbox::new();
        // Projectile travels 880 px/s; reach the victim within a few ticks.
        let mut now = 11.0;
        for _ in 0..10 {
            now += 1.0 / 30.0;
            room.step(now, 1.0 / 30.0, &mut out);
        }

        let shooter_state = room.player(&shooter).unwrap();
        assert_eq!(shooter_state.kills, 1);
        assert_eq!(shooter_state.score, room.tuning.kill_score);
        assert!(shooter_state.damage_dealt > 0.0);
        let victim_state = room.player(&victim).unwrap();
        assert!(!victim_state.alive);
        assert_eq!(victim_state.deaths, 1);
        assert_eq!(room.core.held_by, None);
        assert!(!events_of(&out, "player_died").is_empty());
        assert!(!events_of(&out, "killfeed").is_empty());
    }

    #[test]
    fn score_target_ends_match_once() {
        let mut room = new_room();
        let conns = start_active_match(&mut room);
        if let Some(p) = room.players.get_mut(&conns[0]) {
            p.score = room.tuning.score_target;
        }
        let mut out = Outbox::new();
        room.step(11.0, 1.0 / 30.0, &mut out);
        assert_eq!(room.phase(), MatchPhase::Results);
        assert_eq!(events_of(&out, "match_end").len(), 1);
        assert_eq!(out.summaries.len(), 1);
        assert_eq!(out.summaries[0].reason, "score_target");

        // Further steps do not emit another match_end.
        let mut out = Outbox::new();
        room.step(11.1, 1.0 / 30.0, &mut out);
        assert!(events_of(&out, "match_end").is_empty());
        assert!(out.summaries.is_empty());
    }

    #[test]
    fn results_resets_to_lobby_and_rotates_map() {
        let mut room = new_room();
        start_active_match(&mut room);
        let first_map = room.maps.current().id;
        if let Some(p) = room.players.values_mut().next() {
            p.score = 70;
        }
        let mut out = Outbox::new();
        room.step(11.0, 1.0 / 30.0, &mut out);
        assert_eq!(room.phase(), MatchPhase::Results);

        let mut out = Outbox::new();
        room.step(11.0 + 12.5, 1.0 / 30.0, &mut out);
        // Lobby again (countdown may retrigger immediately with 4 actives).
        assert_ne!(room.maps.current().id, first_map);
        assert!(matches!(
            room.phase(),
            MatchPhase::Lobby | MatchPhase::Countdown
        ));
    }

    #[test]
    fn overlapping_players_are_separated() {
        let mut room = new_room();
        let conns = start_active_match(&mut room);
        let (a, b) = (conns[0], conns[1]);
        for conn in [a, b] {
            if let Some(p) = room.players.get_mut(&conn) {
                p.x = 400.0;
                p.y = 400.0;
                p.vx = 10.0;
            }
        }
        let mut out = Outbox::new();
        room.step(11.0, 1.0 / 30.0, &mut out);

        let pa = room.player(&a).unwrap();
        let pb = room.player(&b).unwrap();
        let min_dist = room.tuning.player_radius * 2.0;
        assert!(
            distance(pa.x, pa.y, pb.x, pb.y) >= min_dist - 1e-6,
            "players still overlap after resolution"
        );
    }

    #[test]
    fn players_stay_in_bounds_under_input() {
        let mut room = new_room();
        let conns = start_active_match(&mut room);
        for conn in &conns {
            room.update_input(
                conn,
                InputAxes {
                    up: true,
                    left: true,
                    seq: 1,
                    ..Default::default()
                },
            );
        }
        let mut now = 11.0;
        for _ in 0..300 {
            let mut out = Outbox::new();
            now += 1.0 / 30.0;
            room.step(now, 1.0 / 30.0, &mut out);
        }
        let r = room.tuning.player_radius;
        for p in room.players.values().filter(|p| p.alive) {
            assert!(p.x >= r - 1e-6 && p.x <= room.tuning.map_width - r + 1e-6);
            assert!(p.y >= r - 1e-6 && p.y <= room.tuning.map_height - r + 1e-6);
        }
    }

    #[test]
    fn core_holder_accrues_score_and_overclock() {
        let mut room = new_room();
        let conns = start_active_match(&mut room);
        let holder = conns[0];
        room.core.held_by = Some(holder);

        let mut now = 11.0;
        for _ in 0..(30 * 5) {
            let mut out = Outbox::new();
            now += 1.0 / 30.0;
            room.step(now, 1.0 / 30.0, &mut out);
        }

        let p = room.player(&holder).unwrap();
        assert!(p.core_seconds >= 4, "core seconds accrued: {}", p.core_seconds);
        assert!(p.score >= 4);
        // 26/s charge for 5s crosses 100 and triggers overclock.
        assert!(p.overclock_until > 0.0);
    }

    #[test]
    fn dead_player_respawns_after_delay() {
        let mut room = new_room();
        let conns = start_active_match(&mut room);
        let victim = conns[0];
        if let Some(p) = room.players.get_mut(&victim) {
            p.alive = false;
            p.respawn_at = 12.0;
        }
        let mut out = Outbox::new();
        room.step(11.5, 1.0 / 30.0, &mut out);
        assert!(!room.player(&victim).unwrap().alive);
        room.step(12.1, 1.0 / 30.0, &mut out);
        let p = room.player(&victim).unwrap();
        assert!(p.alive);
        assert_eq!(p.hp, p.max_hp);
    }

    #[test]
    fn leave_is_idempotent_and_drops_core() {
        let mut room = new_room();
        let conns = join_n(&mut room, 4, 0.0);
        room.core.held_by = Some(conns[0]);
        assert!(room.leave(&conns[0], 1.0).is_some());
        assert_eq!(room.core.held_by, None);
        assert!(room.leave(&conns[0], 1.0).is_none());
        assert_eq!(room.player_count(), 3);
    }

    #[test]
    fn snapshot_cadence_and_contents() {
        let mut room = new_room();
        let conns = start_active_match(&mut room);
        let mut out = Outbox::new();
        room.step(11.0, 1.0 / 30.0, &mut out);
        let snapshots = events_of(&out, "snapshot");
        assert_eq!(snapshots.len(), 1);
        if let ServerEvent::Snapshot(snap) = snapshots[0] {
            assert_eq!(snap.players.len(), conns.len());
            assert_eq!(snap.match_info.state, MatchPhase::Active);
            assert!(!snap.obstacles.is_empty());
        }
    }

    #[test]
    fn projectile_expiry_emits_removal_before_next_snapshot() {
        let mut room = new_room();
        let conns = start_active_match(&mut room);
        let shooter = conns[0];
        // Isolate the shooter so nothing gets hit.
        if let Some(p) = room.players.get_mut(&shooter) {
            p.x = 2100.0;
            p.y = 1400.0;
        }
        for conn in &conns[1..] {
            if let Some(p) = room.players.get_mut(conn) {
                p.x = 300.0;
                p.y = 300.0;
            }
        }
        room.handle_shoot(&shooter, 2100.0, 1200.0, 11.0).unwrap();
        assert_eq!(room.projectiles.len(), 1);

        // Step past the lifetime; removal event fires, registry empty.
        let mut removed_seen = false;
        let mut now = 11.0;
        for _ in 0..80 {
            let mut out = Outbox::new();
            now += 1.0 / 30.0;
            room.step(now, 1.0 / 30.0, &mut out);
            if !events_of(&out, "projectile_removed").is_empty() {
                removed_seen = true;
            }
            if let Some(ServerEvent::Snapshot(snap)) =
                events_of(&out, "snapshot").first().copied()
            {
                for view in &snap.projectiles {
                    assert!(
                        room.projectiles.contains_key(&view.id),
                        "snapshot advertises a removed projectile"
                    );
                }
            }
        }
        assert!(removed_seen);
        assert!(room.projectiles.is_empty());
    }

    #[test]
    fn powerup_pickup_applies_effect() {
        let mut room = new_room();
        let conns = start_active_match(&mut room);
        let collector = conns[0];
        if let Some(p) = room.players.get_mut(&collector) {
            p.hp = 40;
            p.x = 1000.0;
            p.y = 1000.0;
        }
        for conn in &conns[1..] {
            if let Some(p) = room.players.get_mut(conn) {
                p.x = 3800.0;
                p.y = 2600.0;
            }
        }
        room.powerups.push(PowerUp {
            id: "pow_test".into(),
            kind: PowerUpKind::Heal,
            x: 1000.0,
            y: 1000.0,
            radius: 18.0,
            spawned_at: 11.0,
        });

        let mut out = Outbox::new();
        room.step(11.0, 1.0 / 30.0, &mut out);
        let collected = events_of(&out, "powerup_collected");
        assert_eq!(collected.len(), 1);
        let p = room.player(&collector).unwrap();
        assert_eq!(p.hp, 40 + 38);
        assert_eq!(p.powerups_collected, vec![PowerUpKind::Heal]);
        assert!(room.powerups.is_empty());
    }

    #[test]
    fn shielded_damage_is_reduced() {
        let mut room = new_room();
        let conns = start_active_match(&mut room);
        let victim = conns[1];
        if let Some(p) = room.players.get_mut(&victim) {
            p.shield_until = 100.0;
        }
        let mut out = Outbox::new();
        room.apply_damage(&victim, Some(conns[0]), 50.0, "projectile", None, 11.0, &mut out);
        let p = room.player(&victim).unwrap();
        assert_eq!(p.hp, 100 - 29); // 50 * 0.58 = 29
    }
}
