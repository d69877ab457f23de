//! Boss Battle: cooperative rooms with a shared boss health pool.
//!
//! Movement is event-driven: each move request is clamped, resolved against
//! the boss footprint and other players, and the corrected position is
//! returned to the mover and broadcast to the rest. The only periodic work
//! is the power-up spawn cadence.

use std::collections::HashMap;

use crate::config::BossTuning;
use crate::geometry::{clamp, distance, resolve_circle_overlap};
use crate::protocol::validation::NormalizedBounds;
use crate::protocol::{
    BossBoundsView, BossFinalStats, BossPlayerView, BossRoomStatePayload, ConnId, HeroClass,
    PowerUpKind, SelfSeat, ServerEvent, UserId,
};
use crate::rooms::powerup::PowerUp;
use crate::rooms::spawn::{allocate_spawn, clamp_into_area, SpawnArea};
use crate::rooms::{Outbox, RoomKey, Simulated};
use crate::stats::{MatchSummary, PlayerMatchStats};

/// Clearance padding between two spawned players.
const SPAWN_CLEARANCE_PADDING: f64 = 6.0;
/// Extra clearance around the boss footprint at spawn time.
const BOSS_FOOTPRINT_PADDING: f64 = 12.0;
/// The boss anchors near the top of the arena.
const BOSS_ANCHOR_Y: f64 = 110.0;
/// Spawns never land above this line even when `top` is small.
const SPAWN_MIN_Y: f64 = 260.0;

/// One connection's state inside a boss room.
#[derive(Debug, Clone)]
pub struct BossPlayer {
    pub conn: ConnId,
    pub user_id: Option<UserId>,
    pub name: String,
    pub character: HeroClass,
    pub bullets: i64,
    pub lives: i64,
    pub x: f64,
    pub y: f64,
    pub alive: bool,
    pub bullets_fired: u64,
    pub bullets_hit: u64,
    pub damage_dealt: f64,
    pub lives_lost: u64,
    pub powerups_collected: Vec<PowerUpKind>,
    pub stats_reported: bool,
    pub joined_at: f64,
}

/// Join rejected: the room is at capacity.
#[derive(Debug, thiserror::Error)]
#[error("Room is full (max {capacity} players)")]
pub struct BossRoomFull {
    pub capacity: usize,
}

/// Full authoritative state of one boss room.
pub struct BossState {
    pub key: RoomKey,
    tuning: BossTuning,
    boss_health: f64,
    max_health: f64,
    bounds: NormalizedBounds,
    players: HashMap<ConnId, BossPlayer>,
    powerups: Vec<PowerUp>,
    powerup_seq: u64,
    last_powerup_spawn: f64,
    battle_started_at: f64,
}

impl BossState {
    #[must_use]
    pub fn new(
        key: RoomKey,
        tuning: BossTuning,
        bounds: NormalizedBounds,
        boss_health: Option<f64>,
        max_boss_health: Option<f64>,
        now: f64,
    ) -> Self {
        let max_health = max_boss_health
            .filter(|h| h.is_finite() && *h > 0.0)
            .unwrap_or(tuning.default_boss_health);
        let boss_health = boss_health
            .filter(|h| h.is_finite() && *h > 0.0)
            .unwrap_or(max_health)
            .min(max_health);

        Self {
            key,
            tuning,
            boss_health,
            max_health,
            bounds,
            players: HashMap::new(),
            powerups: Vec::new(),
            powerup_seq: 0,
            last_powerup_spawn: 0.0,
            battle_started_at: now,
        }
    }

    #[must_use]
    pub fn boss_health(&self) -> f64 {
        self.boss_health
    }

    #[must_use]
    pub fn bounds_view(&self) -> BossBoundsView {
        BossBoundsView {
            width: self.bounds.width,
            height: self.bounds.height,
            top: self.bounds.top,
        }
    }

    #[must_use]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    #[must_use]
    pub fn contains(&self, conn: &ConnId) -> bool {
        self.players.contains_key(conn)
    }

    fn spawn_area(&self) -> SpawnArea {
        let r = self.tuning.player_radius;
        let pad = self.tuning.spawn_padding;
        SpawnArea {
            min_x: r + pad,
            max_x: self.bounds.width - r - pad,
            min_y: (self.bounds.top + r).max(SPAWN_MIN_Y),
            max_y: self.bounds.height - r - pad,
        }
    }

    fn is_spawn_clear(&self, x: f64, y: f64) -> bool {
        let r = self.tuning.player_radius;
        for other in self.players.values() {
            if distance(x, y, other.x, other.y) < r * 2.0 + SPAWN_CLEARANCE_PADDING {
                return false;
            }
        }
        let boss_x = self.bounds.width / 2.0;
        distance(x, y, boss_x, BOSS_ANCHOR_Y)
            >= self.tuning.boss_radius + r + BOSS_FOOTPRINT_PADDING
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Seat a player at a clear spawn. The room lock serializes concurrent
    /// joiners, so two cannot receive overlapping seats.
    #[allow(clippy::too_many_arguments)]
    pub fn join(
        &mut self,
        conn: ConnId,
        user_id: Option<UserId>,
        name: String,
        character: HeroClass,
        bullets: i64,
        lives: i64,
        requested: (f64, f64),
        now: f64,
    ) -> Result<SelfSeat, BossRoomFull> {
        if self.players.len() >= self.tuning.capacity {
            return Err(BossRoomFull {
                capacity: self.tuning.capacity,
            });
        }

        let area = self.spawn_area();
        let (x, y) = allocate_spawn(
            area,
            self.tuning.spawn_attempts,
            (self.tuning.player_radius * 2.0).max(self.tuning.spawn_grid_step),
            |x, y| self.is_spawn_clear(x, y),
        )
        .unwrap_or_else(|| clamp_into_area(area, requested.0, requested.1));

        self.players.insert(
            conn,
            BossPlayer {
                conn,
                user_id,
                name,
                character,
                bullets,
                lives,
                x,
                y,
                alive: true,
                bullets_fired: 0,
                bullets_hit: 0,
                damage_dealt: 0.0,
                lives_lost: 0,
                powerups_collected: Vec::new(),
                stats_reported: false,
                joined_at: now,
            },
        );

        Ok(SelfSeat {
            x,
            y,
            bullets,
            lives,
        })
    }

    /// Remove a connection. Idempotent; returns the removed name.
    pub fn leave(&mut self, conn: &ConnId) -> Option<String> {
        self.players.remove(conn).map(|p| p.name)
    }

    // ------------------------------------------------------------------
    // Movement
    // ------------------------------------------------------------------

    /// Clamp and resolve one movement request. Returns the authoritative
    /// position, or `None` when the mover is unknown.
    pub fn move_player(
        &mut self,
        conn: &ConnId,
        x: f64,
        y: f64,
        boss: Option<(f64, f64)>,
    ) -> Option<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        if !self.players.contains_key(conn) {
            return None;
        }

        let r = self.tuning.player_radius;
        let (min_x, max_x) = (r, self.bounds.width - r);
        let (min_y, max_y) = (self.bounds.top + r, self.bounds.height - r);
        let mut desired_x = clamp(x, min_x, max_x);
        let mut desired_y = clamp(y, min_y, max_y);

        if let Some((bx, by)) = boss.filter(|(bx, by)| bx.is_finite() && by.is_finite()) {
            let (rx, ry, _) = resolve_circle_overlap(
                desired_x,
                desired_y,
                bx,
                by,
                self.tuning.boss_radius + r,
            );
            desired_x = rx;
            desired_y = ry;
        }

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

    // ------------------------------------------------------------------
    // Combat
    // ------------------------------------------------------------------

    /// Advisory client stat report (bullets/lives display values).
    pub fn update_stats(
        &mut self,
        conn: &ConnId,
        bullets: Option<i64>,
        lives: Option<i64>,
    ) -> Option<(String, i64, i64)> {
        let player = self.players.get_mut(conn)?;
        if let Some(bullets) = bullets {
            player.bullets = bullets.max(0);
        }
        if let Some(lives) = lives {
            player.lives = lives.max(0);
        }
        Some((player.name.clone(), player.bullets, player.lives))
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

    /// Apply boss damage attributed to `conn`. Emits the health update and,
    /// when the boss falls, exactly one victory broadcast before resetting
    /// the boss for the next battle.
    pub fn apply_boss_damage(&mut self, conn: &ConnId, damage: f64, now: f64, out: &mut Outbox) {
        let damage = if damage.is_finite() {
            damage.clamp(0.0, 500.0)
        } else {
            return;
        };
        if damage == 0.0 {
            return;
        }

        let attacker_name = {
            let Some(player) = self.players.get_mut(conn) else {
                return;
            };
            if !player.alive {
                return;
            }
            player.damage_dealt += damage;
            player.bullets_hit += 1;
            player.name.clone()
        };

        self.boss_health = (self.boss_health - damage).max(0.0);
        out.room(ServerEvent::HealthUpdate {
            boss_health: self.boss_health,
            max_boss_health: self.max_health,
            attacker: attacker_name,
            damage,
        });

        if self.boss_health <= 0.0 {
            self.broadcast_victory(now, out);
        }
    }

    /// Single victory broadcast with the stats snapshot taken at the moment
    /// the boss fell; the boss then resets for a future battle.
    fn broadcast_victory(&mut self, now: f64, out: &mut Outbox) {
        let stats = self.final_stats();
        out.room(ServerEvent::Defeated {
            message: "The boss has been defeated!".to_string(),
            players: self.players_list(),
            all_player_stats: stats,
        });

        out.summary(MatchSummary {
            mode: self.key.mode,
            room_id: self.key.room_id.clone(),
            reason: "boss_defeated".to_string(),
            duration_secs: now - self.battle_started_at,
            players: self
                .players
                .values()
                .map(|p| PlayerMatchStats {
                    user_id: p.user_id,
                    name: p.name.clone(),
                    score: p.damage_dealt.round() as i64,
                    kills: 0,
                    deaths: p.lives_lost as u32,
                    damage_dealt: p.damage_dealt,
                    bullets_fired: p.bullets_fired,
                    bullets_hit: p.bullets_hit,
                    powerups_collected: p.powerups_collected.clone(),
                })
                .collect(),
        });

        self.boss_health = self.max_health;
        self.battle_started_at = now;
        for player in self.players.values_mut() {
            player.stats_reported = false;
        }
    }

    /// Player reports being hit by the boss. A player at zero lives dies
    /// and leaves the room; `player_died` always precedes the matching
    /// `player_left(reason="died")`.
    pub fn player_hit(&mut self, conn: &ConnId, lives: Option<i64>, out: &mut Outbox) {
        let (name, dead) = {
            let Some(player) = self.players.get_mut(conn) else {
                return;
            };
            player.lives_lost += 1;
            if let Some(lives) = lives {
                player.lives = lives.max(0);
            } else {
                player.lives = (player.lives - 1).max(0);
            }
            (player.name.clone(), player.lives <= 0)
        };

        if !dead {
            let player = &self.players[conn];
            out.room(ServerEvent::PlayerDamaged {
                conn_id: *conn,
                name,
                lives: player.lives,
            });
            return;
        }

        self.players.remove(conn);
        let player_count = self.players.len();
        out.room(ServerEvent::PlayerDied {
            conn_id: *conn,
            killer: None,
            reason: "boss".to_string(),
            respawn_in: 0.0,
        });
        out.room(ServerEvent::PlayerLeft {
            conn_id: *conn,
            name,
            reason: "died".to_string(),
            player_count,
        });
    }

    // ------------------------------------------------------------------
    // Power-ups
    // ------------------------------------------------------------------

    fn spawn_powerup(&mut self, now: f64) -> Option<PowerUp> {
        if self.powerups.len() >= self.tuning.max_powerups || self.tuning.powerup_kinds.is_empty()
        {
            return None;
        }

        // Middle-bottom play area, clear of the boss zone and players.
        let area = self.spawn_area();
        let spot = allocate_spawn(area, 24, self.tuning.spawn_grid_step, |x, y| {
            self.is_spawn_clear(x, y)
                && self
                    .powerups
                    .iter()
                    .all(|p| distance(x, y, p.x, p.y) >= 50.0)
        })?;

        let kind = self.tuning.powerup_kinds[fastrand::usize(..self.tuning.powerup_kinds.len())];
        self.powerup_seq += 1;
        let powerup = PowerUp {
            id: format!("pow_{}", self.powerup_seq),
            kind,
            x: spot.0,
            y: spot.1,
            radius: 18.0,
            spawned_at: now,
        };
        self.powerups.push(powerup.clone());
        Some(powerup)
    }

    /// Rate-limited client request to spawn a power-up; the tick also
    /// spawns on its own cadence.
    pub fn request_powerup_spawn(&mut self, now: f64, out: &mut Outbox) {
        if now - self.last_powerup_spawn < self.tuning.powerup_interval_secs {
            return;
        }
        if let Some(powerup) = self.spawn_powerup(now) {
            self.last_powerup_spawn = now;
            out.room(ServerEvent::PowerupSpawned(powerup.view()));
        }
    }

    /// Client reports picking up a power-up (effects are applied by the
    /// client simulation in this mode; the server records the collection).
    pub fn collect_powerup(&mut self, conn: &ConnId, powerup_id: &str, out: &mut Outbox) {
        if !self.players.contains_key(conn) {
            return;
        }
        let Some(index) = self.powerups.iter().position(|p| p.id == powerup_id) else {
            return;
        };
        let powerup = self.powerups.remove(index);

        let name = match self.players.get_mut(conn) {
            Some(player) => {
                player.powerups_collected.push(powerup.kind);
                player.name.clone()
            }
            None => "Unknown".to_string(),
        };

        out.room(ServerEvent::PowerupCollected {
            id: powerup.id,
            kind: powerup.kind,
            by: *conn,
            username: name,
        });
    }

    /// Reconcile an end-of-match client report. Server counters win; client
    /// values only fill in what the server could not observe.
    pub fn report_stats(
        &mut self,
        conn: &ConnId,
        bullets_fired: Option<u64>,
        bullets_hit: Option<u64>,
        lives_lost: Option<u64>,
    ) {
        let Some(player) = self.players.get_mut(conn) else {
            return;
        };
        if let Some(fired) = bullets_fired {
            player.bullets_fired = player.bullets_fired.max(fired);
        }
        if let Some(hit) = bullets_hit {
            player.bullets_hit = player.bullets_hit.max(hit.min(player.bullets_fired));
        }
        if let Some(lost) = lives_lost {
            player.lives_lost = player.lives_lost.max(lost);
        }
        player.stats_reported = true;
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    #[must_use]
    pub fn players_list(&self) -> Vec<BossPlayerView> {
        let mut list: Vec<BossPlayerView> = self.players.values().map(Self::player_view).collect();
        list.sort_by(|a, b| a.username.cmp(&b.username));
        list
    }

    fn player_view(player: &BossPlayer) -> BossPlayerView {
        BossPlayerView {
            conn_id: player.conn,
            username: player.name.clone(),
            user_id: player.user_id,
            character: player.character,
            bullets: player.bullets,
            lives: player.lives,
            x: player.x,
            y: player.y,
            alive: player.alive,
        }
    }

    #[must_use]
    pub fn view_of(&self, conn: &ConnId) -> Option<BossPlayerView> {
        self.players.get(conn).map(Self::player_view)
    }

    fn final_stats(&self) -> Vec<BossFinalStats> {
        self.players
            .values()
            .map(|p| BossFinalStats {
                conn_id: p.conn,
                username: p.name.clone(),
                character: p.character,
                damage_dealt: p.damage_dealt,
                bullets_fired: p.bullets_fired.max(p.bullets_hit),
                bullets_hit: p.bullets_hit,
                lives: p.lives,
                lives_lost: p.lives_lost,
                powerups_collected: p.powerups_collected.clone(),
            })
            .collect()
    }

    #[must_use]
    pub fn room_state_payload(&self, seat: SelfSeat) -> BossRoomStatePayload {
        BossRoomStatePayload {
            room_id: self.key.room_id.clone(),
            boss_health: self.boss_health,
            max_boss_health: self.max_health,
            player_count: self.players.len(),
            players: self.players_list(),
            powerups: self.powerups.iter().map(PowerUp::view).collect(),
            self_state: seat,
            bounds: self.bounds_view(),
        }
    }

    #[must_use]
    pub fn debug_state(&self) -> serde_json::Value {
        serde_json::json!({
            "room_id": self.key.room_id,
            "boss_health": self.boss_health,
            "max_boss_health": self.max_health,
            "player_count": self.players.len(),
            "powerups": self.powerups.len(),
        })
    }
}

impl Simulated for BossState {
    fn step(&mut self, now: f64, _dt: f64, out: &mut Outbox) {
        if now - self.last_powerup_spawn >= self.tuning.powerup_interval_secs {
            if let Some(powerup) = self.spawn_powerup(now) {
                self.last_powerup_spawn = now;
                out.room(ServerEvent::PowerupSpawned(powerup.view()));
            }
        }
    }

    fn occupant_count(&self) -> usize {
        self.players.len()
    }
}
