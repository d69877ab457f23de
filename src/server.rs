//! Main server orchestration: event dispatch, room membership plumbing,
//! outbox flushing and the disconnect reaper.
//!
//! Handlers never touch sockets directly: they mutate room state under the
//! room lock, collect addressed events in an [`Outbox`], and flush after
//! releasing the lock. One mode's handlers live in one submodule, mirrored
//! on the inbound event prefix.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::chat::ChatRouter;
use crate::config::Config;
use crate::hub::ConnectionHub;
use crate::identity::{IdentityInfo, IdentityResolver};
use crate::protocol::{ClientEvent, ConnId, GameMode, ServerEvent};
use crate::rate_limit::{ActionRateLimiter, WindowConfig};
use crate::registry::RoomRegistry;
use crate::rooms::{Audience, Outbox, RoomKey};
use crate::stats::StatsSink;

mod boss;
mod koz;
mod pvp;
mod slither;
mod social;

/// The authoritative game server shared by every connection task.
pub struct GameServer {
    config: Arc<Config>,
    registry: RoomRegistry,
    hub: ConnectionHub,
    chat: ChatRouter,
    stats: Arc<dyn StatsSink>,
    identity: Arc<dyn IdentityResolver>,
    join_limiter: ActionRateLimiter,
    pvp_viewers: DashMap<ConnId, ()>,
    epoch: Instant,
}

impl GameServer {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        stats: Arc<dyn StatsSink>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Arc<Self> {
        let hub = ConnectionHub::new(config.server.send_failure_streak);
        let chat = ChatRouter::new(config.server.chat.clone());
        let join_limiter = ActionRateLimiter::new(WindowConfig {
            max_actions: config.server.join_rate.max_attempts,
            window: std::time::Duration::from_secs(config.server.join_rate.window_secs),
        });

        Arc::new(Self {
            config,
            registry: RoomRegistry::new(),
            hub,
            chat,
            stats,
            identity,
            join_limiter,
            pvp_viewers: DashMap::new(),
            epoch: Instant::now(),
        })
    }

    /// Simulation clock: seconds since server start.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    #[must_use]
    pub fn hub(&self) -> &ConnectionHub {
        &self.hub
    }

    #[must_use]
    pub fn identity_resolver(&self) -> &dyn IdentityResolver {
        self.identity.as_ref()
    }

    /// Attach a connection's outbound queue.
    pub fn register_client(&self, conn: ConnId, sender: mpsc::Sender<Arc<ServerEvent>>) {
        self.hub.register(conn, sender);
        tracing::info!(conn_id = %conn, connections = self.hub.connection_count(), "Client registered");
    }

    // ------------------------------------------------------------------
    // Outbox flushing
    // ------------------------------------------------------------------

    /// Deliver collected events through the hub and hand match summaries to
    /// the stats sink. Called after the room lock has been released; a slow
    /// subscriber only drops its own frames.
    pub fn flush(&self, key: &RoomKey, out: Outbox) {
        let group = key.group();
        for (audience, event) in out.events {
            let event = Arc::new(event);
            match audience {
                Audience::Room => self.hub.broadcast(&group, event),
                Audience::RoomExcept(skip) => self.hub.broadcast_except(&group, &skip, event),
                Audience::One(conn) => self.hub.send_to(&conn, event),
                Audience::Lobby(mode) => self.hub.broadcast(&RoomKey::lobby_group(mode), event),
                Audience::LobbyExcept(mode, skip) => {
                    self.hub
                        .broadcast_except(&RoomKey::lobby_group(mode), &skip, event);
                }
            }
        }
        for summary in out.summaries {
            self.stats.record_match_end(summary);
        }
    }

    fn send_one(&self, conn: &ConnId, event: ServerEvent) {
        self.hub.send_to(conn, Arc::new(event));
    }

    async fn check_join_rate(&self, conn: &ConnId) -> bool {
        match self.join_limiter.check(conn).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(conn_id = %conn, %err, "Join attempt rate limited");
                self.send_one(
                    conn,
                    ServerEvent::Error {
                        message: err.to_string(),
                    },
                );
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Route one inbound event. Every arm is total: invalid input turns
    /// into a rejection event or is ignored, never an error to the caller.
    pub async fn handle_event(self: &Arc<Self>, conn: ConnId, ident: &IdentityInfo, event: ClientEvent) {
        match event {
            // ---- Boss Battle ----
            ClientEvent::BossJoinRoom {
                room_id,
                player,
                bounds,
                boss_health,
                max_boss_health,
            } => {
                self.handle_boss_join(conn, ident, room_id, player, bounds, boss_health, max_boss_health)
                    .await;
            }
            ClientEvent::BossLeaveRoom { .. } => self.leave_current_room(conn, "left").await,
            ClientEvent::BossPlayerMove {
                room_id,
                x,
                y,
                boss_x,
                boss_y,
            } => {
                self.handle_boss_move(conn, &room_id, x, y, boss_x.zip(boss_y))
                    .await;
            }
            ClientEvent::BossPlayerShoot {
                room_id,
                bullet_x,
                bullet_y,
                dx,
                dy,
                character,
            } => {
                self.handle_boss_shoot(conn, &room_id, bullet_x, bullet_y, dx, dy, character)
                    .await;
            }
            ClientEvent::BossDamage { room_id, damage } => {
                self.handle_boss_damage(conn, &room_id, damage.unwrap_or(10.0))
                    .await;
            }
            ClientEvent::BossPlayerHit { room_id, lives } => {
                self.handle_boss_player_hit(conn, &room_id, lives).await;
            }
            ClientEvent::BossPlayerStats {
                room_id,
                bullets,
                lives,
            } => {
                self.handle_boss_stats(conn, &room_id, bullets, lives).await;
            }
            ClientEvent::BossRequestPowerupSpawn { room_id } => {
                self.handle_boss_powerup_request(conn, &room_id).await;
            }
            ClientEvent::BossPowerupCollected {
                room_id,
                powerup_id,
            } => {
                self.handle_boss_powerup_collected(conn, &room_id, &powerup_id)
                    .await;
            }
            ClientEvent::BossReportStats {
                room_id,
                bullets_fired,
                bullets_hit,
                lives_lost,
                ..
            } => {
                self.handle_boss_report_stats(conn, &room_id, bullets_fired, bullets_hit, lives_lost)
                    .await;
            }
            ClientEvent::BossJoinLobby { profile } => {
                self.handle_lobby_join(conn, ident, GameMode::Boss, &profile)
                    .await;
            }
            ClientEvent::BossLeaveLobby => {
                self.handle_lobby_leave(conn, GameMode::Boss).await;
            }
            ClientEvent::BossChatSend { room_id, content } => {
                self.handle_chat(conn, ident, GameMode::Boss, room_id, &content)
                    .await;
            }
            ClientEvent::BossPlayerAway { .. } => {
                self.handle_presence(conn, ident, true).await;
            }
            ClientEvent::BossPlayerReturned { .. } => {
                self.handle_presence(conn, ident, false).await;
            }
            ClientEvent::BossDebugState { room_id } => {
                self.handle_boss_debug(conn, &room_id).await;
            }

            // ---- PVP Arena ----
            ClientEvent::PvpJoinRoom {
                room_id,
                username,
                character,
                bullets,
                lives,
            } => {
                let profile = crate::protocol::JoinProfile {
                    username,
                    hero: character,
                    bullets,
                    lives,
                    ..Default::default()
                };
                self.handle_pvp_join(conn, ident, room_id, profile).await;
            }
            ClientEvent::PvpReady => self.handle_pvp_ready(conn).await,
            ClientEvent::PvpPlayerMove { x, y } => self.handle_pvp_move(conn, x, y).await,
            ClientEvent::PvpPlayerShoot {
                bullet_x,
                bullet_y,
                dx,
                dy,
                character,
            } => {
                self.handle_pvp_shoot(conn, bullet_x, bullet_y, dx, dy, character)
                    .await;
            }
            ClientEvent::PvpHitOpponent { .. } => self.handle_pvp_hit(conn).await,
            ClientEvent::PvpPlayerStats { bullets, lives } => {
                self.handle_pvp_stats(conn, bullets, lives).await;
            }
            ClientEvent::PvpChatSend { content } => {
                self.handle_chat(conn, ident, GameMode::Pvp, None, &content)
                    .await;
            }
            ClientEvent::PvpPlayerAway => self.handle_presence(conn, ident, true).await,
            ClientEvent::PvpPlayerReturned => self.handle_presence(conn, ident, false).await,
            ClientEvent::PvpLeaveRoom => self.leave_current_room(conn, "left").await,
            ClientEvent::PvpGetStatus => self.handle_pvp_status_request(conn).await,
            ClientEvent::PvpModeViewerJoin => self.handle_pvp_viewer(conn, true).await,
            ClientEvent::PvpModeViewerLeave => self.handle_pvp_viewer(conn, false).await,

            // ---- King of the Zone ----
            ClientEvent::KozJoinRoom { profile } => {
                self.handle_koz_join(conn, ident, &profile).await;
            }
            ClientEvent::KozLeaveRoom => self.leave_current_room(conn, "left").await,
            ClientEvent::KozInput(axes) => self.handle_koz_input(conn, axes).await,
            ClientEvent::KozPlayerShoot { aim_x, aim_y } => {
                self.handle_koz_shoot(conn, aim_x, aim_y).await;
            }
            ClientEvent::KozPlayAgain => self.handle_koz_play_again(conn).await,
            ClientEvent::KozRequestState => self.handle_koz_request_state(conn).await,
            ClientEvent::KozChatSend { content } => {
                self.handle_chat(conn, ident, GameMode::Koz, None, &content)
                    .await;
            }

            // ---- Slither ----
            ClientEvent::SlitherJoinRoom { profile } => {
                self.handle_slither_join(conn, ident, &profile).await;
            }
            ClientEvent::SlitherLeaveRoom => self.leave_current_room(conn, "left").await,
            ClientEvent::SlitherInput { dir_x, dir_y, boost } => {
                self.handle_slither_input(conn, dir_x, dir_y, boost).await;
            }
            ClientEvent::SlitherPlayAgain => self.handle_slither_play_again(conn).await,
            ClientEvent::SlitherChatSend { content } => {
                self.handle_chat(conn, ident, GameMode::Slither, None, &content)
                    .await;
            }

            // ---- Transport ----
            ClientEvent::Ping => self.send_one(&conn, ServerEvent::Pong),
        }
    }

    // ------------------------------------------------------------------
    // Leaving and the disconnect reaper
    // ------------------------------------------------------------------

    /// Remove a connection from its current room, if any. Idempotent.
    pub async fn leave_current_room(self: &Arc<Self>, conn: ConnId, reason: &str) {
        let Some(key) = self.registry.unbind(&conn) else {
            return;
        };
        let group = key.group();
        self.hub.leave_group(&group, &conn);
        let now = self.now();

        let mut out = Outbox::new();
        match key.mode {
            GameMode::Boss => {
                if let Some(handle) = self.registry.boss_room(&key.room_id).await {
                    let mut state = handle.state.lock().await;
                    if let Some(name) = state.leave(&conn) {
                        out.room(ServerEvent::PlayerLeft {
                            conn_id: conn,
                            name,
                            reason: reason.to_string(),
                            player_count: state.player_count(),
                        });
                    }
                }
            }
            GameMode::Pvp => {
                if let Some(handle) = self.registry.pvp_room(&key.room_id).await {
                    let mut state = handle.state.lock().await;
                    if let Some(name) = state.leave(&conn) {
                        out.room(ServerEvent::OpponentLeft {
                            username: name.clone(),
                        });
                        out.room(ServerEvent::PlayerLeft {
                            conn_id: conn,
                            name,
                            reason: reason.to_string(),
                            player_count: state.player_count(),
                        });
                    }
                }
            }
            GameMode::Koz => {
                if let Some(handle) = self.registry.koz_room(&key.room_id).await {
                    let mut state = handle.state.lock().await;
                    if let Some(name) = state.leave(&conn, now) {
                        out.room(ServerEvent::PlayerLeft {
                            conn_id: conn,
                            name,
                            reason: reason.to_string(),
                            player_count: state.player_count(),
                        });
                        out.room(ServerEvent::LobbyState(Box::new(state.lobby_payload(now))));
                        out.room(ServerEvent::MatchState(Box::new(
                            state.match_state_payload(now),
                        )));
                    }
                }
            }
            GameMode::Slither => {
                if let Some(handle) = self.registry.slither_room(&key.room_id).await {
                    let mut state = handle.state.lock().await;
                    if let Some(name) = state.leave(&conn, now) {
                        out.room(ServerEvent::PlayerLeft {
                            conn_id: conn,
                            name,
                            reason: reason.to_string(),
                            player_count: state.player_count(),
                        });
                    }
                }
            }
        }
        self.flush(&key, out);

        let _ = self.registry.try_retire(&key).await;
        tracing::info!(conn_id = %conn, room = %key, reason, "Player left room");

        if key.mode == GameMode::Pvp {
            self.broadcast_pvp_status().await;
        }
    }

    /// Socket closed: clean every per-connection ownership. Idempotent and
    /// safe to run concurrently with room ticks (takes the same locks).
    pub async fn disconnect(self: &Arc<Self>, conn: ConnId) {
        self.leave_current_room(conn, "disconnect").await;

        let left_lobbies = self.chat.leave_all_lobbies(&conn).await;
        for (mode, member) in left_lobbies {
            self.announce_lobby_departure(mode, &member).await;
        }

        self.pvp_viewers.remove(&conn);
        self.chat.forget(&conn).await;
        self.join_limiter.forget(&conn).await;
        self.hub.unregister(&conn);
        tracing::info!(conn_id = %conn, "Client disconnected and reaped");
    }
}
