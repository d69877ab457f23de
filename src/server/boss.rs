//! Boss Battle inbound handlers.

use std::sync::Arc;

use super::GameServer;
use crate::identity::IdentityInfo;
use crate::protocol::validation::{normalize_bounds, profile_name};
use crate::protocol::{
    BoundsHint, ConnId, HeroClass, JoinProfile, RoomStateBody, ServerEvent,
};
use crate::rooms::boss::BossState;
use crate::rooms::Outbox;
use crate::scheduler::spawn_room_ticker;

const DEFAULT_BOSS_ROOM: &str = "default_room";

impl GameServer {
    #[allow(clippy::too_many_arguments)]
    pub(super) async fn handle_boss_join(
        self: &Arc<Self>,
        conn: ConnId,
        ident: &IdentityInfo,
        room_hint: Option<String>,
        profile: JoinProfile,
        bounds: Option<BoundsHint>,
        boss_health: Option<f64>,
        max_boss_health: Option<f64>,
    ) {
        if !self.check_join_rate(&conn).await {
            return;
        }
        // A connection sits in at most one room; vacate any previous seat.
        self.leave_current_room(conn, "switched").await;

        let room_id = room_hint
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BOSS_ROOM.to_string());
        let tuning = self.config().game.boss.clone();
        let normalized = normalize_bounds(
            bounds,
            tuning.default_width,
            tuning.default_height,
            tuning.default_top,
        );
        let now = self.now();

        let (handle, created) = self
            .registry()
            .boss_room_or_create(&room_id, |key| {
                BossState::new(key, tuning.clone(), normalized, boss_health, max_boss_health, now)
            })
            .await;

        let name = if profile.raw_name().is_some() {
            profile_name(&profile)
        } else {
            ident.display_name.clone()
        };
        let character = HeroClass::normalize(profile.hero.as_deref());
        let requested = (400.0, 500.0);

        let mut out = Outbox::new();
        let joined = {
            let mut state = handle.state.lock().await;
            match state.join(
                conn,
                ident.user_id,
                name,
                character,
                profile.bullets.unwrap_or(0),
                profile.lives.unwrap_or(5),
                requested,
                now,
            ) {
                Ok(seat) => {
                    out.one(
                        conn,
                        ServerEvent::RoomState(Box::new(RoomStateBody::Boss(
                            state.room_state_payload(seat),
                        ))),
                    );
                    if let Some(view) = state.view_of(&conn) {
                        out.room_except(
                            conn,
                            ServerEvent::PlayerJoined {
                                player: view,
                                player_count: state.player_count(),
                            },
                        );
                    }
                    true
                }
                Err(full) => {
                    out.one(
                        conn,
                        ServerEvent::RoomFull {
                            message: full.to_string(),
                        },
                    );
                    false
                }
            }
        };

        if joined {
            self.registry().bind(conn, handle.key.clone());
            self.hub().join_group(&handle.key.group(), conn);
            spawn_room_ticker(
                Arc::clone(self),
                Arc::clone(&handle),
                self.config().game.boss.tick_hz,
            );
            tracing::info!(conn_id = %conn, room = %handle.key, created, "Player joined boss room");
        } else if created {
            // A fresh room that immediately rejected can only be races;
            // drop it if nobody else landed in the meantime.
            let _ = self.registry().try_retire(&handle.key).await;
        }
        self.flush(&handle.key, out);
    }

    pub(super) async fn handle_boss_move(
        self: &Arc<Self>,
        conn: ConnId,
        room_id: &str,
        x: f64,
        y: f64,
        boss: Option<(f64, f64)>,
    ) {
        let Some(handle) = self.registry().boss_room(room_id).await else {
            return;
        };
        let corrected = {
            let mut state = handle.state.lock().await;
            state.move_player(&conn, x, y, boss)
        };
        let Some((cx, cy)) = corrected else {
            return;
        };

        let mut out = Outbox::new();
        out.room_except(
            conn,
            ServerEvent::PlayerPosition {
                conn_id: conn,
                x: cx,
                y: cy,
            },
        );
        out.one(conn, ServerEvent::SelfPosition { x: cx, y: cy });
        self.flush(&handle.key, out);
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) async fn handle_boss_shoot(
        self: &Arc<Self>,
        conn: ConnId,
        room_id: &str,
        bullet_x: Option<f64>,
        bullet_y: Option<f64>,
        dx: Option<f64>,
        dy: Option<f64>,
        character: Option<String>,
    ) {
        let Some(handle) = self.registry().boss_room(room_id).await else {
            return;
        };
        let known = {
            let mut state = handle.state.lock().await;
            state.record_shot(&conn)
        };
        if !known {
            return;
        }

        let mut out = Outbox::new();
        out.room_except(
            conn,
            ServerEvent::PlayerBullet {
                conn_id: conn,
                bullet_x: bullet_x.unwrap_or(0.0),
                bullet_y: bullet_y.unwrap_or(0.0),
                dx: dx.unwrap_or(0.0),
                dy: dy.unwrap_or(0.0),
                character: HeroClass::normalize(character.as_deref()),
            },
        );
        self.flush(&handle.key, out);
    }

    pub(super) async fn handle_boss_damage(self: &Arc<Self>, conn: ConnId, room_id: &str, damage: f64) {
        let Some(handle) = self.registry().boss_room(room_id).await else {
            return;
        };
        let mut out = Outbox::new();
        {
            let mut state = handle.state.lock().await;
            state.apply_boss_damage(&conn, damage, self.now(), &mut out);
        }
        self.flush(&handle.key, out);
    }

    pub(super) async fn handle_boss_player_hit(
        self: &Arc<Self>,
        conn: ConnId,
        room_id: &str,
        lives: Option<i64>,
    ) {
        let Some(handle) = self.registry().boss_room(room_id).await else {
            return;
        };
        let mut out = Outbox::new();
        let removed = {
            let mut state = handle.state.lock().await;
            state.player_hit(&conn, lives, &mut out);
            !state.contains(&conn)
        };
        self.flush(&handle.key, out);

        if removed {
            self.hub().leave_group(&handle.key.group(), &conn);
            self.registry().unbind(&conn);
            let _ = self.registry().try_retire(&handle.key).await;
        }
    }

    pub(super) async fn handle_boss_stats(
        self: &Arc<Self>,
        conn: ConnId,
        room_id: &str,
        bullets: Option<i64>,
        lives: Option<i64>,
    ) {
        let Some(handle) = self.registry().boss_room(room_id).await else {
            return;
        };
        let updated = {
            let mut state = handle.state.lock().await;
            state.update_stats(&conn, bullets, lives)
        };
        let Some((name, bullets, lives)) = updated else {
            return;
        };

        let mut out = Outbox::new();
        out.room_except(
            conn,
            ServerEvent::PlayerStatsUpdate {
                conn_id: conn,
                name,
                bullets,
                lives,
            },
        );
        self.flush(&handle.key, out);
    }

    pub(super) async fn handle_boss_powerup_request(self: &Arc<Self>, conn: ConnId, room_id: &str) {
        let Some(handle) = self.registry().boss_room(room_id).await else {
            return;
        };
        let mut out = Outbox::new();
        {
            let mut state = handle.state.lock().await;
            if state.contains(&conn) {
                state.request_powerup_spawn(self.now(), &mut out);
            }
        }
        self.flush(&handle.key, out);
    }

    pub(super) async fn handle_boss_powerup_collected(
        self: &Arc<Self>,
        conn: ConnId,
        room_id: &str,
        powerup_id: &str,
    ) {
        let Some(handle) = self.registry().boss_room(room_id).await else {
            return;
        };
        let mut out = Outbox::new();
        {
            let mut state = handle.state.lock().await;
            state.collect_powerup(&conn, powerup_id, &mut out);
        }
        self.flush(&handle.key, out);
    }

    pub(super) async fn handle_boss_report_stats(
        self: &Arc<Self>,
        conn: ConnId,
        room_id: &str,
        bullets_fired: Option<u64>,
        bullets_hit: Option<u64>,
        lives_lost: Option<u64>,
    ) {
        let Some(handle) = self.registry().boss_room(room_id).await else {
            return;
        };
        let mut state = handle.state.lock().await;
        state.report_stats(&conn, bullets_fired, bullets_hit, lives_lost);
    }

    pub(super) async fn handle_boss_debug(self: &Arc<Self>, conn: ConnId, room_id: &str) {
        let Some(handle) = self.registry().boss_room(room_id).await else {
            return;
        };
        let state = handle.state.lock().await.debug_state();
        self.send_one(&conn, ServerEvent::DebugResponse { state });
    }
}
