//! PVP Arena inbound handlers.

use std::sync::Arc;

use super::GameServer;
use crate::identity::IdentityInfo;
use crate::protocol::validation::profile_name;
use crate::protocol::{
    ConnId, GameMode, HeroClass, JoinProfile, PvpStatusPayload, RoomStateBody, ServerEvent,
};
use crate::rooms::pvp::PvpState;
use crate::rooms::{Outbox, RoomKey};

impl GameServer {
    pub(super) async fn handle_pvp_join(
        self: &Arc<Self>,
        conn: ConnId,
        ident: &IdentityInfo,
        requested_room: Option<String>,
        profile: JoinProfile,
    ) {
        if !self.check_join_rate(&conn).await {
            return;
        }

        // Already seated: resend the room state instead of re-joining.
        if let Some(key) = self.registry().locate(&conn) {
            if key.mode == GameMode::Pvp {
                if let Some(handle) = self.registry().pvp_room(&key.room_id).await {
                    let state = handle.state.lock().await;
                    if let Some(payload) = state.room_state_payload(&conn) {
                        let battle_active = state.battle_active();
                        let player_count = state.player_count();
                        drop(state);
                        self.send_one(
                            &conn,
                            ServerEvent::RoomState(Box::new(RoomStateBody::Pvp(payload))),
                        );
                        self.send_one(
                            &conn,
                            ServerEvent::RoomStatus {
                                room_id: key.room_id.clone(),
                                player_count,
                                battle_active,
                            },
                        );
                        return;
                    }
                }
            }
            self.leave_current_room(conn, "switched").await;
        }

        let name = if profile.raw_name().is_some() {
            profile_name(&profile)
        } else {
            ident.display_name.clone()
        };
        let character = HeroClass::normalize(profile.hero.as_deref());
        let tuning = self.config().game.pvp.clone();
        let requested = requested_room.filter(|id| !id.trim().is_empty());

        // The seat check happens again under the room lock; a race with a
        // concurrent joiner falls through to a fresh room.
        for _attempt in 0..3 {
            let (handle, _created) = self
                .registry()
                .pvp_room_for_join(requested.as_deref(), |key| {
                    PvpState::new(key, tuning.clone())
                })
                .await;

            let mut out = Outbox::new();
            let seated = {
                let mut state = handle.state.lock().await;
                match state.join(
                    conn,
                    ident.user_id,
                    name.clone(),
                    character,
                    profile.bullets.unwrap_or(0),
                    profile.lives,
                ) {
                    Some((_number, existing_opponent)) => {
                        if let Some(payload) = state.room_state_payload(&conn) {
                            out.one(
                                conn,
                                ServerEvent::RoomState(Box::new(RoomStateBody::Pvp(payload))),
                            );
                        }
                        out.one(
                            conn,
                            ServerEvent::RoomStatus {
                                room_id: handle.key.room_id.clone(),
                                player_count: state.player_count(),
                                battle_active: state.battle_active(),
                            },
                        );

                        if let Some(opponent) = existing_opponent {
                            let opponent_conn = opponent.conn_id;
                            if let Some(joiner_view) = state.view_of(&conn) {
                                out.one(
                                    opponent_conn,
                                    ServerEvent::OpponentJoined {
                                        opponent: joiner_view,
                                        player_count: state.player_count(),
                                    },
                                );
                            }
                            if let Some(payload) = state.room_state_payload(&opponent_conn) {
                                out.one(
                                    opponent_conn,
                                    ServerEvent::RoomState(Box::new(RoomStateBody::Pvp(payload))),
                                );
                            }
                            let (player1, player2) = state.match_ready_views();
                            out.room(ServerEvent::MatchReady {
                                message: "Both players are in the arena! Press Ready to start."
                                    .to_string(),
                                player_count: state.player_count(),
                                player1,
                                player2,
                            });
                        }
                        true
                    }
                    None => false,
                }
            };

            if seated {
                self.registry().bind(conn, handle.key.clone());
                self.hub().join_group(&handle.key.group(), conn);
                self.flush(&handle.key, out);
                self.broadcast_pvp_status().await;
                tracing::info!(conn_id = %conn, room = %handle.key, "Player joined PVP room");
                return;
            }
        }

        self.send_one(
            &conn,
            ServerEvent::RoomFull {
                message: "No open PVP seat could be allocated".to_string(),
            },
        );
    }

    async fn pvp_room_of(&self, conn: &ConnId) -> Option<Arc<crate::registry::RoomHandle<PvpState>>> {
        let key = self.registry().locate(conn)?;
        if key.mode != GameMode::Pvp {
            return None;
        }
        self.registry().pvp_room(&key.room_id).await
    }

    pub(super) async fn handle_pvp_ready(self: &Arc<Self>, conn: ConnId) {
        let Some(handle) = self.pvp_room_of(&conn).await else {
            return;
        };
        let mut out = Outbox::new();
        {
            let mut state = handle.state.lock().await;
            state.ready(&conn, self.now(), &mut out);
        }
        self.flush(&handle.key, out);
    }

    pub(super) async fn handle_pvp_move(self: &Arc<Self>, conn: ConnId, x: f64, y: f64) {
        let Some(handle) = self.pvp_room_of(&conn).await else {
            return;
        };
        let corrected = {
            let mut state = handle.state.lock().await;
            state.move_player(&conn, x, y)
        };
        let Some((cx, cy)) = corrected else {
            return;
        };

        let mut out = Outbox::new();
        out.room_except(conn, ServerEvent::OpponentPosition { x: cx, y: cy });
        out.one(conn, ServerEvent::SelfPosition { x: cx, y: cy });
        self.flush(&handle.key, out);
    }

    pub(super) async fn handle_pvp_shoot(
        self: &Arc<Self>,
        conn: ConnId,
        bullet_x: Option<f64>,
        bullet_y: Option<f64>,
        dx: Option<f64>,
        dy: Option<f64>,
        character: Option<String>,
    ) {
        let Some(handle) = self.pvp_room_of(&conn).await else {
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
            ServerEvent::OpponentShot {
                bullet_x: bullet_x.unwrap_or(0.0),
                bullet_y: bullet_y.unwrap_or(0.0),
                dx: dx.unwrap_or(0.0),
                dy: dy.unwrap_or(0.0),
                character: HeroClass::normalize(character.as_deref()),
            },
        );
        self.flush(&handle.key, out);
    }

    pub(super) async fn handle_pvp_hit(self: &Arc<Self>, conn: ConnId) {
        let Some(handle) = self.pvp_room_of(&conn).await else {
            return;
        };
        let mut out = Outbox::new();
        {
            let mut state = handle.state.lock().await;
            state.hit_opponent(&conn, self.now(), &mut out);
        }
        self.flush(&handle.key, out);
    }

    pub(super) async fn handle_pvp_stats(
        self: &Arc<Self>,
        conn: ConnId,
        bullets: Option<i64>,
        lives: Option<i64>,
    ) {
        let Some(handle) = self.pvp_room_of(&conn).await else {
            return;
        };
        let updated = {
            let mut state = handle.state.lock().await;
            state.update_stats(&conn, bullets, lives)
        };
        let Some((bullets, lives)) = updated else {
            return;
        };

        let mut out = Outbox::new();
        out.room_except(conn, ServerEvent::OpponentStats { bullets, lives });
        self.flush(&handle.key, out);
    }

    pub(super) async fn handle_pvp_status_request(self: &Arc<Self>, conn: ConnId) {
        if let Some(handle) = self.pvp_room_of(&conn).await {
            let state = handle.state.lock().await;
            self.send_one(
                &conn,
                ServerEvent::RoomStatus {
                    room_id: handle.key.room_id.clone(),
                    player_count: state.player_count(),
                    battle_active: state.battle_active(),
                },
            );
        }
        let payload = self.pvp_status_payload(true).await;
        self.send_one(&conn, ServerEvent::PvpStatus(payload));
    }

    pub(super) async fn handle_pvp_viewer(self: &Arc<Self>, conn: ConnId, joining: bool) {
        let lobby = RoomKey::lobby_group(GameMode::Pvp);
        if joining {
            self.pvp_viewers.insert(conn, ());
            self.hub().join_group(&lobby, conn);
        } else {
            self.pvp_viewers.remove(&conn);
            self.hub().leave_group(&lobby, &conn);
        }
        let payload = self.pvp_status_payload(true).await;
        self.send_one(&conn, ServerEvent::PvpStatus(payload));
    }

    async fn pvp_status_payload(&self, with_viewers: bool) -> PvpStatusPayload {
        let occupancy = self.registry().pvp_occupancy().await;
        PvpStatusPayload {
            total_players: occupancy.total_players,
            active_rooms: occupancy.active_rooms,
            open_slots: occupancy.open_slots,
            viewer_count: with_viewers.then(|| self.pvp_viewers.len()),
        }
    }

    /// Push fresh aggregate status to mode-selection viewers.
    pub(super) async fn broadcast_pvp_status(self: &Arc<Self>) {
        let payload = self.pvp_status_payload(true).await;
        let lobby = RoomKey::lobby_group(GameMode::Pvp);
        self.hub()
            .broadcast(&lobby, Arc::new(ServerEvent::PvpStatus(payload)));
    }
}
