//! King-of-the-Zone inbound handlers.

use std::sync::Arc;

use super::GameServer;
use crate::identity::IdentityInfo;
use crate::protocol::validation::{profile_name, sanitize_avatar};
use crate::protocol::{
    ConnId, GameMode, HeroClass, InputAxes, JoinProfile, RoomStateBody, ServerEvent, WeaponKind,
};
use crate::rooms::koz::KozState;
use crate::rooms::Outbox;
use crate::scheduler::spawn_room_ticker;

impl GameServer {
    pub(super) async fn handle_koz_join(
        self: &Arc<Self>,
        conn: ConnId,
        ident: &IdentityInfo,
        profile: &JoinProfile,
    ) {
        if !self.check_join_rate(&conn).await {
            return;
        }

        // A rejoin refreshes the profile in place; a seat in another mode
        // is vacated first.
        if let Some(key) = self.registry().locate(&conn) {
            if key.mode != GameMode::Koz {
                self.leave_current_room(conn, "switched").await;
            }
        }

        let cfg = self.config().game.clone();
        let now = self.now();
        let existing = self.registry().locate(&conn).and_then(|key| {
            (key.mode == GameMode::Koz).then_some(key)
        });

        let handle = match existing {
            Some(key) => match self.registry().koz_room(&key.room_id).await {
                Some(handle) => handle,
                None => return,
            },
            None => {
                let (handle, _created) = self
                    .registry()
                    .koz_room_for_join(cfg.koz.max_active_players, |key| {
                        KozState::new(
                            key,
                            cfg.koz.clone(),
                            cfg.weapons.clone(),
                            cfg.powerups.clone(),
                            now,
                        )
                    })
                    .await;
                handle
            }
        };

        let name = if profile.raw_name().is_some() {
            profile_name(profile)
        } else {
            ident.display_name.clone()
        };
        let avatar = profile
            .avatar
            .as_deref()
            .map(|a| sanitize_avatar(Some(a)))
            .unwrap_or_else(|| ident.avatar.clone());
        let hero = HeroClass::normalize(profile.hero.as_deref());
        let weapon = WeaponKind::normalize(hero, profile.weapon_type.as_deref());

        let mut out = Outbox::new();
        {
            let mut state = handle.state.lock().await;
            let role = state.join(conn, ident.user_id, name, avatar, hero, weapon, now, &mut out);
            out.one(
                conn,
                ServerEvent::RoomState(Box::new(RoomStateBody::Koz(
                    state.room_state_payload(conn, role, now),
                ))),
            );
            out.room(ServerEvent::LobbyState(Box::new(state.lobby_payload(now))));
            out.room(ServerEvent::MatchState(Box::new(
                state.match_state_payload(now),
            )));
            out.one(conn, ServerEvent::Snapshot(Box::new(state.snapshot(now))));
        }

        self.registry().bind(conn, handle.key.clone());
        self.hub().join_group(&handle.key.group(), conn);
        spawn_room_ticker(
            Arc::clone(self),
            Arc::clone(&handle),
            self.config().game.koz.tick_hz,
        );
        self.flush(&handle.key, out);
        tracing::info!(conn_id = %conn, room = %handle.key, "Player joined KOZ room");
    }

    async fn koz_room_of(&self, conn: &ConnId) -> Option<Arc<crate::registry::RoomHandle<KozState>>> {
        let key = self.registry().locate(conn)?;
        if key.mode != GameMode::Koz {
            return None;
        }
        self.registry().koz_room(&key.room_id).await
    }

    pub(super) async fn handle_koz_input(self: &Arc<Self>, conn: ConnId, axes: InputAxes) {
        let Some(handle) = self.koz_room_of(&conn).await else {
            return;
        };
        let mut state = handle.state.lock().await;
        state.update_input(&conn, axes);
    }

    pub(super) async fn handle_koz_shoot(self: &Arc<Self>, conn: ConnId, aim_x: f64, aim_y: f64) {
        let Some(handle) = self.koz_room_of(&conn).await else {
            return;
        };
        let mut out = Outbox::new();
        {
            let mut state = handle.state.lock().await;
            match state.handle_shoot(&conn, aim_x, aim_y, self.now()) {
                Ok(spawned) => {
                    out.room(ServerEvent::ProjectileSpawned {
                        owner: conn,
                        projectiles: spawned.iter().map(|p| p.view()).collect(),
                    });
                }
                Err(reason) => {
                    out.one(conn, ServerEvent::ShotRejected { reason });
                }
            }
        }
        self.flush(&handle.key, out);
    }

    pub(super) async fn handle_koz_play_again(self: &Arc<Self>, conn: ConnId) {
        let Some(handle) = self.koz_room_of(&conn).await else {
            return;
        };
        let now = self.now();
        let mut out = Outbox::new();
        {
            let mut state = handle.state.lock().await;
            state.promote_if_possible(&conn);
            out.room(ServerEvent::LobbyState(Box::new(state.lobby_payload(now))));
            out.room(ServerEvent::MatchState(Box::new(
                state.match_state_payload(now),
            )));
        }
        self.flush(&handle.key, out);
    }

    pub(super) async fn handle_koz_request_state(self: &Arc<Self>, conn: ConnId) {
        let Some(handle) = self.koz_room_of(&conn).await else {
            return;
        };
        let now = self.now();
        let mut state = handle.state.lock().await;
        let lobby = state.lobby_payload(now);
        let match_state = state.match_state_payload(now);
        let snapshot = state.snapshot(now);
        drop(state);

        self.send_one(&conn, ServerEvent::LobbyState(Box::new(lobby)));
        self.send_one(&conn, ServerEvent::MatchState(Box::new(match_state)));
        self.send_one(&conn, ServerEvent::Snapshot(Box::new(snapshot)));
    }
}
