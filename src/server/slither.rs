//! Slither inbound handlers.

use std::sync::Arc;

use super::GameServer;
use crate::identity::IdentityInfo;
use crate::protocol::validation::profile_name;
use crate::protocol::{ConnId, GameMode, JoinProfile, RoomStateBody, ServerEvent};
use crate::rooms::slither::SlitherState;
use crate::rooms::Outbox;
use crate::scheduler::spawn_room_ticker;

impl GameServer {
    pub(super) async fn handle_slither_join(
        self: &Arc<Self>,
        conn: ConnId,
        ident: &IdentityInfo,
        profile: &JoinProfile,
    ) {
        if !self.check_join_rate(&conn).await {
            return;
        }
        if let Some(key) = self.registry().locate(&conn) {
            if key.mode != GameMode::Slither {
                self.leave_current_room(conn, "switched").await;
            }
        }

        let tuning = self.config().game.slither.clone();
        let now = self.now();
        let party_id = profile
            .party_id
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(str::to_string);

        let handle = match self.registry().locate(&conn) {
            Some(key) if key.mode == GameMode::Slither => {
                match self.registry().slither_room(&key.room_id).await {
                    Some(handle) => handle,
                    None => return,
                }
            }
            _ => {
                let (handle, _created) = self
                    .registry()
                    .slither_room_for_join(party_id.as_deref(), tuning.capacity, |key| {
                        SlitherState::new(key, tuning.clone())
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

        let mut out = Outbox::new();
        {
            let mut state = handle.state.lock().await;
            let role = state.join(conn, ident.user_id, name, party_id, now);
            out.one(
                conn,
                ServerEvent::RoomState(Box::new(RoomStateBody::Slither(
                    state.room_state_payload(conn, role, now),
                ))),
            );
            out.one(conn, ServerEvent::ArenaState(Box::new(state.snapshot(now))));
        }

        self.registry().bind(conn, handle.key.clone());
        self.hub().join_group(&handle.key.group(), conn);
        spawn_room_ticker(
            Arc::clone(self),
            Arc::clone(&handle),
            self.config().game.slither.tick_hz,
        );
        self.flush(&handle.key, out);
        tracing::info!(conn_id = %conn, room = %handle.key, "Player joined slither arena");
    }

    async fn slither_room_of(
        &self,
        conn: &ConnId,
    ) -> Option<Arc<crate::registry::RoomHandle<SlitherState>>> {
        let key = self.registry().locate(conn)?;
        if key.mode != GameMode::Slither {
            return None;
        }
        self.registry().slither_room(&key.room_id).await
    }

    pub(super) async fn handle_slither_input(
        self: &Arc<Self>,
        conn: ConnId,
        dir_x: f64,
        dir_y: f64,
        boost: bool,
    ) {
        let Some(handle) = self.slither_room_of(&conn).await else {
            return;
        };
        let mut state = handle.state.lock().await;
        state.update_input(&conn, dir_x, dir_y, boost);
    }

    pub(super) async fn handle_slither_play_again(self: &Arc<Self>, conn: ConnId) {
        let Some(handle) = self.slither_room_of(&conn).await else {
            return;
        };
        let mut state = handle.state.lock().await;
        state.play_again(&conn, self.now());
    }
}
