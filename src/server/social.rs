//! Chat, lobby membership and presence handlers shared by every mode.

use std::sync::Arc;

use super::GameServer;
use crate::chat::{ChatRouter, LobbyMember};
use crate::identity::IdentityInfo;
use crate::protocol::validation::profile_name;
use crate::protocol::{ConnId, GameMode, HeroClass, JoinProfile, ServerEvent};
use crate::rooms::RoomKey;

impl GameServer {
    pub(super) async fn handle_lobby_join(
        self: &Arc<Self>,
        conn: ConnId,
        ident: &IdentityInfo,
        mode: GameMode,
        profile: &JoinProfile,
    ) {
        let username = if profile.raw_name().is_some() {
            profile_name(profile)
        } else {
            ident.display_name.clone()
        };
        let member = LobbyMember {
            conn,
            username: username.clone(),
            character: HeroClass::normalize(profile.hero.as_deref()),
        };
        self.chat.join_lobby(mode, member).await;
        let lobby = RoomKey::lobby_group(mode);
        self.hub().join_group(&lobby, conn);

        let members = self.chat.lobby_members(mode).await;
        let count = members.len();

        self.send_one(
            &conn,
            ServerEvent::LobbyMembers {
                members: members.clone(),
            },
        );
        self.send_one(&conn, ServerEvent::LobbyPlayerCount { player_count: count });

        self.hub().broadcast_except(
            &lobby,
            &conn,
            Arc::new(ServerEvent::LobbyMembers { members }),
        );
        self.hub().broadcast_except(
            &lobby,
            &conn,
            Arc::new(ServerEvent::LobbyPlayerCount { player_count: count }),
        );
        self.hub().broadcast_except(
            &lobby,
            &conn,
            Arc::new(ServerEvent::ChatMessage(ChatRouter::system_message(
                format!("{username} joined the lobby"),
            ))),
        );
    }

    pub(super) async fn handle_lobby_leave(self: &Arc<Self>, conn: ConnId, mode: GameMode) {
        let Some(member) = self.chat.leave_lobby(mode, &conn).await else {
            return;
        };
        self.hub().leave_group(&RoomKey::lobby_group(mode), &conn);
        self.announce_lobby_departure(mode, &member).await;
    }

    /// Broadcast an updated roster and a system notice after a departure.
    pub(super) async fn announce_lobby_departure(
        self: &Arc<Self>,
        mode: GameMode,
        member: &LobbyMember,
    ) {
        self.hub().leave_group(&RoomKey::lobby_group(mode), &member.conn);
        let members = self.chat.lobby_members(mode).await;
        let count = members.len();
        let lobby = RoomKey::lobby_group(mode);

        self.hub()
            .broadcast(&lobby, Arc::new(ServerEvent::LobbyMembers { members }));
        self.hub().broadcast(
            &lobby,
            Arc::new(ServerEvent::LobbyPlayerCount { player_count: count }),
        );
        self.hub().broadcast(
            &lobby,
            Arc::new(ServerEvent::ChatMessage(ChatRouter::system_message(
                format!("{} left the lobby", member.username),
            ))),
        );
    }

    /// Route a chat message to the sender's current room, or their mode
    /// lobby when they are not in a room. Malformed or over-rate messages
    /// drop silently.
    pub(super) async fn handle_chat(
        self: &Arc<Self>,
        conn: ConnId,
        ident: &IdentityInfo,
        mode: GameMode,
        _room_hint: Option<String>,
        content: &str,
    ) {
        let in_room = self
            .registry()
            .locate(&conn)
            .filter(|key| key.mode == mode);
        let lobby_member = self.chat.lobby_member(mode, &conn).await;

        let (group, username, character) = match (&in_room, &lobby_member) {
            (Some(key), _) => (
                key.group(),
                ident.display_name.clone(),
                None,
            ),
            (None, Some(member)) => (
                RoomKey::lobby_group(mode),
                member.username.clone(),
                Some(member.character),
            ),
            (None, None) => return,
        };

        let Ok(payload) = self.chat.compose(&conn, &username, character, content).await else {
            return;
        };
        self.hub()
            .broadcast_except(&group, &conn, Arc::new(ServerEvent::ChatMessage(payload)));
    }

    /// Tab-visibility hints; broadcast only, no state change.
    pub(super) async fn handle_presence(
        self: &Arc<Self>,
        conn: ConnId,
        ident: &IdentityInfo,
        away: bool,
    ) {
        let Some(key) = self.registry().locate(&conn) else {
            return;
        };
        let event = if away {
            ServerEvent::PlayerAway {
                conn_id: conn,
                username: ident.display_name.clone(),
            }
        } else {
            ServerEvent::PlayerReturned {
                conn_id: conn,
                username: ident.display_name.clone(),
            }
        };
        self.hub()
            .broadcast_except(&key.group(), &conn, Arc::new(event));
    }
}
