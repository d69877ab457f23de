//! Chat and lobby routing.
//!
//! Two logical channels exist per mode: the pre-match lobby and the
//! in-match room. Every message is length-capped and rate-limited, routed
//! only to the sender's current channel, and never echoed back to the
//! sender (clients render locally on submission). System notices are
//! synthesized here and are never accepted from clients.

use std::collections::BTreeMap;

use tokio::sync::Mutex;

use crate::config::ChatLimitsConfig;
use crate::protocol::validation::sanitize_chat_content;
use crate::protocol::{ChatMessagePayload, ConnId, GameMode, HeroClass, LobbyMemberView};
use crate::rate_limit::{ActionRateLimiter, WindowConfig};

/// A connection attached to a mode's pre-match lobby.
#[derive(Debug, Clone)]
pub struct LobbyMember {
    pub conn: ConnId,
    pub username: String,
    pub character: HeroClass,
}

/// Why a chat message was not routed. Both cases drop silently on the
/// wire; the sender sees no error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatDrop {
    Empty,
    RateLimited,
}

/// Lobby membership plus chat admission control for all modes.
pub struct ChatRouter {
    limits: ChatLimitsConfig,
    limiter: ActionRateLimiter,
    lobbies: Mutex<BTreeMap<GameMode, BTreeMap<ConnId, LobbyMember>>>,
}

impl ChatRouter {
    #[must_use]
    pub fn new(limits: ChatLimitsConfig) -> Self {
        let limiter = ActionRateLimiter::new(WindowConfig {
            max_actions: limits.max_messages,
            window: std::time::Duration::from_secs(limits.window_secs),
        });
        Self {
            limits,
            limiter,
            lobbies: Mutex::new(BTreeMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Lobby membership
    // ------------------------------------------------------------------

    pub async fn join_lobby(&self, mode: GameMode, member: LobbyMember) {
        let mut lobbies = self.lobbies.lock().await;
        lobbies.entry(mode).or_default().insert(member.conn, member);
    }

    pub async fn leave_lobby(&self, mode: GameMode, conn: &ConnId) -> Option<LobbyMember> {
        let mut lobbies = self.lobbies.lock().await;
        let lobby = lobbies.get_mut(&mode)?;
        let removed = lobby.remove(conn);
        if lobby.is_empty() {
            lobbies.remove(&mode);
        }
        removed
    }

    /// Remove a disconnected member from every lobby; returns the modes
    /// the connection was attached to.
    pub async fn leave_all_lobbies(&self, conn: &ConnId) -> Vec<(GameMode, LobbyMember)> {
        let mut lobbies = self.lobbies.lock().await;
        let mut removed = Vec::new();
        lobbies.retain(|mode, lobby| {
            if let Some(member) = lobby.remove(conn) {
                removed.push((*mode, member));
            }
            !lobby.is_empty()
        });
        removed
    }

    pub async fn lobby_members(&self, mode: GameMode) -> Vec<LobbyMemberView> {
        let lobbies = self.lobbies.lock().await;
        lobbies
            .get(&mode)
            .map(|lobby| {
                lobby
                    .values()
                    .map(|m| LobbyMemberView {
                        conn_id: m.conn,
                        username: m.username.clone(),
                        character: m.character,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn lobby_count(&self, mode: GameMode) -> usize {
        let lobbies = self.lobbies.lock().await;
        lobbies.get(&mode).map_or(0, BTreeMap::len)
    }

    pub async fn lobby_member(&self, mode: GameMode, conn: &ConnId) -> Option<LobbyMember> {
        let lobbies = self.lobbies.lock().await;
        lobbies.get(&mode).and_then(|lobby| lobby.get(conn)).cloned()
    }

    /// Forget a sender's rate-limit window on disconnect.
    pub async fn forget(&self, conn: &ConnId) {
        self.limiter.forget(conn).await;
    }

    // ------------------------------------------------------------------
    // Message admission
    // ------------------------------------------------------------------

    /// Sanitize and admit one user message. The caller routes the returned
    /// payload to the sender's channel, excluding the sender.
    pub async fn compose(
        &self,
        conn: &ConnId,
        username: &str,
        character: Option<HeroClass>,
        content: &str,
    ) -> Result<ChatMessagePayload, ChatDrop> {
        let Some(content) = sanitize_chat_content(content, self.limits.max_length) else {
            return Err(ChatDrop::Empty);
        };
        if self.limiter.check(conn).await.is_err() {
            tracing::debug!(conn_id = %conn, "Chat message dropped by rate limit");
            return Err(ChatDrop::RateLimited);
        }

        Ok(ChatMessagePayload {
            conn_id: Some(*conn),
            username: username.to_string(),
            character,
            content,
            system: false,
            timestamp: chrono::Utc::now(),
        })
    }

    /// Synthesize a system notice (join/leave announcements).
    #[must_use]
    pub fn system_message(content: impl Into<String>) -> ChatMessagePayload {
        ChatMessagePayload {
            conn_id: None,
            username: "System".to_string(),
            character: None,
            content: content.into(),
            system: true,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> ChatRouter {
        ChatRouter::new(ChatLimitsConfig {
            window_secs: 10,
            max_messages: 2,
            max_length: 20,
        })
    }

    fn member(name: &str) -> LobbyMember {
        LobbyMember {
            conn: ConnId::new_v4(),
            username: name.to_string(),
            character: HeroClass::Knight,
        }
    }

    #[tokio::test]
    async fn lobby_membership_round_trip() {
        let router = router();
        let m = member("a");
        let conn = m.conn;
        router.join_lobby(GameMode::Boss, m).await;
        assert_eq!(router.lobby_count(GameMode::Boss).await, 1);
        assert_eq!(router.lobby_members(GameMode::Boss).await.len(), 1);
        assert!(router.leave_lobby(GameMode::Boss, &conn).await.is_some());
        assert_eq!(router.lobby_count(GameMode::Boss).await, 0);
        assert!(router.leave_lobby(GameMode::Boss, &conn).await.is_none());
    }

    #[tokio::test]
    async fn empty_content_is_dropped_silently() {
        let router = router();
        let conn = ConnId::new_v4();
        let result = router.compose(&conn, "a", None, "   ").await;
        assert_eq!(result.unwrap_err(), ChatDrop::Empty);
    }

    #[tokio::test]
    async fn content_is_length_capped() {
        let router = router();
        let conn = ConnId::new_v4();
        let msg = router
            .compose(&conn, "a", None, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
            .await
            .unwrap();
        assert_eq!(msg.content.len(), 20);
        assert!(!msg.system);
        assert_eq!(msg.conn_id, Some(conn));
    }

    #[tokio::test]
    async fn send_rate_is_limited_per_sender() {
        let router = router();
        let conn = ConnId::new_v4();
        assert!(router.compose(&conn, "a", None, "one").await.is_ok());
        assert!(router.compose(&conn, "a", None, "two").await.is_ok());
        assert_eq!(
            router.compose(&conn, "a", None, "three").await.unwrap_err(),
            ChatDrop::RateLimited
        );
        // Another sender is unaffected.
        let other = ConnId::new_v4();
        assert!(router.compose(&other, "b", None, "hello").await.is_ok());
    }

    #[tokio::test]
    async fn disconnect_cleans_all_lobbies() {
        let router = router();
        let m = member("a");
        let conn = m.conn;
        router.join_lobby(GameMode::Boss, m.clone()).await;
        router.join_lobby(GameMode::Pvp, m).await;
        let removed = router.leave_all_lobbies(&conn).await;
        assert_eq!(removed.len(), 2);
        assert_eq!(router.lobby_count(GameMode::Boss).await, 0);
    }

    #[test]
    fn system_messages_are_marked() {
        let msg = ChatRouter::system_message("x joined");
        assert!(msg.system);
        assert_eq!(msg.conn_id, None);
    }
}
