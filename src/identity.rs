//! Identity resolution for incoming connections.
//!
//! The game core consumes a thin identity interface: given the query
//! parameters of the WebSocket handshake, produce a stable user id (or
//! none, for guests), a display name and an avatar reference. Persistence
//! of accounts lives outside this crate.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::protocol::validation::{sanitize_avatar, sanitize_name};
use crate::protocol::UserId;

/// Resolved identity attached to a connection for its lifetime.
#[derive(Debug, Clone)]
pub struct IdentityInfo {
    /// Stable user id, or `None` for guests.
    pub user_id: Option<UserId>,
    pub display_name: String,
    pub avatar: String,
}

impl IdentityInfo {
    #[must_use]
    pub fn guest(display_name: impl Into<String>) -> Self {
        Self {
            user_id: None,
            display_name: display_name.into(),
            avatar: String::new(),
        }
    }
}

/// Maps a socket handshake to an identity.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, params: &HashMap<String, String>) -> IdentityInfo;
}

/// Default resolver: trusts handshake parameters, treats everyone without a
/// parseable `user_id` as a guest. A deployment fronted by an auth gateway
/// substitutes its own resolver.
#[derive(Debug, Default)]
pub struct GuestIdentityResolver;

#[async_trait]
impl IdentityResolver for GuestIdentityResolver {
    async fn resolve(&self, params: &HashMap<String, String>) -> IdentityInfo {
        let user_id = params
            .get("user_id")
            .and_then(|raw| raw.parse::<UserId>().ok())
            .filter(|id| *id > 0);
        let display_name = sanitize_name(
            params
                .get("name")
                .or_else(|| params.get("username"))
                .map(String::as_str),
        );
        let avatar = sanitize_avatar(params.get("avatar").map(String::as_str));

        IdentityInfo {
            user_id,
            display_name,
            avatar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn resolves_registered_user() {
        let resolver = GuestIdentityResolver;
        let info = resolver
            .resolve(&params(&[("user_id", "42"), ("name", "Rook")]))
            .await;
        assert_eq!(info.user_id, Some(42));
        assert_eq!(info.display_name, "Rook");
    }

    #[tokio::test]
    async fn unparseable_user_id_is_guest() {
        let resolver = GuestIdentityResolver;
        let info = resolver
            .resolve(&params(&[("user_id", "abc"), ("username", "Pawn")]))
            .await;
        assert_eq!(info.user_id, None);
        assert_eq!(info.display_name, "Pawn");
    }

    #[tokio::test]
    async fn empty_handshake_is_anonymous_guest() {
        let resolver = GuestIdentityResolver;
        let info = resolver.resolve(&HashMap::new()).await;
        assert_eq!(info.user_id, None);
        assert_eq!(info.display_name, "Guest");
        assert!(info.avatar.is_empty());
    }
}
