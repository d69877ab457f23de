//! Connection hub: per-connection outbound queues and broadcast groups.
//!
//! Every connection registers an `mpsc` sender that its socket send task
//! drains. Rooms and lobbies are broadcast groups keyed by
//! `"<mode>:<room_id>"` / `"<mode>:lobby"`. Sends use `try_send` so a slow
//! subscriber drops frames instead of blocking a tick; a configurable streak
//! of consecutive drops disconnects the subscriber.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::protocol::{ConnId, ServerEvent};

struct ClientLink {
    sender: mpsc::Sender<Arc<ServerEvent>>,
    failure_streak: u32,
}

/// Registry of live connections and their broadcast groups.
pub struct ConnectionHub {
    clients: DashMap<ConnId, ClientLink>,
    groups: DashMap<String, HashSet<ConnId>>,
    max_failure_streak: u32,
}

impl ConnectionHub {
    #[must_use]
    pub fn new(max_failure_streak: u32) -> Self {
        Self {
            clients: DashMap::new(),
            groups: DashMap::new(),
            max_failure_streak: max_failure_streak.max(1),
        }
    }

    /// Attach a connection's outbound queue.
    pub fn register(&self, conn: ConnId, sender: mpsc::Sender<Arc<ServerEvent>>) {
        self.clients.insert(
            conn,
            ClientLink {
                sender,
                failure_streak: 0,
            },
        );
    }

    /// Detach a connection and remove it from every group.
    pub fn unregister(&self, conn: &ConnId) {
        self.clients.remove(conn);
        self.groups.retain(|_, members| {
            members.remove(conn);
            !members.is_empty()
        });
    }

    #[must_use]
    pub fn is_connected(&self, conn: &ConnId) -> bool {
        self.clients.contains_key(conn)
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    pub fn join_group(&self, group: &str, conn: ConnId) {
        self.groups.entry(group.to_string()).or_default().insert(conn);
    }

    pub fn leave_group(&self, group: &str, conn: &ConnId) {
        if let Some(mut members) = self.groups.get_mut(group) {
            members.remove(conn);
        }
        self.groups.remove_if(group, |_, members| members.is_empty());
    }

    #[must_use]
    pub fn group_members(&self, group: &str) -> Vec<ConnId> {
        self.groups
            .get(group)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn group_len(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, |members| members.len())
    }

    /// Queue one frame for one connection. Dropped frames count toward the
    /// failure streak; exceeding it evicts the subscriber.
    pub fn send_to(&self, conn: &ConnId, event: Arc<ServerEvent>) {
        let mut evict = false;
        if let Some(mut link) = self.clients.get_mut(conn) {
            match link.sender.try_send(event) {
                Ok(()) => link.failure_streak = 0,
                Err(err) => {
                    link.failure_streak += 1;
                    tracing::warn!(
                        conn_id = %conn,
                        streak = link.failure_streak,
                        error = %err,
                        "Dropped outbound frame for slow subscriber"
                    );
                    evict = link.failure_streak >= self.max_failure_streak;
                }
            }
        }

        if evict {
            tracing::warn!(conn_id = %conn, "Evicting subscriber after repeated send failures");
            self.unregister(conn);
        }
    }

    /// Queue one frame for every member of a group.
    pub fn broadcast(&self, group: &str, event: Arc<ServerEvent>) {
        for conn in self.group_members(group) {
            self.send_to(&conn, Arc::clone(&event));
        }
    }

    /// Queue one frame for every member of a group except `skip` (the
    /// sender-suppression rule: the origin client renders locally).
    pub fn broadcast_except(&self, group: &str, skip: &ConnId, event: Arc<ServerEvent>) {
        for conn in self.group_members(group) {
            if conn != *skip {
                self.send_to(&conn, Arc::clone(&event));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub_with_client(capacity: usize) -> (ConnectionHub, ConnId, mpsc::Receiver<Arc<ServerEvent>>)
    {
        let hub = ConnectionHub::new(3);
        let conn = ConnId::new_v4();
        let (tx, rx) = mpsc::channel(capacity);
        hub.register(conn, tx);
        (hub, conn, rx)
    }

    #[tokio::test]
    async fn broadcast_reaches_group_members_only() {
        let hub = ConnectionHub::new(3);
        let (a, b, c) = (ConnId::new_v4(), ConnId::new_v4(), ConnId::new_v4());
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let (tx_c, mut rx_c) = mpsc::channel(8);
        hub.register(a, tx_a);
        hub.register(b, tx_b);
        hub.register(c, tx_c);
        hub.join_group("koz:1", a);
        hub.join_group("koz:1", b);

        hub.broadcast("koz:1", Arc::new(ServerEvent::Pong));
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_except_suppresses_sender() {
        let hub = ConnectionHub::new(3);
        let (a, b) = (ConnId::new_v4(), ConnId::new_v4());
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        hub.register(a, tx_a);
        hub.register(b, tx_b);
        hub.join_group("pvp:1", a);
        hub.join_group("pvp:1", b);

        hub.broadcast_except("pvp:1", &a, Arc::new(ServerEvent::Pong));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn slow_subscriber_is_evicted_after_streak() {
        let (hub, conn, _rx) = hub_with_client(1);
        hub.join_group("boss:1", conn);

        // Queue capacity 1: first send fills it, the next three drop.
        for _ in 0..4 {
            hub.send_to(&conn, Arc::new(ServerEvent::Pong));
        }
        assert!(!hub.is_connected(&conn));
        assert_eq!(hub.group_len("boss:1"), 0);
    }

    #[tokio::test]
    async fn unregister_removes_group_membership() {
        let (hub, conn, _rx) = hub_with_client(8);
        hub.join_group("slither:1", conn);
        hub.unregister(&conn);
        assert_eq!(hub.group_len("slither:1"), 0);
        assert!(!hub.is_connected(&conn));
    }
}
