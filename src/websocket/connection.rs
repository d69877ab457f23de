//! Per-connection socket loops.
//!
//! Each accepted socket is split into a send task draining the outbound
//! queue and a receive task parsing inbound frames. Inbound traffic is
//! size-capped and rate-shaped; outbound frames are serialized once per
//! send. The disconnect reaper runs whenever either task ends.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::protocol::{ClientEvent, ConnId, ServerEvent};
use crate::server::GameServer;

/// Sliding one-second window shaping inbound event volume.
struct IngressShaper {
    window_start: Instant,
    count: u32,
    max_per_second: u32,
    dropped: u64,
}

impl IngressShaper {
    fn new(max_per_second: u32) -> Self {
        Self {
            window_start: Instant::now(),
            count: 0,
            max_per_second: max_per_second.max(1),
            dropped: 0,
        }
    }

    fn admit(&mut self) -> bool {
        if self.window_start.elapsed().as_secs_f64() >= 1.0 {
            self.window_start = Instant::now();
            self.count = 0;
        }
        if self.count < self.max_per_second {
            self.count += 1;
            true
        } else {
            self.dropped += 1;
            false
        }
    }
}

pub(super) async fn handle_socket(
    socket: WebSocket,
    server: Arc<GameServer>,
    params: HashMap<String, String>,
) {
    let (mut sender, mut receiver) = socket.split();
    let conn: ConnId = ConnId::new_v4();
    let identity = server.identity_resolver().resolve(&params).await;
    tracing::info!(
        conn_id = %conn,
        user_id = ?identity.user_id,
        display_name = %identity.display_name,
        "WebSocket connection established"
    );

    let queue_capacity = server.config().server.send_queue_capacity.max(1);
    let (tx, mut rx) = mpsc::channel::<Arc<ServerEvent>>(queue_capacity);
    server.register_client(conn, tx);

    // Outbound: drain the queue, serialize, and push frames.
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match serde_json::to_string(event.as_ref()) {
                Ok(json) => json,
                Err(err) => {
                    tracing::error!(conn_id = %conn, error = %err, "Failed to serialize outbound event");
                    continue;
                }
            };
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    // Inbound: parse, shape, dispatch.
    let server_recv = Arc::clone(&server);
    let identity_recv = identity.clone();
    let receive_task = tokio::spawn(async move {
        let max_size = server_recv.config().server.max_message_size;
        let mut shaper = IngressShaper::new(server_recv.config().server.max_events_per_second);

        while let Some(frame) = receiver.next().await {
            let message = match frame {
                Ok(message) => message,
                Err(err) => {
                    tracing::warn!(conn_id = %conn, error = %err, "WebSocket error");
                    break;
                }
            };

            match message {
                Message::Text(text) => {
                    if text.len() > max_size {
                        tracing::warn!(
                            conn_id = %conn,
                            size = text.len(),
                            max = max_size,
                            "Dropping oversized frame"
                        );
                        continue;
                    }
                    if !shaper.admit() {
                        if shaper.dropped == 1 || shaper.dropped % 100 == 0 {
                            tracing::warn!(
                                conn_id = %conn,
                                dropped = shaper.dropped,
                                "Inbound events exceed the per-second ceiling; dropping"
                            );
                        }
                        continue;
                    }

                    let event: ClientEvent = match serde_json::from_str(&text) {
                        Ok(event) => event,
                        Err(err) => {
                            // Unknown or malformed events are ignored, not fatal.
                            tracing::debug!(conn_id = %conn, error = %err, "Ignoring unparseable frame");
                            continue;
                        }
                    };
                    server_recv.handle_event(conn, &identity_recv, event).await;
                }
                Message::Close(_) => {
                    tracing::info!(conn_id = %conn, "WebSocket connection closed");
                    break;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // Transport keepalive handled by axum.
                }
                Message::Binary(_) => {
                    tracing::debug!(conn_id = %conn, "Ignoring binary frame on JSON protocol");
                }
            }
        }
    });

    // Whichever loop ends first tears the connection down.
    tokio::select! {
        _ = send_task => {}
        _ = receive_task => {}
    }

    server.disconnect(conn).await;
}
