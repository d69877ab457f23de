//! HTTP routes exposed by the socket gateway.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use super::connection::handle_socket;
use crate::server::GameServer;

/// Build the gateway router: the WebSocket endpoint plus a liveness probe.
pub fn create_router() -> Router<Arc<GameServer>> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(health_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(server): State<Arc<GameServer>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, server, params))
}

async fn health_handler() -> &'static str {
    "ok"
}
