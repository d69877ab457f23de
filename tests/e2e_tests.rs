//! End-to-end test over a real WebSocket: boot the gateway, connect a
//! client, join a room and observe the acknowledgement frames.


use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message as TungsteniteMessage};

use test_helpers::create_test_server;
use zonefall_server::protocol::{ClientEvent, JoinProfile, ServerEvent};
use zonefall_server::websocket;

#[tokio::test(flavor = "multi_thread")]
async fn websocket_join_round_trip() {
    let test_result = tokio::time::timeout(
        tokio::time::Duration::from_secs(30),
        websocket_join_round_trip_impl(),
    )
    .await;

    assert!(test_result.is_ok(), "test timed out after 30 seconds");
}

async fn websocket_join_round_trip_impl() {
    let (server, _stats) = create_test_server();

    let addr: SocketAddr = "127.0.0.1:0".parse().expect("parse bind address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local address");

    let app = websocket::create_router().with_state(Arc::clone(&server));
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app.into_make_service()).await {
            tracing::error!("Test server failed: {e}");
        }
    });

    // Connect with identity parameters in the handshake.
    let url = format!("ws://{addr}/ws?name=Tester&user_id=42");
    let (ws_stream, _) = tokio::time::timeout(
        tokio::time::Duration::from_secs(10),
        connect_async(&url),
    )
    .await
    .expect("connection attempt timed out")
    .expect("websocket connect");
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let join = ClientEvent::KozJoinRoom {
        profile: JoinProfile {
            name: Some("Tester".to_string()),
            hero: Some("wizard".to_string()),
            ..Default::default()
        },
    };
    let frame = serde_json::to_string(&join).expect("serialize join");
    ws_sender
        .send(TungsteniteMessage::Text(frame.into()))
        .await
        .expect("send join frame");

    // The join acknowledgement arrives among the initial burst of state
    // frames; scan until we see it.
    let mut saw_room_state = false;
    let mut saw_snapshot = false;
    for _ in 0..20 {
        let frame = tokio::time::timeout(
            tokio::time::Duration::from_secs(5),
            ws_receiver.next(),
        )
        .await
        .expect("timed out waiting for a frame")
        .expect("connection closed early")
        .expect("websocket frame error");

        if let TungsteniteMessage::Text(text) = frame {
            let event: ServerEvent = serde_json::from_str(&text).expect("parse server event");
            match event {
                ServerEvent::RoomState(_) => saw_room_state = true,
                ServerEvent::Snapshot(_) => saw_snapshot = true,
                _ => {}
            }
        }
        if saw_room_state && saw_snapshot {
            break;
        }
    }
    assert!(saw_room_state, "expected a room_state acknowledgement");
    assert!(saw_snapshot, "expected an initial snapshot");

    // Ping round-trips through the dispatch table.
    let ping = serde_json::to_string(&ClientEvent::Ping).expect("serialize ping");
    ws_sender
        .send(TungsteniteMessage::Text(ping.into()))
        .await
        .expect("send ping");
    let mut saw_pong = false;
    for _ in 0..20 {
        let frame = tokio::time::timeout(
            tokio::time::Duration::from_secs(5),
            ws_receiver.next(),
        )
        .await
        .expect("timed out waiting for pong")
        .expect("connection closed early")
        .expect("websocket frame error");
        if let TungsteniteMessage::Text(text) = frame {
            if let Ok(ServerEvent::Pong) = serde_json::from_str::<ServerEvent>(&text) {
                saw_pong = true;
                break;
            }
        }
    }
    assert!(saw_pong, "expected a pong response");
}
