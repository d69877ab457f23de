//! PVP pairing and battle lifecycle through the full dispatch path.


use test_helpers::{connect, create_test_server, events_of};
use zonefall_server::protocol::{ClientEvent, RoomStateBody, ServerEvent};

fn join_event() -> ClientEvent {
    ClientEvent::PvpJoinRoom {
        room_id: None,
        username: None,
        character: None,
        bullets: None,
        lives: None,
    }
}

#[tokio::test]
async fn pairing_flows_through_one_room() {
    let (server, _stats) = create_test_server();
    let mut alice = connect(&server, "alice");
    let mut bob = connect(&server, "bob");

    // First joiner opens a room and seats as player 1.
    alice.send(&server, join_event()).await;
    let events = alice.drain();
    let room_states = events_of(&events, "room_state");
    assert_eq!(room_states.len(), 1);
    let room_id = match &room_states[0] {
        ServerEvent::RoomState(body) => match body.as_ref() {
            RoomStateBody::Pvp(payload) => {
                assert_eq!(payload.player_number, 1);
                assert!(payload.opponent.is_none());
                payload.room_id.clone()
            }
            other => panic!("wrong room_state shape: {other:?}"),
        },
        _ => unreachable!(),
    };

    // Second joiner lands in the same room as player 2; the first player
    // is notified.
    bob.send(&server, join_event()).await;
    let events = bob.drain();
    match &events_of(&events, "room_state")[0] {
        ServerEvent::RoomState(body) => match body.as_ref() {
            RoomStateBody::Pvp(payload) => {
                assert_eq!(payload.room_id, room_id);
                assert_eq!(payload.player_number, 2);
                assert_eq!(payload.opponent.as_ref().unwrap().username, "alice");
            }
            other => panic!("wrong room_state shape: {other:?}"),
        },
        _ => unreachable!(),
    }

    let alice_events = alice.drain();
    let joined = events_of(&alice_events, "opponent_joined");
    assert_eq!(joined.len(), 1);
    if let ServerEvent::OpponentJoined { opponent, .. } = &joined[0] {
        assert_eq!(opponent.username, "bob");
    }
    assert_eq!(events_of(&alice_events, "match_ready").len(), 1);
}

#[tokio::test]
async fn battle_start_fires_exactly_once() {
    let (server, _stats) = create_test_server();
    let mut alice = connect(&server, "alice");
    let mut bob = connect(&server, "bob");
    alice.send(&server, join_event()).await;
    bob.send(&server, join_event()).await;
    alice.drain();
    bob.drain();

    alice.send(&server, ClientEvent::PvpReady).await;
    assert!(events_of(&alice.drain(), "battle_start").is_empty());

    bob.send(&server, ClientEvent::PvpReady).await;
    assert_eq!(events_of(&alice.drain(), "battle_start").len(), 1);
    assert_eq!(events_of(&bob.drain(), "battle_start").len(), 1);

    // A duplicate ready does not re-announce.
    alice.send(&server, ClientEvent::PvpReady).await;
    assert!(events_of(&alice.drain(), "battle_start").is_empty());
}

#[tokio::test]
async fn knockout_records_a_single_summary() {
    let (server, stats) = create_test_server();
    let mut alice = connect(&server, "alice");
    let mut bob = connect(&server, "bob");
    alice.send(&server, join_event()).await;
    bob.send(&server, join_event()).await;
    alice.send(&server, ClientEvent::PvpReady).await;
    bob.send(&server, ClientEvent::PvpReady).await;
    alice.drain();
    bob.drain();

    // Five hits exhaust the default five lives.
    for _ in 0..5 {
        alice
            .send(&server, ClientEvent::PvpHitOpponent { damage: None })
            .await;
    }

    let bob_events = bob.drain();
    assert_eq!(events_of(&bob_events, "player_died").len(), 1);
    assert_eq!(events_of(&bob_events, "match_end").len(), 1);

    let summaries = stats.recorded();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].reason, "knockout");
    assert_eq!(summaries[0].players.len(), 2);
}

#[tokio::test]
async fn moves_separate_and_echo_authoritative_positions() {
    let (server, _stats) = create_test_server();
    let mut alice = connect(&server, "alice");
    let mut bob = connect(&server, "bob");
    alice.send(&server, join_event()).await;
    bob.send(&server, join_event()).await;
    alice.drain();
    bob.drain();

    alice
        .send(&server, ClientEvent::PvpPlayerMove { x: 400.0, y: 300.0 })
        .await;
    bob.send(&server, ClientEvent::PvpPlayerMove { x: 400.0, y: 300.0 })
        .await;

    let alice_self = events_of(&alice.drain(), "self_position");
    let bob_self = events_of(&bob.drain(), "self_position");
    assert_eq!(alice_self.len(), 1);
    assert_eq!(bob_self.len(), 1);

    let (ax, ay) = match &alice_self[0] {
        ServerEvent::SelfPosition { x, y } => (*x, *y),
        _ => unreachable!(),
    };
    let (bx, by) = match &bob_self[0] {
        ServerEvent::SelfPosition { x, y } => (*x, *y),
        _ => unreachable!(),
    };
    let dist = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt();
    assert!(dist >= 56.0 - 1e-6, "pair not separated: {dist}");
}

#[tokio::test]
async fn leave_notifies_opponent_and_is_idempotent() {
    let (server, _stats) = create_test_server();
    let mut alice = connect(&server, "alice");
    let mut bob = connect(&server, "bob");
    alice.send(&server, join_event()).await;
    bob.send(&server, join_event()).await;
    alice.drain();
    bob.drain();

    alice.send(&server, ClientEvent::PvpLeaveRoom).await;
    let bob_events = bob.drain();
    assert_eq!(events_of(&bob_events, "opponent_left").len(), 1);

    // Second leave is a no-op.
    alice.send(&server, ClientEvent::PvpLeaveRoom).await;
    assert!(events_of(&bob.drain(), "opponent_left").is_empty());
}

#[tokio::test]
async fn status_reports_open_slots() {
    let (server, _stats) = create_test_server();
    let mut alice = connect(&server, "alice");
    alice.send(&server, join_event()).await;
    alice.drain();

    alice.send(&server, ClientEvent::PvpGetStatus).await;
    let events = alice.drain();
    let statuses = events_of(&events, "pvp_status");
    assert_eq!(statuses.len(), 1);
    if let ServerEvent::PvpStatus(payload) = &statuses[0] {
        assert_eq!(payload.total_players, 1);
        assert_eq!(payload.active_rooms, 1);
        assert_eq!(payload.open_slots, 1);
    }
    assert_eq!(events_of(&events, "room_status").len(), 1);
}
