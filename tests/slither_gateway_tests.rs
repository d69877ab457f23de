//! Slither gateway behavior through the full dispatch path.


use test_helpers::{connect, create_test_server, events_of};
use zonefall_server::protocol::{ClientEvent, JoinProfile, RoomStateBody, ServerEvent};

fn join_event(name: &str, party: Option<&str>) -> ClientEvent {
    ClientEvent::SlitherJoinRoom {
        profile: JoinProfile {
            name: Some(name.to_string()),
            party_id: party.map(str::to_string),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn join_acknowledges_with_room_state_and_arena_snapshot() {
    let (server, _stats) = create_test_server();
    let mut client = connect(&server, "snake");
    client.send(&server, join_event("snake", None)).await;

    let events = client.drain();
    let room_states = events_of(&events, "room_state");
    assert_eq!(room_states.len(), 1);
    match &room_states[0] {
        ServerEvent::RoomState(body) => match body.as_ref() {
            RoomStateBody::Slither(payload) => {
                assert_eq!(payload.tick_rate, 25);
                assert!(!payload.color.is_empty());
                assert_eq!(payload.bounds.width, 4800.0);
            }
            other => panic!("wrong room_state shape: {other:?}"),
        },
        _ => unreachable!(),
    }

    let snapshots = events_of(&events, "arena_state");
    assert!(!snapshots.is_empty());
    if let ServerEvent::ArenaState(snap) = &snapshots[0] {
        assert!(snap.orbs.len() >= 320, "orb floor seeded");
        assert_eq!(snap.players.len(), 1);
    }
}

#[tokio::test]
async fn party_members_land_in_the_same_arena() {
    let (server, _stats) = create_test_server();
    let mut alice = connect(&server, "alice");
    let mut bob = connect(&server, "bob");
    alice.send(&server, join_event("alice", Some("crew"))).await;
    bob.send(&server, join_event("bob", Some("crew"))).await;

    let room_of = |events: &[ServerEvent]| -> String {
        match &events_of(events, "room_state")[0] {
            ServerEvent::RoomState(body) => match body.as_ref() {
                RoomStateBody::Slither(payload) => payload.room_id.clone(),
                other => panic!("wrong room_state shape: {other:?}"),
            },
            _ => unreachable!(),
        }
    };
    let alice_room = room_of(&alice.drain());
    let bob_room = room_of(&bob.drain());
    assert_eq!(alice_room, bob_room);
}

#[tokio::test]
async fn input_without_membership_is_ignored() {
    let (server, _stats) = create_test_server();
    let mut stranger = connect(&server, "stranger");
    stranger
        .send(
            &server,
            ClientEvent::SlitherInput {
                dir_x: 1.0,
                dir_y: 0.0,
                boost: true,
            },
        )
        .await;
    assert!(stranger.drain().is_empty());
}

#[tokio::test]
async fn leave_is_announced_and_idempotent() {
    let (server, _stats) = create_test_server();
    let mut alice = connect(&server, "alice");
    let mut bob = connect(&server, "bob");
    alice.send(&server, join_event("alice", None)).await;
    bob.send(&server, join_event("bob", None)).await;
    alice.drain();
    bob.drain();

    alice.send(&server, ClientEvent::SlitherLeaveRoom).await;
    let bob_events = bob.drain();
    assert_eq!(events_of(&bob_events, "player_left").len(), 1);

    alice.send(&server, ClientEvent::SlitherLeaveRoom).await;
    assert!(events_of(&bob.drain(), "player_left").is_empty());
}
