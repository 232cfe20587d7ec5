#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Room lifecycle tests: entry, lobby and the start gate.
//!
//! Each test drives the session the way a UI would: issue a command,
//! feed the server's answer through the [`ServerHandle`], await the
//! surfaced update. One push in flight at a time keeps the observed
//! order deterministic.

mod common;

use common::{
    absorb, alice_and_bob, both_players_ready_json, connect, error_json, game_started_json,
    player, player_disconnected_json, player_left_json, room_created_json, room_data_json,
    room_data_json_with, room_joined_json, settle, wait_connected, ServerHandle,
};
use sketch_duel_client::{
    Connection, EventKind, PlayerIdentity, RoomCode, RoomSession, RoomStatus, RoomUpdate,
    SketchDuelError,
};

fn fresh_session() -> (RoomSession, PlayerIdentity, Connection, ServerHandle) {
    let (conn, server) = connect();
    let identity = PlayerIdentity::new();
    let session = RoomSession::new(conn.clone(), identity.clone());
    (session, identity, conn, server)
}

/// Create a room as Alice and bring the lobby to a known state: both
/// seats taken, Alice holding the creator seat.
async fn alice_in_lobby(
    status: Option<RoomStatus>,
) -> (RoomSession, PlayerIdentity, Connection, ServerHandle) {
    let (mut session, identity, conn, server) = fresh_session();
    wait_connected(&conn).await;
    session.create_room("Alice").unwrap();
    server.push(room_created_json("XK42"));
    assert!(matches!(
        session.next().await,
        Some(RoomUpdate::Created { .. })
    ));
    server.push(room_data_json_with(
        "XK42",
        alice_and_bob(),
        Some("Alice"),
        status,
    ));
    assert!(matches!(
        session.next().await,
        Some(RoomUpdate::RosterUpdated { .. })
    ));
    (session, identity, conn, server)
}

// ════════════════════════════════════════════════════════════════════
// Room entry
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn create_room_pins_the_name_and_fetches_the_roster() {
    let (mut session, identity, conn, server) = fresh_session();
    wait_connected(&conn).await;

    session.create_room("  Alice  ").unwrap();
    server.push(room_created_json("XK42"));

    let update = session.next().await;
    assert_eq!(
        update,
        Some(RoomUpdate::Created {
            code: RoomCode::new("XK42")
        })
    );
    assert_eq!(identity.current().as_deref(), Some("Alice"));
    assert_eq!(session.room().unwrap().code.as_str(), "XK42");

    settle().await;
    assert_eq!(server.sent_events(), ["create_room", "get_room_data"]);
}

#[tokio::test]
async fn join_room_normalizes_the_code_and_surfaces_the_roster() {
    let (mut session, identity, conn, server) = fresh_session();
    wait_connected(&conn).await;

    session.join_room("Bob", "  xk42 ").unwrap();
    server.push(room_joined_json("XK42", alice_and_bob()));

    let Some(RoomUpdate::Joined { room }) = session.next().await else {
        panic!("expected the join ack to surface");
    };
    assert_eq!(room.code.as_str(), "XK42");
    assert_eq!(room.players.len(), 2);
    assert_eq!(room.status, RoomStatus::Ready);
    assert_eq!(identity.current().as_deref(), Some("Bob"));

    settle().await;
    assert_eq!(server.sent_payloads("join_room")[0]["room_code"], "XK42");
}

#[tokio::test]
async fn blank_inputs_fail_before_touching_the_wire() {
    let (mut session, _identity, conn, server) = fresh_session();
    wait_connected(&conn).await;

    assert!(matches!(
        session.create_room("   "),
        Err(SketchDuelError::EmptyPlayerName)
    ));
    assert!(matches!(
        session.join_room("Bob", "   "),
        Err(SketchDuelError::EmptyRoomCode)
    ));
    assert!(matches!(
        session.join_room("  ", "AB12"),
        Err(SketchDuelError::EmptyPlayerName)
    ));

    settle().await;
    assert!(server.sent_raw().is_empty());
}

#[tokio::test]
async fn stale_roster_pushes_before_entry_are_absorbed() {
    let (mut session, _identity, conn, server) = fresh_session();
    wait_connected(&conn).await;

    server.push(room_data_json("XK42", alice_and_bob()));
    absorb(session.next()).await;
    assert!(session.room().is_none());

    // The loop is still alive for the real entry.
    session.create_room("Alice").unwrap();
    server.push(room_created_json("XK42"));
    assert!(matches!(
        session.next().await,
        Some(RoomUpdate::Created { .. })
    ));
}

// ════════════════════════════════════════════════════════════════════
// Start gate
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn start_game_requires_a_room_first() {
    let (session, _identity, _conn, _server) = fresh_session();
    assert!(matches!(
        session.start_game(),
        Err(SketchDuelError::NotInRoom)
    ));
}

#[tokio::test]
async fn start_game_requires_the_creator_seat() {
    let (mut session, _identity, conn, server) = fresh_session();
    wait_connected(&conn).await;

    session.join_room("Bob", "XK42").unwrap();
    server.push(room_joined_json("XK42", alice_and_bob()));
    assert!(matches!(
        session.next().await,
        Some(RoomUpdate::Joined { .. })
    ));
    server.push(room_data_json_with(
        "XK42",
        alice_and_bob(),
        Some("Alice"),
        None,
    ));
    assert!(matches!(
        session.next().await,
        Some(RoomUpdate::RosterUpdated { .. })
    ));

    assert!(!session.is_creator());
    assert!(matches!(
        session.start_game(),
        Err(SketchDuelError::NotCreator)
    ));
}

#[tokio::test]
async fn start_game_requires_a_full_roster() {
    let (mut session, _identity, conn, server) = fresh_session();
    wait_connected(&conn).await;

    session.create_room("Alice").unwrap();
    server.push(room_created_json("XK42"));
    assert!(matches!(
        session.next().await,
        Some(RoomUpdate::Created { .. })
    ));
    server.push(room_data_json_with(
        "XK42",
        vec![player("p1", "Alice", Some(true))],
        Some("Alice"),
        None,
    ));
    assert!(matches!(
        session.next().await,
        Some(RoomUpdate::RosterUpdated { .. })
    ));

    assert!(matches!(
        session.start_game(),
        Err(SketchDuelError::NotEnoughPlayers)
    ));
}

#[tokio::test]
async fn start_game_rejects_a_room_already_playing() {
    let (session, _identity, _conn, _server) = alice_in_lobby(Some(RoomStatus::InProgress)).await;
    assert!(matches!(
        session.start_game(),
        Err(SketchDuelError::UnexpectedPhase)
    ));
}

#[tokio::test]
async fn start_game_emits_once_every_gate_passes() {
    let (session, _identity, _conn, server) = alice_in_lobby(None).await;

    assert!(session.is_creator());
    assert_eq!(session.room().unwrap().status, RoomStatus::Ready);
    session.start_game().unwrap();

    settle().await;
    assert!(server.sent_events().contains(&"start_game".to_string()));
}

// ════════════════════════════════════════════════════════════════════
// Lobby pushes
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn both_players_ready_forces_the_ready_status() {
    let (mut session, _identity, conn, server) = fresh_session();
    wait_connected(&conn).await;

    session.create_room("Alice").unwrap();
    server.push(room_created_json("XK42"));
    assert!(matches!(
        session.next().await,
        Some(RoomUpdate::Created { .. })
    ));

    // Ready flags missing from the push; the event itself is the word.
    let flagless = vec![player("p1", "Alice", None), player("p2", "Bob", None)];
    server.push(both_players_ready_json("XK42", flagless));

    let Some(RoomUpdate::BothPlayersReady { room }) = session.next().await else {
        panic!("expected the ready push to surface");
    };
    assert_eq!(room.status, RoomStatus::Ready);
    assert_eq!(session.room().unwrap().status, RoomStatus::Ready);
}

#[tokio::test]
async fn opponent_departures_carry_the_shrunk_roster() {
    let (mut session, _identity, _conn, server) = alice_in_lobby(None).await;

    let solo = vec![player("p1", "Alice", Some(true))];
    server.push(player_disconnected_json("XK42", solo.clone()));
    let Some(RoomUpdate::OpponentDisconnected { room }) = session.next().await else {
        panic!("expected the disconnect to surface");
    };
    assert_eq!(room.players.len(), 1);

    server.push(player_left_json("XK42", solo));
    let Some(RoomUpdate::OpponentLeft { room }) = session.next().await else {
        panic!("expected the leave to surface");
    };
    assert_eq!(room.players.len(), 1);
    assert_eq!(room.players[0].name, "Alice");
}

#[tokio::test]
async fn game_started_flips_the_room_in_progress() {
    let (mut session, _identity, _conn, server) = alice_in_lobby(None).await;

    server.push(game_started_json());
    assert_eq!(session.next().await, Some(RoomUpdate::GameStarted));
    assert_eq!(session.room().unwrap().status, RoomStatus::InProgress);
}

// ════════════════════════════════════════════════════════════════════
// Errors and teardown
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn a_room_gone_error_returns_to_entry_and_keeps_the_name() {
    let (mut session, identity, _conn, server) = alice_in_lobby(None).await;

    server.push(error_json("Room not found"));
    let Some(RoomUpdate::ReturnToEntry { message }) = session.next().await else {
        panic!("expected the room-gone error to surface");
    };
    assert_eq!(message, "Room not found");
    assert!(session.room().is_none());
    // The name survives for the next entry attempt.
    assert_eq!(identity.current().as_deref(), Some("Alice"));
}

#[tokio::test]
async fn other_server_errors_keep_the_room() {
    let (mut session, _identity, _conn, server) = alice_in_lobby(None).await;

    server.push(error_json("Name already taken"));
    let Some(RoomUpdate::ServerError { message }) = session.next().await else {
        panic!("expected the error to surface");
    };
    assert_eq!(message, "Name already taken");
    assert!(session.room().is_some());
}

#[tokio::test]
async fn leave_room_clears_everything_and_notifies_the_server() {
    let (mut session, identity, conn, server) = alice_in_lobby(None).await;

    session.leave_room();
    assert!(session.room().is_none());
    assert!(identity.current().is_none());

    settle().await;
    assert!(server.sent_events().contains(&"leave_room".to_string()));

    conn.shutdown().await;
    assert!(server.link_closed());
}

#[tokio::test]
async fn garbage_on_the_wire_does_not_stall_the_session() {
    let (mut session, _identity, conn, server) = fresh_session();
    wait_connected(&conn).await;

    session.create_room("Alice").unwrap();
    server.push("{ not json");
    server.push(room_created_json("XK42"));

    assert!(matches!(
        session.next().await,
        Some(RoomUpdate::Created { .. })
    ));
}

#[tokio::test]
async fn resubscribing_takes_the_event_slot_back() {
    let (mut session, _identity, conn, server) = fresh_session();
    wait_connected(&conn).await;

    // Another screen takes the slot, then the lobby comes back.
    let _stolen = conn.subscribe(EventKind::RoomCreated);
    session.resubscribe();

    session.create_room("Alice").unwrap();
    server.push(room_created_json("XK42"));
    assert!(matches!(
        session.next().await,
        Some(RoomUpdate::Created { .. })
    ));
}
