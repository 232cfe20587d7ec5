#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests against literal JSON fixtures.
//!
//! The sketch-duel server speaks a plain `{"event", "data"}` envelope
//! with snake_case event names. These tests pin the exact shapes the
//! server produces and accepts, so protocol drift shows up here before
//! it shows up in a live session.

use serde_json::{json, Value};
use sketch_duel_client::protocol::{
    ClientMessage, EventKind, Player, RoomCode, RoomStatus, ServerMessage,
};

fn to_value(message: &ClientMessage) -> Value {
    serde_json::to_value(message).expect("client message serializes")
}

fn parse(raw: &str) -> ServerMessage {
    serde_json::from_str(raw).expect("server message parses")
}

// ════════════════════════════════════════════════════════════════════
// Outbound envelope
// ════════════════════════════════════════════════════════════════════

#[test]
fn create_room_envelope_matches_the_server_contract() {
    let value = to_value(&ClientMessage::CreateRoom {
        name: "Alice".into(),
    });
    assert_eq!(
        value,
        json!({"event": "create_room", "data": {"name": "Alice"}})
    );
}

#[test]
fn join_room_carries_name_and_code() {
    let value = to_value(&ClientMessage::JoinRoom {
        name: "Bob".into(),
        room_code: RoomCode::new("AB12"),
    });
    assert_eq!(
        value,
        json!({"event": "join_room", "data": {"name": "Bob", "room_code": "AB12"}})
    );
}

#[test]
fn room_codes_are_uppercased_before_they_reach_the_wire() {
    let value = to_value(&ClientMessage::GetRoomData {
        room_code: RoomCode::new("  ab12  "),
    });
    assert_eq!(value["data"]["room_code"], json!("AB12"));
}

#[test]
fn submit_score_is_a_plain_integer_payload() {
    let value = to_value(&ClientMessage::SubmitScore {
        room_code: RoomCode::new("AB12"),
        score: 76,
    });
    assert_eq!(
        value,
        json!({"event": "submit_score", "data": {"room_code": "AB12", "score": 76}})
    );
}

#[test]
fn every_rematch_reply_targets_the_room() {
    let code = || RoomCode::new("AB12");
    let replies = [
        (
            ClientMessage::RequestRematch { room_code: code() },
            "request_rematch",
        ),
        (
            ClientMessage::AcceptRematch { room_code: code() },
            "accept_rematch",
        ),
        (
            ClientMessage::DeclineRematch { room_code: code() },
            "decline_rematch",
        ),
    ];
    for (message, event) in replies {
        let value = to_value(&message);
        assert_eq!(value["event"], json!(event));
        assert_eq!(value["data"]["room_code"], json!("AB12"));
    }
}

// ════════════════════════════════════════════════════════════════════
// Inbound pushes
// ════════════════════════════════════════════════════════════════════

#[test]
fn room_created_parses_and_reports_its_kind() {
    let message = parse(r#"{"event":"room_created","data":{"room_code":"XK42"}}"#);
    assert_eq!(message.kind(), EventKind::RoomCreated);
    let ServerMessage::RoomCreated { room_code } = message else {
        panic!("expected room_created");
    };
    assert_eq!(room_code.as_str(), "XK42");
}

#[test]
fn roster_entries_use_camel_case_ready_flags() {
    let message = parse(
        r#"{"event":"room_joined","data":{"room_code":"XK42","players":[
            {"id":"p1","name":"Alice","isReady":true},
            {"id":"p2","name":"Bob"}
        ]}}"#,
    );
    let ServerMessage::RoomJoined(snapshot) = message else {
        panic!("expected room_joined");
    };
    assert_eq!(snapshot.players.len(), 2);
    assert_eq!(snapshot.players[0].is_ready, Some(true));
    assert_eq!(snapshot.players[1].is_ready, None);
}

#[test]
fn absent_ready_flag_is_omitted_on_the_wire() {
    let player = Player {
        id: "p1".into(),
        name: "Alice".into(),
        is_ready: None,
    };
    let value = serde_json::to_value(&player).expect("player serializes");
    assert_eq!(value, json!({"id": "p1", "name": "Alice"}));
}

#[test]
fn empty_snapshot_fields_all_default() {
    let message = parse(r#"{"event":"room_data","data":{}}"#);
    let ServerMessage::RoomData(snapshot) = message else {
        panic!("expected room_data");
    };
    assert_eq!(snapshot.room_code, None);
    assert!(snapshot.players.is_empty());
    assert_eq!(snapshot.creator, None);
    assert_eq!(snapshot.status, None);
}

#[test]
fn room_status_names_are_snake_case() {
    let message =
        parse(r#"{"event":"room_data","data":{"room_code":"XK42","status":"in_progress"}}"#);
    let ServerMessage::RoomData(snapshot) = message else {
        panic!("expected room_data");
    };
    assert_eq!(snapshot.status, Some(RoomStatus::InProgress));
}

#[test]
fn start_round_carries_word_and_number() {
    let message = parse(r#"{"event":"start_round","data":{"word":"cat","round":3}}"#);
    let ServerMessage::StartRound { word, round } = message else {
        panic!("expected start_round");
    };
    assert_eq!(word, "cat");
    assert_eq!(round, 3);
}

#[test]
fn player_progress_tolerates_a_missing_name() {
    let message = parse(
        r#"{"event":"player_progress","data":{
            "player_id":"p2","round":2,"total_rounds":5,"score":136
        }}"#,
    );
    let ServerMessage::PlayerProgress(update) = message else {
        panic!("expected player_progress");
    };
    assert_eq!(update.player_id, "p2");
    assert_eq!(update.player_name, None);
    assert_eq!(update.round, 2);
    assert_eq!(update.total_rounds, 5);
    assert_eq!(update.score, 136);
}

#[test]
fn game_over_is_a_map_keyed_by_player_id() {
    let message = parse(
        r#"{"event":"game_over","data":{"final_scores":{
            "p1":{"score":312},"p2":{"score":298}
        }}}"#,
    );
    let ServerMessage::GameOver { final_scores } = message else {
        panic!("expected game_over");
    };
    assert_eq!(final_scores["p1"].score, 312);
    assert_eq!(final_scores["p2"].score, 298);
}

#[test]
fn waiting_for_other_player_counts_seconds() {
    let message = parse(r#"{"event":"waiting_for_other_player","data":{"remaining_time":12}}"#);
    let ServerMessage::WaitingForOtherPlayer { remaining_time } = message else {
        panic!("expected waiting_for_other_player");
    };
    assert_eq!(remaining_time, 12);
}

// ════════════════════════════════════════════════════════════════════
// Payload-free pushes
// ════════════════════════════════════════════════════════════════════

#[test]
fn unit_events_parse_without_a_data_member() {
    let fixtures = [
        (r#"{"event":"game_started"}"#, EventKind::GameStarted),
        (r#"{"event":"rematch_requested"}"#, EventKind::RematchRequested),
        (r#"{"event":"rematch_accepted"}"#, EventKind::RematchAccepted),
        (r#"{"event":"rematch_declined"}"#, EventKind::RematchDeclined),
        (
            r#"{"event":"both_returned_to_lobby"}"#,
            EventKind::BothReturnedToLobby,
        ),
        (
            r#"{"event":"forced_return_to_lobby"}"#,
            EventKind::ForcedReturnToLobby,
        ),
        (r#"{"event":"returned_to_lobby"}"#, EventKind::ReturnedToLobby),
    ];
    for (raw, kind) in fixtures {
        assert_eq!(parse(raw).kind(), kind, "fixture: {raw}");
    }
}

#[test]
fn unit_events_serialize_without_a_data_member() {
    let value = serde_json::to_value(&ServerMessage::GameStarted).expect("serializes");
    assert_eq!(value, json!({"event": "game_started"}));
}

// ════════════════════════════════════════════════════════════════════
// Rejected input
// ════════════════════════════════════════════════════════════════════

#[test]
fn unknown_event_names_are_an_error_not_a_panic() {
    let result = serde_json::from_str::<ServerMessage>(r#"{"event":"mystery","data":{}}"#);
    assert!(result.is_err());
}

#[test]
fn an_envelope_without_an_event_tag_is_rejected() {
    let result = serde_json::from_str::<ServerMessage>(r#"{"data":{"room_code":"XK42"}}"#);
    assert!(result.is_err());
}
