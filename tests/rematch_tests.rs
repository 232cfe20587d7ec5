#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Rematch handshake tests: offers, answers, drop-outs and the armed
//! redirects that walk the player off the results screen.

mod common;

use std::time::Duration;

use common::{
    absorb, both_returned_to_lobby_json, connect, forced_return_to_lobby_json, player,
    player_disconnected_json, player_left_json, rematch_accepted_json, rematch_declined_json,
    rematch_requested_json, returned_to_lobby_json, settle, wait_connected, ServerHandle,
};
use sketch_duel_client::rematch::{
    DECLINED_LOBBY_DELAY, DECLINE_HOME_DELAY, OPPONENT_GONE_HOME_DELAY,
};
use sketch_duel_client::{
    Connection, NavTarget, RematchNegotiator, RematchState, RematchUpdate, RoomCode,
    SketchDuelError,
};

async fn negotiator_rig() -> (RematchNegotiator, Connection, ServerHandle) {
    let (conn, server) = connect();
    let negotiator = RematchNegotiator::new(conn.clone(), RoomCode::new("XK42"));
    wait_connected(&conn).await;
    (negotiator, conn, server)
}

fn solo_roster_json() -> String {
    player_disconnected_json("XK42", vec![player("p1", "Alice", None)])
}

// ════════════════════════════════════════════════════════════════════
// Offers and answers
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn offering_and_acceptance_commit_the_handshake() {
    let (mut negotiator, _conn, server) = negotiator_rig().await;

    negotiator.request().unwrap();
    assert_eq!(negotiator.state(), RematchState::RequestedBySelf);
    settle().await;
    assert_eq!(server.sent_payloads("request_rematch")[0]["room_code"], "XK42");

    server.push(rematch_accepted_json());
    assert_eq!(negotiator.next().await, Some(RematchUpdate::Accepted));
    assert_eq!(negotiator.state(), RematchState::Accepted);
}

#[tokio::test]
async fn an_open_offer_blocks_a_second_one() {
    let (mut negotiator, _conn, server) = negotiator_rig().await;

    negotiator.request().unwrap();
    assert!(matches!(
        negotiator.request(),
        Err(SketchDuelError::UnexpectedPhase)
    ));

    // A crossing offer from the opponent is absorbed, not layered on.
    server.push(rematch_requested_json());
    absorb(negotiator.next()).await;
    assert_eq!(negotiator.state(), RematchState::RequestedBySelf);
}

#[tokio::test]
async fn an_opponent_offer_can_be_accepted() {
    let (mut negotiator, _conn, server) = negotiator_rig().await;

    // Nothing to accept yet.
    assert!(matches!(
        negotiator.accept(),
        Err(SketchDuelError::UnexpectedPhase)
    ));

    server.push(rematch_requested_json());
    assert_eq!(negotiator.next().await, Some(RematchUpdate::OfferReceived));
    assert_eq!(negotiator.state(), RematchState::RequestedByOpponent);

    negotiator.accept().unwrap();
    assert_eq!(negotiator.state(), RematchState::Accepted);
    settle().await;
    assert_eq!(server.sent_payloads("accept_rematch")[0]["room_code"], "XK42");
}

// ════════════════════════════════════════════════════════════════════
// Redirects
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn declining_arms_a_short_home_redirect() {
    let (mut negotiator, _conn, server) = negotiator_rig().await;

    server.push(rematch_requested_json());
    assert_eq!(negotiator.next().await, Some(RematchUpdate::OfferReceived));

    negotiator.decline().unwrap();
    assert_eq!(negotiator.state(), RematchState::Declined);
    assert_eq!(negotiator.pending_redirect(), Some(NavTarget::Home));

    let armed_at = tokio::time::Instant::now();
    let Some(RematchUpdate::RedirectDue { target }) = negotiator.next().await else {
        panic!("expected the redirect to fire");
    };
    assert_eq!(target, NavTarget::Home);
    let waited = armed_at.elapsed();
    assert!(waited >= DECLINE_HOME_DELAY);
    assert!(waited <= DECLINE_HOME_DELAY + Duration::from_millis(50));
    assert!(negotiator.pending_redirect().is_none());

    settle().await;
    assert_eq!(server.sent_payloads("decline_rematch")[0]["room_code"], "XK42");
}

#[tokio::test(start_paused = true)]
async fn a_declined_offer_returns_us_to_the_lobby() {
    let (mut negotiator, _conn, server) = negotiator_rig().await;

    negotiator.request().unwrap();
    server.push(rematch_declined_json());
    assert_eq!(negotiator.next().await, Some(RematchUpdate::OfferDeclined));
    assert_eq!(negotiator.state(), RematchState::Declined);
    assert_eq!(negotiator.pending_redirect(), Some(NavTarget::Lobby));

    let armed_at = tokio::time::Instant::now();
    let Some(RematchUpdate::RedirectDue { target }) = negotiator.next().await else {
        panic!("expected the redirect to fire");
    };
    assert_eq!(target, NavTarget::Lobby);
    let waited = armed_at.elapsed();
    assert!(waited >= DECLINED_LOBBY_DELAY);
    assert!(waited <= DECLINED_LOBBY_DELAY + Duration::from_millis(50));
}

// ════════════════════════════════════════════════════════════════════
// Drop-outs
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn losing_the_opponent_mid_offer_counts_as_a_decline() {
    let (mut negotiator, _conn, server) = negotiator_rig().await;

    negotiator.request().unwrap();
    server.push(solo_roster_json());
    assert_eq!(negotiator.next().await, Some(RematchUpdate::OpponentGone));
    assert_eq!(negotiator.state(), RematchState::Declined);
    assert!(!negotiator.opponent_connected());
    assert_eq!(negotiator.pending_redirect(), Some(NavTarget::Home));

    let armed_at = tokio::time::Instant::now();
    let Some(RematchUpdate::RedirectDue { target }) = negotiator.next().await else {
        panic!("expected the redirect to fire");
    };
    assert_eq!(target, NavTarget::Home);
    let waited = armed_at.elapsed();
    assert!(waited >= OPPONENT_GONE_HOME_DELAY);
    assert!(waited <= OPPONENT_GONE_HOME_DELAY + Duration::from_millis(50));

    assert!(matches!(
        negotiator.request(),
        Err(SketchDuelError::UnexpectedPhase)
    ));
}

#[tokio::test]
async fn losing_the_opponent_while_idle_only_disables_the_offer() {
    let (mut negotiator, _conn, server) = negotiator_rig().await;

    server.push(player_left_json("XK42", vec![player("p1", "Alice", None)]));
    assert_eq!(negotiator.next().await, Some(RematchUpdate::OpponentGone));
    assert_eq!(negotiator.state(), RematchState::Idle);
    assert!(!negotiator.can_request());
    assert!(negotiator.pending_redirect().is_none());

    assert!(matches!(
        negotiator.request(),
        Err(SketchDuelError::OpponentUnavailable)
    ));
}

// ════════════════════════════════════════════════════════════════════
// Lobby returns and settled handshakes
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn a_lobby_return_cancels_the_armed_redirect() {
    let (mut negotiator, _conn, server) = negotiator_rig().await;

    server.push(rematch_requested_json());
    assert_eq!(negotiator.next().await, Some(RematchUpdate::OfferReceived));
    negotiator.decline().unwrap();
    assert!(negotiator.pending_redirect().is_some());

    // The server's own navigation beats the local redirect.
    server.push(both_returned_to_lobby_json());
    assert_eq!(
        negotiator.next().await,
        Some(RematchUpdate::BothReturnedToLobby)
    );
    assert_eq!(negotiator.state(), RematchState::Idle);
    assert!(negotiator.pending_redirect().is_none());
    assert!(negotiator.can_request());

    server.push(forced_return_to_lobby_json());
    assert_eq!(
        negotiator.next().await,
        Some(RematchUpdate::ForcedReturnToLobby)
    );
    server.push(returned_to_lobby_json());
    assert_eq!(negotiator.next().await, Some(RematchUpdate::ReturnedToLobby));

    // The cancelled redirect never fires, even past its deadline.
    absorb(negotiator.next()).await;
}

#[tokio::test]
async fn settled_handshakes_absorb_late_answers() {
    let (mut negotiator, _conn, server) = negotiator_rig().await;

    negotiator.request().unwrap();
    server.push(rematch_accepted_json());
    assert_eq!(negotiator.next().await, Some(RematchUpdate::Accepted));

    // A decline after the acceptance is stale.
    server.push(rematch_declined_json());
    absorb(negotiator.next()).await;
    assert_eq!(negotiator.state(), RematchState::Accepted);

    // A drop-out after settlement disables the seat without a redirect.
    server.push(solo_roster_json());
    absorb(negotiator.next()).await;
    assert!(!negotiator.opponent_connected());
    assert!(negotiator.pending_redirect().is_none());

    // Reset clears the slate for the fresh match.
    negotiator.reset();
    assert_eq!(negotiator.state(), RematchState::Idle);
    assert!(negotiator.can_request());
}
