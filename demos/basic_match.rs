//! # Basic Match Example
//!
//! Demonstrates a complete sketch-duel session lifecycle:
//!
//! 1. Connect to a game server via WebSocket
//! 2. Create a room (or join one with `SKETCH_DUEL_ROOM=CODE`)
//! 3. Start the match once both players are seated and ready
//! 4. Play the rounds: acknowledge each prompt, feed recognizer output,
//!    watch both scoreboards move
//! 5. Report the verdict and shut down gracefully
//!
//! There is no canvas here, so a stand-in recognizer "solves" each
//! sketch a few seconds into the round by reporting the round word at
//! high confidence. Wire a real recognizer in by feeding its
//! predictions through [`MatchController::handle_predictions`] instead.
//!
//! ## Running
//!
//! ```sh
//! # Start a sketch-duel server on localhost:3000, then:
//! cargo run --example basic_match
//!
//! # Second player, joining the room the first one printed:
//! SKETCH_DUEL_NAME=Bob SKETCH_DUEL_ROOM=XK42 cargo run --example basic_match
//!
//! # Override the server URL:
//! SKETCH_DUEL_URL=ws://my-server:3000/ws cargo run --example basic_match
//! ```

use std::time::Duration;

use sketch_duel_client::{
    Connection, ConnectionConfig, GameRules, MatchController, MatchUpdate, PlayerIdentity,
    Prediction, RoomCode, RoomSession, RoomUpdate, WsConnector,
};
use tokio::time::Instant;

/// Default server URL when `SKETCH_DUEL_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:3000/ws";

/// How long the stand-in recognizer "draws" before it solves the word.
const DRAW_TIME: Duration = Duration::from_secs(4);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("SKETCH_DUEL_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let name = std::env::var("SKETCH_DUEL_NAME").unwrap_or_else(|_| "RustPlayer".to_string());
    let room_to_join = std::env::var("SKETCH_DUEL_ROOM").ok();
    tracing::info!("Connecting to {url} as {name}");

    // ── Connect ─────────────────────────────────────────────────────
    // The supervisor task dials, keeps the link alive and redials on
    // loss. Commands fail with `NotConnected` until the link is up.
    let conn = Connection::start(WsConnector::new(&url), ConnectionConfig::new());
    while !conn.is_connected() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // ── Lobby ───────────────────────────────────────────────────────
    let identity = PlayerIdentity::new();
    let mut session = RoomSession::new(conn.clone(), identity.clone());

    match &room_to_join {
        Some(code) => {
            session.join_room(&name, code)?;
            tracing::info!("Joining room {}", RoomCode::new(code));
        }
        None => {
            session.create_room(&name)?;
            tracing::info!("Creating a room");
        }
    }

    let room_code = loop {
        tokio::select! {
            update = session.next() => {
                let Some(update) = update else {
                    tracing::info!("Session ended, exiting");
                    return Ok(());
                };
                match update {
                    RoomUpdate::Created { code } => {
                        tracing::info!("Room {code} created — share this code with your opponent");
                    }
                    RoomUpdate::Joined { room } => {
                        tracing::info!("Joined room {} ({} seated)", room.code, room.players.len());
                    }
                    RoomUpdate::RosterUpdated { room } => {
                        tracing::info!("Roster: {} player(s), status {:?}", room.players.len(), room.status);
                    }
                    RoomUpdate::BothPlayersReady { .. } => {
                        tracing::info!("Both players ready");
                        // The creator fires the start; the server
                        // re-validates and broadcasts `game_started`.
                        if session.is_creator() {
                            session.start_game()?;
                            tracing::info!("Starting the match");
                        }
                    }
                    RoomUpdate::OpponentDisconnected { .. } => {
                        tracing::warn!("Opponent disconnected, waiting for them to return");
                    }
                    RoomUpdate::OpponentLeft { .. } => {
                        tracing::warn!("Opponent left the room");
                    }
                    RoomUpdate::CreatorChanged { creator } => {
                        tracing::info!("Creator seat moved to {creator}");
                    }
                    RoomUpdate::GameStarted => {
                        tracing::info!("Match starting!");
                        match session.room().map(|r| r.code.clone()) {
                            Some(code) => break code,
                            None => return Err("game started outside a room".into()),
                        }
                    }
                    RoomUpdate::GameAbandoned { message } | RoomUpdate::ReturnToEntry { message } => {
                        tracing::error!("Room gone: {message}");
                        conn.shutdown().await;
                        return Ok(());
                    }
                    RoomUpdate::ServerError { message } => {
                        tracing::error!("Server error: {message}");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                conn.shutdown().await;
                return Ok(());
            }
        }
    };

    // ── Match ───────────────────────────────────────────────────────
    // The controller takes the match event slots over from the lobby.
    let mut controller =
        MatchController::new(conn.clone(), identity, room_code, GameRules::new());
    controller.begin()?;

    // Armed while the stand-in recognizer is "drawing".
    let mut recognize_at: Option<Instant> = None;
    let mut current_word: Option<String> = None;

    loop {
        tokio::select! {
            update = controller.next() => {
                let Some(update) = update else {
                    tracing::info!("Match stream ended, exiting");
                    break;
                };
                match update {
                    MatchUpdate::RoundStarted { round, total_rounds, word } => {
                        tracing::info!("Round {round}/{total_rounds}: draw \"{word}\"");
                        controller.acknowledge_prompt()?;
                        current_word = Some(word);
                        recognize_at = Some(Instant::now() + DRAW_TIME);
                    }
                    MatchUpdate::RoundTimedOut { outcome } => {
                        tracing::warn!("Round {} timed out — no points", outcome.round);
                        recognize_at = None;
                        current_word = None;
                    }
                    MatchUpdate::ProgressChanged { side, progress } => {
                        tracing::info!(
                            "Scoreboard [{side:?}]: {} — round {}, {} pts",
                            progress.name, progress.round, progress.score
                        );
                    }
                    MatchUpdate::WaitingForOpponent { remaining } => {
                        tracing::info!("Done! Opponent has {remaining:?} left");
                    }
                    MatchUpdate::MatchComplete { verdict } => {
                        match verdict {
                            Some(v) => tracing::info!("Match over: {v:?}"),
                            None => tracing::info!("Match over"),
                        }
                        if let (Some(me), Some(them)) =
                            (controller.progress().own(), controller.progress().opponent())
                        {
                            tracing::info!("Final: {} {} — {} {}", me.name, me.score, them.score, them.name);
                        }
                        break;
                    }
                    MatchUpdate::IdentityUnresolved { reason } => {
                        tracing::warn!("Scoreboard not resolved yet: {reason}");
                    }
                }
            }

            // The stand-in recognizer finishes its "drawing".
            () = sleep_until_maybe(recognize_at), if recognize_at.is_some() => {
                recognize_at = None;
                if let Some(word) = current_word.take() {
                    let prediction = Prediction { label: word, confidence: 0.9 };
                    if let Some(outcome) = controller.handle_predictions(&[prediction]) {
                        tracing::info!(
                            "Recognized in {:.1}s — {} pts",
                            outcome.elapsed.as_secs_f64(),
                            outcome.score
                        );
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    conn.shutdown().await;
    tracing::info!("Client shut down. Goodbye!");
    Ok(())
}

async fn sleep_until_maybe(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
