#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for sketch-duel client integration tests.
//!
//! Provides a channel-fed [`MockTransport`] driven through a
//! [`ServerHandle`], plus helpers for building server push JSON. The
//! handle feeds one push at a time, so a test can interleave pushes
//! with controller polls and observe a deterministic event order.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use sketch_duel_client::protocol::{
    FinalScore, Player, PlayerId, ProgressUpdate, RoomCode, RoomSnapshot, RoomStatus,
    ServerMessage,
};
use sketch_duel_client::{Connection, ConnectionConfig, Connector, SketchDuelError, Transport};
use tokio::sync::mpsc;

type Incoming = Option<Result<String, SketchDuelError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// Transport whose incoming side is fed by the test through a
/// [`ServerHandle`]. Outgoing messages are recorded on the handle.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Incoming>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// The test's side of a [`MockTransport`]: push server messages in,
/// inspect what the client sent out.
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<Incoming>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> (Self, ServerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: rx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, ServerHandle { tx, sent, closed })
    }
}

impl ServerHandle {
    /// Deliver one raw frame to the client.
    pub fn push(&self, raw: impl Into<String>) {
        let _ = self.tx.send(Some(Ok(raw.into())));
    }

    /// Deliver a transport error, which drops the link.
    pub fn fail(&self, err: SketchDuelError) {
        let _ = self.tx.send(Some(Err(err)));
    }

    /// Close the link cleanly.
    pub fn close_link(&self) {
        let _ = self.tx.send(None);
    }

    /// Event names of every message the client has sent, in order.
    pub fn sent_events(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|raw| {
                let value: serde_json::Value = serde_json::from_str(raw).ok()?;
                Some(value.get("event")?.as_str()?.to_string())
            })
            .collect()
    }

    /// Raw copies of every message the client has sent.
    pub fn sent_raw(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// True once the client closed the link.
    pub fn link_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Parsed payloads of every sent message with the given event name.
    pub fn sent_payloads(&self, event: &str) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|raw| {
                let value: serde_json::Value = serde_json::from_str(raw).ok()?;
                if value.get("event")?.as_str()? == event {
                    Some(value.get("data").cloned().unwrap_or(serde_json::Value::Null))
                } else {
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), SketchDuelError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, SketchDuelError>> {
        match self.incoming.recv().await {
            Some(item) => item,
            // The handle dropped; hold the line open so the supervisor
            // stays in the pump until shutdown.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), SketchDuelError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Hands out prepared transports in order; dials hang once the supply
/// is exhausted, modelling an unreachable server.
pub struct MockConnector {
    transports: Vec<MockTransport>,
}

impl MockConnector {
    pub fn new(transports: Vec<MockTransport>) -> Self {
        let mut transports = transports;
        transports.reverse();
        Self { transports }
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&mut self) -> Result<MockTransport, SketchDuelError> {
        match self.transports.pop() {
            Some(transport) => Ok(transport),
            None => std::future::pending().await,
        }
    }
}

// ── Connection helpers ──────────────────────────────────────────────

/// Bring up a connection over a single fed transport.
pub fn connect() -> (Connection, ServerHandle) {
    let (transport, server) = MockTransport::new();
    let conn = Connection::start(MockConnector::new(vec![transport]), ConnectionConfig::new());
    (conn, server)
}

/// Block until the supervisor reports the link up.
pub async fn wait_connected(conn: &Connection) {
    for _ in 0..100 {
        if conn.is_connected() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("connection never became ready");
}

/// Let the supervisor drain its queues.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Poll a controller loop that should absorb the pending push without
/// surfacing an update. Panics if an update surfaces.
pub async fn absorb<F, T>(next: F)
where
    F: Future<Output = Option<T>>,
    T: std::fmt::Debug,
{
    if let Ok(update) = tokio::time::timeout(Duration::from_millis(50), next).await {
        panic!("expected the push to be absorbed, surfaced {update:?}");
    }
}

// ── Roster builders ─────────────────────────────────────────────────

pub fn player(id: &str, name: &str, ready: Option<bool>) -> Player {
    Player {
        id: id.into(),
        name: name.into(),
        is_ready: ready,
    }
}

/// Roster pair used by most flows: Alice on `p1`, Bob on `p2`.
pub fn alice_and_bob() -> Vec<Player> {
    vec![
        player("p1", "Alice", Some(true)),
        player("p2", "Bob", Some(true)),
    ]
}

fn snapshot(code: &str, players: Vec<Player>, status: Option<RoomStatus>) -> RoomSnapshot {
    RoomSnapshot {
        room_code: Some(RoomCode::new(code)),
        players,
        creator: None,
        status,
        current_player: None,
    }
}

// ── Server push JSON builders ───────────────────────────────────────

pub fn room_created_json(code: &str) -> String {
    serde_json::to_string(&ServerMessage::RoomCreated {
        room_code: RoomCode::new(code),
    })
    .expect("room_created_json")
}

pub fn room_joined_json(code: &str, players: Vec<Player>) -> String {
    serde_json::to_string(&ServerMessage::RoomJoined(snapshot(code, players, None)))
        .expect("room_joined_json")
}

pub fn room_data_json(code: &str, players: Vec<Player>) -> String {
    room_data_json_with(code, players, None, None)
}

pub fn room_data_json_with(
    code: &str,
    players: Vec<Player>,
    creator: Option<&str>,
    status: Option<RoomStatus>,
) -> String {
    let mut snap = snapshot(code, players, status);
    snap.creator = creator.map(Into::into);
    serde_json::to_string(&ServerMessage::RoomData(snap)).expect("room_data_json")
}

pub fn both_players_ready_json(code: &str, players: Vec<Player>) -> String {
    serde_json::to_string(&ServerMessage::BothPlayersReady(snapshot(
        code, players, None,
    )))
    .expect("both_players_ready_json")
}

pub fn player_disconnected_json(code: &str, players: Vec<Player>) -> String {
    serde_json::to_string(&ServerMessage::PlayerDisconnected(snapshot(
        code, players, None,
    )))
    .expect("player_disconnected_json")
}

pub fn player_left_json(code: &str, players: Vec<Player>) -> String {
    serde_json::to_string(&ServerMessage::PlayerLeft(snapshot(code, players, None)))
        .expect("player_left_json")
}

pub fn creator_changed_json(new_creator: &str) -> String {
    serde_json::to_string(&ServerMessage::CreatorChanged {
        new_creator: new_creator.into(),
    })
    .expect("creator_changed_json")
}

pub fn game_started_json() -> String {
    serde_json::to_string(&ServerMessage::GameStarted).expect("game_started_json")
}

pub fn start_round_json(word: &str, round: u32) -> String {
    serde_json::to_string(&ServerMessage::StartRound {
        word: word.into(),
        round,
    })
    .expect("start_round_json")
}

pub fn player_progress_json(player_id: &str, round: u32, total_rounds: u32, score: u32) -> String {
    serde_json::to_string(&ServerMessage::PlayerProgress(ProgressUpdate {
        player_id: player_id.into(),
        player_name: None,
        round,
        total_rounds,
        score,
    }))
    .expect("player_progress_json")
}

pub fn game_over_json(scores: &[(&str, u32)]) -> String {
    let final_scores = scores
        .iter()
        .map(|(id, score)| (PlayerId::from(*id), FinalScore { score: *score }))
        .collect::<std::collections::HashMap<_, _>>();
    serde_json::to_string(&ServerMessage::GameOver { final_scores }).expect("game_over_json")
}

pub fn rematch_requested_json() -> String {
    serde_json::to_string(&ServerMessage::RematchRequested).expect("rematch_requested_json")
}

pub fn rematch_accepted_json() -> String {
    serde_json::to_string(&ServerMessage::RematchAccepted).expect("rematch_accepted_json")
}

pub fn rematch_declined_json() -> String {
    serde_json::to_string(&ServerMessage::RematchDeclined).expect("rematch_declined_json")
}

pub fn waiting_for_other_player_json(remaining_time: u64) -> String {
    serde_json::to_string(&ServerMessage::WaitingForOtherPlayer { remaining_time })
        .expect("waiting_for_other_player_json")
}

pub fn both_returned_to_lobby_json() -> String {
    serde_json::to_string(&ServerMessage::BothReturnedToLobby).expect("both_returned_to_lobby_json")
}

pub fn forced_return_to_lobby_json() -> String {
    serde_json::to_string(&ServerMessage::ForcedReturnToLobby)
        .expect("forced_return_to_lobby_json")
}

pub fn returned_to_lobby_json() -> String {
    serde_json::to_string(&ServerMessage::ReturnedToLobby).expect("returned_to_lobby_json")
}

pub fn game_abandoned_json(message: &str) -> String {
    serde_json::to_string(&ServerMessage::GameAbandoned {
        message: message.into(),
    })
    .expect("game_abandoned_json")
}

pub fn error_json(message: &str) -> String {
    serde_json::to_string(&ServerMessage::Error {
        message: message.into(),
    })
    .expect("error_json")
}
