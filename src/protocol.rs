//! Wire types for the sketch-duel socket protocol.
//!
//! Every type in this module produces the JSON the game server speaks: an
//! `{"event": ..., "data": ...}` envelope with snake_case event names and
//! no payload member for unit events. Key points:
//!
//! - Roster payloads are lenient on input because the server reuses the
//!   same shape across several pushes and fills in different subsets.
//! - `Player::is_ready` is camelCase `isReady` on the wire.
//! - Join codes are case-insensitive; [`RoomCode`] normalizes user input
//!   once so the rest of the crate compares exactly.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for players.
///
/// Ids are minted by the server (socket ids) and opaque to the client;
/// they are the only correlation key once the local player has been
/// resolved against the roster.
pub type PlayerId = String;

// ── Room code ───────────────────────────────────────────────────────

/// Room join code as shown to players.
///
/// User-entered codes are trimmed and upper-cased exactly once, at
/// construction. Codes deserialized from server payloads are taken
/// verbatim (the server only mints upper-case codes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalizes raw user input into a canonical code.
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    /// True when the normalized code is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomCode {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

// ── Enums ───────────────────────────────────────────────────────────

/// Lifecycle state of a room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Fewer than two players, or not everyone is ready.
    #[default]
    Waiting,
    /// Two players seated and ready; the creator may start.
    Ready,
    /// A match is running.
    InProgress,
    /// The match settled; results are being shown.
    Finished,
    /// Rematch negotiation is open.
    PostGame,
    /// The room dissolved mid-match.
    Abandoned,
}

// ── Structs ─────────────────────────────────────────────────────────

/// One seat in a room roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Lobby readiness flag. Pushes emitted outside the lobby phase
    /// omit it.
    #[serde(rename = "isReady", skip_serializing_if = "Option::is_none")]
    pub is_ready: Option<bool>,
}

/// Roster-bearing room payload.
///
/// The server attaches this shape to `room_joined`, `room_data`,
/// `both_players_ready`, `player_disconnected` and `player_left`, and is
/// not consistent about which fields it fills in, so everything but the
/// roster is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoomSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_code: Option<RoomCode>,
    #[serde(default)]
    pub players: Vec<Player>,
    /// Display name of the room creator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RoomStatus>,
    /// Id of the player the push concerns (set on disconnect and leave
    /// pushes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_player: Option<PlayerId>,
}

/// Payload for the `player_progress` broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub player_id: PlayerId,
    /// Display name at broadcast time. Names go stale after renames and
    /// reconnects; correlate by `player_id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    /// Rounds this player has completed.
    pub round: u32,
    pub total_rounds: u32,
    /// Cumulative score.
    pub score: u32,
}

/// Per-player entry in the `game_over` settlement map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinalScore {
    pub score: u32,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a new room. The server answers with `room_created`.
    CreateRoom { name: String },
    /// Take the second seat in an existing room.
    JoinRoom { name: String, room_code: RoomCode },
    /// Give up the seat. The server needs no answer.
    LeaveRoom { room_code: RoomCode },
    /// Ask for the authoritative roster and status.
    GetRoomData { room_code: RoomCode },
    /// Start the match. Creator only; the server re-validates.
    StartGame { room_code: RoomCode },
    /// Ask for the next round prompt (also bootstraps round 1).
    NextRound { room_code: RoomCode },
    /// Report the local score for the round just resolved.
    SubmitScore { room_code: RoomCode, score: u32 },
    /// Offer a rematch after game over.
    RequestRematch { room_code: RoomCode },
    /// Accept the opponent's rematch offer.
    AcceptRematch { room_code: RoomCode },
    /// Turn down the opponent's rematch offer.
    DeclineRematch { room_code: RoomCode },
}

/// Message types sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Room opened; the caller holds the creator seat.
    RoomCreated { room_code: RoomCode },
    /// Join acknowledged, with the roster as the server sees it.
    RoomJoined(RoomSnapshot),
    /// Answer to `get_room_data`.
    RoomData(RoomSnapshot),
    /// Both seats taken and ready.
    BothPlayersReady(RoomSnapshot),
    /// A player's link dropped (the seat is held for a grace period).
    PlayerDisconnected(RoomSnapshot),
    /// A player gave up their seat.
    PlayerLeft(RoomSnapshot),
    /// Creator seat reassigned.
    CreatorChanged { new_creator: String },
    /// The match begins.
    GameStarted,
    /// Round prompt. `round` is 1-based and authoritative.
    StartRound { word: String, round: u32 },
    /// Progress broadcast for one player.
    PlayerProgress(ProgressUpdate),
    /// Authoritative settlement; the only event that completes a match.
    GameOver {
        final_scores: HashMap<PlayerId, FinalScore>,
    },
    /// Opponent asked for a rematch.
    RematchRequested,
    /// Opponent accepted the local rematch offer.
    RematchAccepted,
    /// Opponent turned the rematch offer down.
    RematchDeclined,
    /// Local player finished all rounds; the opponent is still playing.
    WaitingForOtherPlayer {
        /// Seconds the server will keep waiting before settling.
        remaining_time: u64,
    },
    /// Both players are back in the lobby.
    BothReturnedToLobby,
    /// The server moved everyone back to the lobby.
    ForcedReturnToLobby,
    /// The local player is back in the lobby.
    ReturnedToLobby,
    /// Room dissolved mid-match.
    GameAbandoned { message: String },
    /// Request rejected, or a room-level failure.
    Error { message: String },
}

/// Registry key naming each server push.
///
/// [`crate::connection::Connection::subscribe`] takes one of these;
/// [`ServerMessage::kind`] maps a parsed message back for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RoomCreated,
    RoomJoined,
    RoomData,
    BothPlayersReady,
    PlayerDisconnected,
    PlayerLeft,
    CreatorChanged,
    GameStarted,
    StartRound,
    PlayerProgress,
    GameOver,
    RematchRequested,
    RematchAccepted,
    RematchDeclined,
    WaitingForOtherPlayer,
    BothReturnedToLobby,
    ForcedReturnToLobby,
    ReturnedToLobby,
    GameAbandoned,
    Error,
}

impl ServerMessage {
    /// Registry key for this message.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RoomCreated { .. } => EventKind::RoomCreated,
            Self::RoomJoined(_) => EventKind::RoomJoined,
            Self::RoomData(_) => EventKind::RoomData,
            Self::BothPlayersReady(_) => EventKind::BothPlayersReady,
            Self::PlayerDisconnected(_) => EventKind::PlayerDisconnected,
            Self::PlayerLeft(_) => EventKind::PlayerLeft,
            Self::CreatorChanged { .. } => EventKind::CreatorChanged,
            Self::GameStarted => EventKind::GameStarted,
            Self::StartRound { .. } => EventKind::StartRound,
            Self::PlayerProgress(_) => EventKind::PlayerProgress,
            Self::GameOver { .. } => EventKind::GameOver,
            Self::RematchRequested => EventKind::RematchRequested,
            Self::RematchAccepted => EventKind::RematchAccepted,
            Self::RematchDeclined => EventKind::RematchDeclined,
            Self::WaitingForOtherPlayer { .. } => EventKind::WaitingForOtherPlayer,
            Self::BothReturnedToLobby => EventKind::BothReturnedToLobby,
            Self::ForcedReturnToLobby => EventKind::ForcedReturnToLobby,
            Self::ReturnedToLobby => EventKind::ReturnedToLobby,
            Self::GameAbandoned { .. } => EventKind::GameAbandoned,
            Self::Error { .. } => EventKind::Error,
        }
    }
}
