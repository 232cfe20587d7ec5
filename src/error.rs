//! Error types for the sketch-duel client.

use thiserror::Error;

/// Errors that can occur when using the sketch-duel client.
///
/// Connectivity variants are transient: the connection supervisor keeps
/// redialing, so callers surface them as status and retry the action.
/// Validation variants are produced locally and never reach the wire.
#[derive(Debug, Error)]
pub enum SketchDuelError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the
    /// client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// A player name was empty after trimming.
    #[error("player name must not be empty")]
    EmptyPlayerName,

    /// A room code was empty after trimming.
    #[error("room code must not be empty")]
    EmptyRoomCode,

    /// Attempted a room operation but the client is not in a room.
    #[error("not in a room")]
    NotInRoom,

    /// Attempted a creator-only operation without holding the creator seat.
    #[error("only the room creator can start the game")]
    NotCreator,

    /// Attempted to start a match with fewer than two players seated.
    #[error("two players are needed to start")]
    NotEnoughPlayers,

    /// Attempted a rematch action while the opponent is gone.
    #[error("opponent is not available")]
    OpponentUnavailable,

    /// Attempted an action the current room or round phase does not allow.
    #[error("action not allowed in the current phase")]
    UnexpectedPhase,

    /// The local player's name did not match exactly one roster entry.
    #[error("could not resolve local player: {reason}")]
    IdentityUnresolved {
        /// What went wrong with the roster match.
        reason: String,
    },

    /// The server rejected a request.
    #[error("server error: {message}")]
    Server {
        /// Human-readable error message from the server.
        message: String,
    },

    /// The recognizer backend failed to produce predictions.
    #[error("recognizer error: {0}")]
    Recognizer(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SketchDuelError {
    /// True for errors the liveness poll recovers from on its own.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::TransportSend(_)
                | Self::TransportReceive(_)
                | Self::TransportClosed
                | Self::NotConnected
                | Self::Timeout
                | Self::Io(_)
        )
    }

    /// True when the server's message says the room no longer exists.
    ///
    /// The server reports this only as free text, so the check matches the
    /// phrases it actually produces.
    pub fn is_room_gone(&self) -> bool {
        match self {
            Self::Server { message } => {
                message.contains("Room not found") || message.contains("does not exist")
            }
            _ => false,
        }
    }
}

/// A specialized [`Result`] type for sketch-duel client operations.
pub type Result<T> = std::result::Result<T, SketchDuelError>;
