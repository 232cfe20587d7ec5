//! # Sketch Duel Client
//!
//! Transport-agnostic Rust client for the Sketch Duel server: a
//! real-time, two-player draw-and-guess duel. Each player gets the same
//! word each round; whoever's drawing is recognized faster scores
//! higher, and five rounds settle the match.
//!
//! The crate covers the session logic between the socket and the screen:
//! the persistent connection, rooms and the lobby, round timing and
//! scoring, the scoreboard, and the post-match rematch handshake. The
//! canvas, the recognizer service and all rendering stay outside; they
//! meet this crate at small trait and data boundaries.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] trait for any
//!   backend; the default `transport-websocket` feature provides
//!   [`WebSocketTransport`] and [`WsConnector`]
//! - **Self-healing connection** — [`Connection`] supervises the link,
//!   polls liveness and redials on loss, keeping subscriptions intact
//! - **One controller per screen** — [`RoomSession`],
//!   [`MatchController`] and [`RematchNegotiator`] each own their server
//!   events and hand back typed updates to render
//! - **Recognition plumbing** — [`PredictionScheduler`] paces snapshot
//!   requests; the optional `recognizer-http` feature adds
//!   [`HttpRecognizer`] for the stock inference service
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sketch_duel_client::{
//!     Connection, ConnectionConfig, PlayerIdentity, RoomSession, RoomUpdate, WsConnector,
//! };
//!
//! # async fn example() -> Result<(), sketch_duel_client::SketchDuelError> {
//! let connector = WsConnector::new("ws://localhost:3000");
//! let conn = Connection::start(connector, ConnectionConfig::new());
//! let identity = PlayerIdentity::default();
//!
//! let mut lobby = RoomSession::new(conn.clone(), identity.clone());
//! lobby.create_room("Alice")?;
//!
//! while let Some(update) = lobby.next().await {
//!     match update {
//!         RoomUpdate::Created { code } => println!("share this code: {code}"),
//!         RoomUpdate::BothPlayersReady { .. } => lobby.start_game()?,
//!         RoomUpdate::GameStarted => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod identity;
pub mod progress;
pub mod protocol;
pub mod recognizer;
pub mod rematch;
pub mod room;
pub mod round;
pub mod score;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use connection::{Connection, ConnectionConfig, ConnectionStatus, EventStream};
pub use error::SketchDuelError;
pub use identity::PlayerIdentity;
pub use progress::{MatchVerdict, PlayerProgress, ProgressSide, ProgressTracker};
pub use protocol::{ClientMessage, EventKind, Player, RoomCode, RoomStatus, ServerMessage};
pub use recognizer::{Prediction, PredictionScheduler, Recognizer};
pub use rematch::{NavTarget, RematchNegotiator, RematchState, RematchUpdate};
pub use room::{Room, RoomSession, RoomUpdate};
pub use round::{MatchController, MatchUpdate, RoundOutcome, RoundPhase};
pub use score::{calculate_score, GameRules};
pub use transport::{Connector, Transport};

#[cfg(feature = "recognizer-http")]
pub use recognizer::HttpRecognizer;

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketTransport, WsConnector};
