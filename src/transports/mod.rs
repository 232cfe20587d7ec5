//! Transport implementations for the sketch-duel protocol.
//!
//! This module provides concrete [`Transport`](crate::Transport)
//! implementations behind feature gates. Enable the corresponding Cargo
//! feature to pull in a transport:
//!
//! | Feature                | Transport              |
//! |------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), sketch_duel_client::SketchDuelError> {
//! use sketch_duel_client::{Transport, WebSocketTransport};
//!
//! let mut ws = WebSocketTransport::connect("ws://localhost:3000").await?;
//! ws.send(r#"{"event":"get_room_data","data":{"room_code":"AB12"}}"#.to_string())
//!     .await?;
//!
//! if let Some(Ok(msg)) = ws.recv().await {
//!     println!("server said: {msg}");
//! }
//!
//! ws.close().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketTransport, WsConnector};
