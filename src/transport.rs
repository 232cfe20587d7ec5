//! Transport abstraction for the sketch-duel protocol.
//!
//! The [`Transport`] trait defines a bidirectional text message channel
//! between the client and the game server. The protocol uses JSON text
//! messages, so every transport implementation must handle message framing
//! internally (e.g., WebSocket frames, length-prefixed TCP).
//!
//! # Connection Setup
//!
//! Connection setup lives in [`Connector`], not [`Transport`]: the
//! connection supervisor redials on its own after liveness loss, so it
//! needs a factory it can call repeatedly rather than one pre-connected
//! transport. Pass a connector to `Connection::start`.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use sketch_duel_client::error::SketchDuelError;
//! use sketch_duel_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), SketchDuelError> {
//!         // Send the JSON text message over your transport
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, SketchDuelError>> {
//!         // Receive the next JSON text message
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SketchDuelError> {
//!         // Gracefully shut down the connection
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector { /* ... */ }
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(&mut self) -> Result<Self::Transport, SketchDuelError> {
//!         // Dial a fresh transport
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::SketchDuelError;

/// A bidirectional text message transport for the sketch-duel protocol.
///
/// Implementors shuttle serialized JSON strings between the client and
/// server. Each call to [`send`](Transport::send) transmits one complete
/// JSON message. Each call to [`recv`](Transport::recv) returns one
/// complete JSON message.
///
/// # Object Safety
///
/// This trait is object-safe, so `Box<dyn Transport>` works for dynamic
/// dispatch. The connection supervisor works with the monomorphized
/// [`Connector::Transport`] type for the common case.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it
/// is used inside `tokio::select!`. If `recv` is cancelled before
/// completion, calling it again must not lose data. Channel-based
/// implementations (e.g., wrapping `mpsc::Receiver`) are naturally
/// cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`SketchDuelError::TransportSend`] if the message could not
    /// be sent (e.g., connection broken, write buffer full).
    async fn send(&mut self, message: String) -> Result<(), SketchDuelError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete message was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed cleanly by the server
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, SketchDuelError>>;

    /// Close the transport connection gracefully.
    ///
    /// After calling this method, subsequent calls to [`send`](Transport::send)
    /// and [`recv`](Transport::recv) may return errors or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations
    /// should still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), SketchDuelError>;
}

/// Factory that dials fresh [`Transport`]s for the connection supervisor.
///
/// The supervisor calls [`connect`](Connector::connect) once at startup and
/// again after every detected connection loss, so implementations must be
/// reusable: each call returns a brand-new transport and leaves the
/// connector ready for the next attempt.
#[async_trait]
pub trait Connector: Send + 'static {
    /// The transport type this connector produces.
    type Transport: Transport;

    /// Dial a fresh transport.
    ///
    /// # Errors
    ///
    /// Returns a connectivity error when the dial fails; the supervisor
    /// logs it and retries on the next liveness tick.
    async fn connect(&mut self) -> Result<Self::Transport, SketchDuelError>;
}
