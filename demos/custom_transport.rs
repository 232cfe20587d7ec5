//! # Custom Transport Example
//!
//! Shows how to implement the [`Transport`] and [`Connector`] traits
//! with a simple in-process loopback channel. This is useful for:
//!
//! - **Testing** — drive the session controllers without a real server
//! - **Custom backends** — adapt any I/O layer that can carry text
//!   frames (TCP, QUIC, WebRTC data channels)
//!
//! The fake server in `main` answers a `create_room` request the way a
//! real sketch-duel server would, and the room session surfaces the
//! resulting updates.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example custom_transport --no-default-features
//! ```

use async_trait::async_trait;
use sketch_duel_client::{
    Connection, ConnectionConfig, Connector, PlayerIdentity, RoomSession, RoomUpdate,
    SketchDuelError, Transport,
};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: Define a channel-based "loopback" transport
// ─────────────────────────────────────────────────────────────────────

/// A loopback transport that shuttles frames through in-process
/// channels.
///
/// The client half implements [`Transport`] and goes to the connection
/// supervisor; the server half ([`LoopbackServer`]) lets you read what
/// the client sent and inject responses.
pub struct LoopbackTransport {
    /// Frames the client sends go here (server reads the other end).
    tx: mpsc::UnboundedSender<String>,
    /// Frames the server sends arrive here.
    rx: mpsc::UnboundedReceiver<String>,
}

/// The "server side" of the loopback — use this to drive the
/// conversation.
pub struct LoopbackServer {
    /// Read what the client sent.
    pub rx: mpsc::UnboundedReceiver<String>,
    /// Send frames to the client (as if they came from a server).
    pub tx: mpsc::UnboundedSender<String>,
}

/// Create a connected `(transport, server)` pair.
fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();

    let transport = LoopbackTransport {
        tx: client_tx,
        rx: client_rx,
    };
    let server = LoopbackServer {
        rx: server_rx,
        tx: server_tx,
    };

    (transport, server)
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: Implement the Transport and Connector traits
// ─────────────────────────────────────────────────────────────────────

#[async_trait]
impl Transport for LoopbackTransport {
    /// Send a JSON frame to the "server" side of the loopback.
    async fn send(&mut self, message: String) -> Result<(), SketchDuelError> {
        self.tx
            .send(message)
            .map_err(|e| SketchDuelError::TransportSend(e.to_string()))
    }

    /// Receive the next frame from the "server" side.
    ///
    /// Returns `None` when the server channel closes — that is how the
    /// supervisor discovers the connection has ended.
    async fn recv(&mut self) -> Option<Result<String, SketchDuelError>> {
        self.rx.recv().await.map(Ok)
    }

    /// Close is a no-op for channels — dropping is sufficient.
    async fn close(&mut self) -> Result<(), SketchDuelError> {
        Ok(())
    }
}

/// Hands out the loopback once; later redial attempts wait forever,
/// which keeps the supervisor quiet after the demo ends.
pub struct LoopbackConnector {
    transport: Option<LoopbackTransport>,
}

#[async_trait]
impl Connector for LoopbackConnector {
    type Transport = LoopbackTransport;

    async fn connect(&mut self) -> Result<LoopbackTransport, SketchDuelError> {
        match self.transport.take() {
            Some(transport) => Ok(transport),
            None => std::future::pending().await,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Wire the session to the fake server
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for readable output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (transport, mut server) = loopback_pair();
    let connector = LoopbackConnector {
        transport: Some(transport),
    };

    let conn = Connection::start(connector, ConnectionConfig::new());
    let identity = PlayerIdentity::new();
    let mut session = RoomSession::new(conn.clone(), identity);

    while !conn.is_connected() {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    // ── Client: ask for a room ──────────────────────────────────────
    session.create_room("Dana")?;

    // ── Fake server: acknowledge the create ────────────────────────
    let Some(create_msg) = server.rx.recv().await else {
        return Err("server channel closed before create_room arrived".into());
    };
    tracing::info!("Server received: {create_msg}");

    // The wire format is an `{"event", "data"}` envelope with
    // snake_case event names.
    let created = serde_json::json!({
        "event": "room_created",
        "data": { "room_code": "DM01" }
    });
    server.tx.send(created.to_string())?;

    let Some(RoomUpdate::Created { code }) = session.next().await else {
        return Err("expected the create ack to surface".into());
    };
    tracing::info!("Client entered room {code}");

    // ── Fake server: answer the roster fetch ────────────────────────
    // The session asks for the roster on its own right after the ack.
    let Some(fetch_msg) = server.rx.recv().await else {
        return Err("server channel closed before get_room_data arrived".into());
    };
    tracing::info!("Server received: {fetch_msg}");

    let roster = serde_json::json!({
        "event": "room_data",
        "data": {
            "room_code": "DM01",
            "players": [ { "id": "p1", "name": "Dana", "isReady": false } ],
            "creator": "Dana"
        }
    });
    server.tx.send(roster.to_string())?;

    let Some(RoomUpdate::RosterUpdated { room }) = session.next().await else {
        return Err("expected the roster to surface".into());
    };
    tracing::info!(
        "Roster: {} player(s), creator {:?}, status {:?}",
        room.players.len(),
        room.creator,
        room.status
    );

    // ── Clean shutdown ──────────────────────────────────────────────
    conn.shutdown().await;
    tracing::info!("Done — the loopback carried a whole lobby exchange.");
    Ok(())
}
