//! Connection management for the sketch-duel protocol.
//!
//! [`Connection`] is a cheap-to-clone handle over a background supervisor
//! task. The supervisor owns a [`Connector`], dials it for a fresh
//! [`Transport`](crate::transport::Transport), and pumps that transport
//! until the link drops; a liveness poll (default every 3 seconds) then
//! paces redials until the link is back. There is no backoff and no retry
//! cap: a duel in progress is worth redialing for indefinitely.
//!
//! Incoming messages are fanned out through a per-event registry with
//! exactly one slot per [`EventKind`]. Subscribing to an event that already
//! has a subscriber silently replaces it — the previous [`EventStream`]
//! ends. This mirrors the duplicate-handler defense the protocol was
//! designed around: screens re-register their handlers on every mount, and
//! the newest registration must be the only live one.
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WsConnector::new("ws://localhost:3000");
//! let conn = Connection::start(connector, ConnectionConfig::new());
//!
//! let mut created = conn.subscribe(EventKind::RoomCreated);
//! conn.emit(ClientMessage::CreateRoom { name: "Alice".into() })?;
//!
//! if let Some(ServerMessage::RoomCreated { room_code }) = created.next().await {
//!     println!("room is {room_code}");
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SketchDuelError};
use crate::protocol::{ClientMessage, EventKind, ServerMessage};
use crate::transport::{Connector, Transport};

/// Default interval of the liveness poll that paces redials.
const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(3);

/// Default capacity of each subscriber's bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`Connection`].
///
/// Every field has a sensible default; construct with
/// [`ConnectionConfig::new`] and override with the `with_*` builders.
///
/// # Example
///
/// ```
/// use sketch_duel_client::connection::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::new()
///     .with_liveness_interval(Duration::from_secs(5))
///     .with_shutdown_timeout(Duration::from_secs(2));
/// assert_eq!(config.liveness_interval, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Interval of the liveness poll.
    ///
    /// After a connection loss, the supervisor waits one full interval
    /// before each redial attempt. Defaults to **3 seconds**.
    pub liveness_interval: Duration,
    /// Capacity of each subscriber's bounded event channel.
    ///
    /// When a subscriber cannot keep up with incoming server messages,
    /// events for it are dropped (with a warning logged) to avoid blocking
    /// the supervisor. Defaults to **256**. Values below 1 are clamped
    /// to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`Connection::shutdown`] is called, the supervisor is given
    /// this much time to close the transport and exit. If the timeout
    /// expires the task is aborted. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl ConnectionConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the liveness poll interval.
    #[must_use]
    pub fn with_liveness_interval(mut self, interval: Duration) -> Self {
        self.liveness_interval = interval;
        self
    }

    /// Set the capacity of each subscriber's event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Status ──────────────────────────────────────────────────────────

/// Coarse connection state, readable from any handle at any time.
///
/// Liveness is polled, not event-driven: callers that care about the link
/// check [`Connection::is_connected`] when they need it, the way the game
/// screens do before enabling actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A dial attempt is in flight.
    Connecting,
    /// The transport is believed to be alive.
    Connected,
    /// The link is down; the liveness poll is pacing redials.
    Disconnected,
}

const STATUS_CONNECTING: u8 = 0;
const STATUS_CONNECTED: u8 = 1;
const STATUS_DISCONNECTED: u8 = 2;

impl ConnectionStatus {
    fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => STATUS_CONNECTING,
            Self::Connected => STATUS_CONNECTED,
            Self::Disconnected => STATUS_DISCONNECTED,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            STATUS_CONNECTING => Self::Connecting,
            STATUS_CONNECTED => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

// ── Event stream ────────────────────────────────────────────────────

/// Live feed of one server event kind.
///
/// Returned by [`Connection::subscribe`]. The stream yields messages for
/// as long as it holds the registry slot; it ends (yields `None`) once a
/// newer subscriber replaces it or the connection shuts down. There is no
/// replay: messages that arrived before the subscription are gone.
#[derive(Debug)]
pub struct EventStream {
    kind: EventKind,
    rx: mpsc::Receiver<ServerMessage>,
}

impl EventStream {
    /// The event kind this stream carries.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Receive the next message.
    ///
    /// Returns `None` once the subscription has been replaced or the
    /// connection has shut down and the buffer is drained.
    ///
    /// # Cancel Safety
    ///
    /// Cancel-safe: dropping the future loses no messages, so this is
    /// fine to use inside `tokio::select!`.
    pub async fn next(&mut self) -> Option<ServerMessage> {
        self.rx.recv().await
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between every handle clone and the supervisor task.
struct ConnectionShared {
    status: AtomicU8,
    shut_down: AtomicBool,
    registry: StdMutex<HashMap<EventKind, mpsc::Sender<ServerMessage>>>,
    event_capacity: usize,
    task: StdMutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown_tx: StdMutex<Option<oneshot::Sender<()>>>,
}

impl ConnectionShared {
    fn new(event_capacity: usize) -> Self {
        Self {
            status: AtomicU8::new(STATUS_CONNECTING),
            shut_down: AtomicBool::new(false),
            registry: StdMutex::new(HashMap::new()),
            event_capacity,
            task: StdMutex::new(None),
            shutdown_tx: StdMutex::new(None),
        }
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
        debug!(?status, "connection status changed");
    }

    /// Route a parsed server message to its registry slot, if any.
    fn dispatch(&self, msg: ServerMessage) {
        let kind = msg.kind();
        let slot = {
            let registry = self
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            registry.get(&kind).cloned()
        };

        let Some(tx) = slot else {
            debug!(?kind, "no subscriber, dropping event");
            return;
        };

        match tx.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(?kind, "subscriber channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(?kind, "subscriber went away, clearing slot");
                let mut registry = self
                    .registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                // Only clear the slot if it still holds the dead sender; a
                // replacement may have raced in.
                if registry.get(&kind).is_some_and(|cur| cur.same_channel(&tx)) {
                    registry.remove(&kind);
                }
            }
        }
    }

    /// Mark the connection as shut down and end every live stream.
    fn mark_shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        registry.clear();
    }
}

// ── Connection handle ───────────────────────────────────────────────

/// Handle to the background connection supervisor.
///
/// Created via [`Connection::start`]. Clones are cheap and share the same
/// supervisor; hand one to each controller. When the last clone is dropped
/// the command channel closes and the supervisor exits on its own.
///
/// All emit methods serialize a [`ClientMessage`] and queue it to the
/// supervisor. They return immediately once the message is queued (no
/// round-trip await), and fail fast with
/// [`SketchDuelError::NotConnected`] while the link is down — commands are
/// never held back for a future connection.
#[derive(Clone)]
pub struct Connection {
    cmd_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<ConnectionShared>,
    shutdown_timeout: Duration,
}

/// Handle-to-supervisor requests.
enum Command {
    Emit(ClientMessage),
    Reconnect,
}

impl Connection {
    /// Start the connection supervisor and return a handle.
    ///
    /// The supervisor dials `connector` immediately and keeps the link
    /// alive from then on: every detected loss is followed by redials
    /// paced at [`ConnectionConfig::liveness_interval`].
    #[must_use = "dropping the last handle shuts the connection down"]
    pub fn start<C: Connector>(connector: C, config: ConnectionConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let shared = Arc::new(ConnectionShared::new(config.event_channel_capacity.max(1)));
        let loop_shared = Arc::clone(&shared);

        let task = tokio::spawn(run_supervisor(
            connector,
            cmd_rx,
            loop_shared,
            shutdown_rx,
            config.liveness_interval,
        ));

        *shared.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        *shared
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(shutdown_tx);

        Self {
            cmd_tx,
            shared,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Queue a message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`SketchDuelError::NotConnected`] while the link is down or
    /// after shutdown. Messages are never queued across a connection gap.
    pub fn emit(&self, msg: ClientMessage) -> Result<()> {
        if self.shared.status() != ConnectionStatus::Connected {
            return Err(SketchDuelError::NotConnected);
        }
        self.cmd_tx
            .send(Command::Emit(msg))
            .map_err(|_| SketchDuelError::NotConnected)
    }

    /// Subscribe to one server event kind.
    ///
    /// The registry keeps exactly one slot per kind: subscribing to a kind
    /// that already has a subscriber silently replaces it, and the old
    /// [`EventStream`] ends. Handlers therefore never stack, no matter how
    /// often a screen re-registers. Subscriptions survive reconnects.
    pub fn subscribe(&self, kind: EventKind) -> EventStream {
        let (tx, rx) = mpsc::channel(self.shared.event_capacity);
        {
            let mut registry = self
                .shared
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.shared.shut_down.load(Ordering::Acquire) {
                // tx is dropped here; the returned stream ends immediately.
                debug!(?kind, "subscribe after shutdown, returning closed stream");
            } else if registry.insert(kind, tx).is_some() {
                debug!(?kind, "replacing previous subscriber");
            }
        }
        EventStream { kind, rx }
    }

    /// Ask the supervisor to redial now instead of on the next poll tick.
    ///
    /// Safe to call at any time: while connected (or already dialing) the
    /// request is ignored, and repeated calls collapse into one attempt.
    pub fn reconnect(&self) {
        debug!("reconnect requested");
        let _ = self.cmd_tx.send(Command::Reconnect);
    }

    /// Returns `true` if the transport is believed to be alive.
    pub fn is_connected(&self) -> bool {
        self.shared.status() == ConnectionStatus::Connected
    }

    /// Current coarse connection state.
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    /// Shut down the connection, closing the transport and stopping the
    /// supervisor.
    ///
    /// Every live [`EventStream`] ends once the supervisor exits. Calling
    /// this more than once (or from several clones) is harmless.
    pub async fn shutdown(&self) {
        debug!("Connection: shutdown requested");

        // Signal the supervisor to exit gracefully.
        let shutdown_tx = self
            .shared
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(());
        }

        // Await the supervisor with a timeout. If it doesn't exit in time,
        // abort it so the task cannot detach and run indefinitely.
        let task = self
            .shared
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut task) = task {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("supervisor terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("supervisor did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("supervisor aborted: {join_err}");
                    }
                }
            }
        }

        self.shared.set_status(ConnectionStatus::Disconnected);
        // The supervisor clears the registry on its way out; repeat here to
        // cover the abort path.
        self.shared.mark_shutdown();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("status", &self.status())
            .finish()
    }
}

// ── Supervisor ──────────────────────────────────────────────────────

/// Why the pump stopped.
enum PumpExit {
    /// Shutdown was requested; the supervisor should exit.
    Shutdown,
    /// The link dropped; the supervisor should redial.
    ConnectionLost,
}

/// Background task that owns the connector and keeps the link alive.
///
/// Cycles through connect → pump → disconnected-wait until shutdown is
/// requested or every handle is dropped.
async fn run_supervisor<C: Connector>(
    mut connector: C,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    shared: Arc<ConnectionShared>,
    mut shutdown_rx: oneshot::Receiver<()>,
    liveness_interval: Duration,
) {
    debug!("connection supervisor started");

    let mut liveness = tokio::time::interval(liveness_interval);
    liveness.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    'outer: loop {
        // ── Connect phase ───────────────────────────────────────────
        shared.set_status(ConnectionStatus::Connecting);
        let transport = tokio::select! {
            result = connector.connect() => match result {
                Ok(transport) => {
                    info!("connected to game server");
                    Some(transport)
                }
                Err(e) => {
                    warn!("connect attempt failed: {e}");
                    None
                }
            },
            cmd = cmd_rx.recv() => match cmd {
                // Already dialing; nothing extra to do.
                Some(Command::Reconnect) => continue 'outer,
                Some(Command::Emit(_)) => {
                    warn!("dropping outgoing message, not connected");
                    continue 'outer;
                }
                None => {
                    debug!("all handles dropped, stopping supervisor");
                    break 'outer;
                }
            },
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received while dialing");
                break 'outer;
            }
        };

        // ── Pump phase ──────────────────────────────────────────────
        if let Some(transport) = transport {
            shared.set_status(ConnectionStatus::Connected);
            match pump(transport, &mut cmd_rx, &shared, &mut shutdown_rx).await {
                PumpExit::Shutdown => break 'outer,
                PumpExit::ConnectionLost => {}
            }
        }

        // ── Disconnected wait ───────────────────────────────────────
        shared.set_status(ConnectionStatus::Disconnected);
        // Full interval before the next attempt; the poll is the pacing.
        liveness.reset();
        loop {
            tokio::select! {
                _ = liveness.tick() => {
                    debug!("liveness poll: link is down, redialing");
                    break;
                }
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Reconnect) => {
                        debug!("explicit reconnect, redialing now");
                        break;
                    }
                    Some(Command::Emit(_)) => {
                        // Raced a status change on the handle side.
                        warn!("dropping outgoing message, not connected");
                    }
                    None => {
                        debug!("all handles dropped, stopping supervisor");
                        break 'outer;
                    }
                },
                _ = &mut shutdown_rx => {
                    debug!("shutdown signal received while disconnected");
                    break 'outer;
                }
            }
        }
    }

    shared.set_status(ConnectionStatus::Disconnected);
    shared.mark_shutdown();
    debug!("connection supervisor exited");
}

/// Pump one live transport until shutdown or connection loss.
///
/// Multiplexes outgoing commands, the shutdown signal and incoming
/// messages via `tokio::select!`, exactly one at a time.
async fn pump(
    mut transport: impl Transport,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    shared: &ConnectionShared,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> PumpExit {
    loop {
        tokio::select! {
            // Branch 1: outgoing command from a handle
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Emit(msg)) => {
                        debug!("sending client message: {:?}", std::mem::discriminant(&msg));
                        match serde_json::to_string(&msg) {
                            Ok(json) => {
                                if let Err(e) = transport.send(json).await {
                                    error!("transport send error: {e}");
                                    return PumpExit::ConnectionLost;
                                }
                            }
                            Err(e) => {
                                // Serialization errors are programming bugs;
                                // don't kill the link over one.
                                error!("failed to serialize ClientMessage: {e}");
                            }
                        }
                    }
                    Some(Command::Reconnect) => {
                        debug!("reconnect requested while connected, ignoring");
                    }
                    None => {
                        debug!("all handles dropped, closing transport");
                        let _ = transport.close().await;
                        return PumpExit::Shutdown;
                    }
                }
            }

            // Branch 2: shutdown signal
            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                return PumpExit::Shutdown;
            }

            // Branch 3: incoming message from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(msg) => shared.dispatch(msg),
                            Err(e) => {
                                warn!("failed to deserialize server message: {e} — raw: {text}");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return PumpExit::ConnectionLost;
                    }
                    // Transport closed cleanly.
                    None => {
                        debug!("transport closed by server");
                        return PumpExit::ConnectionLost;
                    }
                }
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::RoomCode;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    // ── Mock transport and connector ────────────────────────────────

    /// A mock transport that records sent messages and replays scripted
    /// responses.
    struct MockTransport {
        /// Messages that `recv()` will yield in order.
        incoming: VecDeque<Option<std::result::Result<String, SketchDuelError>>>,
        /// Recorded outgoing messages.
        sent: Arc<StdMutex<Vec<String>>>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<String, SketchDuelError>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
            };
            (transport, sent)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), SketchDuelError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, SketchDuelError>> {
            if let Some(item) = self.incoming.pop_front() {
                // An explicit `None` entry signals a clean transport close;
                // `Some(result)` delivers the scripted message or error.
                item
            } else {
                // All scripted messages delivered — hang forever so the
                // supervisor stays in the pump until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), SketchDuelError> {
            Ok(())
        }
    }

    /// A connector yielding a scripted sequence of transports, for
    /// reconnect testing.
    struct MockConnector {
        transports: VecDeque<MockTransport>,
    }

    impl MockConnector {
        fn new(transports: Vec<MockTransport>) -> Self {
            Self {
                transports: VecDeque::from(transports),
            }
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Transport = MockTransport;

        async fn connect(&mut self) -> std::result::Result<MockTransport, SketchDuelError> {
            match self.transports.pop_front() {
                Some(transport) => Ok(transport),
                // Script exhausted — model an unreachable server.
                None => std::future::pending().await,
            }
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn room_created_json(code: &str) -> String {
        serde_json::to_string(&ServerMessage::RoomCreated {
            room_code: RoomCode::new(code),
        })
        .unwrap()
    }

    async fn wait_connected(conn: &Connection) {
        for _ in 0..100 {
            if conn.is_connected() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("connection never became ready");
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn start_connects_and_reports_status() {
        let (transport, _sent) = MockTransport::new(vec![]);
        let conn = Connection::start(
            MockConnector::new(vec![transport]),
            ConnectionConfig::new(),
        );

        wait_connected(&conn).await;
        assert_eq!(conn.status(), ConnectionStatus::Connected);

        conn.shutdown().await;
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn emit_fails_fast_while_dialing() {
        // No scripted transports: the connector hangs forever.
        let conn = Connection::start(MockConnector::new(vec![]), ConnectionConfig::new());

        let err = conn
            .emit(ClientMessage::CreateRoom {
                name: "Alice".into(),
            })
            .unwrap_err();
        assert!(matches!(err, SketchDuelError::NotConnected));

        conn.shutdown().await;
    }

    #[tokio::test]
    async fn emit_serializes_to_transport() {
        let (transport, sent) = MockTransport::new(vec![]);
        let conn = Connection::start(
            MockConnector::new(vec![transport]),
            ConnectionConfig::new(),
        );
        wait_connected(&conn).await;

        conn.emit(ClientMessage::NextRound {
            room_code: RoomCode::new("ab12"),
        })
        .unwrap();

        // Give the supervisor a moment to process.
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            assert_eq!(messages.len(), 1);
            assert!(messages[0].contains(r#""event":"next_round""#));
            assert!(messages[0].contains(r#""room_code":"AB12""#));
        }

        conn.shutdown().await;
    }

    #[tokio::test]
    async fn subscriber_receives_dispatched_event() {
        let (transport, _sent) = MockTransport::new(vec![Some(Ok(room_created_json("AB12")))]);
        let conn = Connection::start(
            MockConnector::new(vec![transport]),
            ConnectionConfig::new(),
        );

        let mut created = conn.subscribe(EventKind::RoomCreated);
        let msg = created.next().await.unwrap();
        assert!(matches!(msg, ServerMessage::RoomCreated { .. }));

        conn.shutdown().await;
    }

    #[tokio::test]
    async fn resubscribe_replaces_previous_subscriber() {
        let (transport, _sent) = MockTransport::new(vec![]);
        let conn = Connection::start(
            MockConnector::new(vec![transport]),
            ConnectionConfig::new(),
        );
        wait_connected(&conn).await;

        let mut first = conn.subscribe(EventKind::RoomCreated);
        let _second = conn.subscribe(EventKind::RoomCreated);

        // The first stream must end, not linger half-alive.
        assert!(first.next().await.is_none());

        conn.shutdown().await;
    }

    #[tokio::test]
    async fn events_without_subscriber_are_dropped() {
        let (transport, _sent) = MockTransport::new(vec![Some(Ok(room_created_json("AB12")))]);
        let conn = Connection::start(
            MockConnector::new(vec![transport]),
            ConnectionConfig::new(),
        );
        wait_connected(&conn).await;

        // Let the scripted event arrive before anyone subscribes.
        tokio::time::sleep(Duration::from_millis(50)).await;

        // A late subscriber must not see the already-dropped event.
        let mut created = conn.subscribe(EventKind::RoomCreated);
        let result =
            tokio::time::timeout(Duration::from_millis(50), created.next()).await;
        assert!(result.is_err(), "expected no replay of dropped events");

        conn.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn liveness_poll_redials_after_loss() {
        // First transport closes immediately; second stays alive.
        let (first, _sent1) = MockTransport::new(vec![None]);
        let (second, _sent2) = MockTransport::new(vec![]);
        let conn = Connection::start(
            MockConnector::new(vec![first, second]),
            ConnectionConfig::new(),
        );

        // Let the first connection establish and drop.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);

        // One liveness interval later the supervisor redials.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(conn.is_connected());

        conn.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_reconnect_skips_the_poll_wait() {
        let (first, _sent1) = MockTransport::new(vec![None]);
        let (second, _sent2) = MockTransport::new(vec![]);
        let conn = Connection::start(
            MockConnector::new(vec![first, second]),
            ConnectionConfig::new(),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);

        conn.reconnect();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(conn.is_connected());

        conn.shutdown().await;
    }

    #[tokio::test]
    async fn subscriptions_survive_reconnects() {
        // First transport delivers one event then closes; the second
        // delivers another after the redial.
        let (first, _sent1) = MockTransport::new(vec![
            Some(Ok(room_created_json("AB12"))),
            None,
        ]);
        let (second, _sent2) = MockTransport::new(vec![Some(Ok(room_created_json("CD34")))]);
        let conn = Connection::start(
            MockConnector::new(vec![first, second]),
            ConnectionConfig::new().with_liveness_interval(Duration::from_millis(20)),
        );

        let mut created = conn.subscribe(EventKind::RoomCreated);

        let msg = created.next().await.unwrap();
        if let ServerMessage::RoomCreated { room_code } = msg {
            assert_eq!(room_code.as_str(), "AB12");
        } else {
            panic!("expected RoomCreated");
        }

        // Same stream, next connection.
        let msg = created.next().await.unwrap();
        if let ServerMessage::RoomCreated { room_code } = msg {
            assert_eq!(room_code.as_str(), "CD34");
        } else {
            panic!("expected RoomCreated");
        }

        conn.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_ends_live_streams() {
        let (transport, _sent) = MockTransport::new(vec![]);
        let conn = Connection::start(
            MockConnector::new(vec![transport]),
            ConnectionConfig::new(),
        );
        wait_connected(&conn).await;

        let mut created = conn.subscribe(EventKind::RoomCreated);
        conn.shutdown().await;

        assert!(created.next().await.is_none());
    }

    #[tokio::test]
    async fn subscribe_after_shutdown_yields_closed_stream() {
        let (transport, _sent) = MockTransport::new(vec![]);
        let conn = Connection::start(
            MockConnector::new(vec![transport]),
            ConnectionConfig::new(),
        );
        wait_connected(&conn).await;
        conn.shutdown().await;

        let mut late = conn.subscribe(EventKind::GameOver);
        assert!(late.next().await.is_none());
    }

    #[tokio::test]
    async fn double_shutdown_is_harmless() {
        let (transport, _sent) = MockTransport::new(vec![]);
        let conn = Connection::start(
            MockConnector::new(vec![transport]),
            ConnectionConfig::new(),
        );
        wait_connected(&conn).await;

        conn.shutdown().await;
        conn.shutdown().await;
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn clones_share_the_same_link() {
        let (transport, sent) = MockTransport::new(vec![]);
        let conn = Connection::start(
            MockConnector::new(vec![transport]),
            ConnectionConfig::new(),
        );
        wait_connected(&conn).await;

        let clone = conn.clone();
        assert!(clone.is_connected());

        clone
            .emit(ClientMessage::GetRoomData {
                room_code: RoomCode::new("AB12"),
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(sent.lock().unwrap().len(), 1);

        conn.shutdown().await;
    }
}
