//! Room lifecycle: entry, lobby and the start gate.
//!
//! [`RoomSession`] owns every room-scoped subscription and turns server
//! pushes into [`RoomUpdate`]s for the caller to render. It is a
//! pull-driven controller: await [`RoomSession::next`] in a loop and call
//! the command methods in between. One event is applied at a time, so no
//! update ever observes a half-applied roster.
//!
//! Local validation runs before anything touches the wire — empty names,
//! empty codes, starting without the creator seat or a full roster all
//! fail immediately with a validation error and no network traffic.

use std::time::Duration;

use tracing::{debug, warn};

use crate::connection::{Connection, EventStream};
use crate::error::{Result, SketchDuelError};
use crate::identity::PlayerIdentity;
use crate::protocol::{
    ClientMessage, EventKind, Player, RoomCode, RoomSnapshot, RoomStatus, ServerMessage,
};

/// Pause the lobby shows between `game_started` and the first round.
///
/// The countdown itself is presentation; the constant lives here so every
/// surface paces it the same way.
pub const GAME_START_COUNTDOWN: Duration = Duration::from_secs(3);

/// Local view of the room the player is in.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub code: RoomCode,
    /// Roster as last pushed by the server. At most two players.
    pub players: Vec<Player>,
    /// Display name of the creator. `None` until the server has said —
    /// the creator seat is never derived locally, not even by the player
    /// who created the room.
    pub creator: Option<String>,
    pub status: RoomStatus,
}

impl Room {
    fn new(code: RoomCode) -> Self {
        Self {
            code,
            players: Vec::new(),
            creator: None,
            status: RoomStatus::Waiting,
        }
    }

    /// True when both seats are taken.
    pub fn is_full(&self) -> bool {
        self.players.len() == 2
    }
}

/// Fold a roster push into the local room.
///
/// The roster is replaced wholesale (deduplicated by id, capped at two
/// seats). Lobby statuses are recomputed from the roster — `ready` iff
/// both seats are taken and every tracked ready flag is `true` — while
/// match-lifecycle statuses from the server (`in_progress` and later)
/// are applied verbatim.
fn merge_snapshot(room: &mut Room, snap: RoomSnapshot) {
    let mut players: Vec<Player> = Vec::with_capacity(2);
    for player in snap.players {
        if players.iter().any(|p| p.id == player.id) {
            warn!(id = %player.id, "duplicate player id in roster push, skipping");
            continue;
        }
        if players.len() == 2 {
            warn!(id = %player.id, "roster push carries more than two players, skipping");
            continue;
        }
        players.push(player);
    }
    room.players = players;

    if let Some(creator) = snap.creator {
        room.creator = Some(creator);
    }
    if let Some(code) = snap.room_code {
        room.code = code;
    }

    room.status = match snap.status {
        Some(
            status @ (RoomStatus::InProgress
            | RoomStatus::Finished
            | RoomStatus::PostGame
            | RoomStatus::Abandoned),
        ) => status,
        // A push without a status does not demote a running match.
        None if !matches!(room.status, RoomStatus::Waiting | RoomStatus::Ready) => room.status,
        // Lobby statuses are recomputed, not trusted.
        _ => {
            let all_ready =
                room.is_full() && room.players.iter().all(|p| p.is_ready.unwrap_or(false));
            if all_ready {
                RoomStatus::Ready
            } else {
                RoomStatus::Waiting
            }
        }
    };
}

/// What changed in the room, for the caller to render or act on.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomUpdate {
    /// Our `create_room` was acknowledged. A roster fetch is already on
    /// the wire; navigate to the lobby.
    Created { code: RoomCode },
    /// Our `join_room` was acknowledged; navigate to the lobby.
    Joined { room: Room },
    /// Roster or status changed.
    RosterUpdated { room: Room },
    /// Both seats taken and ready; the creator may start.
    BothPlayersReady { room: Room },
    /// The opponent's link dropped (their seat is held).
    OpponentDisconnected { room: Room },
    /// The opponent gave up their seat.
    OpponentLeft { room: Room },
    /// The creator seat moved.
    CreatorChanged { creator: String },
    /// The match begins after [`GAME_START_COUNTDOWN`].
    GameStarted,
    /// The room dissolved mid-match.
    GameAbandoned { message: String },
    /// The room no longer exists; go back to the entry screen.
    ReturnToEntry { message: String },
    /// The server rejected a request; show the message.
    ServerError { message: String },
}

/// Controller for room entry and the lobby.
///
/// Construct one per session (or call [`resubscribe`](Self::resubscribe)
/// when returning to the lobby after another screen held the event
/// slots). Dropping it releases nothing by itself — the slots simply get
/// taken over by whichever controller subscribes next.
pub struct RoomSession {
    conn: Connection,
    identity: PlayerIdentity,
    room: Option<Room>,
    /// Trimmed name sent with the last create/join, pinned on ack.
    pending_name: Option<String>,
    room_created: EventStream,
    room_joined: EventStream,
    room_data: EventStream,
    both_ready: EventStream,
    player_disconnected: EventStream,
    player_left: EventStream,
    creator_changed: EventStream,
    game_started: EventStream,
    game_abandoned: EventStream,
    errors: EventStream,
}

impl RoomSession {
    /// Create a session and take the room-scoped event slots.
    pub fn new(conn: Connection, identity: PlayerIdentity) -> Self {
        Self {
            room: None,
            pending_name: None,
            room_created: conn.subscribe(EventKind::RoomCreated),
            room_joined: conn.subscribe(EventKind::RoomJoined),
            room_data: conn.subscribe(EventKind::RoomData),
            both_ready: conn.subscribe(EventKind::BothPlayersReady),
            player_disconnected: conn.subscribe(EventKind::PlayerDisconnected),
            player_left: conn.subscribe(EventKind::PlayerLeft),
            creator_changed: conn.subscribe(EventKind::CreatorChanged),
            game_started: conn.subscribe(EventKind::GameStarted),
            game_abandoned: conn.subscribe(EventKind::GameAbandoned),
            errors: conn.subscribe(EventKind::Error),
            identity,
            conn,
        }
    }

    /// Re-take every room event slot.
    ///
    /// Call when the lobby comes back into focus after the match or
    /// post-game screens held some of the slots. Replacing a slot we
    /// already hold is harmless.
    pub fn resubscribe(&mut self) {
        self.room_created = self.conn.subscribe(EventKind::RoomCreated);
        self.room_joined = self.conn.subscribe(EventKind::RoomJoined);
        self.room_data = self.conn.subscribe(EventKind::RoomData);
        self.both_ready = self.conn.subscribe(EventKind::BothPlayersReady);
        self.player_disconnected = self.conn.subscribe(EventKind::PlayerDisconnected);
        self.player_left = self.conn.subscribe(EventKind::PlayerLeft);
        self.creator_changed = self.conn.subscribe(EventKind::CreatorChanged);
        self.game_started = self.conn.subscribe(EventKind::GameStarted);
        self.game_abandoned = self.conn.subscribe(EventKind::GameAbandoned);
        self.errors = self.conn.subscribe(EventKind::Error);
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Open a new room under the given display name.
    ///
    /// # Errors
    ///
    /// [`SketchDuelError::EmptyPlayerName`] when the trimmed name is
    /// empty; [`SketchDuelError::NotConnected`] while the link is down.
    pub fn create_room(&mut self, name: &str) -> Result<()> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(SketchDuelError::EmptyPlayerName);
        }
        self.conn.emit(ClientMessage::CreateRoom {
            name: trimmed.to_string(),
        })?;
        self.pending_name = Some(trimmed.to_string());
        Ok(())
    }

    /// Take the second seat in an existing room.
    ///
    /// The code is trimmed and upper-cased before it goes out, so codes
    /// compare exactly everywhere downstream.
    ///
    /// # Errors
    ///
    /// [`SketchDuelError::EmptyPlayerName`] or
    /// [`SketchDuelError::EmptyRoomCode`] on blank input;
    /// [`SketchDuelError::NotConnected`] while the link is down.
    pub fn join_room(&mut self, name: &str, code: &str) -> Result<()> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(SketchDuelError::EmptyPlayerName);
        }
        let room_code = RoomCode::new(code);
        if room_code.is_empty() {
            return Err(SketchDuelError::EmptyRoomCode);
        }
        self.conn.emit(ClientMessage::JoinRoom {
            name: trimmed.to_string(),
            room_code,
        })?;
        self.pending_name = Some(trimmed.to_string());
        Ok(())
    }

    /// Give up the seat and forget the room.
    ///
    /// Always succeeds locally: the room and the pinned name are cleared
    /// even when the network send fails (the server notices the absence
    /// on its own).
    pub fn leave_room(&mut self) {
        self.identity.clear();
        self.pending_name = None;
        let Some(room) = self.room.take() else {
            return;
        };
        debug!(code = %room.code, "leaving room");
        if let Err(e) = self.conn.emit(ClientMessage::LeaveRoom { room_code: room.code }) {
            warn!("leave_room send failed, leaving locally anyway: {e}");
        }
    }

    /// Start the match.
    ///
    /// # Errors
    ///
    /// [`SketchDuelError::NotInRoom`] outside a room;
    /// [`SketchDuelError::NotCreator`] unless the pinned name holds the
    /// server-assigned creator seat; [`SketchDuelError::NotEnoughPlayers`]
    /// with a single seat taken; [`SketchDuelError::UnexpectedPhase`]
    /// once the room has left the lobby. None of these reach the wire —
    /// the server re-validates the ones that do.
    pub fn start_game(&self) -> Result<()> {
        let room = self.room.as_ref().ok_or(SketchDuelError::NotInRoom)?;
        let is_creator = match (&room.creator, self.identity.current()) {
            (Some(creator), Some(me)) => *creator == me,
            _ => false,
        };
        if !is_creator {
            return Err(SketchDuelError::NotCreator);
        }
        if !room.is_full() {
            return Err(SketchDuelError::NotEnoughPlayers);
        }
        if !matches!(room.status, RoomStatus::Waiting | RoomStatus::Ready) {
            return Err(SketchDuelError::UnexpectedPhase);
        }
        self.conn.emit(ClientMessage::StartGame {
            room_code: room.code.clone(),
        })
    }

    /// Ask the server for a fresh roster.
    ///
    /// # Errors
    ///
    /// [`SketchDuelError::NotInRoom`] outside a room;
    /// [`SketchDuelError::NotConnected`] while the link is down.
    pub fn request_room_data(&self) -> Result<()> {
        let room = self.room.as_ref().ok_or(SketchDuelError::NotInRoom)?;
        self.conn.emit(ClientMessage::GetRoomData {
            room_code: room.code.clone(),
        })
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// The room as last seen, if entered.
    pub fn room(&self) -> Option<&Room> {
        self.room.as_ref()
    }

    /// True when the pinned name holds the creator seat.
    pub fn is_creator(&self) -> bool {
        match (self.room.as_ref().and_then(|r| r.creator.as_deref()), self.identity.current()) {
            (Some(creator), Some(me)) => creator == me,
            _ => false,
        }
    }

    /// Shared connection handle.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ── Event loop ──────────────────────────────────────────────────

    /// Wait for the next room update.
    ///
    /// Returns `None` once every subscription has ended (connection shut
    /// down, or all slots taken over by other controllers).
    pub async fn next(&mut self) -> Option<RoomUpdate> {
        loop {
            let update = tokio::select! {
                Some(msg) = self.room_created.next() => self.on_room_created(msg),
                Some(msg) = self.room_joined.next() => self.on_room_joined(msg),
                Some(msg) = self.room_data.next() => self.on_roster_push(msg),
                Some(msg) = self.both_ready.next() => self.on_both_ready(msg),
                Some(msg) = self.player_disconnected.next() => self.on_player_gone(msg, false),
                Some(msg) = self.player_left.next() => self.on_player_gone(msg, true),
                Some(msg) = self.creator_changed.next() => self.on_creator_changed(msg),
                Some(_) = self.game_started.next() => self.on_game_started(),
                Some(msg) = self.game_abandoned.next() => self.on_game_abandoned(msg),
                Some(msg) = self.errors.next() => self.on_error(msg),
                else => return None,
            };
            if update.is_some() {
                return update;
            }
        }
    }

    fn on_room_created(&mut self, msg: ServerMessage) -> Option<RoomUpdate> {
        let ServerMessage::RoomCreated { room_code } = msg else {
            return None;
        };
        debug!(code = %room_code, "room created");
        self.pin_pending_name();
        self.room = Some(Room::new(room_code.clone()));
        // Fetch the roster right away; the ack itself only carries the code.
        if let Err(e) = self.conn.emit(ClientMessage::GetRoomData {
            room_code: room_code.clone(),
        }) {
            warn!("roster fetch after create failed: {e}");
        }
        Some(RoomUpdate::Created { code: room_code })
    }

    fn on_room_joined(&mut self, msg: ServerMessage) -> Option<RoomUpdate> {
        let ServerMessage::RoomJoined(snap) = msg else {
            return None;
        };
        self.pin_pending_name();
        let code = snap.room_code.clone()?;
        let mut room = Room::new(code);
        merge_snapshot(&mut room, snap);
        debug!(code = %room.code, players = room.players.len(), "room joined");
        self.room = Some(room.clone());
        Some(RoomUpdate::Joined { room })
    }

    fn on_roster_push(&mut self, msg: ServerMessage) -> Option<RoomUpdate> {
        let ServerMessage::RoomData(snap) = msg else {
            return None;
        };
        let room = self.merge_into_current(snap)?;
        Some(RoomUpdate::RosterUpdated { room })
    }

    fn on_both_ready(&mut self, msg: ServerMessage) -> Option<RoomUpdate> {
        let ServerMessage::BothPlayersReady(snap) = msg else {
            return None;
        };
        let mut room = self.merge_into_current(snap)?;
        // The push is the server's word that everyone is ready, even when
        // the roster copy lags behind on the flags.
        room.status = RoomStatus::Ready;
        if let Some(current) = self.room.as_mut() {
            current.status = RoomStatus::Ready;
        }
        Some(RoomUpdate::BothPlayersReady { room })
    }

    fn on_player_gone(&mut self, msg: ServerMessage, left_for_good: bool) -> Option<RoomUpdate> {
        let snap = match msg {
            ServerMessage::PlayerDisconnected(snap) | ServerMessage::PlayerLeft(snap) => snap,
            _ => return None,
        };
        let room = self.merge_into_current(snap)?;
        if left_for_good {
            Some(RoomUpdate::OpponentLeft { room })
        } else {
            Some(RoomUpdate::OpponentDisconnected { room })
        }
    }

    fn on_creator_changed(&mut self, msg: ServerMessage) -> Option<RoomUpdate> {
        let ServerMessage::CreatorChanged { new_creator } = msg else {
            return None;
        };
        let room = self.room.as_mut()?;
        debug!(creator = %new_creator, "creator changed");
        room.creator = Some(new_creator.clone());
        Some(RoomUpdate::CreatorChanged {
            creator: new_creator,
        })
    }

    fn on_game_started(&mut self) -> Option<RoomUpdate> {
        let room = self.room.as_mut()?;
        room.status = RoomStatus::InProgress;
        debug!(code = %room.code, "game started");
        Some(RoomUpdate::GameStarted)
    }

    fn on_game_abandoned(&mut self, msg: ServerMessage) -> Option<RoomUpdate> {
        let ServerMessage::GameAbandoned { message } = msg else {
            return None;
        };
        if let Some(room) = self.room.as_mut() {
            room.status = RoomStatus::Abandoned;
        }
        Some(RoomUpdate::GameAbandoned { message })
    }

    fn on_error(&mut self, msg: ServerMessage) -> Option<RoomUpdate> {
        let ServerMessage::Error { message } = msg else {
            return None;
        };
        let err = SketchDuelError::Server {
            message: message.clone(),
        };
        if err.is_room_gone() {
            // The room is gone server-side; drop the local copy. The
            // pinned name survives for the next entry attempt.
            warn!("room gone: {message}");
            self.room = None;
            return Some(RoomUpdate::ReturnToEntry { message });
        }
        Some(RoomUpdate::ServerError { message })
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Pin the name from the last create/join now that the server
    /// acknowledged it.
    fn pin_pending_name(&mut self) {
        if let Some(name) = self.pending_name.take() {
            self.identity.set(name);
        }
    }

    /// Merge a snapshot into the current room and return a copy for the
    /// update. Pushes arriving while not in a room are stale; they are
    /// logged and absorbed.
    fn merge_into_current(&mut self, snap: RoomSnapshot) -> Option<Room> {
        match self.room.as_mut() {
            Some(room) => {
                merge_snapshot(room, snap);
                Some(room.clone())
            }
            None => {
                debug!("roster push while not in a room, ignoring");
                None
            }
        }
    }
}

impl std::fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("room", &self.room)
            .finish()
    }
}

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

    fn player(id: &str, name: &str, ready: Option<bool>) -> Player {
        Player {
            id: id.into(),
            name: name.into(),
            is_ready: ready,
        }
    }

    fn snapshot(players: Vec<Player>) -> RoomSnapshot {
        RoomSnapshot {
            players,
            ..RoomSnapshot::default()
        }
    }

    #[test]
    fn two_ready_players_recompute_to_ready() {
        let mut room = Room::new(RoomCode::new("AB12"));
        merge_snapshot(
            &mut room,
            snapshot(vec![
                player("p1", "Alice", Some(true)),
                player("p2", "Bob", Some(true)),
            ]),
        );
        assert_eq!(room.status, RoomStatus::Ready);
    }

    #[test]
    fn missing_ready_flag_keeps_waiting() {
        let mut room = Room::new(RoomCode::new("AB12"));
        merge_snapshot(
            &mut room,
            snapshot(vec![
                player("p1", "Alice", Some(true)),
                player("p2", "Bob", None),
            ]),
        );
        assert_eq!(room.status, RoomStatus::Waiting);
    }

    #[test]
    fn single_player_is_never_ready() {
        let mut room = Room::new(RoomCode::new("AB12"));
        merge_snapshot(&mut room, snapshot(vec![player("p1", "Alice", Some(true))]));
        assert_eq!(room.status, RoomStatus::Waiting);
        assert!(!room.is_full());
    }

    #[test]
    fn duplicate_ids_are_dropped() {
        let mut room = Room::new(RoomCode::new("AB12"));
        merge_snapshot(
            &mut room,
            snapshot(vec![
                player("p1", "Alice", None),
                player("p1", "Alice again", None),
                player("p2", "Bob", None),
            ]),
        );
        assert_eq!(room.players.len(), 2);
        assert_eq!(room.players[0].name, "Alice");
        assert_eq!(room.players[1].name, "Bob");
    }

    #[test]
    fn roster_is_capped_at_two_seats() {
        let mut room = Room::new(RoomCode::new("AB12"));
        merge_snapshot(
            &mut room,
            snapshot(vec![
                player("p1", "Alice", None),
                player("p2", "Bob", None),
                player("p3", "Mallory", None),
            ]),
        );
        assert_eq!(room.players.len(), 2);
        assert!(room.players.iter().all(|p| p.id != "p3"));
    }

    #[test]
    fn server_match_status_is_applied_verbatim() {
        let mut room = Room::new(RoomCode::new("AB12"));
        let mut snap = snapshot(vec![
            player("p1", "Alice", Some(true)),
            player("p2", "Bob", Some(true)),
        ]);
        snap.status = Some(RoomStatus::InProgress);
        merge_snapshot(&mut room, snap);
        assert_eq!(room.status, RoomStatus::InProgress);
    }

    #[test]
    fn lobby_status_from_server_is_recomputed_instead() {
        // A stale `ready` from the server loses to the roster evidence.
        let mut room = Room::new(RoomCode::new("AB12"));
        let mut snap = snapshot(vec![player("p1", "Alice", Some(true))]);
        snap.status = Some(RoomStatus::Ready);
        merge_snapshot(&mut room, snap);
        assert_eq!(room.status, RoomStatus::Waiting);
    }

    #[test]
    fn statusless_push_keeps_a_running_match_running() {
        let mut room = Room::new(RoomCode::new("AB12"));
        let mut started = snapshot(vec![
            player("p1", "Alice", None),
            player("p2", "Bob", None),
        ]);
        started.status = Some(RoomStatus::InProgress);
        merge_snapshot(&mut room, started);

        // A disconnect push mid-match carries the roster but no status.
        merge_snapshot(&mut room, snapshot(vec![player("p1", "Alice", None)]));
        assert_eq!(room.status, RoomStatus::InProgress);
    }

    #[test]
    fn creator_persists_across_pushes_without_one() {
        let mut room = Room::new(RoomCode::new("AB12"));
        let mut with_creator = snapshot(vec![player("p1", "Alice", None)]);
        with_creator.creator = Some("Alice".into());
        merge_snapshot(&mut room, with_creator);
        assert_eq!(room.creator.as_deref(), Some("Alice"));

        merge_snapshot(&mut room, snapshot(vec![player("p1", "Alice", None)]));
        assert_eq!(room.creator.as_deref(), Some("Alice"));
    }
}
