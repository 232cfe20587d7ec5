//! Post-match rematch handshake.
//!
//! After settlement both players land on the results screen, where either
//! may offer a rematch. [`RematchNegotiator`] runs the two-party
//! handshake: `request` from one side, `accept` or `decline` from the
//! other. Acceptance means the caller resets its match controller and
//! begins again in the same room; every other outcome funnels the player
//! off the results screen, either by an armed redirect or by one of the
//! server's lobby-return pushes.
//!
//! A pending negotiation must never strand the player. The opponent
//! dropping off the room while an offer is open is treated exactly like
//! a decline, redirect included.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::connection::{Connection, EventStream};
use crate::error::{Result, SketchDuelError};
use crate::protocol::{ClientMessage, EventKind, RoomCode, ServerMessage};

/// Delay before the declining player is sent home.
pub const DECLINE_HOME_DELAY: Duration = Duration::from_secs(1);

/// Delay before a declined requester is returned to the lobby.
pub const DECLINED_LOBBY_DELAY: Duration = Duration::from_secs(3);

/// Delay before a player stranded by a mid-negotiation disconnect is
/// sent home.
pub const OPPONENT_GONE_HOME_DELAY: Duration = Duration::from_secs(3);

/// Where an armed redirect will take the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavTarget {
    /// The entry screen, outside any room.
    Home,
    /// The room lobby.
    Lobby,
}

/// Where the handshake stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RematchState {
    /// No offer on the table.
    Idle,
    /// We offered; awaiting the opponent's answer.
    RequestedBySelf,
    /// The opponent offered; answer with accept or decline.
    RequestedByOpponent,
    /// Both sides committed to a fresh match.
    Accepted,
    /// The handshake closed without a rematch. No further rematch
    /// actions are accepted.
    Declined,
}

/// What moved in the handshake, for the caller to render or act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RematchUpdate {
    /// The opponent offered a rematch.
    OfferReceived,
    /// The opponent accepted our offer. Reset the match controller and
    /// begin the fresh match.
    Accepted,
    /// The opponent turned our offer down; a lobby redirect is armed.
    OfferDeclined,
    /// The opponent dropped off the room. If an offer was pending it
    /// counts as a decline and a home redirect is armed; otherwise this
    /// only disables the request action.
    OpponentGone,
    /// An armed redirect came due; navigate now.
    RedirectDue { target: NavTarget },
    /// The server confirmed both players are back in the lobby.
    BothReturnedToLobby,
    /// The server moved everyone back to the lobby.
    ForcedReturnToLobby,
    /// The server confirmed our own return to the lobby.
    ReturnedToLobby,
}

/// Controller for the results screen.
///
/// Construct one when settlement lands, await [`next`](Self::next) in a
/// loop, and drive it with [`request`](Self::request),
/// [`accept`](Self::accept) and [`decline`](Self::decline).
pub struct RematchNegotiator {
    conn: Connection,
    room_code: RoomCode,
    state: RematchState,
    opponent_connected: bool,
    redirect: Option<(Instant, NavTarget)>,
    requested: EventStream,
    accepted: EventStream,
    declined: EventStream,
    player_disconnected: EventStream,
    player_left: EventStream,
    both_returned: EventStream,
    forced_return: EventStream,
    returned: EventStream,
}

impl RematchNegotiator {
    /// Create a negotiator for the given room and take the post-game
    /// event slots.
    pub fn new(conn: Connection, room_code: RoomCode) -> Self {
        Self {
            room_code,
            state: RematchState::Idle,
            opponent_connected: true,
            redirect: None,
            requested: conn.subscribe(EventKind::RematchRequested),
            accepted: conn.subscribe(EventKind::RematchAccepted),
            declined: conn.subscribe(EventKind::RematchDeclined),
            player_disconnected: conn.subscribe(EventKind::PlayerDisconnected),
            player_left: conn.subscribe(EventKind::PlayerLeft),
            both_returned: conn.subscribe(EventKind::BothReturnedToLobby),
            forced_return: conn.subscribe(EventKind::ForcedReturnToLobby),
            returned: conn.subscribe(EventKind::ReturnedToLobby),
            conn,
        }
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Offer the opponent a rematch.
    ///
    /// # Errors
    ///
    /// [`SketchDuelError::OpponentUnavailable`] once the opponent has
    /// dropped off the room; [`SketchDuelError::UnexpectedPhase`] when a
    /// handshake is already underway or settled;
    /// [`SketchDuelError::NotConnected`] while the link is down.
    pub fn request(&mut self) -> Result<()> {
        if self.state != RematchState::Idle {
            return Err(SketchDuelError::UnexpectedPhase);
        }
        if !self.opponent_connected {
            return Err(SketchDuelError::OpponentUnavailable);
        }
        self.conn.emit(ClientMessage::RequestRematch {
            room_code: self.room_code.clone(),
        })?;
        self.state = RematchState::RequestedBySelf;
        debug!("rematch offered");
        Ok(())
    }

    /// Accept the opponent's offer.
    ///
    /// On success the handshake is committed on our side; reset the
    /// match controller and begin the fresh match right away. The
    /// opponent learns through the server.
    ///
    /// # Errors
    ///
    /// [`SketchDuelError::UnexpectedPhase`] unless an opponent offer is
    /// open; [`SketchDuelError::NotConnected`] while the link is down.
    pub fn accept(&mut self) -> Result<()> {
        if self.state != RematchState::RequestedByOpponent {
            return Err(SketchDuelError::UnexpectedPhase);
        }
        self.conn.emit(ClientMessage::AcceptRematch {
            room_code: self.room_code.clone(),
        })?;
        self.state = RematchState::Accepted;
        debug!("rematch accepted");
        Ok(())
    }

    /// Turn the opponent's offer down.
    ///
    /// Arms a short home redirect so the declining player is not left
    /// on a dead results screen.
    ///
    /// # Errors
    ///
    /// [`SketchDuelError::UnexpectedPhase`] unless an opponent offer is
    /// open; [`SketchDuelError::NotConnected`] while the link is down.
    pub fn decline(&mut self) -> Result<()> {
        if self.state != RematchState::RequestedByOpponent {
            return Err(SketchDuelError::UnexpectedPhase);
        }
        self.conn.emit(ClientMessage::DeclineRematch {
            room_code: self.room_code.clone(),
        })?;
        self.state = RematchState::Declined;
        self.arm_redirect(NavTarget::Home, DECLINE_HOME_DELAY);
        debug!("rematch declined");
        Ok(())
    }

    /// Clear the handshake for a fresh match or on leaving the results
    /// screen. Cancels any armed redirect.
    pub fn reset(&mut self) {
        self.state = RematchState::Idle;
        self.opponent_connected = true;
        self.redirect = None;
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn state(&self) -> RematchState {
        self.state
    }

    /// True while the opponent still holds their seat.
    pub fn opponent_connected(&self) -> bool {
        self.opponent_connected
    }

    /// True when [`request`](Self::request) would be accepted.
    pub fn can_request(&self) -> bool {
        self.state == RematchState::Idle && self.opponent_connected
    }

    /// The armed redirect, if any.
    pub fn pending_redirect(&self) -> Option<NavTarget> {
        self.redirect.map(|(_, target)| target)
    }

    // ── Event loop ──────────────────────────────────────────────────

    /// Wait for the next handshake update.
    ///
    /// Returns `None` once every subscription has ended. Armed
    /// redirects fire from here, so keep polling until navigation.
    pub async fn next(&mut self) -> Option<RematchUpdate> {
        loop {
            let update = tokio::select! {
                Some(msg) = self.requested.next() => self.on_requested(msg),
                Some(msg) = self.accepted.next() => self.on_accepted(msg),
                Some(msg) = self.declined.next() => self.on_declined(msg),
                Some(msg) = self.player_disconnected.next() => self.on_opponent_gone(msg),
                Some(msg) = self.player_left.next() => self.on_opponent_gone(msg),
                Some(msg) = self.both_returned.next() => self.on_lobby_return(msg),
                Some(msg) = self.forced_return.next() => self.on_lobby_return(msg),
                Some(msg) = self.returned.next() => self.on_lobby_return(msg),
                () = sleep_until_redirect(self.redirect), if self.redirect.is_some() => {
                    return self.on_redirect_due();
                }
                else => return None,
            };
            if update.is_some() {
                return update;
            }
        }
    }

    fn on_requested(&mut self, msg: ServerMessage) -> Option<RematchUpdate> {
        if !matches!(msg, ServerMessage::RematchRequested) {
            return None;
        }
        if self.state != RematchState::Idle {
            debug!(state = ?self.state, "rematch offer in a non-idle state, ignoring");
            return None;
        }
        self.state = RematchState::RequestedByOpponent;
        Some(RematchUpdate::OfferReceived)
    }

    fn on_accepted(&mut self, msg: ServerMessage) -> Option<RematchUpdate> {
        if !matches!(msg, ServerMessage::RematchAccepted) {
            return None;
        }
        if self.state != RematchState::RequestedBySelf {
            debug!(state = ?self.state, "rematch acceptance without an open offer, ignoring");
            return None;
        }
        self.state = RematchState::Accepted;
        Some(RematchUpdate::Accepted)
    }

    fn on_declined(&mut self, msg: ServerMessage) -> Option<RematchUpdate> {
        if !matches!(msg, ServerMessage::RematchDeclined) {
            return None;
        }
        if self.state != RematchState::RequestedBySelf {
            debug!(state = ?self.state, "rematch decline without an open offer, ignoring");
            return None;
        }
        self.state = RematchState::Declined;
        self.arm_redirect(NavTarget::Lobby, DECLINED_LOBBY_DELAY);
        Some(RematchUpdate::OfferDeclined)
    }

    fn on_opponent_gone(&mut self, msg: ServerMessage) -> Option<RematchUpdate> {
        if !matches!(
            msg,
            ServerMessage::PlayerDisconnected(_) | ServerMessage::PlayerLeft(_)
        ) {
            return None;
        }
        self.opponent_connected = false;
        match self.state {
            // A pending handshake would wait forever on an answer that
            // cannot arrive; close it out as a decline.
            RematchState::RequestedBySelf | RematchState::RequestedByOpponent => {
                warn!("opponent gone mid-negotiation, treating as a decline");
                self.state = RematchState::Declined;
                self.arm_redirect(NavTarget::Home, OPPONENT_GONE_HOME_DELAY);
                Some(RematchUpdate::OpponentGone)
            }
            RematchState::Idle => Some(RematchUpdate::OpponentGone),
            RematchState::Accepted | RematchState::Declined => {
                debug!(state = ?self.state, "opponent gone after the handshake settled");
                None
            }
        }
    }

    fn on_lobby_return(&mut self, msg: ServerMessage) -> Option<RematchUpdate> {
        let update = match msg {
            ServerMessage::BothReturnedToLobby => RematchUpdate::BothReturnedToLobby,
            ServerMessage::ForcedReturnToLobby => RematchUpdate::ForcedReturnToLobby,
            ServerMessage::ReturnedToLobby => RematchUpdate::ReturnedToLobby,
            _ => return None,
        };
        // The server is navigating us; a slower local redirect to the
        // same end is now stale.
        self.redirect = None;
        self.state = RematchState::Idle;
        Some(update)
    }

    fn on_redirect_due(&mut self) -> Option<RematchUpdate> {
        let (_, target) = self.redirect.take()?;
        debug!(?target, "redirect due");
        Some(RematchUpdate::RedirectDue { target })
    }

    fn arm_redirect(&mut self, target: NavTarget, delay: Duration) {
        self.redirect = Some((Instant::now() + delay, target));
    }
}

impl std::fmt::Debug for RematchNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RematchNegotiator")
            .field("state", &self.state)
            .field("opponent_connected", &self.opponent_connected)
            .finish()
    }
}

async fn sleep_until_redirect(redirect: Option<(Instant, NavTarget)>) {
    match redirect {
        Some((at, _)) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
