//! The match itself: round prompts, the drawing clock and settlement.
//!
//! [`MatchController`] drives one match of five timed drawing rounds. The
//! server owns round numbering and the final settlement; this controller
//! owns the local drawing clock and the verdict for our own rounds:
//!
//! 1. `start_round` puts the controller in [`RoundPhase::Prompt`] with
//!    the word to draw.
//! 2. [`acknowledge_prompt`](MatchController::acknowledge_prompt) starts
//!    the clock (the player has seen the word and the canvas is live).
//! 3. While timing, recognizer output goes through
//!    [`handle_predictions`](MatchController::handle_predictions). A top
//!    prediction matching the word at sufficient confidence resolves the
//!    round with a time-based score; the round clock running out
//!    resolves it with zero.
//! 4. Resolution submits the score, asks for the next prompt (or waits
//!    for the opponent after the last round), and the cycle repeats
//!    until the server's `game_over` settles both totals.
//!
//! Each round resolves at most once: both resolution paths are gated on
//! [`RoundPhase::Timing`], and only `start_round` re-enters the drawing
//! phases. Late recognizer responses and duplicate timer fires fall
//! through harmlessly.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::connection::{Connection, EventStream};
use crate::error::{Result, SketchDuelError};
use crate::identity::PlayerIdentity;
use crate::progress::{MatchVerdict, PlayerProgress, ProgressSide, ProgressTracker};
use crate::protocol::{ClientMessage, EventKind, RoomCode, ServerMessage};
use crate::recognizer::Prediction;
use crate::score::{calculate_score, GameRules};

/// Where the controller is in the round cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// No round yet; the bootstrap request may be in flight.
    Idle,
    /// Word received, waiting for the local prompt acknowledgement.
    Prompt,
    /// The drawing clock is running.
    Timing,
    /// Our round resolved; waiting for the server's next prompt.
    Resolving,
    /// We finished every round; the opponent is still playing.
    WaitingForOpponent,
    /// `game_over` settled the match.
    MatchComplete,
}

/// How one of our own rounds ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    pub round: u32,
    pub word: String,
    /// True when the recognizer matched the word in time.
    pub correct: bool,
    /// Drawing time consumed. The full round time on a timeout.
    pub elapsed: Duration,
    pub score: u32,
}

/// What changed in the match, for the caller to render or act on.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchUpdate {
    /// A new round prompt. Show the word, then call
    /// [`MatchController::acknowledge_prompt`] to start drawing.
    RoundStarted {
        round: u32,
        total_rounds: u32,
        word: String,
    },
    /// The round clock ran out before the recognizer matched.
    RoundTimedOut { outcome: RoundOutcome },
    /// A scoreboard entry moved.
    ProgressChanged {
        side: ProgressSide,
        progress: PlayerProgress,
    },
    /// We are done; the server waits this much longer for the opponent.
    WaitingForOpponent { remaining: Duration },
    /// The server settled the match. Totals are final; read them off
    /// [`MatchController::progress`].
    MatchComplete { verdict: Option<MatchVerdict> },
    /// The roster has no usable entry for our pinned name. Recoverable:
    /// the scoreboard resolves on the next clean roster push.
    IdentityUnresolved { reason: String },
}

/// Controller for a running match.
///
/// Construct it when the match screen comes up, call
/// [`begin`](Self::begin) once, then await [`next`](Self::next) in a
/// loop, feeding recognizer output in through
/// [`handle_predictions`](Self::handle_predictions) as it arrives.
pub struct MatchController {
    conn: Connection,
    identity: PlayerIdentity,
    rules: GameRules,
    room_code: RoomCode,
    phase: RoundPhase,
    /// Current round, 1-based, as last assigned by the server.
    round: u32,
    word: Option<String>,
    /// Set while [`RoundPhase::Timing`].
    started_at: Option<Instant>,
    /// Armed while [`RoundPhase::Timing`].
    deadline: Option<Instant>,
    tracker: ProgressTracker,
    bootstrap_sent: bool,
    start_round: EventStream,
    player_progress: EventStream,
    game_over: EventStream,
    waiting: EventStream,
    room_data: EventStream,
}

impl MatchController {
    /// Create a controller for the given room and take the match event
    /// slots.
    pub fn new(
        conn: Connection,
        identity: PlayerIdentity,
        room_code: RoomCode,
        rules: GameRules,
    ) -> Self {
        Self {
            rules,
            room_code,
            phase: RoundPhase::Idle,
            round: 0,
            word: None,
            started_at: None,
            deadline: None,
            tracker: ProgressTracker::new(rules.total_rounds),
            bootstrap_sent: false,
            start_round: conn.subscribe(EventKind::StartRound),
            player_progress: conn.subscribe(EventKind::PlayerProgress),
            game_over: conn.subscribe(EventKind::GameOver),
            waiting: conn.subscribe(EventKind::WaitingForOtherPlayer),
            room_data: conn.subscribe(EventKind::RoomData),
            identity,
            conn,
        }
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Kick the match off: fetch the roster for the scoreboard and ask
    /// for the first round. Idempotent; later rounds are requested
    /// automatically as rounds resolve.
    ///
    /// # Errors
    ///
    /// [`SketchDuelError::NotConnected`] while the link is down; call
    /// again once reconnected.
    pub fn begin(&mut self) -> Result<()> {
        if self.bootstrap_sent {
            return Ok(());
        }
        self.conn.emit(ClientMessage::GetRoomData {
            room_code: self.room_code.clone(),
        })?;
        self.conn.emit(ClientMessage::NextRound {
            room_code: self.room_code.clone(),
        })?;
        self.bootstrap_sent = true;
        Ok(())
    }

    /// The player has seen the word; start the drawing clock.
    ///
    /// # Errors
    ///
    /// [`SketchDuelError::UnexpectedPhase`] outside
    /// [`RoundPhase::Prompt`].
    pub fn acknowledge_prompt(&mut self) -> Result<()> {
        if self.phase != RoundPhase::Prompt {
            return Err(SketchDuelError::UnexpectedPhase);
        }
        let now = Instant::now();
        self.phase = RoundPhase::Timing;
        self.started_at = Some(now);
        self.deadline = Some(now + self.rules.round_time);
        debug!(round = self.round, "drawing clock started");
        Ok(())
    }

    /// Feed a batch of recognizer predictions in.
    ///
    /// Only the top prediction counts: when its label matches the round
    /// word case-insensitively at or above the accept confidence, the
    /// round resolves and the outcome comes back. Anything else, and any
    /// batch arriving outside the timed window, returns `None`.
    pub fn handle_predictions(&mut self, predictions: &[Prediction]) -> Option<RoundOutcome> {
        if self.phase != RoundPhase::Timing {
            debug!("predictions outside the timed window, ignoring");
            return None;
        }
        let started_at = self.started_at?;
        let matched = match (&self.word, predictions.first()) {
            (Some(word), Some(top)) => top.matches(word, self.rules.accept_confidence),
            _ => false,
        };
        if !matched {
            return None;
        }
        let elapsed = started_at.elapsed();
        let score = calculate_score(elapsed.as_secs_f64());
        debug!(round = self.round, ?elapsed, score, "word recognized");
        Some(self.resolve_round(true, elapsed, score))
    }

    /// Ask the server again for the next prompt.
    ///
    /// Round advancement is normally automatic; this is the recovery
    /// path when a prompt went missing (say, across a reconnect).
    ///
    /// # Errors
    ///
    /// [`SketchDuelError::UnexpectedPhase`] unless a round is awaiting
    /// its prompt; [`SketchDuelError::NotConnected`] while the link is
    /// down.
    pub fn request_next_round(&self) -> Result<()> {
        if self.phase != RoundPhase::Resolving {
            return Err(SketchDuelError::UnexpectedPhase);
        }
        self.conn.emit(ClientMessage::NextRound {
            room_code: self.room_code.clone(),
        })
    }

    /// Put the controller back to the start of a fresh match in the same
    /// room, keeping the resolved scoreboard seats.
    ///
    /// Call [`begin`](Self::begin) afterwards to request round one.
    pub fn reset_for_rematch(&mut self) {
        self.phase = RoundPhase::Idle;
        self.round = 0;
        self.word = None;
        self.started_at = None;
        self.deadline = None;
        self.bootstrap_sent = false;
        self.tracker.reset_scores();
        debug!("match state reset for rematch");
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Current round number, 1-based. Zero before the first prompt.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// The word to draw, while a round is open.
    pub fn word(&self) -> Option<&str> {
        self.word.as_deref()
    }

    /// Time left on the drawing clock, while it runs.
    pub fn remaining_time(&self) -> Option<Duration> {
        self.deadline
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Scoreboard for both players.
    pub fn progress(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn room_code(&self) -> &RoomCode {
        &self.room_code
    }

    // ── Event loop ──────────────────────────────────────────────────

    /// Wait for the next match update.
    ///
    /// Returns `None` once every subscription has ended. The round
    /// timeout fires from here, so keep polling while a round is being
    /// timed.
    pub async fn next(&mut self) -> Option<MatchUpdate> {
        loop {
            let update = tokio::select! {
                Some(msg) = self.start_round.next() => self.on_start_round(msg),
                Some(msg) = self.player_progress.next() => self.on_progress(msg),
                Some(msg) = self.game_over.next() => self.on_game_over(msg),
                Some(msg) = self.waiting.next() => self.on_waiting(msg),
                Some(msg) = self.room_data.next() => self.on_roster(msg),
                () = sleep_until_deadline(self.deadline), if self.deadline.is_some() => {
                    self.on_timeout()
                }
                else => return None,
            };
            if update.is_some() {
                return update;
            }
        }
    }

    fn on_start_round(&mut self, msg: ServerMessage) -> Option<MatchUpdate> {
        let ServerMessage::StartRound { word, round } = msg else {
            return None;
        };
        if self.phase == RoundPhase::MatchComplete {
            debug!(round, "round prompt after settlement, ignoring");
            return None;
        }
        // The server owns round numbers; a prompt replaces whatever
        // round was open, clock included.
        debug!(round, "round started");
        self.round = round;
        self.word = Some(word.clone());
        self.phase = RoundPhase::Prompt;
        self.started_at = None;
        self.deadline = None;
        Some(MatchUpdate::RoundStarted {
            round,
            total_rounds: self.tracker.total_rounds(),
            word,
        })
    }

    fn on_progress(&mut self, msg: ServerMessage) -> Option<MatchUpdate> {
        let ServerMessage::PlayerProgress(update) = msg else {
            return None;
        };
        let (side, progress) = self.tracker.apply_push(&update)?;
        Some(MatchUpdate::ProgressChanged { side, progress })
    }

    fn on_game_over(&mut self, msg: ServerMessage) -> Option<MatchUpdate> {
        let ServerMessage::GameOver { final_scores } = msg else {
            return None;
        };
        self.phase = RoundPhase::MatchComplete;
        self.started_at = None;
        self.deadline = None;
        self.word = None;
        self.tracker.apply_final(&final_scores);
        debug!("match settled");
        Some(MatchUpdate::MatchComplete {
            verdict: self.tracker.verdict(),
        })
    }

    fn on_waiting(&mut self, msg: ServerMessage) -> Option<MatchUpdate> {
        let ServerMessage::WaitingForOtherPlayer { remaining_time } = msg else {
            return None;
        };
        if self.phase != RoundPhase::MatchComplete {
            self.phase = RoundPhase::WaitingForOpponent;
        }
        Some(MatchUpdate::WaitingForOpponent {
            remaining: Duration::from_secs(remaining_time),
        })
    }

    fn on_roster(&mut self, msg: ServerMessage) -> Option<MatchUpdate> {
        let ServerMessage::RoomData(snap) = msg else {
            return None;
        };
        if self.tracker.is_resolved() {
            return None;
        }
        let Some(name) = self.identity.current() else {
            return Some(MatchUpdate::IdentityUnresolved {
                reason: "no pinned display name".to_string(),
            });
        };
        if let Err(e) = self.tracker.resolve(&name, &snap.players) {
            return Some(MatchUpdate::IdentityUnresolved {
                reason: e.to_string(),
            });
        }
        None
    }

    fn on_timeout(&mut self) -> Option<MatchUpdate> {
        self.deadline = None;
        if self.phase != RoundPhase::Timing {
            return None;
        }
        // A timed-out round scores zero outright; the time-based curve
        // is only for recognized words.
        debug!(round = self.round, "round timed out");
        let outcome = self.resolve_round(false, self.rules.round_time, 0);
        Some(MatchUpdate::RoundTimedOut { outcome })
    }

    /// Close the open round with the given verdict. Submits the score,
    /// advances the phase and requests the next prompt when rounds
    /// remain.
    ///
    /// Send failures are logged, not returned: the round is resolved
    /// locally either way, and the server reconciles through its own
    /// pushes once the link is back.
    fn resolve_round(&mut self, correct: bool, elapsed: Duration, score: u32) -> RoundOutcome {
        self.started_at = None;
        self.deadline = None;
        let word = self.word.take().unwrap_or_default();
        if let Err(e) = self.conn.emit(ClientMessage::SubmitScore {
            room_code: self.room_code.clone(),
            score,
        }) {
            warn!(round = self.round, "score submission failed: {e}");
        }
        self.tracker.record_own(self.round, score);
        if self.round < self.tracker.total_rounds() {
            self.phase = RoundPhase::Resolving;
            if let Err(e) = self.conn.emit(ClientMessage::NextRound {
                room_code: self.room_code.clone(),
            }) {
                warn!(round = self.round, "next round request failed: {e}");
            }
        } else {
            self.phase = RoundPhase::WaitingForOpponent;
        }
        RoundOutcome {
            round: self.round,
            word,
            correct,
            elapsed,
            score,
        }
    }
}

impl std::fmt::Debug for MatchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchController")
            .field("phase", &self.phase)
            .field("round", &self.round)
            .finish()
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
