//! Per-player scoreboard for the running match.
//!
//! [`ProgressTracker`] keeps both players' round and score totals. Our
//! own entry advances locally the instant a round resolves; the server's
//! `player_progress` pushes overwrite on conflict, and `game_over`
//! settles the final totals for both sides. The opponent's entry moves
//! on pushes only.
//!
//! Identity is resolved exactly once per match: the pinned display name
//! is matched against the roster, and from then on everything keys off
//! the server-assigned player id. Names may collide or change; ids do
//! not.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{Result, SketchDuelError};
use crate::protocol::{FinalScore, Player, PlayerId, ProgressUpdate};

/// One player's standing in the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerProgress {
    pub id: PlayerId,
    pub name: String,
    /// Rounds completed.
    pub round: u32,
    /// Cumulative score.
    pub score: u32,
}

impl PlayerProgress {
    fn starting(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            round: 0,
            score: 0,
        }
    }
}

/// Which side a progress push landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSide {
    Me,
    Opponent,
}

/// Outcome of the match once both totals are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchVerdict {
    Victory,
    Defeat,
    Draw,
}

/// Scoreboard for a two-player match.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    me: Option<PlayerProgress>,
    opponent: Option<PlayerProgress>,
    total_rounds: u32,
}

impl ProgressTracker {
    /// New tracker expecting `total_rounds` rounds. The server may
    /// revise the count through its pushes.
    pub fn new(total_rounds: u32) -> Self {
        Self {
            me: None,
            opponent: None,
            total_rounds,
        }
    }

    /// Match the pinned display name against the roster and pin both
    /// seats by id. Idempotent once resolved.
    ///
    /// # Errors
    ///
    /// [`SketchDuelError::IdentityUnresolved`] when the roster has no
    /// entry with our name, or more than one. The tracker is untouched;
    /// the caller may retry with a fresh roster.
    pub fn resolve(&mut self, my_name: &str, roster: &[Player]) -> Result<()> {
        if self.me.is_some() {
            return Ok(());
        }
        let mut matches = roster.iter().filter(|p| p.name == my_name);
        let me = matches.next().ok_or_else(|| SketchDuelError::IdentityUnresolved {
            reason: format!("no roster entry named {my_name:?}"),
        })?;
        if matches.next().is_some() {
            return Err(SketchDuelError::IdentityUnresolved {
                reason: format!("several roster entries named {my_name:?}"),
            });
        }
        debug!(id = %me.id, name = %me.name, "identity resolved");
        self.me = Some(PlayerProgress::starting(me.id.clone(), me.name.clone()));
        self.opponent = roster
            .iter()
            .find(|p| p.id != me.id)
            .map(|p| PlayerProgress::starting(p.id.clone(), p.name.clone()));
        Ok(())
    }

    /// Record our own round result locally.
    ///
    /// `round` is the round just completed, `score` its points. Runs
    /// ahead of the server; a later push for our id overwrites it.
    /// Returns the updated entry, or `None` before resolution.
    pub fn record_own(&mut self, round: u32, score: u32) -> Option<PlayerProgress> {
        let me = self.me.as_mut()?;
        me.round = round;
        me.score += score;
        Some(me.clone())
    }

    /// Fold a `player_progress` push in.
    ///
    /// The push's totals replace ours for the matching id (the server is
    /// the authority on totals), and an unseen id becomes the opponent
    /// entry. Pushes before resolution cannot be attributed and are
    /// absorbed.
    pub fn apply_push(&mut self, update: &ProgressUpdate) -> Option<(ProgressSide, PlayerProgress)> {
        let Some(me) = self.me.as_mut() else {
            debug!(id = %update.player_id, "progress push before identity resolution, ignoring");
            return None;
        };
        if update.total_rounds > 0 {
            self.total_rounds = update.total_rounds;
        }
        if me.id == update.player_id {
            me.round = update.round;
            me.score = update.score;
            if let Some(name) = &update.player_name {
                me.name = name.clone();
            }
            return Some((ProgressSide::Me, me.clone()));
        }
        let opponent = self.opponent.get_or_insert_with(|| {
            PlayerProgress::starting(
                update.player_id.clone(),
                update.player_name.clone().unwrap_or_default(),
            )
        });
        if opponent.id != update.player_id {
            // Two-player match: a third id means the seat changed hands,
            // not a third player.
            warn!(old = %opponent.id, new = %update.player_id, "opponent id changed");
            opponent.id = update.player_id.clone();
        }
        opponent.round = update.round;
        opponent.score = update.score;
        if let Some(name) = &update.player_name {
            opponent.name = name.clone();
        }
        Some((ProgressSide::Opponent, opponent.clone()))
    }

    /// Settle both totals from the `game_over` score map.
    ///
    /// Both entries are marked as having finished every round; ids
    /// missing from the map keep their last known score.
    pub fn apply_final(&mut self, final_scores: &HashMap<PlayerId, FinalScore>) {
        let total = self.total_rounds;
        for entry in [self.me.as_mut(), self.opponent.as_mut()].into_iter().flatten() {
            if let Some(settled) = final_scores.get(&entry.id) {
                entry.score = settled.score;
            }
            entry.round = total;
        }
    }

    /// Compare settled totals. `None` until both seats are resolved.
    pub fn verdict(&self) -> Option<MatchVerdict> {
        let me = self.me.as_ref()?;
        let opponent = self.opponent.as_ref()?;
        Some(match me.score.cmp(&opponent.score) {
            std::cmp::Ordering::Greater => MatchVerdict::Victory,
            std::cmp::Ordering::Less => MatchVerdict::Defeat,
            std::cmp::Ordering::Equal => MatchVerdict::Draw,
        })
    }

    /// Zero both players for a rematch, keeping the resolved seats.
    pub fn reset_scores(&mut self) {
        for entry in [self.me.as_mut(), self.opponent.as_mut()].into_iter().flatten() {
            entry.round = 0;
            entry.score = 0;
        }
    }

    /// True once [`resolve`](Self::resolve) has succeeded.
    pub fn is_resolved(&self) -> bool {
        self.me.is_some()
    }

    /// Our entry, once resolved.
    pub fn own(&self) -> Option<&PlayerProgress> {
        self.me.as_ref()
    }

    /// The opponent's entry, once known.
    pub fn opponent(&self) -> Option<&PlayerProgress> {
        self.opponent.as_ref()
    }

    /// Rounds in the match, as last confirmed by the server.
    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
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

    fn roster() -> Vec<Player> {
        vec![
            Player {
                id: "p1".into(),
                name: "Alice".into(),
                is_ready: Some(true),
            },
            Player {
                id: "p2".into(),
                name: "Bob".into(),
                is_ready: Some(true),
            },
        ]
    }

    fn push(id: &str, round: u32, score: u32) -> ProgressUpdate {
        ProgressUpdate {
            player_id: id.into(),
            player_name: None,
            round,
            total_rounds: 5,
            score,
        }
    }

    #[test]
    fn resolve_pins_both_seats_by_id() {
        let mut tracker = ProgressTracker::new(5);
        tracker.resolve("Bob", &roster()).unwrap();
        assert_eq!(tracker.own().unwrap().id, "p2");
        assert_eq!(tracker.opponent().unwrap().id, "p1");
        assert!(tracker.is_resolved());
    }

    #[test]
    fn resolve_fails_on_missing_name() {
        let mut tracker = ProgressTracker::new(5);
        let err = tracker.resolve("Mallory", &roster()).unwrap_err();
        assert!(matches!(err, SketchDuelError::IdentityUnresolved { .. }));
        assert!(!tracker.is_resolved());
    }

    #[test]
    fn resolve_fails_on_duplicate_names() {
        let twins = vec![
            Player {
                id: "p1".into(),
                name: "Alice".into(),
                is_ready: None,
            },
            Player {
                id: "p2".into(),
                name: "Alice".into(),
                is_ready: None,
            },
        ];
        let mut tracker = ProgressTracker::new(5);
        let err = tracker.resolve("Alice", &twins).unwrap_err();
        assert!(matches!(err, SketchDuelError::IdentityUnresolved { .. }));
    }

    #[test]
    fn resolve_is_idempotent() {
        let mut tracker = ProgressTracker::new(5);
        tracker.resolve("Alice", &roster()).unwrap();
        tracker.record_own(1, 76);
        // A second resolve must not wipe recorded progress.
        tracker.resolve("Alice", &roster()).unwrap();
        assert_eq!(tracker.own().unwrap().score, 76);
    }

    #[test]
    fn own_scores_accumulate_locally() {
        let mut tracker = ProgressTracker::new(5);
        tracker.resolve("Alice", &roster()).unwrap();
        tracker.record_own(1, 100);
        let me = tracker.record_own(2, 60).unwrap();
        assert_eq!(me.round, 2);
        assert_eq!(me.score, 160);
    }

    #[test]
    fn server_push_overwrites_local_total() {
        let mut tracker = ProgressTracker::new(5);
        tracker.resolve("Alice", &roster()).unwrap();
        tracker.record_own(1, 100);
        let (side, me) = tracker.apply_push(&push("p1", 1, 88)).unwrap();
        assert_eq!(side, ProgressSide::Me);
        assert_eq!(me.score, 88);
        assert_eq!(tracker.own().unwrap().score, 88);
    }

    #[test]
    fn opponent_moves_on_pushes_only() {
        let mut tracker = ProgressTracker::new(5);
        tracker.resolve("Alice", &roster()).unwrap();
        let (side, op) = tracker.apply_push(&push("p2", 3, 240)).unwrap();
        assert_eq!(side, ProgressSide::Opponent);
        assert_eq!(op.round, 3);
        assert_eq!(op.score, 240);
    }

    #[test]
    fn push_before_resolution_is_absorbed() {
        let mut tracker = ProgressTracker::new(5);
        assert!(tracker.apply_push(&push("p1", 1, 100)).is_none());
    }

    #[test]
    fn pushed_total_rounds_wins() {
        let mut tracker = ProgressTracker::new(5);
        tracker.resolve("Alice", &roster()).unwrap();
        let mut update = push("p2", 1, 100);
        update.total_rounds = 7;
        tracker.apply_push(&update);
        assert_eq!(tracker.total_rounds(), 7);
    }

    #[test]
    fn final_scores_settle_both_sides() {
        let mut tracker = ProgressTracker::new(5);
        tracker.resolve("Alice", &roster()).unwrap();
        tracker.record_own(4, 300);
        let finals = HashMap::from([
            ("p1".into(), FinalScore { score: 380 }),
            ("p2".into(), FinalScore { score: 402 }),
        ]);
        tracker.apply_final(&finals);
        assert_eq!(tracker.own().unwrap().score, 380);
        assert_eq!(tracker.opponent().unwrap().score, 402);
        assert_eq!(tracker.own().unwrap().round, 5);
        assert_eq!(tracker.verdict(), Some(MatchVerdict::Defeat));
    }

    #[test]
    fn equal_totals_draw() {
        let mut tracker = ProgressTracker::new(5);
        tracker.resolve("Alice", &roster()).unwrap();
        let finals = HashMap::from([
            ("p1".into(), FinalScore { score: 380 }),
            ("p2".into(), FinalScore { score: 380 }),
        ]);
        tracker.apply_final(&finals);
        assert_eq!(tracker.verdict(), Some(MatchVerdict::Draw));
    }

    #[test]
    fn reset_keeps_seats_and_zeroes_totals() {
        let mut tracker = ProgressTracker::new(5);
        tracker.resolve("Alice", &roster()).unwrap();
        tracker.record_own(2, 150);
        tracker.apply_push(&push("p2", 2, 180));
        tracker.reset_scores();
        assert_eq!(tracker.own().unwrap().score, 0);
        assert_eq!(tracker.opponent().unwrap().score, 0);
        assert_eq!(tracker.own().unwrap().id, "p1");
        assert_eq!(tracker.opponent().unwrap().id, "p2");
    }
}
