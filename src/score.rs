//! Round scoring and match tuning constants.
//!
//! Scoring is a pure function of elapsed time so both players compute
//! identical values for identical performances: no randomness, no hidden
//! state. The server re-broadcasts whatever score the client submits; this
//! module is the single place the number comes from.

use std::time::Duration;

/// Score awarded for an instant correct guess.
pub const MAX_SCORE: u32 = 100;

/// Score awarded for a correct guess at the very end of the round.
///
/// A guess at the buzzer still beats a timeout, which scores zero.
pub const MIN_SCORE: u32 = 20;

/// Length of one round.
pub const ROUND_TIME: Duration = Duration::from_secs(20);

/// Rounds per match.
pub const TOTAL_ROUNDS: u32 = 5;

/// Minimum recognizer confidence for a verdict to count.
pub const ACCEPT_CONFIDENCE: f64 = 0.75;

/// Compute the score for a correct guess after `elapsed_secs` seconds.
///
/// The score falls linearly from [`MAX_SCORE`] at zero seconds to
/// [`MIN_SCORE`] at the full round time, rounded to the nearest integer:
///
/// ```text
/// score = round(100 - 80 * clamp(elapsed, 0, 20) / 20)
/// ```
///
/// Inputs outside the round window clamp: negative elapsed time (clock
/// skew) scores [`MAX_SCORE`], anything past the round time scores
/// [`MIN_SCORE`]. Timeouts are not scored here at all — an unsolved round
/// is worth zero, recorded by the round controller directly.
///
/// ```
/// use sketch_duel_client::score::calculate_score;
///
/// assert_eq!(calculate_score(0.0), 100);
/// assert_eq!(calculate_score(6.0), 76);
/// assert_eq!(calculate_score(10.0), 60);
/// assert_eq!(calculate_score(20.0), 20);
/// ```
pub fn calculate_score(elapsed_secs: f64) -> u32 {
    let max_time = ROUND_TIME.as_secs_f64();
    let clamped = elapsed_secs.clamp(0.0, max_time);
    let range = f64::from(MAX_SCORE - MIN_SCORE);
    let raw = f64::from(MAX_SCORE) - range * (clamped / max_time);
    // `raw` is within [MIN_SCORE, MAX_SCORE] by construction, so the cast
    // cannot truncate out of range.
    raw.round() as u32
}

/// Tunable rules for one match.
///
/// The defaults mirror the live game; tests shrink the round time to keep
/// timer assertions fast.
///
/// # Example
///
/// ```
/// use sketch_duel_client::score::GameRules;
/// use std::time::Duration;
///
/// let rules = GameRules::new().with_round_time(Duration::from_secs(5));
/// assert_eq!(rules.total_rounds, 5);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct GameRules {
    /// Length of one round.
    pub round_time: Duration,
    /// Rounds per match.
    pub total_rounds: u32,
    /// Minimum recognizer confidence for a verdict to count.
    pub accept_confidence: f64,
}

impl GameRules {
    /// Create rules with the live-game defaults.
    pub fn new() -> Self {
        Self {
            round_time: ROUND_TIME,
            total_rounds: TOTAL_ROUNDS,
            accept_confidence: ACCEPT_CONFIDENCE,
        }
    }

    /// Set the round length.
    #[must_use]
    pub fn with_round_time(mut self, round_time: Duration) -> Self {
        self.round_time = round_time;
        self
    }

    /// Set the number of rounds per match.
    #[must_use]
    pub fn with_total_rounds(mut self, total_rounds: u32) -> Self {
        self.total_rounds = total_rounds;
        self
    }

    /// Set the recognizer confidence threshold.
    #[must_use]
    pub fn with_accept_confidence(mut self, accept_confidence: f64) -> Self {
        self.accept_confidence = accept_confidence;
        self
    }
}

impl Default for GameRules {
    fn default() -> Self {
        Self::new()
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

    #[test]
    fn anchor_points_match_the_tuning_table() {
        assert_eq!(calculate_score(0.0), 100);
        assert_eq!(calculate_score(10.0), 60);
        assert_eq!(calculate_score(20.0), 20);
    }

    #[test]
    fn six_seconds_scores_seventy_six() {
        assert_eq!(calculate_score(6.0), 76);
    }

    #[test]
    fn elapsed_beyond_round_time_clamps_to_min() {
        assert_eq!(calculate_score(25.0), MIN_SCORE);
        assert_eq!(calculate_score(1e9), MIN_SCORE);
    }

    #[test]
    fn negative_elapsed_clamps_to_max() {
        assert_eq!(calculate_score(-0.5), MAX_SCORE);
        assert_eq!(calculate_score(-1e9), MAX_SCORE);
    }

    #[test]
    fn score_never_increases_with_time() {
        let mut previous = calculate_score(0.0);
        let mut t = 0.0_f64;
        while t <= 21.0 {
            let score = calculate_score(t);
            assert!(
                score <= previous,
                "score went up between {:.2}s ({previous}) and {t:.2}s ({score})",
                t - 0.05,
            );
            previous = score;
            t += 0.05;
        }
    }

    #[test]
    fn rules_default_to_live_tuning() {
        let rules = GameRules::default();
        assert_eq!(rules.round_time, ROUND_TIME);
        assert_eq!(rules.total_rounds, TOTAL_ROUNDS);
        assert!((rules.accept_confidence - ACCEPT_CONFIDENCE).abs() < f64::EPSILON);
    }
}
