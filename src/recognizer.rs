//! Sketch recognizer boundary.
//!
//! The recognizer is an external collaborator: it takes a still PNG frame
//! of the drawing surface and returns ranked guesses. This module defines
//! the seam ([`Recognizer`]), the pacing machine that decides *when* to ask
//! ([`PredictionScheduler`]), and, behind the `recognizer-http` feature, the
//! HTTP client the live game uses.
//!
//! The core only ever looks at the top-ranked prediction; a round resolves
//! when that label matches the prompt word case-insensitively with enough
//! confidence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::Result;

/// Debounce after a stroke movement while the pen is down.
pub const DRAW_DEBOUNCE: Duration = Duration::from_millis(200);

/// Debounce after the pen lifts.
pub const IDLE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Minimum spacing between recognizer requests.
pub const REQUEST_THROTTLE: Duration = Duration::from_millis(300);

/// One ranked guess from the recognizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    /// Guessed label (one of the model's word classes).
    pub label: String,
    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Prediction {
    /// True when this prediction settles the round for `word`.
    ///
    /// The label comparison ignores case; the confidence bound is
    /// inclusive.
    pub fn matches(&self, word: &str, min_confidence: f64) -> bool {
        self.confidence >= min_confidence && self.label.eq_ignore_ascii_case(word)
    }
}

/// Produces ranked guesses for a PNG frame of the drawing surface.
///
/// Implementations must return predictions in descending confidence
/// order; the round controller only inspects the first entry.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Ask the model what the drawing shows.
    ///
    /// # Errors
    ///
    /// Returns [`SketchDuelError::Recognizer`](crate::error::SketchDuelError::Recognizer)
    /// when the backend is unreachable or answers garbage. Recognizer
    /// failures never end a round; the caller just tries again on the
    /// next scheduled request.
    async fn predict(&self, image_png: &[u8]) -> Result<Vec<Prediction>>;
}

// ── Scheduler ───────────────────────────────────────────────────────

/// Decides when the next recognizer request should go out.
///
/// Mirrors the pacing of the live drawing surface: every stroke movement
/// re-arms a short debounce ([`DRAW_DEBOUNCE`]), lifting the pen arms a
/// longer one ([`IDLE_DEBOUNCE`]), and no two requests fire within
/// [`REQUEST_THROTTLE`] of each other. A fire suppressed by the throttle
/// is dropped, not deferred — the next stroke re-arms the debounce anyway.
///
/// Drive it from a `select!` loop:
///
/// ```rust,ignore
/// tokio::select! {
///     _ = tokio::time::sleep_until(deadline), if scheduler.deadline().is_some() => {
///         if scheduler.should_request() {
///             let predictions = recognizer.predict(&frame).await?;
///             // feed predictions into the round controller
///         }
///     }
///     // ... other branches
/// }
/// ```
#[derive(Debug)]
pub struct PredictionScheduler {
    due: Option<Instant>,
    last_request: Option<Instant>,
}

impl PredictionScheduler {
    pub fn new() -> Self {
        Self {
            due: None,
            last_request: None,
        }
    }

    /// The pen moved while down; re-arm the short debounce.
    pub fn note_stroke(&mut self) {
        self.due = Some(Instant::now() + DRAW_DEBOUNCE);
    }

    /// The pen lifted; arm the long debounce.
    pub fn note_stroke_end(&mut self) {
        self.due = Some(Instant::now() + IDLE_DEBOUNCE);
    }

    /// When the armed debounce fires, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.due
    }

    /// Consume an expired deadline and apply the throttle.
    ///
    /// Returns `true` when a request should go out now. Returns `false`
    /// while no deadline is armed, the deadline has not expired yet, or
    /// the previous request was under [`REQUEST_THROTTLE`] ago (in which
    /// case the fire is dropped).
    pub fn should_request(&mut self) -> bool {
        let now = Instant::now();
        match self.due {
            Some(due) if due <= now => {
                self.due = None;
                let throttled = self
                    .last_request
                    .is_some_and(|last| now.duration_since(last) < REQUEST_THROTTLE);
                if throttled {
                    return false;
                }
                self.last_request = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Drop any armed deadline and throttle history (round teardown).
    pub fn reset(&mut self) {
        self.due = None;
        self.last_request = None;
    }
}

impl Default for PredictionScheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ── HTTP recognizer ─────────────────────────────────────────────────

#[cfg(feature = "recognizer-http")]
mod http {
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde::{Deserialize, Serialize};

    use super::{Prediction, Recognizer};
    use crate::error::{Result, SketchDuelError};

    /// [`Recognizer`] backed by the game's inference service.
    ///
    /// Sends `POST {base_url}/predict` with the frame as base64 PNG and
    /// reads back `{"predictions": [{"label", "confidence"}, ...]}`.
    ///
    /// Only available with the `recognizer-http` feature.
    #[derive(Debug, Clone)]
    pub struct HttpRecognizer {
        base_url: String,
        client: reqwest::Client,
    }

    #[derive(Serialize)]
    struct PredictRequest<'a> {
        image: &'a str,
    }

    #[derive(Deserialize)]
    struct PredictResponse {
        #[serde(default)]
        predictions: Vec<Prediction>,
    }

    impl HttpRecognizer {
        /// Recognizer for the service at `base_url` (no trailing slash).
        pub fn new(base_url: impl Into<String>) -> Self {
            Self {
                base_url: base_url.into(),
                client: reqwest::Client::new(),
            }
        }

        /// Recognizer with a caller-provided [`reqwest::Client`]
        /// (custom timeouts, proxies).
        pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
            Self {
                base_url: base_url.into(),
                client,
            }
        }

        /// The service URL this recognizer posts to.
        pub fn base_url(&self) -> &str {
            &self.base_url
        }
    }

    #[async_trait]
    impl Recognizer for HttpRecognizer {
        async fn predict(&self, image_png: &[u8]) -> Result<Vec<Prediction>> {
            let image = BASE64.encode(image_png);
            let response = self
                .client
                .post(format!("{}/predict", self.base_url))
                .json(&PredictRequest { image: &image })
                .send()
                .await
                .map_err(|e| SketchDuelError::Recognizer(e.to_string()))?
                .error_for_status()
                .map_err(|e| SketchDuelError::Recognizer(e.to_string()))?;

            let body: PredictResponse = response
                .json()
                .await
                .map_err(|e| SketchDuelError::Recognizer(e.to_string()))?;

            Ok(body.predictions)
        }
    }
}

#[cfg(feature = "recognizer-http")]
pub use http::HttpRecognizer;

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

    fn prediction(label: &str, confidence: f64) -> Prediction {
        Prediction {
            label: label.into(),
            confidence,
        }
    }

    #[test]
    fn match_ignores_case_and_holds_the_threshold() {
        assert!(prediction("Cat", 0.9).matches("cat", 0.75));
        assert!(prediction("CAT", 0.75).matches("cat", 0.75));
        assert!(!prediction("cat", 0.74).matches("cat", 0.75));
        assert!(!prediction("dog", 0.99).matches("cat", 0.75));
    }

    #[test]
    fn prediction_deserializes_from_service_shape() {
        let parsed: Prediction =
            serde_json::from_str(r#"{"label":"bicycle","confidence":0.8125}"#).unwrap();
        assert_eq!(parsed.label, "bicycle");
        assert!((parsed.confidence - 0.8125).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn stroke_arms_the_short_debounce() {
        let mut scheduler = PredictionScheduler::new();
        scheduler.note_stroke();

        // Not due yet.
        assert!(!scheduler.should_request());

        tokio::time::advance(DRAW_DEBOUNCE).await;
        assert!(scheduler.should_request());
        // Consumed; a second poll is a no-op.
        assert!(!scheduler.should_request());
    }

    #[tokio::test(start_paused = true)]
    async fn stroke_end_arms_the_long_debounce() {
        let mut scheduler = PredictionScheduler::new();
        scheduler.note_stroke_end();

        tokio::time::advance(DRAW_DEBOUNCE).await;
        assert!(!scheduler.should_request(), "must wait the idle debounce");

        tokio::time::advance(IDLE_DEBOUNCE - DRAW_DEBOUNCE).await;
        assert!(scheduler.should_request());
    }

    #[tokio::test(start_paused = true)]
    async fn later_stroke_replaces_the_armed_deadline() {
        let mut scheduler = PredictionScheduler::new();
        scheduler.note_stroke();

        tokio::time::advance(Duration::from_millis(150)).await;
        // Pen still moving: the deadline pushes out.
        scheduler.note_stroke();

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(
            !scheduler.should_request(),
            "original deadline must not fire"
        );

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(scheduler.should_request());
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_drops_rapid_fires() {
        let mut scheduler = PredictionScheduler::new();

        scheduler.note_stroke();
        tokio::time::advance(DRAW_DEBOUNCE).await;
        assert!(scheduler.should_request());

        // Re-arm immediately; the debounce expires inside the throttle
        // window, so the fire is dropped outright.
        scheduler.note_stroke();
        tokio::time::advance(DRAW_DEBOUNCE).await;
        assert!(!scheduler.should_request());
        assert_eq!(scheduler.deadline(), None, "dropped fire is consumed");

        // Outside the window a fresh arm fires normally.
        scheduler.note_stroke();
        tokio::time::advance(REQUEST_THROTTLE).await;
        assert!(scheduler.should_request());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_pending_state() {
        let mut scheduler = PredictionScheduler::new();
        scheduler.note_stroke();
        scheduler.reset();

        tokio::time::advance(IDLE_DEBOUNCE).await;
        assert!(!scheduler.should_request());
        assert_eq!(scheduler.deadline(), None);
    }

    #[cfg(feature = "recognizer-http")]
    #[test]
    fn http_recognizer_keeps_its_base_url() {
        let recognizer = HttpRecognizer::new("http://localhost:5000");
        assert_eq!(recognizer.base_url(), "http://localhost:5000");
    }
}
