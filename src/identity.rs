//! Scoped storage for the local player's display name.
//!
//! The game server never tells a client which roster entry is "you": the
//! only hook is the display name the player entered on the way in. This
//! store pins that name at room entry so the match controller can resolve
//! the local player against the roster exactly once, and clears it when
//! the player leaves.

use std::sync::{Arc, Mutex, PoisonError};

/// Cloneable store for the pinned display name.
///
/// All clones share the same slot. The name is set by the room controller
/// when the server acknowledges entry, read by the match controller during
/// identity resolution, and cleared on leave.
#[derive(Debug, Clone, Default)]
pub struct PlayerIdentity {
    name: Arc<Mutex<Option<String>>>,
}

impl PlayerIdentity {
    /// An empty store (no name pinned).
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the display name the local player entered the room with.
    pub fn set(&self, name: impl Into<String>) {
        let mut slot = self.name.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(name.into());
    }

    /// The pinned name, if a room has been entered.
    pub fn current(&self) -> Option<String> {
        self.name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget the pinned name (called on leave).
    pub fn clear(&self) {
        let mut slot = self.name.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
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
    fn starts_empty() {
        let identity = PlayerIdentity::new();
        assert_eq!(identity.current(), None);
    }

    #[test]
    fn set_then_clear_round_trips() {
        let identity = PlayerIdentity::new();
        identity.set("Alice");
        assert_eq!(identity.current().as_deref(), Some("Alice"));

        identity.clear();
        assert_eq!(identity.current(), None);
    }

    #[test]
    fn clones_share_the_slot() {
        let identity = PlayerIdentity::new();
        let clone = identity.clone();

        identity.set("Bob");
        assert_eq!(clone.current().as_deref(), Some("Bob"));

        clone.clear();
        assert_eq!(identity.current(), None);
    }
}
