//! Session marker detection.
//!
//! A directory holds an in-progress game when the game's sentinel save file
//! sits directly inside it. The marker is only observed here, never written.
//! Presence is a heuristic: a marker left behind by a crashed game still
//! counts as an active session.

use std::path::Path;

/// Sentinel written by the game while a run is in progress
pub const DEFAULT_SENTINEL: &str = "continue.sav";

#[derive(Debug, Clone)]
pub struct SessionGate {
    sentinel: String,
}

impl SessionGate {
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self {
            sentinel: sentinel.into(),
        }
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// True when `dir/<sentinel>` is a regular file. A missing directory is
    /// simply not active.
    pub fn has_active_session(&self, dir: &Path) -> bool {
        dir.join(&self.sentinel).is_file()
    }
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new(DEFAULT_SENTINEL)
    }
}
