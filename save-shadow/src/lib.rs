//! Save Shadow Library
//!
//! Keeps a game's save folder shadowed in a staging copy and freezes dated
//! snapshots of it on a timer, so a run can be restarted or rolled back.

pub mod catalog;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod executor;
pub mod fs;
pub mod launcher;
pub mod scheduler;
pub mod settings;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use engine::{DirectoryRole, SessionReport, SessionStatus, SyncEngine};
pub use utils::errors::{Result, SyncError};
