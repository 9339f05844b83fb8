//! Custom error types for save-shadow.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Tree operation a filesystem failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Initial live -> staging copy at session start
    SeedStaging,
    /// Per-cycle live -> staging refresh
    Refresh,
    /// Staging -> new snapshot directory
    Snapshot,
    /// User-triggered capture cycle
    Capture,
    /// Staging -> live
    Restart,
    /// Snapshot -> live
    Restore,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::SeedStaging => "seed staging",
            Operation::Refresh => "refresh staging",
            Operation::Snapshot => "snapshot",
            Operation::Capture => "capture",
            Operation::Restart => "restart",
            Operation::Restore => "restore",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("{operation} failed ({} -> {}): {error}", .from.display(), .to.display())]
    Mirror {
        operation: Operation,
        from: PathBuf,
        to: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error(
        "{operation} incomplete ({} -> {}): {failed} entries failed, {copied} copied; first failure: {first_failure}",
        .from.display(),
        .to.display()
    )]
    Incomplete {
        operation: Operation,
        from: PathBuf,
        to: PathBuf,
        copied: usize,
        failed: usize,
        first_failure: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings document malformed: {0}")]
    SettingsMalformed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Launcher unresolved: {0}")]
    LauncherUnresolved(String),

    #[error("Snapshot not found: {0}")]
    NotFound(String),

    #[error("Invalid capture interval: {0} (must be at least 1 minute)")]
    InvalidInterval(u64),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(e: tokio::task::JoinError) -> Self {
        SyncError::Task(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
