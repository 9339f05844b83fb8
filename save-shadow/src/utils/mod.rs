//! Utility modules for save-shadow.

pub mod errors;
pub mod format;
pub mod logger;

pub use errors::{Operation, Result, SyncError};
