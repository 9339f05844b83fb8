//! Filesystem primitives: tree walking, mirroring and session detection.

pub mod mirror;
pub mod session;
pub mod walker;

pub use mirror::{mirror, mirror_for, MirrorFailure, MirrorReport};
pub use session::SessionGate;
