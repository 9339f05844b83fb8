//! Ctrl+C / SIGTERM handling for a foreground session.

use std::fmt;
use tokio::signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "SIGINT (Ctrl+C)"),
            ShutdownReason::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Wait for SIGINT or, on unix, SIGTERM
pub async fn wait_for_signal() -> std::io::Result<ShutdownReason> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result.map(|()| ShutdownReason::Interrupt),
            _ = terminate.recv() => Ok(ShutdownReason::Terminate),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        Ok(ShutdownReason::Interrupt)
    }
}
