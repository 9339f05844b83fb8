//! Foreground session runner.

pub mod shutdown;

use crate::engine::SyncEngine;
use crate::scheduler::CaptureEvent;
use crate::utils::format::format_elapsed;
use std::future::Future;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

/// Log capture cycles from `events` until `until` resolves or the session is
/// stopped elsewhere, then stop the timer and wait for any in-flight cycle.
/// Returns the number of cycles observed.
pub async fn run_until<F>(engine: &SyncEngine, mut events: broadcast::Receiver<CaptureEvent>, until: F) -> usize
where
    F: Future<Output = ()>,
{
    let mut cycles = 0;
    tokio::pin!(until);

    loop {
        tokio::select! {
            _ = &mut until => break,
            event = events.recv() => match event {
                Ok(CaptureEvent::CycleCompleted(report)) => {
                    cycles += 1;
                    if report.is_success() {
                        info!(
                            snapshot = report.snapshot.as_deref().unwrap_or("-"),
                            elapsed = %format_elapsed(report.elapsed),
                            "Autosave captured"
                        );
                    } else {
                        for error in &report.errors {
                            warn!(%error, "Autosave cycle error");
                        }
                    }
                }
                Ok(CaptureEvent::Stopped) => {
                    if !engine.is_running() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed capture events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    engine.shutdown().await;
    cycles
}

/// Run until Ctrl+C or SIGTERM
pub async fn run_until_signal(engine: &SyncEngine, events: broadcast::Receiver<CaptureEvent>) -> std::io::Result<usize> {
    let mut signal_error = None;
    let cycles = run_until(engine, events, async {
        match shutdown::wait_for_signal().await {
            Ok(reason) => info!(%reason, "Shutting down"),
            Err(e) => signal_error = Some(e),
        }
    })
    .await;

    match signal_error {
        Some(e) => Err(e),
        None => Ok(cycles),
    }
}
