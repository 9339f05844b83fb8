//! Periodic capture timer.
//!
//! At most one timer task exists per scheduler. The task runs each cycle on
//! the blocking pool and awaits it before the next tick, so cycles never
//! overlap; ticks missed while a cycle overran are skipped. Replacing a timer
//! hands the old task's handle to the new one, which waits for it before its
//! first cycle.

use crate::executor::CycleReport;
use crate::utils::{Result, SyncError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A blocking unit of work run on every tick
pub trait CaptureJob: Send + Sync + 'static {
    fn run_cycle(&self) -> CycleReport;
}

#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// A scheduled cycle finished, successfully or not
    CycleCompleted(CycleReport),
    /// A timer task exited (stop, shutdown or replacement)
    Stopped,
}

struct Timer {
    period: Duration,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

enum State {
    Idle { draining: Option<JoinHandle<()>> },
    Running(Timer),
}

pub struct CaptureScheduler<J: CaptureJob> {
    job: Arc<J>,
    state: Mutex<State>,
    events: broadcast::Sender<CaptureEvent>,
}

impl<J: CaptureJob> CaptureScheduler<J> {
    pub fn new(job: Arc<J>) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            job,
            state: Mutex::new(State::Idle { draining: None }),
            events,
        }
    }

    /// Start the timer with a cycle right away. Restarts the timer when
    /// already running.
    pub fn start(&self, period: Duration) -> Result<()> {
        self.launch(period, Duration::ZERO)
    }

    /// Start the timer with the first cycle one period from now
    pub fn start_deferred(&self, period: Duration) -> Result<()> {
        self.launch(period, period)
    }

    /// Replace the running timer with one of a new period. Returns false and
    /// does nothing when idle.
    pub fn reconfigure(&self, period: Duration) -> Result<bool> {
        if period.is_zero() {
            return Err(SyncError::InvalidInterval(0));
        }
        let mut state = self.lock_state();
        if !matches!(*state, State::Running(_)) {
            return Ok(false);
        }
        self.replace_timer(&mut state, period, Duration::ZERO);
        Ok(true)
    }

    /// Cancel the timer without waiting for it. An in-flight cycle finishes;
    /// no further ticks fire.
    pub fn stop(&self) -> bool {
        let mut state = self.lock_state();
        match std::mem::replace(&mut *state, State::Idle { draining: None }) {
            State::Running(timer) => {
                timer.cancel.cancel();
                *state = State::Idle {
                    draining: Some(timer.handle),
                };
                info!("Capture timer stopped");
                true
            }
            idle => {
                *state = idle;
                false
            }
        }
    }

    /// Stop and wait for the timer task to exit
    pub async fn shutdown(&self) {
        self.stop();
        let draining = match &mut *self.lock_state() {
            State::Idle { draining } => draining.take(),
            State::Running(_) => None,
        };
        if let Some(handle) = draining {
            if let Err(e) = handle.await {
                warn!(error = %e, "Capture timer task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock_state(), State::Running(_))
    }

    pub fn period(&self) -> Option<Duration> {
        match &*self.lock_state() {
            State::Running(timer) => Some(timer.period),
            State::Idle { .. } => None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }

    fn launch(&self, period: Duration, first_delay: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(SyncError::InvalidInterval(0));
        }
        let mut state = self.lock_state();
        self.replace_timer(&mut state, period, first_delay);
        Ok(())
    }

    fn replace_timer(&self, state: &mut MutexGuard<'_, State>, period: Duration, first_delay: Duration) {
        let previous = match std::mem::replace(&mut **state, State::Idle { draining: None }) {
            State::Idle { draining } => draining,
            State::Running(timer) => {
                timer.cancel.cancel();
                Some(timer.handle)
            }
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_timer(
            Arc::clone(&self.job),
            period,
            first_delay,
            cancel.clone(),
            self.events.clone(),
            previous,
        ));

        info!(period_secs = period.as_secs_f64(), deferred = !first_delay.is_zero(), "Capture timer started");
        **state = State::Running(Timer { period, cancel, handle });
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<J: CaptureJob> Drop for CaptureScheduler<J> {
    fn drop(&mut self) {
        if let State::Running(timer) = &*self.lock_state() {
            timer.cancel.cancel();
        }
    }
}

async fn run_timer<J: CaptureJob>(
    job: Arc<J>,
    period: Duration,
    first_delay: Duration,
    cancel: CancellationToken,
    events: broadcast::Sender<CaptureEvent>,
    previous: Option<JoinHandle<()>>,
) {
    // The previous timer is already cancelled; let its in-flight cycle finish
    if let Some(previous) = previous {
        if let Err(e) = previous.await {
            warn!(error = %e, "Previous capture timer ended abnormally");
        }
    }

    let mut interval = tokio::time::interval_at(Instant::now() + first_delay, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let job = Arc::clone(&job);
                match tokio::task::spawn_blocking(move || job.run_cycle()).await {
                    Ok(report) => {
                        // No receivers is fine
                        let _ = events.send(CaptureEvent::CycleCompleted(report));
                    }
                    Err(e) => error!(error = %e, "Capture cycle task failed"),
                }
            }
        }
    }

    let _ = events.send(CaptureEvent::Stopped);
    debug!("Capture timer task exited");
}
