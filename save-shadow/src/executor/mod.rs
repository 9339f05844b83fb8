//! Capture cycle executor.
//!
//! One cycle refreshes staging from the live save folder and then freezes
//! staging into a new dated snapshot. Cycles run on the blocking pool and
//! hold the tree lock for their whole duration, so a user-triggered restart
//! or restore never interleaves with a half-finished refresh.

use crate::catalog::SnapshotCatalog;
use crate::fs::mirror::mirror_for;
use crate::scheduler::CaptureJob;
use crate::utils::format::format_elapsed;
use crate::utils::{Operation, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Outcome of one capture cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Files copied into staging by the refresh step
    pub refreshed_files: usize,
    /// Identifier of the snapshot created, if any
    pub snapshot: Option<String>,
    pub errors: Vec<String>,
}

impl CycleReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            elapsed: Duration::ZERO,
            refreshed_files: 0,
            snapshot: None,
            errors: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs capture cycles against one live/staging/backup layout
pub struct CaptureExecutor {
    live: PathBuf,
    staging: PathBuf,
    catalog: SnapshotCatalog,
    tree_lock: Arc<Mutex<()>>,
}

impl CaptureExecutor {
    pub fn new(
        live: impl Into<PathBuf>,
        staging: impl Into<PathBuf>,
        catalog: SnapshotCatalog,
        tree_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            live: live.into(),
            staging: staging.into(),
            catalog,
            tree_lock,
        }
    }

    /// Scheduled cycle: both steps always run, failures are recorded in the
    /// report and logged. Must be called from a blocking context.
    pub fn capture(&self) -> CycleReport {
        let _guard = self.tree_lock.blocking_lock();
        let start_time = Instant::now();
        let mut report = CycleReport::new(Utc::now());

        match mirror_for(Operation::Refresh, &self.live, &self.staging) {
            Ok(refreshed) => report.refreshed_files = refreshed.files_copied,
            Err(e) => {
                warn!(error = %e, "Staging refresh failed");
                report.errors.push(e.to_string());
            }
        }

        match self.catalog.create_snapshot(&self.staging, report.started_at) {
            Ok((id, _)) => report.snapshot = Some(id),
            Err(e) => {
                error!(error = %e, "Snapshot failed");
                report.errors.push(e.to_string());
            }
        }

        report.elapsed = start_time.elapsed();
        if report.is_success() {
            info!(
                snapshot = report.snapshot.as_deref().unwrap_or("-"),
                files = report.refreshed_files,
                elapsed = %format_elapsed(report.elapsed),
                "Capture cycle completed"
            );
        } else {
            warn!(
                snapshot = report.snapshot.as_deref().unwrap_or("-"),
                errors = report.errors.len(),
                "Capture cycle finished with errors"
            );
        }

        report
    }

    /// User-triggered cycle: stops at the first failing step and returns its
    /// error. Must be called from a blocking context.
    pub fn try_capture(&self) -> Result<CycleReport> {
        let _guard = self.tree_lock.blocking_lock();
        let start_time = Instant::now();
        let mut report = CycleReport::new(Utc::now());

        report.refreshed_files = mirror_for(Operation::Capture, &self.live, &self.staging)?.files_copied;
        let (id, _) = self.catalog.create_snapshot(&self.staging, report.started_at)?;
        report.snapshot = Some(id);
        report.elapsed = start_time.elapsed();

        Ok(report)
    }
}

impl CaptureJob for CaptureExecutor {
    fn run_cycle(&self) -> CycleReport {
        self.capture()
    }
}
