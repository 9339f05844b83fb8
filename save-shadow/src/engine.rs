//! Session orchestration.
//!
//! [`SyncEngine`] is the surface a front-end drives: begin a play session,
//! restart from staging, restore a snapshot, change the capture interval.
//! Everything that mutates the live or staging trees runs on the blocking
//! pool under one tree lock shared with the capture cycle.

use crate::catalog::{SnapshotCatalog, SnapshotInfo};
use crate::config::{Config, PathsConfig};
use crate::executor::{CaptureExecutor, CycleReport};
use crate::fs::mirror::{mirror_for, MirrorReport};
use crate::fs::SessionGate;
use crate::launcher::{default_resolver, CommandLauncher, LauncherResolver, ProcessLauncher};
use crate::scheduler::{CaptureEvent, CaptureScheduler};
use crate::settings::SettingsStore;
use crate::utils::format::format_interval;
use crate::utils::{Operation, Result, SyncError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryRole {
    Live,
    Staging,
}

/// What `begin_session` did before handing over to the timer
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub executable: PathBuf,
    /// Staging was overwritten from live
    pub seeded_staging: bool,
    /// Snapshot taken because the catalog was empty
    pub seeded_snapshot: Option<String>,
    /// The game could not be started; capturing continues regardless
    pub launch_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub running: bool,
    pub interval_minutes: u32,
    pub live_active: bool,
    pub staging_active: bool,
    pub snapshot_count: usize,
    pub latest_snapshot: Option<String>,
}

pub struct SyncEngine {
    paths: PathsConfig,
    gate: SessionGate,
    settings: Arc<SettingsStore>,
    catalog: SnapshotCatalog,
    executor: Arc<CaptureExecutor>,
    scheduler: CaptureScheduler<CaptureExecutor>,
    tree_lock: Arc<Mutex<()>>,
    resolver: Arc<dyn LauncherResolver>,
    launcher: Arc<dyn ProcessLauncher>,
}

impl SyncEngine {
    /// Engine with the platform's launcher resolution and process spawning
    pub fn new(config: &Config) -> Self {
        Self::with_collaborators(
            config,
            Arc::from(default_resolver()),
            Arc::new(CommandLauncher),
        )
    }

    pub fn with_collaborators(
        config: &Config,
        resolver: Arc<dyn LauncherResolver>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let paths = config.paths.clone();
        let tree_lock = Arc::new(Mutex::new(()));
        let catalog = SnapshotCatalog::new(&paths.backup_root);
        let executor = Arc::new(CaptureExecutor::new(
            &paths.live,
            &paths.staging,
            catalog.clone(),
            Arc::clone(&tree_lock),
        ));

        Self {
            gate: SessionGate::new(config.session.sentinel.clone()),
            settings: Arc::new(SettingsStore::new(&paths.settings_file)),
            scheduler: CaptureScheduler::new(Arc::clone(&executor)),
            paths,
            catalog,
            executor,
            tree_lock,
            resolver,
            launcher,
        }
    }

    /// Create the layout, resolve and remember the launcher, prepare staging
    /// and the catalog, start capturing every `interval_minutes` and launch
    /// the game.
    pub async fn begin_session(&self, launcher_ref: &str, interval_minutes: u32) -> Result<SessionReport> {
        let period = period_of(interval_minutes)?;
        self.ensure_layout().await?;

        let executable = match self.resolver.resolve(launcher_ref) {
            Ok(executable) => executable,
            Err(e) => {
                warn!(reference = launcher_ref, error = %e, "Launcher could not be resolved, forgetting it");
                if let Err(clear) = self.settings.clear_launcher() {
                    warn!(error = %clear, "Failed to clear stored launcher");
                }
                return Err(e);
            }
        };
        self.settings.set_launcher(launcher_ref.trim())?;

        let seeded_staging = {
            let gate = self.gate.clone();
            let live = self.paths.live.clone();
            let staging = self.paths.staging.clone();
            self.with_tree(move || {
                if gate.has_active_session(&staging) {
                    info!(
                        staging = %staging.display(),
                        sentinel = gate.sentinel(),
                        "Staging holds a run in progress, keeping it"
                    );
                    return Ok(false);
                }
                mirror_for(Operation::SeedStaging, &live, &staging)?;
                Ok(true)
            })
            .await?
        };

        let seeded_snapshot = if self.catalog.is_empty()? {
            let report = self.capture_now().await?;
            self.scheduler.start_deferred(period)?;
            report.snapshot
        } else {
            self.scheduler.start(period)?;
            None
        };
        info!(interval = %format_interval(interval_minutes), "Session started");

        let launch_error = match self.launcher.launch(&executable) {
            Ok(()) => None,
            Err(e) => {
                warn!(executable = %executable.display(), error = %e, "Failed to launch game");
                Some(e.to_string())
            }
        };

        Ok(SessionReport {
            executable,
            seeded_staging,
            seeded_snapshot,
            launch_error,
        })
    }

    /// Put the staged copy back over the live folder
    pub async fn restart(&self) -> Result<MirrorReport> {
        let staging = self.paths.staging.clone();
        let live = self.paths.live.clone();
        let report = self
            .with_tree(move || mirror_for(Operation::Restart, &staging, &live))
            .await?;
        info!(files = report.files_copied, "Restarted from staging");
        Ok(report)
    }

    /// Whether staging holds a run worth restarting
    pub fn can_restart(&self) -> bool {
        self.gate.has_active_session(&self.paths.staging)
    }

    pub async fn restore_latest(&self) -> Result<MirrorReport> {
        let latest = self
            .catalog
            .latest()?
            .ok_or_else(|| SyncError::NotFound("no snapshots to restore".to_string()))?;
        self.restore_snapshot(&latest).await
    }

    pub async fn restore_snapshot(&self, id: &str) -> Result<MirrorReport> {
        let snapshot = self.catalog.resolve(id)?;
        let live = self.paths.live.clone();
        let report = self
            .with_tree(move || mirror_for(Operation::Restore, &snapshot, &live))
            .await?;
        info!(snapshot = id, files = report.files_copied, "Snapshot restored");
        Ok(report)
    }

    /// Persist a new interval and retime a running session
    pub fn set_interval(&self, minutes: u32) -> Result<()> {
        let period = period_of(minutes)?;
        self.settings.set_interval(minutes)?;
        if self.scheduler.reconfigure(period)? {
            info!(interval = %format_interval(minutes), "Capture interval changed");
        }
        Ok(())
    }

    pub fn current_interval(&self) -> u32 {
        self.settings.load().interval_minutes
    }

    /// Launcher reference remembered from the last session
    pub fn stored_launcher(&self) -> Option<String> {
        self.settings.load().launcher
    }

    pub fn list_snapshots(&self) -> Result<Vec<String>> {
        Ok(self.catalog.list()?)
    }

    pub fn describe_snapshot(&self, id: &str) -> Result<SnapshotInfo> {
        self.catalog.describe(id)
    }

    pub fn is_session_active(&self, role: DirectoryRole) -> bool {
        self.gate.has_active_session(self.directory(role))
    }

    /// Refresh staging and snapshot it now, surfacing the first failure
    pub async fn capture_now(&self) -> Result<CycleReport> {
        let executor = Arc::clone(&self.executor);
        tokio::task::spawn_blocking(move || executor.try_capture()).await?
    }

    /// Stop capturing; an in-flight cycle still completes
    pub fn stop(&self) -> bool {
        self.scheduler.stop()
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.scheduler.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn status(&self) -> Result<SessionStatus> {
        let snapshots = self.catalog.list()?;
        Ok(SessionStatus {
            running: self.is_running(),
            interval_minutes: self.current_interval(),
            live_active: self.is_session_active(DirectoryRole::Live),
            staging_active: self.is_session_active(DirectoryRole::Staging),
            snapshot_count: snapshots.len(),
            latest_snapshot: snapshots.into_iter().next(),
        })
    }

    /// Create the three directories and the settings document, and drop any
    /// snapshot left half-written by an interrupted capture
    pub async fn ensure_layout(&self) -> Result<()> {
        let paths = self.paths.clone();
        let settings = Arc::clone(&self.settings);
        let catalog = self.catalog.clone();
        tokio::task::spawn_blocking(move || {
            for dir in [&paths.live, &paths.staging, &paths.backup_root] {
                std::fs::create_dir_all(dir)?;
            }
            settings.ensure_exists()?;
            catalog.sweep_incomplete()?;
            Ok(())
        })
        .await?
    }

    pub fn directory(&self, role: DirectoryRole) -> &Path {
        match role {
            DirectoryRole::Live => &self.paths.live,
            DirectoryRole::Staging => &self.paths.staging,
        }
    }

    pub fn backup_root(&self) -> &Path {
        self.catalog.root()
    }

    async fn with_tree<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        // The guard moves into the blocking task so the lock outlives a
        // dropped caller for as long as the tree is being written
        let guard = Arc::clone(&self.tree_lock).lock_owned().await;
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            work()
        })
        .await?
    }
}

fn period_of(minutes: u32) -> Result<Duration> {
    if minutes == 0 {
        return Err(SyncError::InvalidInterval(0));
    }
    Ok(Duration::from_secs(u64::from(minutes) * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::testing::{read_tree, write_files};
    use crate::settings::DEFAULT_INTERVAL_MINUTES;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    struct AcceptAll;

    impl LauncherResolver for AcceptAll {
        fn resolve(&self, reference: &str) -> Result<PathBuf> {
            Ok(PathBuf::from(reference.trim()))
        }
    }

    struct RejectAll;

    impl LauncherResolver for RejectAll {
        fn resolve(&self, reference: &str) -> Result<PathBuf> {
            Err(SyncError::LauncherUnresolved(reference.to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingLauncher {
        launched: StdMutex<Vec<PathBuf>>,
        fail: bool,
    }

    impl ProcessLauncher for RecordingLauncher {
        fn launch(&self, executable: &Path) -> std::io::Result<()> {
            self.launched.lock().unwrap().push(executable.to_path_buf());
            if self.fail {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no such game"))
            } else {
                Ok(())
            }
        }
    }

    fn engine(temp_dir: &TempDir, resolver: Arc<dyn LauncherResolver>) -> (SyncEngine, Arc<RecordingLauncher>) {
        let launcher = Arc::new(RecordingLauncher::default());
        let config = Config::rooted_at(temp_dir.path());
        let engine = SyncEngine::with_collaborators(&config, resolver, launcher.clone());
        (engine, launcher)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_session_capture_and_restore_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, launcher) = engine(&temp_dir, Arc::new(AcceptAll));
        let live = engine.directory(DirectoryRole::Live).to_path_buf();
        let staging = engine.directory(DirectoryRole::Staging).to_path_buf();
        write_files(&live, &[("a.sav", "first"), ("sub/b.sav", "beta")]).unwrap();
        let original = read_tree(&live).unwrap();

        let report = engine.begin_session("/games/FTLGame", 60).await.unwrap();

        assert!(report.seeded_staging);
        assert!(report.launch_error.is_none());
        assert_eq!(read_tree(&staging).unwrap(), original);
        let first = report.seeded_snapshot.expect("first snapshot");
        assert_eq!(engine.list_snapshots().unwrap(), vec![first.clone()]);
        assert_eq!(read_tree(&engine.backup_root().join(&first)).unwrap(), original);
        assert_eq!(launcher.launched.lock().unwrap().as_slice(), [PathBuf::from("/games/FTLGame")]);
        assert_eq!(engine.stored_launcher().as_deref(), Some("/games/FTLGame"));
        assert!(engine.is_running());

        // Retime the running session so its next tick lands one short period from now
        let mut events = engine.subscribe();
        write_files(&live, &[("a.sav", "second"), ("gained.sav", "new")]).unwrap();
        engine.scheduler.start_deferred(Duration::from_millis(300)).unwrap();
        let cycle = loop {
            match tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap() {
                Ok(CaptureEvent::CycleCompleted(cycle)) => break cycle,
                _ => continue,
            }
        };
        engine.stop();
        assert!(cycle.is_success(), "{:?}", cycle.errors);
        let second = cycle.snapshot.unwrap();

        assert_eq!(engine.list_snapshots().unwrap(), vec![second.clone(), first.clone()]);
        assert_eq!(
            std::fs::read_to_string(engine.backup_root().join(&second).join("a.sav")).unwrap(),
            "second"
        );
        assert_eq!(read_tree(&engine.backup_root().join(&first)).unwrap(), original);

        engine.restore_snapshot(&first).await.unwrap();
        assert_eq!(read_tree(&live).unwrap(), original);

        engine.shutdown().await;
        assert!(!engine.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_existing_catalog_starts_timer_immediately() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = engine(&temp_dir, Arc::new(AcceptAll));
        write_files(engine.directory(DirectoryRole::Live), &[("a.sav", "one")]).unwrap();
        engine.ensure_layout().await.unwrap();
        let existing = engine.capture_now().await.unwrap().snapshot.unwrap();
        let mut events = engine.subscribe();

        let report = engine.begin_session("game", 60).await.unwrap();
        assert!(report.seeded_snapshot.is_none());

        let cycle = loop {
            match tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap() {
                Ok(CaptureEvent::CycleCompleted(cycle)) => break cycle,
                _ => continue,
            }
        };
        assert!(cycle.is_success(), "{:?}", cycle.errors);
        let snapshots = engine.list_snapshots().unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[1], existing);
        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_active_staging_is_not_overwritten_by_seed() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = engine(&temp_dir, Arc::new(AcceptAll));
        write_files(engine.directory(DirectoryRole::Live), &[("a.sav", "live")]).unwrap();
        engine.ensure_layout().await.unwrap();
        engine.capture_now().await.unwrap();
        write_files(engine.directory(DirectoryRole::Staging), &[("continue.sav", "run")]).unwrap();
        assert!(engine.is_session_active(DirectoryRole::Staging));

        let report = engine.begin_session("game", 60).await.unwrap();

        assert!(!report.seeded_staging);
        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unresolved_launcher_is_forgotten() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, launcher) = engine(&temp_dir, Arc::new(RejectAll));
        engine.settings.set_launcher("C:/old/FTL.lnk").unwrap();

        let err = engine.begin_session("C:/old/FTL.lnk", 5).await.unwrap_err();

        assert!(matches!(err, SyncError::LauncherUnresolved(_)));
        assert_eq!(engine.stored_launcher(), None);
        assert!(!engine.is_running());
        assert!(launcher.launched.lock().unwrap().is_empty());
        assert!(engine.list_snapshots().unwrap().is_empty());
        // The layout is prepared before the launcher is looked at
        assert!(engine.directory(DirectoryRole::Live).is_dir());
        assert!(engine.directory(DirectoryRole::Staging).is_dir());
        assert!(engine.backup_root().is_dir());
        assert!(engine.settings.path().is_file());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tree_lock_held_until_dropped_work_finishes() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = engine(&temp_dir, Arc::new(AcceptAll));
        let finished = Arc::new(AtomicBool::new(false));

        let work_finished = Arc::clone(&finished);
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            engine.with_tree(move || {
                std::thread::sleep(Duration::from_millis(500));
                work_finished.store(true, Ordering::SeqCst);
                Ok(())
            }),
        )
        .await;
        assert!(abandoned.is_err());

        assert!(engine.tree_lock.try_lock().is_err());
        assert!(!finished.load(Ordering::SeqCst));

        let _guard = tokio::time::timeout(Duration::from_secs(5), engine.tree_lock.lock())
            .await
            .unwrap();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_launch_failure_keeps_capturing() {
        let temp_dir = TempDir::new().unwrap();
        let launcher = Arc::new(RecordingLauncher {
            fail: true,
            ..Default::default()
        });
        let config = Config::rooted_at(temp_dir.path());
        let engine = SyncEngine::with_collaborators(&config, Arc::new(AcceptAll), launcher);

        let report = engine.begin_session("game", 60).await.unwrap();

        assert!(report.launch_error.is_some());
        assert!(engine.is_running());
        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_restart_copies_staging_over_live() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = engine(&temp_dir, Arc::new(AcceptAll));
        let live = engine.directory(DirectoryRole::Live).to_path_buf();
        let staging = engine.directory(DirectoryRole::Staging).to_path_buf();
        write_files(&staging, &[("continue.sav", "sector 3")]).unwrap();
        write_files(&live, &[("continue.sav", "sector 5"), ("extra.sav", "x")]).unwrap();

        assert!(engine.can_restart());
        engine.restart().await.unwrap();

        assert_eq!(read_tree(&live).unwrap(), read_tree(&staging).unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_restore_without_snapshots_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = engine(&temp_dir, Arc::new(AcceptAll));

        assert!(matches!(engine.restore_latest().await, Err(SyncError::NotFound(_))));
        assert!(matches!(
            engine.restore_snapshot("2020-01-01_00-00-00").await,
            Err(SyncError::NotFound(_))
        ));
        assert!(matches!(engine.restore_snapshot("../live").await, Err(SyncError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_interval_persists_and_retimes() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = engine(&temp_dir, Arc::new(AcceptAll));
        assert_eq!(engine.current_interval(), DEFAULT_INTERVAL_MINUTES);

        assert!(matches!(engine.set_interval(0), Err(SyncError::InvalidInterval(0))));
        engine.set_interval(12).unwrap();
        assert_eq!(engine.current_interval(), 12);
        assert!(!engine.is_running());

        engine.begin_session("game", 60).await.unwrap();
        engine.set_interval(30).unwrap();
        assert_eq!(engine.scheduler.period(), Some(Duration::from_secs(30 * 60)));

        let status = engine.status().unwrap();
        assert!(status.running);
        assert_eq!(status.interval_minutes, 30);
        assert!(status.snapshot_count >= 1);
        assert!(status.latest_snapshot.is_some());
        engine.shutdown().await;
    }
}
