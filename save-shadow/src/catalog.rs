//! Snapshot catalog: dated copies of the staging tree under the backup root.
//!
//! Snapshot directories are named `YYYY-MM-DD_HH-MM-SS` (UTC). Every field
//! is fixed width and most significant first, so sorting names sorts
//! captures chronologically. Two captures within the same second get a
//! `_NNN` suffix; the bare name sorts before its suffixed successors.
//!
//! A snapshot is populated under a hidden `.incoming-<uuid>` name and
//! renamed into place once complete, so `list` never returns a partial copy.

use crate::fs::mirror::{mirror_for, MirrorReport};
use crate::fs::walker::{calculate_total_size, count_files};
use crate::utils::{Operation, Result, SyncError};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// chrono format of a snapshot name
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

const INCOMING_PREFIX: &str = ".incoming-";
const MAX_SUFFIX: u32 = 999;

/// Size summary of one snapshot
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub id: String,
    pub path: PathBuf,
    pub files: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct SnapshotCatalog {
    root: PathBuf,
}

impl SnapshotCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot identifiers, newest first. Read fresh from disk on every
    /// call; a missing backup root is an empty catalog.
    pub fn list(&self) -> io::Result<Vec<String>> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut ids = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            ids.push(name);
        }

        ids.sort_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    pub fn latest(&self) -> io::Result<Option<String>> {
        Ok(self.list()?.into_iter().next())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.list()?.is_empty())
    }

    /// Directory of snapshot `id`
    pub fn resolve(&self, id: &str) -> Result<PathBuf> {
        if !is_valid_identifier(id) {
            return Err(SyncError::NotFound(id.to_string()));
        }

        let path = self.root.join(id);
        if path.is_dir() {
            Ok(path)
        } else {
            Err(SyncError::NotFound(id.to_string()))
        }
    }

    /// Name for a capture taken at `now` that does not collide with an
    /// existing snapshot.
    pub fn new_identifier(&self, now: DateTime<Utc>) -> io::Result<String> {
        let base = now.format(TIMESTAMP_FORMAT).to_string();
        if !self.root.join(&base).exists() {
            return Ok(base);
        }

        for suffix in 1..=MAX_SUFFIX {
            let candidate = format!("{}_{:03}", base, suffix);
            if !self.root.join(&candidate).exists() {
                return Ok(candidate);
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("more than {} snapshots named {}", MAX_SUFFIX + 1, base),
        ))
    }

    /// Freeze a copy of `source` as a new snapshot
    pub fn create_snapshot(&self, source: &Path, now: DateTime<Utc>) -> Result<(String, MirrorReport)> {
        fs::create_dir_all(&self.root)?;

        let incoming = self.root.join(format!("{}{}", INCOMING_PREFIX, Uuid::new_v4()));
        let report = match mirror_for(Operation::Snapshot, source, &incoming) {
            Ok(report) => report,
            Err(e) => {
                discard(&incoming);
                return Err(e);
            }
        };

        let published = self
            .new_identifier(now)
            .and_then(|id| fs::rename(&incoming, self.root.join(&id)).map(|()| id));

        match published {
            Ok(id) => {
                info!(snapshot = %id, files = report.files_copied, "Snapshot created");
                Ok((id, report))
            }
            Err(e) => {
                discard(&incoming);
                Err(SyncError::Mirror {
                    operation: Operation::Snapshot,
                    from: source.to_path_buf(),
                    to: self.root.clone(),
                    error: e,
                })
            }
        }
    }

    /// Remove leftovers of captures interrupted before their rename
    pub fn sweep_incomplete(&self) -> io::Result<usize> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        for entry in read_dir {
            let entry = entry?;
            if !entry.file_name().to_string_lossy().starts_with(INCOMING_PREFIX) {
                continue;
            }
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Failed to remove incomplete snapshot"),
            }
        }

        if removed > 0 {
            info!(removed, "Removed incomplete snapshots");
        }
        Ok(removed)
    }

    pub fn describe(&self, id: &str) -> Result<SnapshotInfo> {
        let path = self.resolve(id)?;

        let files = count_files(&path)?;
        let bytes = calculate_total_size(&path)?;

        Ok(SnapshotInfo {
            id: id.to_string(),
            path,
            files,
            bytes,
        })
    }
}

/// A plain, visible directory name
fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && !id.contains(['/', '\\'])
        && Path::new(id).components().count() == 1
}

fn discard(incoming: &Path) {
    if incoming.exists() {
        if let Err(e) = fs::remove_dir_all(incoming) {
            warn!(path = %incoming.display(), error = %e, "Failed to remove partial snapshot");
        }
    }
}
