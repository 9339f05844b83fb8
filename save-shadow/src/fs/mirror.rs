//! One-shot tree mirroring: make `target` identical to `source`.
//!
//! The source is enumerated in full before anything under the target is
//! touched. The target is then emptied bottom-up and every directory and
//! file from the source is recreated at the same relative path. Entries
//! that fail (a save file held open by the game, a permission problem) are
//! collected in the report and the walk carries on.

use crate::fs::walker::walk_tree;
use crate::utils::format::{format_bytes, format_elapsed};
use crate::utils::{Operation, Result, SyncError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Outcome of a mirror run
#[derive(Debug, Clone, Default)]
pub struct MirrorReport {
    pub files_copied: usize,
    pub dirs_created: usize,
    pub bytes_copied: u64,
    /// Entries deleted from the target before copying
    pub removed: usize,
    pub failures: Vec<MirrorFailure>,
}

/// An entry that could not be removed or copied
#[derive(Debug, Clone)]
pub struct MirrorFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl MirrorReport {
    /// True when no entry failed
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn entries_copied(&self) -> usize {
        self.files_copied + self.dirs_created
    }

    fn record_failure(&mut self, path: &Path, reason: impl ToString) {
        let reason = reason.to_string();
        debug!(path = %path.display(), %reason, "Mirror entry failed");
        self.failures.push(MirrorFailure {
            path: path.to_path_buf(),
            reason,
        });
    }
}

/// Make `target` identical to `source`.
///
/// Returns `Err` without modifying `target` when `source` is missing, is not
/// a directory, cannot be fully enumerated, or overlaps `target`. Otherwise
/// returns a report; check [`MirrorReport::is_complete`] for per-entry
/// failures.
pub fn mirror(source: &Path, target: &Path) -> io::Result<MirrorReport> {
    if !fs::metadata(source)?.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", source.display()),
        ));
    }
    ensure_disjoint(source, target)?;

    let entries = walk_tree(source)?;

    fs::create_dir_all(target)?;

    let mut report = MirrorReport::default();
    clear_directory(target, &mut report);

    for entry in &entries {
        let destination = target.join(&entry.relative_path);

        if entry.is_dir {
            match fs::create_dir_all(&destination) {
                Ok(()) => report.dirs_created += 1,
                Err(e) => report.record_failure(&entry.path, e),
            }
        } else {
            match fs::copy(&entry.path, &destination) {
                Ok(bytes) => {
                    report.files_copied += 1;
                    report.bytes_copied += bytes;
                }
                Err(e) => report.record_failure(&entry.path, e),
            }
        }
    }

    debug!(
        source = %source.display(),
        target = %target.display(),
        files = report.files_copied,
        dirs = report.dirs_created,
        removed = report.removed,
        failed = report.failures.len(),
        "Mirror finished"
    );

    Ok(report)
}

/// [`mirror`] with operation context: fatal errors become
/// [`SyncError::Mirror`], an incomplete report becomes
/// [`SyncError::Incomplete`].
pub fn mirror_for(operation: Operation, source: &Path, target: &Path) -> Result<MirrorReport> {
    let start_time = Instant::now();

    let report = mirror(source, target).map_err(|error| SyncError::Mirror {
        operation,
        from: source.to_path_buf(),
        to: target.to_path_buf(),
        error,
    })?;

    if let Some(first) = report.failures.first() {
        warn!(
            %operation,
            source = %source.display(),
            target = %target.display(),
            copied = report.entries_copied(),
            failed = report.failures.len(),
            "Mirror incomplete"
        );
        return Err(SyncError::Incomplete {
            operation,
            from: source.to_path_buf(),
            to: target.to_path_buf(),
            copied: report.entries_copied(),
            failed: report.failures.len(),
            first_failure: format!("{}: {}", first.path.display(), first.reason),
        });
    }

    info!(
        %operation,
        source = %source.display(),
        target = %target.display(),
        files = report.files_copied,
        size = %format_bytes(report.bytes_copied),
        elapsed = %format_elapsed(start_time.elapsed()),
        "Mirror complete"
    );

    Ok(report)
}

/// Delete everything below `dir`, children before parents.
fn clear_directory(dir: &Path, report: &mut MirrorReport) {
    for entry in WalkDir::new(dir).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(dir).to_path_buf();
                report.record_failure(&path, e);
                continue;
            }
        };

        let removed = if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())
        } else {
            fs::remove_file(entry.path())
        };

        match removed {
            Ok(()) => report.removed += 1,
            Err(e) => report.record_failure(entry.path(), e),
        }
    }
}

/// Refuse to mirror a tree into itself or into one of its ancestors.
fn ensure_disjoint(source: &Path, target: &Path) -> io::Result<()> {
    let source = source.canonicalize()?;
    let target = resolve_target(target);

    if target.starts_with(&source) || source.starts_with(&target) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "source {} and target {} overlap",
                source.display(),
                target.display()
            ),
        ));
    }

    Ok(())
}

/// Canonical form of a path that may not exist yet: the deepest existing
/// ancestor is canonicalized and the remaining components appended.
fn resolve_target(target: &Path) -> PathBuf {
    let mut existing = target;
    let mut rest = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return rest.iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return target.to_path_buf(),
        }
    }
}
