//! Directory traversal for mirroring and snapshot inspection.
//!
//! Entries are produced parent-before-child with paths relative to the walk
//! root, so a consumer can recreate a tree by replaying them in order.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// A file or directory discovered during walking
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Full path to the entry
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// File size in bytes (0 for directories)
    pub size: u64,

    /// Is this a directory?
    pub is_dir: bool,
}

impl TreeEntry {
    /// Create a TreeEntry from a DirEntry.
    /// Symlinks are resolved to their target so the linked file's size is
    /// reported. Returns None for symlinks to directories and broken links.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let raw_metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let (size, is_dir) = if entry.path_is_symlink() {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_dir() => return Ok(None),
                Ok(resolved) => (resolved.len(), false),
                Err(_) => return Ok(None),
            }
        } else if raw_metadata.is_dir() {
            (0, true)
        } else {
            (raw_metadata.len(), false)
        };

        Ok(Some(Self {
            path,
            relative_path,
            size,
            is_dir,
        }))
    }
}

/// Symbolic links are never followed; see [`TreeEntry::from_entry`]
fn walker(root: &Path) -> WalkDir {
    WalkDir::new(root).min_depth(1).follow_links(false).sort_by_file_name()
}

/// Walk a directory tree and collect every file and directory below `root`.
///
/// Any unreadable entry aborts the walk, so a successful return means the
/// whole tree was enumerable.
///
/// # Example
/// ```no_run
/// use save_shadow::fs::walker::walk_tree;
/// use std::path::Path;
///
/// let entries = walk_tree(Path::new("/saves")).unwrap();
/// println!("Found {} entries", entries.len());
/// ```
pub fn walk_tree(root: &Path) -> std::io::Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();

    walk_tree_with_callback(root, |entry| entries.push(entry.clone()))?;

    Ok(entries)
}

/// Walk a directory tree with a callback for each entry
pub fn walk_tree_with_callback<F>(root: &Path, mut callback: F) -> std::io::Result<()>
where
    F: FnMut(&TreeEntry),
{
    for entry in walker(root) {
        let entry = entry?;

        match TreeEntry::from_entry(&entry, root)? {
            Some(tree_entry) => callback(&tree_entry),
            None => tracing::debug!(path = %entry.path().display(), "Skipping directory symlink or broken link"),
        }
    }

    Ok(())
}

/// Count files (not directories) in a tree
pub fn count_files(root: &Path) -> std::io::Result<usize> {
    let mut count = 0;

    walk_tree_with_callback(root, |entry| {
        if !entry.is_dir {
            count += 1;
        }
    })?;

    Ok(count)
}

/// Calculate total size of all files in a tree
pub fn calculate_total_size(root: &Path) -> std::io::Result<u64> {
    let mut total_size = 0u64;

    walk_tree_with_callback(root, |entry| {
        total_size += entry.size;
    })?;

    Ok(total_size)
}

/// Set of relative paths (files and directories) under `root`
pub fn relative_paths(root: &Path) -> std::io::Result<BTreeSet<PathBuf>> {
    let mut paths = BTreeSet::new();

    walk_tree_with_callback(root, |entry| {
        paths.insert(entry.relative_path.clone());
    })?;

    Ok(paths)
}
