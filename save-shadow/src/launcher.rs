//! Game launch collaborators.
//!
//! The stored launcher reference is turned into an executable path by a
//! [`LauncherResolver`] and started by a [`ProcessLauncher`]. Both are
//! traits so the platform mechanism (a plain path, a Windows shortcut) stays
//! out of the engine.

use crate::utils::{Result, SyncError};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::info;

/// Turns a stored launcher reference into a runnable executable path
pub trait LauncherResolver: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<PathBuf>;
}

/// Starts the game; fire-and-forget
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, executable: &Path) -> std::io::Result<()>;
}

/// Treats the reference as the executable's path
#[derive(Debug, Clone, Default)]
pub struct PathResolver;

impl LauncherResolver for PathResolver {
    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(SyncError::LauncherUnresolved("no launcher configured".to_string()));
        }

        let path = PathBuf::from(reference);
        if path.is_file() {
            Ok(path)
        } else {
            Err(SyncError::LauncherUnresolved(format!(
                "{} is not an existing file",
                path.display()
            )))
        }
    }
}

/// Resolves `.lnk` shortcuts through PowerShell's `WScript.Shell`; any other
/// reference is handled like [`PathResolver`].
#[cfg(windows)]
#[derive(Debug, Clone, Default)]
pub struct ShortcutResolver;

#[cfg(windows)]
impl LauncherResolver for ShortcutResolver {
    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        let is_shortcut = Path::new(reference)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("lnk"));
        if !is_shortcut {
            return PathResolver.resolve(reference);
        }
        if !Path::new(reference).is_file() {
            return Err(SyncError::LauncherUnresolved(format!("{} does not exist", reference)));
        }

        let script = format!(
            "(New-Object -ComObject WScript.Shell).CreateShortcut('{}').TargetPath",
            reference.replace('\'', "''")
        );
        let output = Command::new("powershell")
            .args(["-NoProfile", "-Command", &script])
            .output()
            .map_err(|e| SyncError::LauncherUnresolved(format!("powershell: {}", e)))?;

        let target = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() || target.is_empty() {
            return Err(SyncError::LauncherUnresolved(format!(
                "shortcut {} has no target",
                reference
            )));
        }

        PathResolver.resolve(&target)
    }
}

/// Spawns the executable detached from our stdio
#[derive(Debug, Clone, Default)]
pub struct CommandLauncher;

impl ProcessLauncher for CommandLauncher {
    fn launch(&self, executable: &Path) -> std::io::Result<()> {
        let mut command = Command::new(executable);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = executable.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let child = command.spawn()?;
        info!(pid = child.id(), executable = %executable.display(), "Game launched");
        Ok(())
    }
}

/// Resolver for the current platform
pub fn default_resolver() -> Box<dyn LauncherResolver> {
    #[cfg(windows)]
    {
        Box::new(ShortcutResolver)
    }
    #[cfg(not(windows))]
    {
        Box::new(PathResolver)
    }
}
