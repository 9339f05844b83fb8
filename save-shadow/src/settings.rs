//! Per-user settings document.
//!
//! A small JSON object holding the chosen launcher reference and the capture
//! interval. Other keys written by collaborators are carried through every
//! rewrite untouched. A missing or malformed document yields defaults.

use crate::utils::{Result, SyncError};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// Capture interval used when the document has none
pub const DEFAULT_INTERVAL_MINUTES: u32 = 5;

const LAUNCHER_KEY: &str = "shortcut_path";
const INTERVAL_KEY: &str = "interval";

/// Recognised settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub launcher: Option<String>,
    pub interval_minutes: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            launcher: None,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }
}

impl Settings {
    fn from_document(doc: &Map<String, Value>) -> Self {
        let launcher = doc
            .get(LAUNCHER_KEY)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let interval_minutes = match doc.get(INTERVAL_KEY) {
            None | Some(Value::Null) => DEFAULT_INTERVAL_MINUTES,
            Some(value) => match value.as_u64().and_then(|v| u32::try_from(v).ok()) {
                Some(minutes) if minutes >= 1 => minutes,
                _ => {
                    warn!(%value, "Ignoring invalid capture interval in settings");
                    DEFAULT_INTERVAL_MINUTES
                }
            },
        };

        Self {
            launcher,
            interval_minutes,
        }
    }
}

/// Read-modify-write access to the settings document
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the parent directory and an empty document on first use
    pub fn ensure_exists(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                info!(path = %parent.display(), "Creating settings directory");
                fs::create_dir_all(parent)?;
            }
        }

        if !self.path.exists() {
            self.write_document(&Map::new())?;
            info!(path = %self.path.display(), "Created settings file");
        }

        Ok(())
    }

    /// Load recognised settings; never fails
    pub fn load(&self) -> Settings {
        Settings::from_document(&self.load_document())
    }

    pub fn set_interval(&self, minutes: u32) -> Result<()> {
        if minutes == 0 {
            return Err(SyncError::InvalidInterval(0));
        }
        self.update(|doc| {
            doc.insert(INTERVAL_KEY.to_string(), Value::from(minutes));
        })
    }

    pub fn set_launcher(&self, reference: &str) -> Result<()> {
        self.update(|doc| {
            doc.insert(LAUNCHER_KEY.to_string(), Value::from(reference));
        })
    }

    /// Forget the stored launcher so the user is asked again next time
    pub fn clear_launcher(&self) -> Result<()> {
        self.update(|doc| {
            doc.remove(LAUNCHER_KEY);
        })
    }

    fn update<F>(&self, patch: F) -> Result<()>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        // Only a malformed document may be replaced; an unreadable one is left alone
        let mut doc = match self.read_document() {
            Ok(doc) => doc,
            Err(SyncError::SettingsMalformed(reason)) => {
                warn!(path = %self.path.display(), %reason, "Rewriting malformed settings");
                Map::new()
            }
            Err(e) => return Err(e),
        };
        patch(&mut doc);
        self.write_document(&doc)
    }

    /// Document contents, degrading to an empty object on any problem
    fn load_document(&self) -> Map<String, Value> {
        match self.read_document() {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Using default settings");
                Map::new()
            }
        }
    }

    fn read_document(&self) -> Result<Map<String, Value>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(doc)) => Ok(doc),
            Ok(other) => Err(SyncError::SettingsMalformed(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
            Err(e) => Err(SyncError::SettingsMalformed(e.to_string())),
        }
    }

    /// Write to a sibling temp file, then rename over the document
    fn write_document(&self, doc: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "settings.json".to_string());
        let temp_path = self
            .path
            .with_file_name(format!(".{}.tmp.{}", file_name, std::process::id()));

        let json = serde_json::to_string_pretty(doc)?;
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> SettingsStore {
        SettingsStore::new(temp_dir.path().join("FTLAutoSaveManager/autosaveConfig.json"))
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(store(&temp_dir).load(), Settings::default());
    }

    #[test]
    fn test_ensure_exists_creates_parent_and_empty_document() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        store.ensure_exists().unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&content).unwrap(), Value::Object(Map::new()));

        // Second call leaves existing content alone
        store.set_interval(7).unwrap();
        store.ensure_exists().unwrap();
        assert_eq!(store.load().interval_minutes, 7);
    }

    #[test]
    fn test_malformed_document_degrades_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.ensure_exists().unwrap();
        fs::write(store.path(), "{ not json").unwrap();

        assert_eq!(store.load(), Settings::default());
        assert!(matches!(store.read_document(), Err(SyncError::SettingsMalformed(_))));

        // A write over a malformed document still succeeds
        store.set_interval(3).unwrap();
        assert_eq!(store.load().interval_minutes, 3);
    }

    #[test]
    fn test_unreadable_document_is_not_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        // A directory where the document should be cannot be read as a file
        fs::create_dir_all(store.path().join("keep.json")).unwrap();

        assert_eq!(store.load(), Settings::default());
        assert!(matches!(store.set_interval(9), Err(SyncError::Io(_))));
        assert!(matches!(store.set_launcher("/opt/ftl/FTL"), Err(SyncError::Io(_))));
        assert!(store.path().join("keep.json").is_dir());

        let names: Vec<_> = fs::read_dir(store.path().parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["autosaveConfig.json".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_read_error_leaves_document_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        // Self-referencing link: reading fails, but a rename would replace it
        std::os::unix::fs::symlink(store.path(), store.path()).unwrap();

        assert!(matches!(store.clear_launcher(), Err(SyncError::Io(_))));
        assert!(fs::symlink_metadata(store.path()).unwrap().file_type().is_symlink());
    }

    #[test]
    fn test_non_object_document_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.ensure_exists().unwrap();
        fs::write(store.path(), "[1, 2]").unwrap();

        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn test_invalid_interval_falls_back_to_default() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.ensure_exists().unwrap();

        for raw in [r#"{"interval": 0}"#, r#"{"interval": -4}"#, r#"{"interval": "ten"}"#, r#"{"interval": 2.5}"#] {
            fs::write(store.path(), raw).unwrap();
            assert_eq!(store.load().interval_minutes, DEFAULT_INTERVAL_MINUTES, "{raw}");
        }
    }

    #[test]
    fn test_unknown_fields_survive_rewrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.ensure_exists().unwrap();
        fs::write(
            store.path(),
            r#"{"theme": "dark", "window": {"x": 10}, "interval": 2}"#,
        )
        .unwrap();

        store.set_interval(9).unwrap();
        store.set_launcher("C:/Games/FTL.lnk").unwrap();
        store.clear_launcher().unwrap();

        let doc: Value = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(doc["theme"], "dark");
        assert_eq!(doc["window"]["x"], 10);
        assert_eq!(doc["interval"], 9);
        assert!(doc.get("shortcut_path").is_none());
    }

    #[test]
    fn test_launcher_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        store.set_launcher("/opt/ftl/FTL").unwrap();
        assert_eq!(store.load().launcher.as_deref(), Some("/opt/ftl/FTL"));

        store.clear_launcher().unwrap();
        assert_eq!(store.load().launcher, None);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        assert!(matches!(store.set_interval(0), Err(SyncError::InvalidInterval(0))));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.set_interval(4).unwrap();

        let names: Vec<_> = fs::read_dir(store.path().parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["autosaveConfig.json".to_string()]);
    }
}
