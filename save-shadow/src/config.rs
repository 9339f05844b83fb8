//! Configuration management for save-shadow.
//!
//! Names the three directory roles, the per-user settings document and the
//! session sentinel. Loaded from an optional TOML file; every field has a
//! default derived from the user's home and config directories.

use crate::fs::session::DEFAULT_SENTINEL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Save folder written by the game
    #[serde(default = "default_live_dir")]
    pub live: PathBuf,

    /// Continuously refreshed shadow of `live`
    #[serde(default = "default_staging_dir")]
    pub staging: PathBuf,

    /// Container of dated snapshot directories
    #[serde(default = "default_backup_root")]
    pub backup_root: PathBuf,

    /// JSON settings document (launcher reference, interval)
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// File whose presence marks an in-progress run
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn games_dir() -> PathBuf {
    home_dir().join("Documents").join("My Games")
}

fn default_live_dir() -> PathBuf {
    games_dir().join("FasterThanLight")
}

fn default_staging_dir() -> PathBuf {
    games_dir().join("autosave")
}

fn default_backup_root() -> PathBuf {
    games_dir().join("backup")
}

fn default_settings_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| home_dir().join(".config"))
        .join("FTLAutoSaveManager")
        .join("autosaveConfig.json")
}

fn default_sentinel() -> String {
    DEFAULT_SENTINEL.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            live: default_live_dir(),
            staging: default_staging_dir(),
            backup_root: default_backup_root(),
            settings_file: default_settings_file(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sentinel: default_sentinel(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            paths: PathsConfig::default(),
            session: SessionConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// All directories under `base`; used to sandbox a whole layout
    pub fn rooted_at(base: &Path) -> Self {
        Config {
            paths: PathsConfig {
                live: base.join("live"),
                staging: base.join("staging"),
                backup_root: base.join("backup"),
                settings_file: base.join("settings").join("autosaveConfig.json"),
            },
            session: SessionConfig::default(),
            log: LogConfig::default(),
        }
    }
}
