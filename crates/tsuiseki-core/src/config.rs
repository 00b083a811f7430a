use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::context::TrackerSettings;
use crate::error::CoreError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub recognition: RecognitionConfig,
    pub sync: SyncConfig,
    pub library: LibraryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Seconds between detection ticks.
    pub detection_interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    pub enabled: bool,
    pub detect_media_players: bool,
    pub detect_streaming_media: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub check_player: bool,
    pub wait_player: bool,
    pub update_out_of_root: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub folders: Vec<PathBuf>,
    #[serde(default)]
    pub catalog: String,
    #[serde(default)]
    pub players: String,
    #[serde(default)]
    pub streams: String,
}

impl AppConfig {
    /// Load config: the user file if it exists, otherwise built-in defaults.
    pub fn load() -> Result<Self, CoreError> {
        Self::load_from(&Self::config_path())
    }

    /// Load the config file at `path`, falling back to built-in defaults
    /// when it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        if path.exists() {
            let user_str =
                std::fs::read_to_string(path).map_err(|e| CoreError::Config(e.to_string()))?;
            toml::from_str(&user_str).map_err(|e| CoreError::Config(e.to_string()))
        } else {
            toml::from_str(DEFAULT_CONFIG).map_err(|e| CoreError::Config(e.to_string()))
        }
    }

    /// Write the config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Flags the tracker reads on every tick.
    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            recognition_enabled: self.recognition.enabled,
            detect_media_players: self.recognition.detect_media_players,
            detect_streaming_media: self.recognition.detect_streaming_media,
            check_player: self.sync.check_player,
            wait_player: self.sync.wait_player,
            update_out_of_root: self.sync.update_out_of_root,
            library_folders: self.library.folders.clone(),
        }
    }

    /// User player overrides.
    pub fn players_path(&self) -> PathBuf {
        configured_or(&self.library.players, || {
            Self::config_dir().join("players.toml")
        })
    }

    /// User streaming provider overrides.
    pub fn streams_path(&self) -> PathBuf {
        configured_or(&self.library.streams, || {
            Self::config_dir().join("streams.toml")
        })
    }

    pub fn catalog_path(&self) -> PathBuf {
        configured_or(&self.library.catalog, || Self::data_dir().join("catalog.toml"))
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    fn config_dir() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().to_path_buf())
            .unwrap_or_default()
    }

    fn data_dir() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_default()
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "tsuiseki")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

fn configured_or(configured: &str, default: impl FnOnce() -> PathBuf) -> PathBuf {
    if configured.trim().is_empty() {
        default()
    } else {
        PathBuf::from(configured)
    }
}
