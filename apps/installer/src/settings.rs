//! Settings loading from the JSON settings file.
//!
//! Read once at startup. Keys may be camelCase (as written by the old desktop app)
//! or snake_case.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "mission-installer";
const SETTINGS_FILE_NAME: &str = "settings.json";

pub const DEFAULT_MISSION_FOLDER: &str = "Android/data/dji.go.v5/files/waypoint";
pub const DEFAULT_PREVIEW_FOLDER: &str = "Android/data/dji.go.v5/files/waypoint/map_preview";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Local folder holding the KMZ files to install.
    #[serde(alias = "kmzSourceFolder")]
    pub kmz_source_folder: PathBuf,
    /// Waypoint folder, relative to a storage root.
    #[serde(alias = "missionFolder")]
    pub mission_folder: String,
    /// Preview image folder, relative to a storage root.
    #[serde(alias = "previewFolder")]
    pub preview_folder: String,
    #[serde(alias = "useAdbByDefault")]
    pub use_adb_by_default: bool,
    /// Explicit `adb` executable, searched for when unset.
    #[serde(alias = "adbPath")]
    pub adb_path: Option<PathBuf>,
    #[serde(alias = "previewCacheDir")]
    pub preview_cache_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        let documents = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            kmz_source_folder: documents.join("DJI").join("KMZ"),
            mission_folder: DEFAULT_MISSION_FOLDER.to_string(),
            preview_folder: DEFAULT_PREVIEW_FOLDER.to_string(),
            use_adb_by_default: true,
            adb_path: None,
            preview_cache_dir: std::env::temp_dir().join("DJI_Mission_Installer"),
        }
    }
}

/// Default location: `<config dir>/mission-installer/settings.json`.
pub fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
}

/// Loads settings from the default location.
/// Returns defaults if the file doesn't exist or can't be parsed.
pub fn load_settings() -> Settings {
    match settings_path() {
        Some(path) => load_settings_from(&path),
        None => {
            warn!("No config directory on this system, using default settings");
            Settings::default()
        }
    }
}

pub fn load_settings_from(path: &Path) -> Settings {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            debug!("No settings at {} ({}), using defaults", path.display(), e);
            return Settings::default();
        }
    };
    match serde_json::from_str(&contents) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Couldn't parse {}: {}, using defaults", path.display(), e);
            Settings::default()
        }
    }
}
