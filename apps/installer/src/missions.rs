//! Waypoint missions on a connected device, and KMZ files on the local disk.
//!
//! A mission is a directory named by a UUID under the mission folder, holding
//! `<id>.kmz`. Its map preview lives at `<preview folder>/<id>/<id>.jpg`.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::devices::glob::file_name;
use crate::devices::{DeviceError, DeviceIdentity, DeviceOperations, TransportKind};
use crate::settings::Settings;

/// Where missions and previews live, relative to a storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionLayout {
    pub mission_folder: String,
    pub preview_folder: String,
}

impl MissionLayout {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            mission_folder: settings.mission_folder.clone(),
            preview_folder: settings.preview_folder.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMission {
    pub id: Uuid,
    pub directory: String,
    pub kmz_path: String,
    pub preview_path: String,
    /// KMZ size, 0 if the mission has no KMZ yet.
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalKmz {
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

fn separator(ops: &dyn DeviceOperations) -> char {
    match ops.transport() {
        TransportKind::Adb => '/',
        TransportKind::Mtp => '\\',
    }
}

/// Absolute device path of `relative` under the connected storage root.
fn device_path(ops: &dyn DeviceOperations, identity: &DeviceIdentity, relative: &str) -> String {
    let sep = separator(ops);
    let relative = relative.replace(['/', '\\'], &sep.to_string());
    ops.normalize_path(&identity.join(&relative, sep))
}

fn child(ops: &dyn DeviceOperations, parent: &str, name: &str) -> String {
    format!("{}{}{}", parent.trim_end_matches(['/', '\\']), separator(ops), name)
}

/// Lists the missions on the connected device, most recently modified first.
pub fn list_missions(ops: &mut dyn DeviceOperations, layout: &MissionLayout) -> Result<Vec<DeviceMission>, DeviceError> {
    let identity = ops.connected_device().cloned().ok_or(DeviceError::NotConnected)?;
    let mission_root = device_path(ops, &identity, &layout.mission_folder);
    let preview_root = device_path(ops, &identity, &layout.preview_folder);

    let mut missions = Vec::new();
    for directory in ops.list_directories(&mission_root, "*", false)? {
        let Ok(id) = Uuid::parse_str(file_name(&directory)) else {
            debug!("Skipping non-mission folder {}", directory);
            continue;
        };
        let kmz_path = child(ops, &directory, &format!("{id}.kmz"));
        let preview_path = child(ops, &child(ops, &preview_root, &id.to_string()), &format!("{id}.jpg"));
        let stat = ops.stat_file(&kmz_path)?;
        missions.push(DeviceMission {
            id,
            directory,
            kmz_path,
            preview_path,
            size_bytes: stat.as_ref().map_or(0, |s| s.size_bytes),
            last_modified: stat.and_then(|s| s.last_modified),
        });
    }

    missions.sort_by(|a, b| b.last_modified.cmp(&a.last_modified).then(a.id.cmp(&b.id)));
    debug!("Found {} missions under {}", missions.len(), mission_root);
    Ok(missions)
}

/// Finds a listed mission by its UUID.
pub fn find_mission(
    ops: &mut dyn DeviceOperations,
    layout: &MissionLayout,
    id: &Uuid,
) -> Result<Option<DeviceMission>, DeviceError> {
    Ok(list_missions(ops, layout)?.into_iter().find(|m| m.id == *id))
}

fn replace_remote_file(ops: &mut dyn DeviceOperations, local: &Path, remote: &str) -> Result<u64, DeviceError> {
    let mut file = File::open(local).map_err(|e| DeviceError::local_io(local, e))?;
    ops.delete_file(remote)?;
    ops.upload_file(&mut file, remote)
}

/// Replaces a mission's KMZ with `local_kmz`, and its preview with `preview` if given.
/// Returns the total number of bytes uploaded.
pub fn install_mission(
    ops: &mut dyn DeviceOperations,
    mission: &DeviceMission,
    local_kmz: &Path,
    preview: Option<&Path>,
) -> Result<u64, DeviceError> {
    if !ops.directory_exists(&mission.directory)? {
        return Err(DeviceError::RemoteFileNotFound {
            path: mission.directory.clone(),
        });
    }

    let mut total = replace_remote_file(ops, local_kmz, &mission.kmz_path)?;
    if let Some(preview) = preview {
        total += replace_remote_file(ops, preview, &mission.preview_path)?;
    }
    info!("Installed {} into mission {} ({} bytes)", local_kmz.display(), mission.id, total);
    Ok(total)
}

/// Downloads the mission preview into `cache_dir`, reusing a cached copy of the
/// same size. Returns `None` if the mission has no preview.
pub fn fetch_preview(
    ops: &mut dyn DeviceOperations,
    mission: &DeviceMission,
    cache_dir: &Path,
) -> Result<Option<PathBuf>, DeviceError> {
    let Some(remote) = ops.stat_file(&mission.preview_path)? else {
        debug!("Mission {} has no preview", mission.id);
        return Ok(None);
    };

    let local = cache_dir.join(format!("{}.jpg", mission.id));
    if let Ok(metadata) = std::fs::metadata(&local)
        && metadata.len() == remote.size_bytes
    {
        debug!("Using cached preview {}", local.display());
        return Ok(Some(local));
    }

    ops.download_file(&mission.preview_path, &local)?;
    Ok(Some(local))
}

/// Lists `*.kmz` files under `folder`, newest first. A missing folder is empty.
pub fn list_local_kmz(folder: &Path) -> Vec<LocalKmz> {
    let mut found: Vec<LocalKmz> = WalkDir::new(folder)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry under {}: {}", folder.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("kmz"))
        })
        .filter_map(|entry| {
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Couldn't read {}: {}", entry.path().display(), e);
                    return None;
                }
            };
            Some(LocalKmz {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.into_path(),
                size_bytes: metadata.len(),
                last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            })
        })
        .collect();

    found.sort_by(|a, b| b.last_modified.cmp(&a.last_modified).then_with(|| a.name.cmp(&b.name)));
    found
}
