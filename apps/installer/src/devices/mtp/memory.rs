//! In-memory `MediaBackend` for tests.
//!
//! Clones share state, so a test can unplug a device or inspect files while the
//! transport owns another handle.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use super::backend::{MediaBackend, MediaObject, components, join_components};
use crate::devices::errors::DeviceError;

#[derive(Default)]
struct MemoryDevice {
    friendly_name: String,
    storages: Vec<String>,
    folders: BTreeSet<String>,
    files: BTreeMap<String, (Vec<u8>, DateTime<Utc>)>,
}

#[derive(Default)]
struct MemoryState {
    devices: BTreeMap<String, MemoryDevice>,
    closed: Vec<String>,
    clock: i64,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

/// Canonical form of a path: `\`-separated with a leading separator.
fn canonical(path: &str) -> String {
    join_components(&components(path))
}

fn parent_of(path: &str) -> String {
    let parts = components(path);
    join_components(&parts[..parts.len().saturating_sub(1)])
}

fn unavailable(device_id: &str) -> DeviceError {
    DeviceError::DeviceUnavailable {
        device_id: device_id.to_string(),
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub fn add_device(&self, device_id: &str, friendly_name: &str, storages: &[&str]) {
        let mut device = MemoryDevice {
            friendly_name: friendly_name.to_string(),
            ..MemoryDevice::default()
        };
        for storage in storages {
            device.storages.push(storage.to_string());
            device.folders.insert(join_components(&[*storage]));
        }
        self.lock().devices.insert(device_id.to_string(), device);
    }

    pub fn unplug(&self, device_id: &str) {
        self.lock().devices.remove(device_id);
    }

    /// Removes a storage and everything on it, as when a card is ejected.
    pub fn remove_storage(&self, device_id: &str, storage: &str) {
        let mut state = self.lock();
        let device = state.devices.get_mut(device_id).unwrap();
        let root = join_components(&[storage]);
        let prefix = format!("{root}\\");
        device.storages.retain(|s| s != storage);
        device.folders.retain(|f| *f != root && !f.starts_with(&prefix));
        device.files.retain(|f, _| !f.starts_with(&prefix));
    }

    /// Adds a folder and all its ancestors.
    pub fn add_folder(&self, device_id: &str, path: &str) {
        let mut state = self.lock();
        let device = state.devices.get_mut(device_id).unwrap();
        let parts = components(path);
        for depth in 1..=parts.len() {
            device.folders.insert(join_components(&parts[..depth]));
        }
    }

    pub fn add_file(&self, device_id: &str, path: &str, data: &[u8]) {
        self.add_folder(device_id, &parent_of(path));
        let mut state = self.lock();
        let modified = tick(&mut state);
        let device = state.devices.get_mut(device_id).unwrap();
        device.files.insert(canonical(path), (data.to_vec(), modified));
    }

    pub fn file(&self, device_id: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.lock();
        state.devices.get(device_id)?.files.get(&canonical(path)).map(|(data, _)| data.clone())
    }

    pub fn is_folder(&self, device_id: &str, path: &str) -> bool {
        let state = self.lock();
        state
            .devices
            .get(device_id)
            .is_some_and(|device| device.folders.contains(&canonical(path)))
    }

    /// Device IDs passed to `close`, in order.
    pub fn closed(&self) -> Vec<String> {
        self.lock().closed.clone()
    }

    fn with_device<R>(
        &self,
        device_id: &str,
        f: impl FnOnce(&mut MemoryDevice, DateTime<Utc>) -> Result<R, DeviceError>,
    ) -> Result<R, DeviceError> {
        let mut state = self.lock();
        let now = tick(&mut state);
        let device = state.devices.get_mut(device_id).ok_or_else(|| unavailable(device_id))?;
        f(device, now)
    }
}

fn tick(state: &mut MemoryState) -> DateTime<Utc> {
    state.clock += 1;
    Utc.timestamp_opt(1_700_000_000 + state.clock, 0).unwrap()
}

impl MemoryDevice {
    fn object(&self, path: &str) -> Option<MediaObject> {
        let path = canonical(path);
        if self.folders.contains(&path) {
            return Some(MediaObject {
                path,
                is_directory: true,
                size: 0,
                modified: None,
            });
        }
        self.files.get(&path).map(|(data, modified)| MediaObject {
            path: path.clone(),
            is_directory: false,
            size: data.len() as u64,
            modified: Some(*modified),
        })
    }

    fn require_folder(&self, path: &str) -> Result<(), DeviceError> {
        if self.folders.contains(&canonical(path)) {
            Ok(())
        } else {
            Err(DeviceError::Protocol {
                device_id: String::new(),
                message: format!("InvalidParentObject: {path}"),
            })
        }
    }
}

impl MediaBackend for MemoryBackend {
    fn list_devices(&mut self) -> Result<Vec<String>, DeviceError> {
        Ok(self.lock().devices.keys().cloned().collect())
    }

    fn friendly_name(&mut self, device_id: &str) -> Result<String, DeviceError> {
        self.with_device(device_id, |device, _| Ok(device.friendly_name.clone()))
    }

    fn storage_roots(&mut self, device_id: &str) -> Result<Vec<String>, DeviceError> {
        self.with_device(device_id, |device, _| {
            Ok(device.storages.iter().map(|s| join_components(&[s.as_str()])).collect())
        })
    }

    fn object(&mut self, device_id: &str, path: &str) -> Result<Option<MediaObject>, DeviceError> {
        self.with_device(device_id, |device, _| Ok(device.object(path)))
    }

    fn children(&mut self, device_id: &str, path: &str) -> Result<Vec<MediaObject>, DeviceError> {
        self.with_device(device_id, |device, _| {
            let parent = canonical(path);
            let names = device.folders.iter().chain(device.files.keys());
            let children = names
                .filter(|p| **p != parent && parent_of(p) == parent)
                .filter_map(|p| device.object(p))
                .collect();
            Ok(children)
        })
    }

    fn create_folder(&mut self, device_id: &str, path: &str) -> Result<(), DeviceError> {
        self.with_device(device_id, |device, _| {
            device.require_folder(&parent_of(path))?;
            device.folders.insert(canonical(path));
            Ok(())
        })
    }

    fn upload(&mut self, device_id: &str, path: &str, data: Vec<u8>) -> Result<u64, DeviceError> {
        self.with_device(device_id, |device, now| {
            device.require_folder(&parent_of(path))?;
            if device.object(path).is_some() {
                return Err(DeviceError::Protocol {
                    device_id: device_id.to_string(),
                    message: format!("Object already exists: {path}"),
                });
            }
            let size = data.len() as u64;
            device.files.insert(canonical(path), (data, now));
            Ok(size)
        })
    }

    fn download(&mut self, device_id: &str, path: &str, sink: &mut dyn Write) -> Result<u64, DeviceError> {
        self.with_device(device_id, |device, _| {
            let (data, _) = device
                .files
                .get(&canonical(path))
                .ok_or_else(|| DeviceError::RemoteFileNotFound { path: path.to_string() })?;
            sink.write_all(data).map_err(|e| DeviceError::LocalIo {
                path: path.to_string(),
                message: e.to_string(),
            })?;
            Ok(data.len() as u64)
        })
    }

    fn delete(&mut self, device_id: &str, path: &str) -> Result<(), DeviceError> {
        self.with_device(device_id, |device, _| {
            device.files.remove(&canonical(path));
            Ok(())
        })
    }

    fn close(&mut self, device_id: &str) {
        self.lock().closed.push(device_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::mtp::backend::child_path;

    #[test]
    fn test_children_are_direct_only() {
        let mut backend = MemoryBackend::new();
        backend.add_device("mtp-1", "Pixel 8", &["Internal shared storage"]);
        backend.add_folder("mtp-1", "\\Internal shared storage\\DCIM\\Camera");
        backend.add_file("mtp-1", "\\Internal shared storage\\DCIM\\a.jpg", b"jpeg");

        let mut children = backend.children("mtp-1", "\\Internal shared storage\\DCIM").unwrap();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].path, "\\Internal shared storage\\DCIM\\Camera");
        assert!(children[0].is_directory);
        assert_eq!(children[1].size, 4);
    }

    #[test]
    fn test_upload_requires_parent() {
        let mut backend = MemoryBackend::new();
        backend.add_device("mtp-1", "Pixel 8", &["Internal shared storage"]);
        let err = backend
            .upload("mtp-1", &child_path("\\Internal shared storage\\missing", "a.kmz"), vec![1])
            .unwrap_err();
        assert!(matches!(err, DeviceError::Protocol { .. }));
    }
}
