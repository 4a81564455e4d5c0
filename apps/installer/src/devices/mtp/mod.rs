//! Native media-transfer transport (MTP).
//!
//! Each `DeviceOperations` primitive maps onto one or a few object calls on a
//! `MediaBackend`. Paths are native (`\Storage\folder\file`) and pass through
//! `normalize_path` unchanged.

pub mod backend;
pub mod usb;

#[cfg(test)]
pub(crate) mod memory;

use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use self::backend::{MediaBackend, MediaObject, SEPARATOR, components, join_components};
use self::usb::UsbMediaBackend;
use super::errors::DeviceError;
use super::glob::{NamePattern, file_name};
use super::operations::{DeviceOperations, ensure_local_parent};
use super::types::{ConnectionState, DeviceIdentity, RemoteFileStat, TransportKind};

/// `DeviceOperations` over a native media backend.
pub struct MtpDeviceOperations<B: MediaBackend = UsbMediaBackend> {
    backend: B,
    /// Relative folder a storage must contain to be listed, native separators.
    mission_folder: String,
    state: ConnectionState,
}

impl MtpDeviceOperations<UsbMediaBackend> {
    /// Creates an instance talking to USB devices.
    pub fn new(mission_folder: &str) -> Self {
        Self::with_backend(UsbMediaBackend::new(), mission_folder)
    }
}

impl<B: MediaBackend> MtpDeviceOperations<B> {
    pub fn with_backend(backend: B, mission_folder: &str) -> Self {
        Self {
            backend,
            mission_folder: join_components(&components(mission_folder))
                .trim_start_matches(SEPARATOR)
                .to_string(),
            state: ConnectionState::Disconnected,
        }
    }

    /// Returns the connected device ID after checking the device is still attached.
    fn live_device(&mut self) -> Result<String, DeviceError> {
        let device_id = match self.state.identity() {
            Some(identity) => identity.id().to_string(),
            None => return Err(DeviceError::NotConnected),
        };
        if !self.backend.list_devices()?.contains(&device_id) {
            info!("MTP device {} has been disconnected", device_id);
            self.backend.close(&device_id);
            self.state = ConnectionState::Disconnected;
            return Err(DeviceError::DeviceUnavailable { device_id });
        }
        Ok(device_id)
    }

    fn file(&mut self, device_id: &str, path: &str) -> Result<Option<MediaObject>, DeviceError> {
        Ok(self.backend.object(device_id, path)?.filter(|object| !object.is_directory))
    }

    fn identities_for(&mut self, device_id: &str) -> Result<Vec<DeviceIdentity>, DeviceError> {
        let friendly_name = self.backend.friendly_name(device_id)?;
        let mut identities = Vec::new();
        for root in self.backend.storage_roots(device_id)? {
            let folder = format!("{}{SEPARATOR}{}", root.trim_end_matches(SEPARATOR), self.mission_folder);
            match self.backend.object(device_id, &folder) {
                Ok(Some(object)) if object.is_directory => {
                    identities.push(DeviceIdentity::for_native_device(device_id, &friendly_name, &root));
                }
                Ok(_) => debug!("{} has no {} folder", root, self.mission_folder),
                Err(e) => warn!("Failed to check storage {} on {}: {}", root, device_id, e),
            }
        }
        Ok(identities)
    }

    /// Creates every missing folder above `path`.
    fn ensure_parent_folders(&mut self, device_id: &str, path: &str) -> Result<(), DeviceError> {
        let parts = components(path);
        // parts[0] is the storage itself, the last part is the file
        for depth in 2..parts.len() {
            let folder = join_components(&parts[..depth]);
            match self.backend.object(device_id, &folder)? {
                Some(object) if object.is_directory => {}
                Some(_) => {
                    return Err(DeviceError::Protocol {
                        device_id: device_id.to_string(),
                        message: format!("{} is a file, not a folder", folder),
                    });
                }
                None => {
                    debug!("Creating folder {}", folder);
                    self.backend.create_folder(device_id, &folder)?;
                }
            }
        }
        Ok(())
    }
}

impl<B: MediaBackend> DeviceOperations for MtpDeviceOperations<B> {
    fn transport(&self) -> TransportKind {
        TransportKind::Mtp
    }

    fn initialize(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn list_devices(&mut self) -> Result<Vec<DeviceIdentity>, DeviceError> {
        let mut identities = Vec::new();
        for device_id in self.backend.list_devices()? {
            match self.identities_for(&device_id) {
                Ok(found) => identities.extend(found),
                Err(e) => warn!("Failed to process MTP device {}: {}", device_id, e),
            }
        }
        debug!("Found {} usable MTP storages", identities.len());
        Ok(identities)
    }

    fn connect(&mut self, identity: &DeviceIdentity) -> Result<(), DeviceError> {
        if self.state.is_connected() {
            self.disconnect();
        }

        if !self.backend.list_devices()?.iter().any(|id| id == identity.id()) {
            return Err(DeviceError::DeviceUnavailable {
                device_id: identity.id().to_string(),
            });
        }

        let available = self.backend.storage_roots(identity.id())?;
        if !available.iter().any(|root| root == identity.storage_root()) {
            warn!(
                "Storage {} on {} is no longer accessible",
                identity.storage_root(),
                identity.id()
            );
            return Err(DeviceError::StorageUnavailable {
                device_id: identity.id().to_string(),
                storage_root: identity.storage_root().to_string(),
                available,
            });
        }

        info!("Connected to {}", identity);
        self.state = ConnectionState::Connected(identity.clone());
        Ok(())
    }

    fn disconnect(&mut self) {
        if let ConnectionState::Connected(identity) = std::mem::take(&mut self.state) {
            self.backend.close(identity.id());
            info!("Disconnected from {}", identity);
        }
    }

    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    fn connected_device(&self) -> Option<&DeviceIdentity> {
        self.state.identity()
    }

    fn normalize_path(&self, path: &str) -> String {
        path.to_string()
    }

    fn exists(&mut self, path: &str) -> Result<bool, DeviceError> {
        let device_id = self.live_device()?;
        Ok(self.file(&device_id, path)?.is_some())
    }

    fn directory_exists(&mut self, path: &str) -> Result<bool, DeviceError> {
        let device_id = self.live_device()?;
        Ok(self
            .backend
            .object(&device_id, path)?
            .is_some_and(|object| object.is_directory))
    }

    fn stat_file(&mut self, path: &str) -> Result<Option<RemoteFileStat>, DeviceError> {
        let device_id = self.live_device()?;
        Ok(self.file(&device_id, path)?.map(|object| RemoteFileStat {
            path: path.to_string(),
            last_modified: object.modified,
            size_bytes: object.size,
        }))
    }

    fn list_directories(&mut self, path: &str, pattern: &str, recursive: bool) -> Result<Vec<String>, DeviceError> {
        let matcher = NamePattern::new(pattern).map_err(|e| DeviceError::invalid_pattern(pattern, e))?;
        let device_id = self.live_device()?;
        match self.backend.object(&device_id, path)? {
            Some(object) if object.is_directory => {}
            _ => return Ok(Vec::new()),
        }

        let mut found = Vec::new();
        let mut pending = vec![path.to_string()];
        while let Some(folder) = pending.pop() {
            for child in self.backend.children(&device_id, &folder)? {
                if !child.is_directory {
                    continue;
                }
                if recursive {
                    pending.push(child.path.clone());
                }
                if matcher.matches(file_name(&child.path)) {
                    found.push(child.path);
                }
            }
        }
        Ok(found)
    }

    fn upload_file(&mut self, source: &mut dyn Read, destination: &str) -> Result<u64, DeviceError> {
        let device_id = self.live_device()?;

        let mut data = Vec::new();
        source
            .read_to_end(&mut data)
            .map_err(|e| DeviceError::local_io(Path::new(destination), e))?;

        self.ensure_parent_folders(&device_id, destination)?;
        // Objects can't be overwritten in place
        if self.file(&device_id, destination)?.is_some() {
            self.backend.delete(&device_id, destination)?;
        }
        let bytes = self.backend.upload(&device_id, destination, data)?;
        info!("MTP upload complete: {} bytes to {}", bytes, destination);
        Ok(bytes)
    }

    fn delete_file(&mut self, path: &str) -> Result<(), DeviceError> {
        let device_id = self.live_device()?;
        if self.file(&device_id, path)?.is_none() {
            return Ok(());
        }
        self.backend.delete(&device_id, path)?;
        debug!("Deleted {}", path);
        Ok(())
    }

    fn download_file(&mut self, source: &str, destination: &Path) -> Result<u64, DeviceError> {
        let device_id = self.live_device()?;
        if self.file(&device_id, source)?.is_none() {
            return Err(DeviceError::RemoteFileNotFound {
                path: source.to_string(),
            });
        }

        ensure_local_parent(destination)?;
        let file = File::create(destination).map_err(|e| DeviceError::local_io(destination, e))?;
        let mut writer = BufWriter::new(file);
        let result = self
            .backend
            .download(&device_id, source, &mut writer)
            .and_then(|bytes| {
                writer
                    .flush()
                    .map(|()| bytes)
                    .map_err(|e| DeviceError::local_io(destination, e))
            });

        match result {
            Ok(bytes) => {
                info!("MTP download complete: {} bytes to {}", bytes, destination.display());
                Ok(bytes)
            }
            Err(e) => {
                drop(writer);
                if let Err(remove_err) = std::fs::remove_file(destination) {
                    debug!("Couldn't remove partial download {}: {}", destination.display(), remove_err);
                }
                Err(e)
            }
        }
    }
}
