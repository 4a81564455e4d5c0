//! Shell-command transport (Android Debug Bridge).
//!
//! Every filesystem primitive is emulated with a shell command on the device and
//! a parser for its text output (see `parsing`). Storage roots are found
//! heuristically (see `discovery`).

pub mod channel;
pub mod discovery;
mod locate;
pub mod parsing;

#[cfg(test)]
pub(crate) mod fake_shell;

use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use self::channel::{AdbCommandChannel, CommandChannel};
use self::discovery::discover_storage_roots;
use self::parsing::{
    EXISTS_MARKER, directory_test_command, file_test_command, find_directories_command, mkdir_command,
    output_has_marker, parse_find_output, parse_stat_output, remove_command, stat_command,
};
use super::errors::DeviceError;
use super::glob::{NamePattern, file_name};
use super::operations::{DeviceOperations, ensure_local_parent, parent_path};
use super::types::{ConnectionState, DeviceIdentity, RemoteFileStat, TransportKind};

/// `DeviceOperations` over an ADB command channel.
pub struct AdbDeviceOperations<C: CommandChannel = AdbCommandChannel> {
    channel: C,
    /// Relative folder a storage root must contain to be listed, `/`-separated.
    mission_folder: String,
    initialized: bool,
    state: ConnectionState,
}

impl AdbDeviceOperations<AdbCommandChannel> {
    /// Creates an instance backed by the real `adb` executable.
    pub fn new(adb_path: Option<PathBuf>, mission_folder: &str) -> Self {
        Self::with_channel(AdbCommandChannel::new(adb_path), mission_folder)
    }
}

impl<C: CommandChannel> AdbDeviceOperations<C> {
    pub fn with_channel(channel: C, mission_folder: &str) -> Self {
        Self {
            channel,
            mission_folder: mission_folder.replace('\\', "/").trim_matches('/').to_string(),
            initialized: false,
            state: ConnectionState::Disconnected,
        }
    }

    fn ensure_initialized(&self) -> Result<(), DeviceError> {
        if self.initialized {
            Ok(())
        } else {
            Err(DeviceError::TransportUnavailable {
                transport: TransportKind::Adb,
                message: "ADB not initialized, call initialize first".to_string(),
            })
        }
    }

    /// Returns the connected serial after checking the device is still attached.
    ///
    /// A vanished device drops the connection.
    fn live_serial(&mut self) -> Result<String, DeviceError> {
        let serial = match self.state.identity() {
            Some(identity) => identity.id().to_string(),
            None => return Err(DeviceError::NotConnected),
        };

        let still_attached = self
            .channel
            .list_devices()?
            .iter()
            .any(|device| device.serial == serial && device.is_online());
        if !still_attached {
            info!("Device {} has been disconnected", serial);
            self.state = ConnectionState::Disconnected;
            return Err(DeviceError::DeviceUnavailable { device_id: serial });
        }
        Ok(serial)
    }

    fn probe(&mut self, serial: &str, command: &str) -> Result<bool, DeviceError> {
        let output = self.channel.shell(serial, command)?;
        Ok(output_has_marker(&output, EXISTS_MARKER))
    }

    fn file_exists(&mut self, serial: &str, path: &str) -> Result<bool, DeviceError> {
        self.probe(serial, &file_test_command(path))
    }

    /// Storage roots of one device that contain the mission folder.
    fn mission_roots(&mut self, serial: &str) -> Vec<String> {
        let mut roots = Vec::new();
        for root in discover_storage_roots(&mut self.channel, serial) {
            let folder = format!("{}/{}", root.trim_end_matches('/'), self.mission_folder);
            match self.probe(serial, &directory_test_command(&folder)) {
                Ok(true) => roots.push(root),
                Ok(false) => debug!("{} has no {} folder", root, self.mission_folder),
                Err(e) => warn!("Failed to process storage path {} for device {}: {}", root, serial, e),
            }
        }
        roots
    }
}

impl<C: CommandChannel> DeviceOperations for AdbDeviceOperations<C> {
    fn transport(&self) -> TransportKind {
        TransportKind::Adb
    }

    fn initialize(&mut self) -> Result<(), DeviceError> {
        if self.initialized {
            return Ok(());
        }
        self.channel.start_server()?;
        self.initialized = true;
        info!("ADB transport initialized");
        Ok(())
    }

    fn list_devices(&mut self) -> Result<Vec<DeviceIdentity>, DeviceError> {
        self.ensure_initialized()?;

        let mut identities = Vec::new();
        for device in self.channel.list_devices()? {
            if !device.is_online() {
                debug!("Skipping device {} in state {}", device.serial, device.state);
                continue;
            }
            for root in self.mission_roots(&device.serial) {
                identities.push(DeviceIdentity::for_shell_device(&device.serial, &device.model, &root));
            }
        }
        debug!("Found {} usable ADB storage roots", identities.len());
        Ok(identities)
    }

    fn connect(&mut self, identity: &DeviceIdentity) -> Result<(), DeviceError> {
        if self.state.is_connected() {
            self.disconnect();
        }
        self.ensure_initialized()?;

        let attached = self
            .channel
            .list_devices()?
            .into_iter()
            .any(|device| device.serial == identity.id() && device.is_online());
        if !attached {
            return Err(DeviceError::DeviceUnavailable {
                device_id: identity.id().to_string(),
            });
        }

        let available = discover_storage_roots(&mut self.channel, identity.id());
        if !available.iter().any(|root| root == identity.storage_root()) {
            warn!(
                "Storage path {} on {} is no longer accessible",
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
        path.replace('\\', "/")
    }

    fn exists(&mut self, path: &str) -> Result<bool, DeviceError> {
        let serial = self.live_serial()?;
        let path = self.normalize_path(path);
        self.file_exists(&serial, &path)
    }

    fn directory_exists(&mut self, path: &str) -> Result<bool, DeviceError> {
        let serial = self.live_serial()?;
        let path = self.normalize_path(path);
        self.probe(&serial, &directory_test_command(&path))
    }

    fn stat_file(&mut self, path: &str) -> Result<Option<RemoteFileStat>, DeviceError> {
        let serial = self.live_serial()?;
        let path = self.normalize_path(path);
        if !self.file_exists(&serial, &path)? {
            return Ok(None);
        }
        let output = self.channel.shell(&serial, &stat_command(&path))?;
        match parse_stat_output(&path, &output) {
            Some(stat) => Ok(Some(stat)),
            None => Err(DeviceError::Command {
                device_id: serial,
                command: stat_command(&path),
                message: format!("Unexpected stat output: {}", output.trim()),
            }),
        }
    }

    fn list_directories(&mut self, path: &str, pattern: &str, recursive: bool) -> Result<Vec<String>, DeviceError> {
        let matcher = NamePattern::new(pattern).map_err(|e| DeviceError::invalid_pattern(pattern, e))?;
        let serial = self.live_serial()?;
        let path = self.normalize_path(path);
        if !self.probe(&serial, &directory_test_command(&path))? {
            return Ok(Vec::new());
        }

        let output = self.channel.shell(&serial, &find_directories_command(&path, recursive))?;
        Ok(parse_find_output(&path, &output)
            .into_iter()
            .filter(|dir| matcher.matches(file_name(dir)))
            .collect())
    }

    fn upload_file(&mut self, source: &mut dyn Read, destination: &str) -> Result<u64, DeviceError> {
        let serial = self.live_serial()?;
        let destination = self.normalize_path(destination);

        if let Some(parent) = parent_path(&destination) {
            let output = self.channel.shell(&serial, &mkdir_command(parent))?;
            if !output.trim().is_empty() {
                debug!("mkdir -p {}: {}", parent, output.trim());
            }
        }

        let bytes = self.channel.push(&serial, source, &destination)?;
        info!("Uploaded {} bytes to {}", bytes, destination);
        Ok(bytes)
    }

    fn delete_file(&mut self, path: &str) -> Result<(), DeviceError> {
        let serial = self.live_serial()?;
        let path = self.normalize_path(path);
        if !self.file_exists(&serial, &path)? {
            return Ok(());
        }

        let output = self.channel.shell(&serial, &remove_command(&path))?;
        if self.file_exists(&serial, &path)? {
            warn!("Failed to delete {}: {}", path, output.trim());
            return Err(DeviceError::DeleteFailed { path });
        }
        debug!("Deleted {}", path);
        Ok(())
    }

    fn download_file(&mut self, source: &str, destination: &Path) -> Result<u64, DeviceError> {
        let serial = self.live_serial()?;
        let source = self.normalize_path(source);
        if !self.file_exists(&serial, &source)? {
            return Err(DeviceError::RemoteFileNotFound { path: source });
        }

        ensure_local_parent(destination)?;
        let file = File::create(destination).map_err(|e| DeviceError::local_io(destination, e))?;
        let mut writer = BufWriter::new(file);
        let result = self
            .channel
            .pull(&serial, &source, &mut writer)
            .and_then(|bytes| {
                writer
                    .flush()
                    .map(|()| bytes)
                    .map_err(|e| DeviceError::local_io(destination, e))
            });

        match result {
            Ok(bytes) => {
                info!("Downloaded {} ({} bytes) to {}", source, bytes, destination.display());
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
