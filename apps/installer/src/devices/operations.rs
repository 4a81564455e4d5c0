//! The capability contract every transport implements.

use std::io::Read;
use std::path::Path;

use super::errors::DeviceError;
use super::types::{DeviceIdentity, RemoteFileStat, TransportKind};

/// Remote filesystem operations on one device, independent of transport.
///
/// Implementations:
/// - `AdbDeviceOperations`: emulates every primitive with shell commands
/// - `MtpDeviceOperations`: maps each primitive onto native MTP object calls
///
/// All calls block. Methods take `&mut self` so an instance only ever runs one
/// device command at a time; sharing an instance between threads needs a lock
/// owned by the caller. Paths are absolute device paths, in the syntax returned
/// by [`DeviceOperations::normalize_path`].
pub trait DeviceOperations: Send {
    /// Which transport this instance speaks.
    fn transport(&self) -> TransportKind;

    /// One-time setup. Safe to call more than once.
    fn initialize(&mut self) -> Result<(), DeviceError>;

    /// Lists every attached device and storage root that contains the mission
    /// folder. A device that fails to enumerate is logged and skipped.
    fn list_devices(&mut self) -> Result<Vec<DeviceIdentity>, DeviceError>;

    /// Connects to a previously listed identity, dropping any current connection.
    fn connect(&mut self, identity: &DeviceIdentity) -> Result<(), DeviceError>;

    /// Forgets the current connection. Never fails.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    fn connected_device(&self) -> Option<&DeviceIdentity>;

    /// Converts a local-style path to the transport's path syntax.
    fn normalize_path(&self, path: &str) -> String;

    // ========================================
    // Connected operations
    // ========================================

    /// Whether a regular file exists at `path`.
    fn exists(&mut self, path: &str) -> Result<bool, DeviceError>;

    fn directory_exists(&mut self, path: &str) -> Result<bool, DeviceError>;

    /// Size and modification time, or `None` if the file doesn't exist.
    fn stat_file(&mut self, path: &str) -> Result<Option<RemoteFileStat>, DeviceError>;

    /// Child directories of `path` whose name matches `pattern` (`*` and `?`,
    /// case-insensitive). A missing `path` yields an empty list.
    fn list_directories(&mut self, path: &str, pattern: &str, recursive: bool) -> Result<Vec<String>, DeviceError>;

    /// Writes the whole stream to `destination`, creating parent directories and
    /// replacing an existing file. Returns the number of bytes written.
    fn upload_file(&mut self, source: &mut dyn Read, destination: &str) -> Result<u64, DeviceError>;

    /// Deletes a file. Deleting a missing file is a no-op.
    fn delete_file(&mut self, path: &str) -> Result<(), DeviceError>;

    /// Copies a remote file to a local path, creating local parent directories.
    /// Returns the number of bytes written.
    fn download_file(&mut self, source: &str, destination: &Path) -> Result<u64, DeviceError>;
}

/// Parent directory of a device path, or `None` at the root.
pub(crate) fn parent_path(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches(['/', '\\']);
    let index = trimmed.rfind(['/', '\\'])?;
    if index == 0 {
        return Some(&trimmed[..1]);
    }
    Some(&trimmed[..index])
}

/// Creates the parent directory of a local destination file.
pub(crate) fn ensure_local_parent(destination: &Path) -> Result<(), DeviceError> {
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| DeviceError::local_io(parent, e))?;
    }
    Ok(())
}
