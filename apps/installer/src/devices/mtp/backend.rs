//! The object-level API the MTP transport is written against.

use chrono::{DateTime, Utc};
use std::io::Write;

use crate::devices::errors::DeviceError;

/// Native path separator. Paths look like `\Internal shared storage\Android\data`,
/// where the first component names the storage.
pub const SEPARATOR: char = '\\';

/// One object (file or folder) on a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaObject {
    pub path: String,
    pub is_directory: bool,
    /// 0 for folders.
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Native device access: addressing by path, one call per primitive.
///
/// Every call names the device it targets, so an implementation may keep a
/// session per device open between calls.
pub trait MediaBackend: Send {
    /// IDs of every attached device.
    fn list_devices(&mut self) -> Result<Vec<String>, DeviceError>;

    /// The device's own human-readable name.
    fn friendly_name(&mut self, device_id: &str) -> Result<String, DeviceError>;

    /// One absolute root path per storage, for example `\Internal shared storage`.
    fn storage_roots(&mut self, device_id: &str) -> Result<Vec<String>, DeviceError>;

    /// Looks up an object, `None` if nothing is at `path`.
    fn object(&mut self, device_id: &str, path: &str) -> Result<Option<MediaObject>, DeviceError>;

    /// Direct children of the folder at `path`.
    fn children(&mut self, device_id: &str, path: &str) -> Result<Vec<MediaObject>, DeviceError>;

    /// Creates one folder. The parent must exist.
    fn create_folder(&mut self, device_id: &str, path: &str) -> Result<(), DeviceError>;

    /// Creates a file at `path`. The parent must exist and `path` must not.
    fn upload(&mut self, device_id: &str, path: &str, data: Vec<u8>) -> Result<u64, DeviceError>;

    fn download(&mut self, device_id: &str, path: &str, sink: &mut dyn Write) -> Result<u64, DeviceError>;

    fn delete(&mut self, device_id: &str, path: &str) -> Result<(), DeviceError>;

    /// Ends any session held for the device. Never fails.
    fn close(&mut self, device_id: &str);
}

/// Splits a native path into its non-empty components. Both separators are accepted.
pub fn components(path: &str) -> Vec<&str> {
    path.split(['\\', '/']).filter(|c| !c.is_empty()).collect()
}

/// Builds a native path from components.
pub fn join_components(components: &[&str]) -> String {
    let mut path = String::new();
    for component in components {
        path.push(SEPARATOR);
        path.push_str(component);
    }
    path
}

/// Joins a child name onto a native path.
pub fn child_path(parent: &str, name: &str) -> String {
    format!("{}{SEPARATOR}{name}", parent.trim_end_matches(['\\', '/']))
}
