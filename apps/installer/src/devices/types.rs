//! Value types shared by both transports.
//!
//! These types are serialized to JSON when handed to a front end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::DeviceError;

/// The two supported ways of talking to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Shell commands through the Android Debug Bridge.
    Adb,
    /// Media Transfer Protocol over USB.
    Mtp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adb => "adb",
            Self::Mtp => "mtp",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adb" => Ok(Self::Adb),
            "mtp" => Ok(Self::Mtp),
            _ => Err(DeviceError::UnsupportedTransport { name: s.to_string() }),
        }
    }
}

/// One discovered device plus one usable storage root on it.
///
/// Immutable once built. Two identities point at the same target iff `id` and
/// `storage_root` match; the display name is derived and ignored for equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    id: String,
    storage_root: String,
    display_name: String,
}

impl DeviceIdentity {
    pub(crate) fn new(id: impl Into<String>, storage_root: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            storage_root: storage_root.into(),
            display_name: display_name.into(),
        }
    }

    /// Transport-scoped unique ID (ADB serial or "mtp-{location_id}").
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Absolute storage root, in the transport's own path syntax.
    pub fn storage_root(&self) -> &str {
        &self.storage_root
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Joins a relative path onto the storage root using `separator`.
    pub fn join(&self, relative: &str, separator: char) -> String {
        let root = self.storage_root.trim_end_matches(['/', '\\']);
        let relative = relative.trim_start_matches(['/', '\\']);
        if relative.is_empty() {
            return root.to_string();
        }
        format!("{root}{separator}{relative}")
    }
}

impl PartialEq for DeviceIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.storage_root == other.storage_root
    }
}

impl Eq for DeviceIdentity {}

impl std::hash::Hash for DeviceIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.storage_root.hash(state);
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}:{}]", self.display_name, self.id, self.storage_root)
    }
}

/// Point-in-time snapshot of a remote file. Never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFileStat {
    pub path: String,
    /// Second resolution at best. Some transports don't report it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    pub size_bytes: u64,
}

/// Connection state of a `DeviceOperations` instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected(DeviceIdentity),
}

impl ConnectionState {
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        match self {
            Self::Connected(identity) => Some(identity),
            Self::Disconnected => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}
