//! Error types for device operations.

use mtp_rs::ptp::ResponseCode;

use super::types::TransportKind;

/// Error types for device operations, shared by both transports.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum DeviceError {
    /// The external executable or service behind a transport is missing.
    TransportUnavailable { transport: TransportKind, message: String },
    /// The requested transport name isn't one we know.
    UnsupportedTransport { name: String },
    /// An operation needed a connection and there was none.
    NotConnected,
    /// The device went away between enumeration and use.
    DeviceUnavailable { device_id: String },
    /// The storage root went away between enumeration and use.
    StorageUnavailable {
        device_id: String,
        storage_root: String,
        available: Vec<String>,
    },
    /// Download source doesn't exist.
    RemoteFileNotFound { path: String },
    /// The file was still there after deleting it.
    DeleteFailed { path: String },
    /// A directory search pattern couldn't be compiled.
    InvalidPattern { pattern: String, message: String },
    /// A shell command couldn't be run.
    Command {
        device_id: String,
        command: String,
        message: String,
    },
    /// Native transport reported an error.
    Protocol { device_id: String, message: String },
    /// The device didn't answer in time.
    Timeout { device_id: String },
    /// Reading or writing a local file failed.
    LocalIo { path: String, message: String },
}

impl DeviceError {
    /// Returns true if re-enumerating devices or retrying may fix it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DeviceUnavailable { .. } | Self::StorageUnavailable { .. } | Self::Timeout { .. }
        )
    }

    /// Returns a user-friendly message for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::TransportUnavailable { transport, message } => match transport {
                TransportKind::Adb => format!(
                    "ADB isn't available ({message}). Install the Android SDK Platform Tools or switch to MTP."
                ),
                TransportKind::Mtp => format!("MTP isn't available: {message}"),
            },
            Self::UnsupportedTransport { name } => {
                format!("Unknown connection type \"{name}\". Use \"adb\" or \"mtp\".")
            }
            Self::NotConnected => "No device is connected. Select a device first.".to_string(),
            Self::DeviceUnavailable { .. } => {
                "The device was disconnected. Reconnect it and refresh the device list.".to_string()
            }
            Self::StorageUnavailable {
                storage_root, available, ..
            } => {
                if available.is_empty() {
                    format!("Storage {storage_root} is no longer accessible and no other storage was found.")
                } else {
                    format!(
                        "Storage {storage_root} is no longer accessible. Available: {}",
                        available.join(", ")
                    )
                }
            }
            Self::RemoteFileNotFound { path } => format!("File not found on the device: {path}"),
            Self::DeleteFailed { path } => {
                format!("Couldn't delete {path} on the device. It may be write-protected.")
            }
            Self::InvalidPattern { pattern, .. } => format!("Invalid search pattern: {pattern}"),
            Self::Command { message, .. } => format!("Device command failed: {message}"),
            Self::Protocol { message, .. } => format!("Device reported an error: {message}. Try reconnecting."),
            Self::Timeout { .. } => "The device didn't respond in time. Try again.".to_string(),
            Self::LocalIo { path, message } => format!("Couldn't access {path}: {message}"),
        }
    }
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportUnavailable { transport, message } => {
                write!(f, "Transport {transport} unavailable: {message}")
            }
            Self::UnsupportedTransport { name } => write!(f, "Unsupported transport: {name}"),
            Self::NotConnected => write!(f, "No device connected"),
            Self::DeviceUnavailable { device_id } => write!(f, "Device unavailable: {device_id}"),
            Self::StorageUnavailable {
                device_id,
                storage_root,
                available,
            } => write!(
                f,
                "Storage path {storage_root} on {device_id} is no longer accessible. Available paths: {}",
                available.join(", ")
            ),
            Self::RemoteFileNotFound { path } => write!(f, "Remote file not found: {path}"),
            Self::DeleteFailed { path } => write!(f, "Failed to delete remote file: {path}"),
            Self::InvalidPattern { pattern, message } => write!(f, "Invalid pattern {pattern}: {message}"),
            Self::Command {
                device_id,
                command,
                message,
            } => write!(f, "Command `{command}` failed on {device_id}: {message}"),
            Self::Protocol { device_id, message } => write!(f, "Protocol error for {device_id}: {message}"),
            Self::Timeout { device_id } => write!(f, "Timed out talking to device: {device_id}"),
            Self::LocalIo { path, message } => write!(f, "Local I/O error on {path}: {message}"),
        }
    }
}

impl std::error::Error for DeviceError {}

impl DeviceError {
    pub(crate) fn invalid_pattern(pattern: &str, err: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn local_io(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Maps mtp_rs errors to our error types.
pub(crate) fn map_mtp_error(e: mtp_rs::Error, device_id: &str) -> DeviceError {
    match e {
        mtp_rs::Error::NoDevice | mtp_rs::Error::Disconnected | mtp_rs::Error::SessionNotOpen => {
            DeviceError::DeviceUnavailable {
                device_id: device_id.to_string(),
            }
        }
        mtp_rs::Error::Timeout => DeviceError::Timeout {
            device_id: device_id.to_string(),
        },
        mtp_rs::Error::Cancelled => DeviceError::Protocol {
            device_id: device_id.to_string(),
            message: "Operation cancelled".to_string(),
        },
        mtp_rs::Error::Protocol { code, operation } => {
            let message = match code {
                ResponseCode::DeviceBusy => "Device is busy".to_string(),
                ResponseCode::StoreFull => "Storage is full".to_string(),
                ResponseCode::StoreReadOnly => "Storage is read-only".to_string(),
                ResponseCode::AccessDenied => "Access denied".to_string(),
                _ => format!("{:?} (operation: {:?})", code, operation),
            };
            DeviceError::Protocol {
                device_id: device_id.to_string(),
                message,
            }
        }
        mtp_rs::Error::InvalidData { message } => DeviceError::Protocol {
            device_id: device_id.to_string(),
            message: format!("Invalid data from device: {}", message),
        },
        mtp_rs::Error::Io(io_err) => DeviceError::Protocol {
            device_id: device_id.to_string(),
            message: format!("I/O error: {}", io_err),
        },
        mtp_rs::Error::Usb(usb_err) => DeviceError::Protocol {
            device_id: device_id.to_string(),
            message: format!("USB error: {}", usb_err),
        },
    }
}
