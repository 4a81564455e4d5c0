//! Unified access to a removable Android device's filesystem.
//!
//! # Architecture
//!
//! - `operations`: the `DeviceOperations` contract
//! - `adb`: shell-command transport (Android Debug Bridge)
//! - `mtp`: native media-transfer transport (USB MTP)
//! - `types`, `identity`: values shared by both transports
//! - `errors`: the single `DeviceError` enum
//!
//! Callers get an implementation from `DeviceOperationsFactory`, call
//! `initialize`, pick one of `list_devices`, `connect` to it, and then work with
//! absolute device paths.

pub mod adb;
pub mod errors;
pub mod glob;
pub mod identity;
pub mod mtp;
pub mod operations;
pub mod types;

use log::{info, warn};
use std::path::PathBuf;

pub use adb::AdbDeviceOperations;
pub use errors::DeviceError;
pub use mtp::MtpDeviceOperations;
pub use operations::DeviceOperations;
pub use types::{ConnectionState, DeviceIdentity, RemoteFileStat, TransportKind};

use crate::settings::Settings;

/// Builds `DeviceOperations` implementations by transport kind.
#[derive(Debug, Clone)]
pub struct DeviceOperationsFactory {
    adb_path: Option<PathBuf>,
    mission_folder: String,
}

impl DeviceOperationsFactory {
    pub fn new(mission_folder: &str, adb_path: Option<PathBuf>) -> Self {
        Self {
            adb_path,
            mission_folder: mission_folder.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.mission_folder, settings.adb_path.clone())
    }

    pub fn create(&self, kind: TransportKind) -> Box<dyn DeviceOperations> {
        match kind {
            TransportKind::Adb => Box::new(AdbDeviceOperations::new(self.adb_path.clone(), &self.mission_folder)),
            TransportKind::Mtp => Box::new(MtpDeviceOperations::new(&self.mission_folder)),
        }
    }

    /// Parses `name` ("adb" or "mtp") and creates the matching implementation.
    pub fn create_by_name(&self, name: &str) -> Result<Box<dyn DeviceOperations>, DeviceError> {
        Ok(self.create(name.parse()?))
    }

    /// Creates and initializes the preferred transport. If ADB isn't available,
    /// falls back to MTP.
    pub fn create_initialized(&self, preferred: TransportKind) -> Result<Box<dyn DeviceOperations>, DeviceError> {
        initialize_with_fallback(preferred, |kind| self.create(kind))
    }
}

fn initialize_with_fallback(
    preferred: TransportKind,
    mut create: impl FnMut(TransportKind) -> Box<dyn DeviceOperations>,
) -> Result<Box<dyn DeviceOperations>, DeviceError> {
    let mut ops = create(preferred);
    match ops.initialize() {
        Ok(()) => Ok(ops),
        Err(DeviceError::TransportUnavailable { message, .. }) if preferred == TransportKind::Adb => {
            warn!("ADB unavailable ({}), falling back to MTP", message);
            let mut fallback = create(TransportKind::Mtp);
            fallback.initialize()?;
            info!("Using MTP transport");
            Ok(fallback)
        }
        Err(e) => Err(e),
    }
}
