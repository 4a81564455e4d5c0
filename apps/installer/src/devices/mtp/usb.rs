//! `MediaBackend` over USB, using `mtp-rs`.
//!
//! mtp-rs is async; this backend owns a current-thread tokio runtime and blocks
//! on each call. Sessions are opened on first use and kept until `close`.

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info, warn};
use mtp_rs::ptp::ObjectFormatCode;
use mtp_rs::{MtpDevice, MtpDeviceBuilder, NewObjectInfo, ObjectHandle, StorageId};
use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tokio::runtime::Runtime;

use super::backend::{MediaBackend, MediaObject, child_path, components, join_components};
use crate::devices::errors::{DeviceError, map_mtp_error};
use crate::devices::operations::parent_path;
use crate::devices::types::TransportKind;

/// Default timeout for MTP operations (30 seconds - some devices are slow).
const MTP_TIMEOUT_SECS: u64 = 30;
/// Transfers get a longer budget.
const MTP_TRANSFER_TIMEOUT_SECS: u64 = MTP_TIMEOUT_SECS * 10;

/// An object found by walking a path from its storage root.
struct Located {
    storage_id: u32,
    /// `ObjectHandle::ROOT` for the storage itself.
    handle: ObjectHandle,
    object: MediaObject,
}

impl Located {
    /// The handle to pass as a parent in mtp-rs calls.
    fn as_parent(&self) -> Option<ObjectHandle> {
        if self.handle == ObjectHandle::ROOT {
            None
        } else {
            Some(self.handle)
        }
    }
}

#[derive(Default)]
pub struct UsbMediaBackend {
    /// Declared before `runtime` so sessions never outlive it.
    sessions: HashMap<String, MtpDevice>,
    runtime: Option<Runtime>,
}

impl UsbMediaBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the runtime and an open session for `device_id`, opening one if needed.
    fn session(&mut self, device_id: &str) -> Result<(&Runtime, &MtpDevice), DeviceError> {
        if self.runtime.is_none() {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| DeviceError::TransportUnavailable {
                    transport: TransportKind::Mtp,
                    message: format!("Failed to start async runtime: {}", e),
                })?;
            self.runtime = Some(runtime);
        }
        let runtime = self.runtime.as_ref().ok_or_else(|| DeviceError::TransportUnavailable {
            transport: TransportKind::Mtp,
            message: "Async runtime unavailable".to_string(),
        })?;

        if !self.sessions.contains_key(device_id) {
            let location_id = parse_device_id(device_id).ok_or_else(|| DeviceError::DeviceUnavailable {
                device_id: device_id.to_string(),
            })?;
            debug!("Opening MTP device {} (timeout={}s)", device_id, MTP_TIMEOUT_SECS);
            let device = runtime
                .block_on(open_device(location_id))
                .map_err(|e| map_mtp_error(e, device_id))?;
            let info = device.device_info();
            info!("MTP session opened: {} {} ({})", info.manufacturer, info.model, device_id);
            self.sessions.insert(device_id.to_string(), device);
        }
        let device = self.sessions.get(device_id).ok_or_else(|| DeviceError::DeviceUnavailable {
            device_id: device_id.to_string(),
        })?;
        Ok((runtime, device))
    }

    /// Runs `op` against the device, dropping the session if the device went away.
    fn run<T>(
        &mut self,
        device_id: &str,
        timeout_secs: u64,
        op: impl AsyncFnOnce(&MtpDevice) -> Result<T, DeviceError>,
    ) -> Result<T, DeviceError> {
        let (runtime, device) = self.session(device_id)?;
        let result = block_on_with_timeout(runtime, device_id, timeout_secs, op(device));
        if matches!(result, Err(DeviceError::DeviceUnavailable { .. })) {
            self.close(device_id);
        }
        result
    }
}

impl MediaBackend for UsbMediaBackend {
    fn list_devices(&mut self) -> Result<Vec<String>, DeviceError> {
        match MtpDevice::list_devices() {
            Ok(devices) => {
                debug!("Found {} MTP device(s)", devices.len());
                Ok(devices
                    .into_iter()
                    .map(|d| {
                        let id = format!("mtp-{}", d.location_id);
                        debug!(
                            "MTP device: id={}, vendor={:04x}, product={:04x}",
                            id, d.vendor_id, d.product_id
                        );
                        id
                    })
                    .collect())
            }
            Err(e) => {
                warn!("Failed to enumerate MTP devices: {}", e);
                Ok(Vec::new())
            }
        }
    }

    fn friendly_name(&mut self, device_id: &str) -> Result<String, DeviceError> {
        let (_, device) = self.session(device_id)?;
        let info = device.device_info();
        let name = if !info.model.trim().is_empty() {
            info.model.trim().to_string()
        } else if !info.manufacturer.trim().is_empty() {
            format!("{} device", info.manufacturer.trim())
        } else {
            device_id.to_string()
        };
        Ok(name)
    }

    fn storage_roots(&mut self, device_id: &str) -> Result<Vec<String>, DeviceError> {
        self.run(device_id, MTP_TIMEOUT_SECS, async |device| {
            let storages = device.storages().await.map_err(|e| map_mtp_error(e, device_id))?;
            Ok(storages
                .iter()
                .map(|storage| join_components(&[storage.info().description.as_str()]))
                .collect())
        })
    }

    fn object(&mut self, device_id: &str, path: &str) -> Result<Option<MediaObject>, DeviceError> {
        self.run(device_id, MTP_TIMEOUT_SECS, async |device| {
            let located = locate(device, path).await.map_err(|e| map_mtp_error(e, device_id))?;
            Ok(located.map(|l| l.object))
        })
    }

    fn children(&mut self, device_id: &str, path: &str) -> Result<Vec<MediaObject>, DeviceError> {
        self.run(device_id, MTP_TIMEOUT_SECS, async |device| {
            let map = |e| map_mtp_error(e, device_id);
            let Some(folder) = locate(device, path).await.map_err(map)? else {
                return Ok(Vec::new());
            };
            if !folder.object.is_directory {
                return Ok(Vec::new());
            }
            let storage = device.storage(StorageId(folder.storage_id)).await.map_err(map)?;
            let infos = storage.list_objects(folder.as_parent()).await.map_err(map)?;
            Ok(infos
                .into_iter()
                .map(|info| {
                    let is_directory = info.format == ObjectFormatCode::Association;
                    let path = child_path(&folder.object.path, &info.filename);
                    to_media_object(path, is_directory, info.size, info.modified)
                })
                .collect())
        })
    }

    fn create_folder(&mut self, device_id: &str, path: &str) -> Result<(), DeviceError> {
        self.run(device_id, MTP_TIMEOUT_SECS, async |device| {
            let map = |e| map_mtp_error(e, device_id);
            let (parent, name) = locate_parent(device, device_id, path).await?;
            let storage = device.storage(StorageId(parent.storage_id)).await.map_err(map)?;
            storage.create_folder(parent.as_parent(), name).await.map_err(map)?;
            debug!("MTP created folder {}", path);
            Ok(())
        })
    }

    fn upload(&mut self, device_id: &str, path: &str, data: Vec<u8>) -> Result<u64, DeviceError> {
        self.run(device_id, MTP_TRANSFER_TIMEOUT_SECS, async move |device| {
            let map = |e| map_mtp_error(e, device_id);
            let (parent, name) = locate_parent(device, device_id, path).await?;
            let storage = device.storage(StorageId(parent.storage_id)).await.map_err(map)?;

            let size = data.len() as u64;
            let object_info = NewObjectInfo::file(name, size);
            // iter's items are ready, which makes the stream Unpin
            let data_stream = futures_util::stream::iter(vec![Ok::<_, std::io::Error>(bytes::Bytes::from(data))]);
            storage
                .upload(parent.as_parent(), object_info, data_stream)
                .await
                .map_err(map)?;
            Ok(size)
        })
    }

    fn download(&mut self, device_id: &str, path: &str, sink: &mut dyn Write) -> Result<u64, DeviceError> {
        self.run(device_id, MTP_TRANSFER_TIMEOUT_SECS, async |device| {
            let map = |e| map_mtp_error(e, device_id);
            let located = locate(device, path)
                .await
                .map_err(map)?
                .filter(|l| !l.object.is_directory)
                .ok_or_else(|| DeviceError::RemoteFileNotFound { path: path.to_string() })?;
            let storage = device.storage(StorageId(located.storage_id)).await.map_err(map)?;
            let mut download = storage.download_stream(located.handle).await.map_err(map)?;

            let mut bytes_written = 0u64;
            while let Some(chunk_result) = download.next_chunk().await {
                let chunk = chunk_result.map_err(|e| DeviceError::Protocol {
                    device_id: device_id.to_string(),
                    message: format!("Download error: {}", e),
                })?;
                sink.write_all(&chunk).map_err(|e| DeviceError::LocalIo {
                    path: path.to_string(),
                    message: e.to_string(),
                })?;
                bytes_written += chunk.len() as u64;
            }
            Ok(bytes_written)
        })
    }

    fn delete(&mut self, device_id: &str, path: &str) -> Result<(), DeviceError> {
        self.run(device_id, MTP_TIMEOUT_SECS, async |device| {
            let map = |e| map_mtp_error(e, device_id);
            let Some(located) = locate(device, path).await.map_err(map)? else {
                return Ok(());
            };
            let storage = device.storage(StorageId(located.storage_id)).await.map_err(map)?;
            storage.delete(located.handle).await.map_err(map)
        })
    }

    fn close(&mut self, device_id: &str) {
        let Some(device) = self.sessions.remove(device_id) else {
            return;
        };
        let Some(runtime) = &self.runtime else {
            return;
        };
        match runtime.block_on(device.close()) {
            Ok(()) => debug!("MTP session closed: {}", device_id),
            Err(e) => debug!("Failed to close MTP session {}: {}", device_id, e),
        }
    }
}

impl Drop for UsbMediaBackend {
    fn drop(&mut self) {
        let open: Vec<String> = self.sessions.keys().cloned().collect();
        for device_id in open {
            self.close(&device_id);
        }
    }
}

/// Parses a device ID like "mtp-336592896" into its USB location ID.
fn parse_device_id(device_id: &str) -> Option<u64> {
    device_id.strip_prefix("mtp-")?.parse().ok()
}

async fn open_device(location_id: u64) -> Result<MtpDevice, mtp_rs::Error> {
    MtpDeviceBuilder::new()
        .timeout(Duration::from_secs(MTP_TIMEOUT_SECS))
        .open_by_location(location_id)
        .await
}

fn block_on_with_timeout<T>(
    runtime: &Runtime,
    device_id: &str,
    timeout_secs: u64,
    future: impl Future<Output = Result<T, DeviceError>>,
) -> Result<T, DeviceError> {
    runtime.block_on(async {
        tokio::time::timeout(Duration::from_secs(timeout_secs), future)
            .await
            .map_err(|_| DeviceError::Timeout {
                device_id: device_id.to_string(),
            })?
    })
}

/// Walks `path` from its storage down, one listing per component.
async fn locate(device: &MtpDevice, path: &str) -> Result<Option<Located>, mtp_rs::Error> {
    let parts = components(path);
    let Some((storage_name, rest)) = parts.split_first() else {
        return Ok(None);
    };

    let storages = device.storages().await?;
    let Some(storage) = storages.iter().find(|s| s.info().description == *storage_name) else {
        return Ok(None);
    };
    let storage_id = storage.id().0;

    let mut located = Located {
        storage_id,
        handle: ObjectHandle::ROOT,
        object: MediaObject {
            path: join_components(&parts[..1]),
            is_directory: true,
            size: 0,
            modified: None,
        },
    };
    for (depth, name) in rest.iter().enumerate() {
        if !located.object.is_directory {
            return Ok(None);
        }
        let infos = storage.list_objects(located.as_parent()).await?;
        let Some(info) = infos.into_iter().find(|info| info.filename == *name) else {
            return Ok(None);
        };
        let is_directory = info.format == ObjectFormatCode::Association;
        located = Located {
            storage_id,
            handle: info.handle,
            object: to_media_object(
                join_components(&parts[..depth + 2]),
                is_directory,
                info.size,
                info.modified,
            ),
        };
    }
    Ok(Some(located))
}

/// Locates the folder that will contain `path` and returns it with the new object's name.
async fn locate_parent<'a>(device: &MtpDevice, device_id: &str, path: &'a str) -> Result<(Located, &'a str), DeviceError> {
    let name = components(path).pop().ok_or_else(|| DeviceError::RemoteFileNotFound { path: path.to_string() })?;
    let parent_path = parent_path(path).ok_or_else(|| DeviceError::RemoteFileNotFound { path: path.to_string() })?;
    let parent = locate(device, parent_path)
        .await
        .map_err(|e| map_mtp_error(e, device_id))?
        .filter(|l| l.object.is_directory)
        .ok_or_else(|| DeviceError::RemoteFileNotFound {
            path: parent_path.to_string(),
        })?;
    Ok((parent, name))
}

fn to_media_object(
    path: String,
    is_directory: bool,
    size: u64,
    modified: Option<mtp_rs::ptp::DateTime>,
) -> MediaObject {
    MediaObject {
        path,
        is_directory,
        size: if is_directory { 0 } else { size },
        modified: modified.and_then(convert_mtp_datetime),
    }
}

/// Converts an MTP timestamp (device local time, treated as UTC) to a `DateTime`.
fn convert_mtp_datetime(dt: mtp_rs::ptp::DateTime) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)?
        .and_hms_opt(dt.hour as u32, dt.minute as u32, dt.second as u32)
        .map(|naive| naive.and_utc())
}
