//! Building `DeviceIdentity` values for each transport.

use super::types::DeviceIdentity;

/// Roots that always mean the primary (internal) storage.
const INTERNAL_STORAGE_ROOTS: [&str; 3] = ["/storage/emulated/0", "/storage/self/primary", "/sdcard"];

/// Rough classification of a shell-transport storage root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Internal,
    SdCard,
    Other,
}

impl StorageKind {
    /// Classifies a storage root by its mount point.
    pub fn classify(storage_root: &str) -> Self {
        let lower = storage_root.to_lowercase();
        if INTERNAL_STORAGE_ROOTS.contains(&lower.as_str()) {
            Self::Internal
        } else if lower.contains("sdcard") {
            Self::SdCard
        } else {
            Self::Other
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Internal => "Internal Storage",
            Self::SdCard => "SD Card",
            Self::Other => "Storage",
        }
    }
}

/// Turns a raw model string like "SM-G991U" into "Samsung G991U".
pub fn friendly_model_name(model: &str) -> String {
    model
        .replace("SM_", "Samsung ")
        .replace("SM-", "Samsung ")
        .replace('_', " ")
        .trim()
        .to_string()
}

impl DeviceIdentity {
    /// Identity for a shell-transport device: serial, model and a discovered root.
    pub fn for_shell_device(serial: &str, model: &str, storage_root: &str) -> Self {
        let model = if model.trim().is_empty() { serial } else { model };
        let display_name = format!(
            "{} ({})",
            friendly_model_name(model),
            StorageKind::classify(storage_root).label()
        );
        Self::new(serial, storage_root, display_name)
    }

    /// Identity for a native-transport device. The transport already reports a
    /// friendly name, so the display name is just "{name} - {storage folder}".
    pub fn for_native_device(device_id: &str, friendly_name: &str, storage_root: &str) -> Self {
        let folder = storage_root
            .trim_end_matches(['/', '\\'])
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(storage_root);
        Self::new(device_id, storage_root, format!("{friendly_name} - {folder}"))
    }
}
