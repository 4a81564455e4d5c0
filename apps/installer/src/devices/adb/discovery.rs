//! Storage root discovery on shell-transport devices.
//!
//! Android exposes the same primary storage under several aliases, and which of
//! them actually works depends on the vendor and Android version. We probe a
//! fixed list in order of preference and stop at the first one that is present,
//! listable and writable. If none is, every `/storage/*` entry that can be listed
//! becomes a candidate root instead (typically removable SD cards).

use log::{debug, warn};

use super::channel::CommandChannel;
use super::parsing::{
    EXISTS_MARKER, STORAGE_ENUMERATION_COMMAND, WRITABLE_MARKER, directory_test_command, is_listable_output,
    is_missing_path, is_permission_denied, list_command, output_has_marker, parse_storage_listing,
    write_probe_cleanup_command, write_probe_command,
};
use crate::devices::errors::DeviceError;

/// Primary storage aliases, most preferred first.
pub const CANDIDATE_STORAGE_PATHS: [&str; 5] = [
    "/storage/emulated/0",
    "/storage/self/primary",
    "/sdcard",
    "/storage/sdcard0",
    "/storage/emulated/legacy",
];

/// Returns every usable storage root on the device.
pub fn discover_storage_roots(channel: &mut dyn CommandChannel, serial: &str) -> Vec<String> {
    if let Some(root) = probe_candidates(channel, serial, &CANDIDATE_STORAGE_PATHS) {
        return vec![root];
    }
    debug!("No primary storage on {}, enumerating /storage", serial);
    fallback_roots(channel, serial, &CANDIDATE_STORAGE_PATHS)
}

/// Returns the first candidate that exists, can be listed, and can be written to.
pub fn probe_candidates(channel: &mut dyn CommandChannel, serial: &str, candidates: &[&str]) -> Option<String> {
    for candidate in candidates {
        match probe_candidate(channel, serial, candidate) {
            Ok(true) => {
                debug!("Found valid storage path on {}: {}", serial, candidate);
                return Some((*candidate).to_string());
            }
            Ok(false) => {}
            Err(e) => warn!("Failed to verify storage path {} on {}: {}", candidate, serial, e),
        }
    }
    None
}

fn probe_candidate(channel: &mut dyn CommandChannel, serial: &str, root: &str) -> Result<bool, DeviceError> {
    let output = channel.shell(serial, &directory_test_command(root))?;
    if !output_has_marker(&output, EXISTS_MARKER) {
        return Ok(false);
    }

    let output = channel.shell(serial, &list_command(root))?;
    if !is_listable_output(&output) {
        debug!("Storage path {} on {} isn't listable", root, serial);
        return Ok(false);
    }

    let output = channel.shell(serial, &write_probe_command(root))?;
    if output_has_marker(&output, WRITABLE_MARKER) {
        return Ok(true);
    }

    debug!("Storage path {} on {} isn't writable", root, serial);
    // touch may have succeeded with rm failing, so don't leave the probe behind
    if let Err(e) = channel.shell(serial, &write_probe_cleanup_command(root)) {
        debug!("Couldn't clean up write probe under {}: {}", root, e);
    }
    Ok(false)
}

/// Lists `/storage/*` entries not in `excluded` whose contents can be listed.
/// Writability isn't checked here.
pub fn fallback_roots(channel: &mut dyn CommandChannel, serial: &str, excluded: &[&str]) -> Vec<String> {
    let listing = match channel.shell(serial, STORAGE_ENUMERATION_COMMAND) {
        Ok(output) => output,
        Err(e) => {
            warn!("Failed to enumerate storage on {}: {}", serial, e);
            return Vec::new();
        }
    };

    let mut roots = Vec::new();
    for root in parse_storage_listing(&listing) {
        if excluded.contains(&root.as_str()) || roots.contains(&root) {
            continue;
        }
        match channel.shell(serial, &list_command(&root)) {
            Ok(output) if !is_permission_denied(&output) && !is_missing_path(&output) => {
                debug!("Found additional storage path on {}: {}", serial, root);
                roots.push(root);
            }
            Ok(_) => debug!("Skipping inaccessible storage path {} on {}", root, serial),
            Err(e) => warn!("Failed to verify storage path {} on {}: {}", root, serial, e),
        }
    }
    roots
}
