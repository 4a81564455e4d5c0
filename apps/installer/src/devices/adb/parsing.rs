//! Builders and parsers for the shell commands the ADB transport sends.
//!
//! The device only gives us unstructured text back, so every command has a
//! matching pure parser here. None of these functions talk to a device.

use chrono::{DateTime, Utc};

use crate::devices::types::RemoteFileStat;

/// Echoed by existence probes on success.
pub const EXISTS_MARKER: &str = "exists";
/// Echoed by the writability probe on success.
pub const WRITABLE_MARKER: &str = "writable";
/// Hidden file created and removed to prove a root is writable.
pub const WRITE_PROBE_FILE: &str = ".mission_installer_write_probe";

const PERMISSION_DENIED: &str = "Permission denied";
const NO_SUCH_FILE: &str = "No such file or directory";

/// Quotes an argument for the device's POSIX shell.
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

pub fn file_test_command(path: &str) -> String {
    format!("test -f {} && echo {EXISTS_MARKER}", shell_quote(path))
}

pub fn directory_test_command(path: &str) -> String {
    format!("test -d {} && echo {EXISTS_MARKER}", shell_quote(path))
}

/// Lists a directory's contents. The trailing slash makes `ls` follow symlinked roots.
pub fn list_command(path: &str) -> String {
    format!("ls {}", shell_quote(&format!("{}/", path.trim_end_matches('/'))))
}

pub fn write_probe_command(root: &str) -> String {
    let probe = shell_quote(&format!("{}/{WRITE_PROBE_FILE}", root.trim_end_matches('/')));
    format!("touch {probe} && rm {probe} && echo {WRITABLE_MARKER}")
}

/// Best-effort removal of a write probe left behind by a half-failed probe.
pub fn write_probe_cleanup_command(root: &str) -> String {
    format!(
        "rm -f {}",
        shell_quote(&format!("{}/{WRITE_PROBE_FILE}", root.trim_end_matches('/')))
    )
}

/// Lists every top-level entry of the generic storage namespace.
pub const STORAGE_ENUMERATION_COMMAND: &str = "ls -d /storage/*/";

pub fn mkdir_command(path: &str) -> String {
    format!("mkdir -p {}", shell_quote(path))
}

pub fn remove_command(path: &str) -> String {
    format!("rm {}", shell_quote(path))
}

pub fn stat_command(path: &str) -> String {
    format!("stat -c '%s %Y' {}", shell_quote(path))
}

pub fn find_directories_command(path: &str, recursive: bool) -> String {
    // -H: /sdcard and /storage/self/primary are symlinks
    if recursive {
        format!("find -H {} -type d", shell_quote(path))
    } else {
        format!("find -H {} -maxdepth 1 -type d", shell_quote(path))
    }
}

/// True if a `test ... && echo` probe printed its marker.
pub fn output_has_marker(output: &str, marker: &str) -> bool {
    output.lines().any(|line| line.trim() == marker)
}

/// True if an `ls` of a directory shows it can actually be read.
///
/// Empty output counts as unreadable: a real storage root always has entries
/// (at least `Android/`), and some devices print nothing instead of an error.
pub fn is_listable_output(output: &str) -> bool {
    !output.contains(PERMISSION_DENIED) && !output.trim().is_empty()
}

/// True if an `ls` output reports a permission problem.
pub fn is_permission_denied(output: &str) -> bool {
    output.contains(PERMISSION_DENIED)
}

/// True if a command complained about a missing path.
pub fn is_missing_path(output: &str) -> bool {
    output.contains(NO_SUCH_FILE)
}

/// Parses `stat -c '%s %Y'` output: size in bytes and mtime in Unix seconds.
pub fn parse_stat_output(path: &str, output: &str) -> Option<RemoteFileStat> {
    let line = output.lines().map(str::trim).find(|line| !line.is_empty())?;
    let mut parts = line.split_whitespace();
    let size_bytes = parts.next()?.parse::<u64>().ok()?;
    let seconds = parts.next()?.parse::<i64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(RemoteFileStat {
        path: path.to_string(),
        last_modified: DateTime::<Utc>::from_timestamp(seconds, 0),
        size_bytes,
    })
}

/// Parses `find <root> -type d` output into directory paths, excluding `root` itself
/// and any diagnostic lines.
pub fn parse_find_output(root: &str, output: &str) -> Vec<String> {
    let root = root.trim_end_matches('/');
    output
        .lines()
        .map(|line| line.trim_end_matches('\r').trim_end_matches('/'))
        .filter(|line| !line.is_empty())
        .filter(|line| line.starts_with('/'))
        .filter(|line| *line != root)
        .map(str::to_string)
        .collect()
}

/// Parses `ls -d /storage/*/` output into storage roots without trailing slashes.
pub fn parse_storage_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| line.trim().trim_end_matches('/'))
        .filter(|line| line.starts_with("/storage/"))
        .filter(|line| !is_permission_denied(line) && !is_missing_path(line))
        .map(str::to_string)
        .collect()
}
