//! The command channel to the ADB server.
//!
//! `CommandChannel` is the only thing the ADB transport uses to reach a device:
//! it runs a shell command and hands back raw text, and it moves file bytes.
//! `AdbCommandChannel` implements it by running the `adb` executable.

use log::{debug, warn};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::Command;

use super::locate::locate_adb;
use crate::devices::errors::DeviceError;
use crate::devices::types::TransportKind;

/// One entry of `adb devices -l`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellDevice {
    pub serial: String,
    /// For example "device", "offline", "unauthorized".
    pub state: String,
    /// Raw model string, for example "SM_G991U". Empty if not reported.
    pub model: String,
}

impl ShellDevice {
    /// Only devices in the "device" state accept commands.
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}

/// Executes commands on devices behind a shell transport.
pub trait CommandChannel: Send {
    /// Makes sure the server process is running.
    fn start_server(&mut self) -> Result<(), DeviceError>;

    /// Lists every device the server knows about, in any state.
    fn list_devices(&mut self) -> Result<Vec<ShellDevice>, DeviceError>;

    /// Runs `command` in the device shell and returns stdout and stderr combined.
    ///
    /// A non-zero exit status is not an error: the text is what callers parse.
    fn shell(&mut self, serial: &str, command: &str) -> Result<String, DeviceError>;

    /// Writes the whole of `source` to `remote_path`. The parent must exist.
    fn push(&mut self, serial: &str, source: &mut dyn Read, remote_path: &str) -> Result<u64, DeviceError> {
        // adb push only reads from disk, so stage the stream in a temp file first
        let mut staged = staging_file()?;
        let bytes = std::io::copy(source, staged.as_file_mut()).map_err(|e| DeviceError::local_io(staged.path(), e))?;
        staged
            .as_file_mut()
            .flush()
            .map_err(|e| DeviceError::local_io(staged.path(), e))?;

        let mut command = self.adb()?;
        command.args(["-s", serial, "push"]).arg(staged.path()).arg(remote_path);
        self.transfer(command, serial, &format!("push {} ({} bytes)", remote_path, bytes))?;
        Ok(bytes)
    }

    fn pull(&mut self, serial: &str, remote_path: &str, sink: &mut dyn Write) -> Result<u64, DeviceError> {
        // adb pull reports a missing or unreadable file through its exit status,
        // which exec-out doesn't
        let staged = staging_file()?;
        let mut command = self.adb()?;
        command.args(["-s", serial, "pull", remote_path]).arg(staged.path());
        self.transfer(command, serial, &format!("pull {}", remote_path))?;

        let mut file = staged.reopen().map_err(|e| DeviceError::local_io(staged.path(), e))?;
        std::io::copy(&mut file, sink).map_err(|e| DeviceError::local_io(staged.path(), e))
    }
}

impl AdbCommandChannel {
    /// Runs a push or pull, failing on a non-zero exit status.
    fn transfer(&self, mut command: Command, serial: &str, description: &str) -> Result<(), DeviceError> {
        debug!("adb {}: {}", serial, description);
        let output = command.output().map_err(|e| DeviceError::Command {
            device_id: serial.to_string(),
            command: description.to_string(),
            message: e.to_string(),
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("adb {} failed: {}", description, stderr.trim());
            return Err(DeviceError::Command {
                device_id: serial.to_string(),
                command: description.to_string(),
                message: stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

fn staging_file() -> Result<tempfile::NamedTempFile, DeviceError> {
    tempfile::NamedTempFile::new().map_err(|e| DeviceError::local_io(&std::env::temp_dir(), e))
}
