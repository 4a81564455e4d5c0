//! In-memory stand-in for an ADB server and its attached devices.
//!
//! `FakeShell` interprets the exact shell commands the ADB transport sends
//! (`test`, `ls`, `touch`, `rm`, `mkdir -p`, `stat`, `find`, `echo`, joined with
//! `&&`) against a per-device tree of directories and files. Clones share state,
//! so a test can keep a handle to unplug devices or inspect files while the
//! transport owns another.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use super::channel::{CommandChannel, ShellDevice};
use crate::devices::errors::DeviceError;
use crate::devices::operations::parent_path;
use crate::devices::types::TransportKind;

const START_TIME: i64 = 1_700_000_000;

#[derive(Default)]
struct FakeTree {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, (Vec<u8>, i64)>,
    unlistable: BTreeSet<String>,
    read_only: BTreeSet<String>,
}

impl FakeTree {
    fn is_dir(&self, path: &str) -> bool {
        self.dirs.contains(&clean(path))
    }

    fn is_file(&self, path: &str) -> bool {
        self.files.contains_key(&clean(path))
    }

    fn is_writable_dir(&self, path: &str) -> bool {
        self.is_dir(path) && !self.read_only.contains(&clean(path))
    }

    fn add_dir_all(&mut self, path: &str) {
        let mut current = Some(clean(path));
        while let Some(dir) = current {
            current = parent_path(&dir).filter(|parent| *parent != dir).map(str::to_string);
            self.dirs.insert(dir);
        }
    }

    fn children(&self, dir: &str) -> Vec<String> {
        let dir = clean(dir);
        let names = self.dirs.iter().chain(self.files.keys());
        let mut children: Vec<String> = names
            .filter(|path| *path != &dir && parent_path(path) == Some(dir.as_str()))
            .map(|path| path.rsplit('/').next().unwrap_or_default().to_string())
            .collect();
        children.sort();
        children
    }
}

struct FakeDevice {
    serial: String,
    model: String,
    state: String,
    tree: FakeTree,
    failing: Vec<String>,
    /// (needle, output) pairs answered verbatim.
    canned: Vec<(String, String)>,
}

#[derive(Default)]
struct FakeState {
    adb_missing: bool,
    started: bool,
    devices: Vec<FakeDevice>,
    commands: Vec<String>,
    clock: i64,
}

impl FakeState {
    fn device(&mut self, serial: &str) -> Result<&mut FakeDevice, DeviceError> {
        self.devices
            .iter_mut()
            .find(|d| d.serial == serial && d.state == "device")
            .ok_or_else(|| DeviceError::Command {
                device_id: serial.to_string(),
                command: String::new(),
                message: format!("device '{serial}' not found"),
            })
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        START_TIME + self.clock
    }
}

#[derive(Clone, Default)]
pub struct FakeShell {
    state: Arc<Mutex<FakeState>>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn with_tree<R>(&self, serial: &str, f: impl FnOnce(&mut FakeTree) -> R) -> R {
        let mut state = self.lock();
        let device = state.devices.iter_mut().find(|d| d.serial == serial).unwrap();
        f(&mut device.tree)
    }

    /// Makes `start_server` fail as if no executable were installed.
    pub fn set_adb_missing(&self) {
        self.lock().adb_missing = true;
    }

    pub fn add_device(&self, serial: &str, model: &str) {
        self.add_device_in_state(serial, model, "device");
    }

    pub fn add_device_in_state(&self, serial: &str, model: &str, state: &str) {
        let mut tree = FakeTree::default();
        tree.add_dir_all("/storage");
        self.lock().devices.push(FakeDevice {
            serial: serial.to_string(),
            model: model.to_string(),
            state: state.to_string(),
            tree,
            failing: Vec::new(),
            canned: Vec::new(),
        });
    }

    /// Removes the device from the server's list.
    pub fn unplug(&self, serial: &str) {
        self.lock().devices.retain(|d| d.serial != serial);
    }

    pub fn add_dir(&self, serial: &str, path: &str) {
        self.with_tree(serial, |tree| tree.add_dir_all(path));
    }

    pub fn add_file(&self, serial: &str, path: &str, data: &[u8]) {
        let modified = self.lock().tick();
        self.with_tree(serial, |tree| {
            if let Some(parent) = parent_path(path) {
                tree.add_dir_all(parent);
            }
            tree.files.insert(clean(path), (data.to_vec(), modified));
        });
    }

    /// Deletes a file or a directory with everything below it.
    pub fn remove_path(&self, serial: &str, path: &str) {
        let path = clean(path);
        let prefix = format!("{path}/");
        self.with_tree(serial, |tree| {
            tree.dirs.retain(|d| *d != path && !d.starts_with(&prefix));
            tree.files.retain(|f, _| *f != path && !f.starts_with(&prefix));
        });
    }

    /// `ls` of this directory reports "Permission denied".
    pub fn deny_listing(&self, serial: &str, path: &str) {
        self.with_tree(serial, |tree| {
            tree.unlistable.insert(clean(path));
        });
    }

    /// Creating or removing entries directly inside this directory fails.
    pub fn make_read_only(&self, serial: &str, path: &str) {
        self.with_tree(serial, |tree| {
            tree.read_only.insert(clean(path));
        });
    }

    /// Shell commands containing `needle` fail as if the transport broke.
    pub fn fail_commands_containing(&self, serial: &str, needle: &str) {
        let mut state = self.lock();
        let device = state.devices.iter_mut().find(|d| d.serial == serial).unwrap();
        device.failing.push(needle.to_string());
    }

    /// Shell commands containing `needle` print `output` instead of running.
    pub fn respond_to(&self, serial: &str, needle: &str, output: &str) {
        let mut state = self.lock();
        let device = state.devices.iter_mut().find(|d| d.serial == serial).unwrap();
        device.canned.push((needle.to_string(), output.to_string()));
    }

    pub fn file(&self, serial: &str, path: &str) -> Option<Vec<u8>> {
        self.with_tree(serial, |tree| tree.files.get(&clean(path)).map(|(data, _)| data.clone()))
    }

    pub fn is_dir(&self, serial: &str, path: &str) -> bool {
        self.with_tree(serial, |tree| tree.is_dir(path))
    }

    /// Every shell command issued so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }
}

impl CommandChannel for FakeShell {
    fn start_server(&mut self) -> Result<(), DeviceError> {
        let mut state = self.lock();
        if state.adb_missing {
            return Err(DeviceError::TransportUnavailable {
                transport: TransportKind::Adb,
                message: "adb executable not found".to_string(),
            });
        }
        state.started = true;
        Ok(())
    }

    fn list_devices(&mut self) -> Result<Vec<ShellDevice>, DeviceError> {
        let state = self.lock();
        if !state.started {
            return Err(DeviceError::TransportUnavailable {
                transport: TransportKind::Adb,
                message: "ADB server not started".to_string(),
            });
        }
        Ok(state
            .devices
            .iter()
            .map(|d| ShellDevice {
                serial: d.serial.clone(),
                state: d.state.clone(),
                model: d.model.clone(),
            })
            .collect())
    }

    fn shell(&mut self, serial: &str, command: &str) -> Result<String, DeviceError> {
        let mut state = self.lock();
        state.commands.push(command.to_string());
        let clock = state.tick();
        let device = state.device(serial)?;
        if device.failing.iter().any(|needle| command.contains(needle.as_str())) {
            return Err(DeviceError::Command {
                device_id: serial.to_string(),
                command: command.to_string(),
                message: "connection reset".to_string(),
            });
        }
        if let Some((_, output)) = device.canned.iter().find(|(needle, _)| command.contains(needle.as_str())) {
            return Ok(output.clone());
        }

        let mut output = String::new();
        for part in command.split(" && ") {
            let (ok, text) = run(&mut device.tree, clock, &split_words(part));
            output.push_str(&text);
            if !ok {
                break;
            }
        }
        Ok(output)
    }

    fn push(&mut self, serial: &str, source: &mut dyn Read, remote_path: &str) -> Result<u64, DeviceError> {
        let mut data = Vec::new();
        source
            .read_to_end(&mut data)
            .map_err(|e| DeviceError::local_io(std::path::Path::new("<source>"), e))?;
        let mut state = self.lock();
        let modified = state.tick();
        let device = state.device(serial)?;
        let parent = parent_path(remote_path).unwrap_or("/");
        if !device.tree.is_writable_dir(parent) {
            return Err(DeviceError::Command {
                device_id: serial.to_string(),
                command: format!("push {remote_path}"),
                message: format!("remote couldn't create file {remote_path}: Permission denied"),
            });
        }
        let len = data.len() as u64;
        device.tree.files.insert(clean(remote_path), (data, modified));
        Ok(len)
    }

    fn pull(&mut self, serial: &str, remote_path: &str, sink: &mut dyn Write) -> Result<u64, DeviceError> {
        let mut state = self.lock();
        let device = state.device(serial)?;
        let (data, _) = device
            .tree
            .files
            .get(&clean(remote_path))
            .ok_or_else(|| DeviceError::Command {
                device_id: serial.to_string(),
                command: format!("cat {remote_path}"),
                message: format!("cat: {remote_path}: No such file or directory"),
            })?;
        sink.write_all(data)
            .map_err(|e| DeviceError::local_io(std::path::Path::new("<sink>"), e))?;
        Ok(data.len() as u64)
    }
}

/// Runs one simple command. Returns whether it succeeded and what it printed.
fn run(tree: &mut FakeTree, clock: i64, words: &[String]) -> (bool, String) {
    let args: Vec<&str> = words.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["test", "-f", path] => (tree.is_file(path), String::new()),
        ["test", "-d", path] => (tree.is_dir(path), String::new()),
        ["echo", rest @ ..] => (true, format!("{}\n", rest.join(" "))),
        ["ls", "-d", "/storage/*/"] => {
            let roots = tree.children("/storage");
            if roots.is_empty() {
                return (false, "ls: /storage/*/: No such file or directory\n".to_string());
            }
            let listing = roots.iter().map(|name| format!("/storage/{name}/\n")).collect();
            (true, listing)
        }
        ["ls", path] => {
            if !tree.is_dir(path) {
                return (false, format!("ls: {path}: No such file or directory\n"));
            }
            if tree.unlistable.contains(&clean(path)) {
                return (false, format!("ls: {path}: Permission denied\n"));
            }
            let listing = tree.children(path).iter().map(|name| format!("{name}\n")).collect();
            (true, listing)
        }
        ["touch", path] => {
            let parent = parent_path(path).unwrap_or("/");
            if !tree.is_dir(parent) {
                return (false, format!("touch: '{path}': No such file or directory\n"));
            }
            if !tree.is_writable_dir(parent) {
                return (false, format!("touch: '{path}': Permission denied\n"));
            }
            let entry = tree.files.entry(clean(path)).or_insert_with(|| (Vec::new(), clock));
            entry.1 = clock;
            (true, String::new())
        }
        ["rm", "-f", path] => remove(tree, path, true),
        ["rm", path] => remove(tree, path, false),
        ["mkdir", "-p", path] => {
            if tree.is_file(path) {
                return (false, format!("mkdir: '{path}': File exists\n"));
            }
            tree.add_dir_all(path);
            (true, String::new())
        }
        ["stat", "-c", "%s %Y", path] => match tree.files.get(&clean(path)) {
            Some((data, modified)) => (true, format!("{} {}\n", data.len(), modified)),
            None => (false, format!("stat: cannot stat '{path}': No such file or directory\n")),
        },
        ["find", "-H", path, rest @ ..] => find(tree, path, rest.contains(&"-maxdepth")),
        [program, ..] => (false, format!("/system/bin/sh: {program}: not found\n")),
        [] => (true, String::new()),
    }
}

fn remove(tree: &mut FakeTree, path: &str, force: bool) -> (bool, String) {
    if !tree.is_file(path) {
        if force {
            return (true, String::new());
        }
        return (false, format!("rm: {path}: No such file or directory\n"));
    }
    if !tree.is_writable_dir(parent_path(path).unwrap_or("/")) {
        return (false, format!("rm: {path}: Permission denied\n"));
    }
    tree.files.remove(&clean(path));
    (true, String::new())
}

fn find(tree: &FakeTree, path: &str, shallow: bool) -> (bool, String) {
    if !tree.is_dir(path) {
        return (false, format!("find: '{path}': No such file or directory\n"));
    }
    let root = clean(path);
    let prefix = if root == "/" { "/".to_string() } else { format!("{root}/") };
    let mut output = format!("{path}\n");
    for dir in tree.dirs.iter().filter(|d| d.starts_with(&prefix)) {
        if shallow && parent_path(dir) != Some(root.as_str()) {
            continue;
        }
        // Nothing below an unreadable directory is visible
        let hidden = tree
            .unlistable
            .iter()
            .any(|blocked| dir.starts_with(&format!("{blocked}/")) && blocked.starts_with(&prefix));
        if hidden {
            continue;
        }
        output.push_str(&format!("{dir}\n"));
        if !shallow && tree.unlistable.contains(dir) {
            output.push_str(&format!("find: '{dir}': Permission denied\n"));
        }
    }
    (true, output)
}

/// Splits a POSIX shell word list, honoring single quotes and backslash escapes.
fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for quoted in chars.by_ref() {
                    if quoted == '\'' {
                        break;
                    }
                    current.push(quoted);
                }
            }
            '\\' => {
                in_word = true;
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

fn clean(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::adb::parsing::shell_quote;

    #[test]
    fn test_split_words_handles_quoting() {
        assert_eq!(split_words("ls '/a b/'"), vec!["ls", "/a b/"]);
        assert_eq!(
            split_words(&format!("rm {}", shell_quote("it's"))),
            vec!["rm".to_string(), "it's".to_string()]
        );
        assert_eq!(split_words("stat -c '%s %Y' '/x'"), vec!["stat", "-c", "%s %Y", "/x"]);
    }

    #[test]
    fn test_commands_chain_until_failure() {
        let mut shell = FakeShell::new();
        shell.add_device("S1", "Pixel_8");
        shell.add_dir("S1", "/sdcard");
        shell.start_server().unwrap();

        let out = shell.shell("S1", "test -d '/sdcard' && echo exists").unwrap();
        assert_eq!(out, "exists\n");
        let out = shell.shell("S1", "test -d '/nope' && echo exists").unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn test_unplugged_device_fails_commands() {
        let mut shell = FakeShell::new();
        shell.add_device("S1", "Pixel_8");
        shell.start_server().unwrap();
        shell.unplug("S1");
        assert!(shell.shell("S1", "echo hi").is_err());
        assert!(shell.list_devices().unwrap().is_empty());
    }
}
