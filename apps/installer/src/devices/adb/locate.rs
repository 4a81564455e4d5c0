//! Finding the `adb` executable.

use log::debug;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[cfg(windows)]
const ADB_FILE_NAME: &str = "adb.exe";
#[cfg(not(windows))]
const ADB_FILE_NAME: &str = "adb";

/// Places the platform tools usually end up when installed system-wide.
#[cfg(windows)]
const SYSTEM_PLATFORM_TOOLS: [&str; 2] = [
    r"C:\Program Files (x86)\Android\android-sdk\platform-tools",
    r"C:\Program Files\Android\android-sdk\platform-tools",
];
#[cfg(target_os = "macos")]
const SYSTEM_PLATFORM_TOOLS: [&str; 2] = ["/opt/homebrew/bin", "/usr/local/bin"];
#[cfg(all(unix, not(target_os = "macos")))]
const SYSTEM_PLATFORM_TOOLS: [&str; 2] = ["/usr/lib/android-sdk/platform-tools", "/usr/bin"];

/// Returns the first existing `adb` executable, or `None`.
pub fn locate_adb(configured: Option<&Path>) -> Option<PathBuf> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let found = candidate_paths(configured, exe_dir.as_deref(), dirs::home_dir().as_deref(), &|name| {
        std::env::var_os(name)
    })
    .into_iter()
    .find(|path| path.is_file());

    match &found {
        Some(path) => debug!("Using adb at {}", path.display()),
        None => debug!("No adb executable found"),
    }
    found
}

/// Every place to look for `adb`, most specific first.
fn candidate_paths(
    configured: Option<&Path>,
    exe_dir: Option<&Path>,
    home_dir: Option<&Path>,
    env: &dyn Fn(&str) -> Option<OsString>,
) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = configured {
        candidates.push(path.to_path_buf());
    }
    if let Some(path) = env("ADB").filter(|value| !value.is_empty()) {
        candidates.push(PathBuf::from(path));
    }
    if let Some(dir) = exe_dir {
        candidates.push(dir.join(ADB_FILE_NAME));
        candidates.push(dir.join("tools").join(ADB_FILE_NAME));
    }
    for sdk_var in ["ANDROID_HOME", "ANDROID_SDK_ROOT"] {
        if let Some(sdk) = env(sdk_var).filter(|value| !value.is_empty()) {
            candidates.push(PathBuf::from(sdk).join("platform-tools").join(ADB_FILE_NAME));
        }
    }
    if let Some(home) = home_dir {
        candidates.push(default_user_sdk(home).join("platform-tools").join(ADB_FILE_NAME));
    }
    for dir in SYSTEM_PLATFORM_TOOLS {
        candidates.push(Path::new(dir).join(ADB_FILE_NAME));
    }
    if let Some(path_var) = env("PATH") {
        candidates.extend(std::env::split_paths(&path_var).map(|dir| dir.join(ADB_FILE_NAME)));
    }

    candidates
}

/// Where Android Studio installs the SDK for the current user.
fn default_user_sdk(home: &Path) -> PathBuf {
    if cfg!(windows) {
        home.join("AppData").join("Local").join("Android").join("Sdk")
    } else if cfg!(target_os = "macos") {
        home.join("Library").join("Android").join("sdk")
    } else {
        home.join("Android").join("Sdk")
    }
}
