//! Path utilities for the config directory and temporary capture files.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

const APP_DIR_NAME: &str = "Snip2Excel";
const CONFIG_FILE_NAME: &str = "config.json";

/// Gets the per-user config directory.
///
/// On Windows this is `%APPDATA%\Snip2Excel`. On Linux and macOS it is `~/.config/Snip2Excel`
/// (macOS included, rather than `~/Library/Application Support`).
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME))
    }

    #[cfg(not(target_os = "windows"))]
    {
        dirs::home_dir().map(|home| home.join(".config").join(APP_DIR_NAME))
    }
}

/// Gets the config file path: `<config_dir>/config.json`
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Unique temporary PNG path for a capture tool to write into.
pub fn temp_capture_path() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!(
        "snip2excel-capture-{}-{}.png",
        std::process::id(),
        nanos
    ))
}
