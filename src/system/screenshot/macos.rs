//! macOS-specific screenshot implementation using the screencapture command

use std::path::Path;
use std::process::Command;

use tracing::{debug, error};

use super::{ensure_written, ScreenshotError};

/// Shows a crosshair for the user to select a region and writes it as PNG to `path`.
pub(super) fn capture_to_file(path: &Path) -> Result<(), ScreenshotError> {
    debug!("Starting interactive screenshot region selection");

    // -i: interactive region selection, Escape cancels
    // -x: no sound
    let output = Command::new("screencapture")
        .arg("-i")
        .arg("-x")
        .arg(path)
        .output()
        .map_err(|e| {
            ScreenshotError::CommandExecution(format!("Failed to execute screencapture: {e}"))
        })?;

    if !output.status.success() {
        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code == 1 {
            debug!("User cancelled screenshot selection");
            return Err(ScreenshotError::Cancelled);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let error_msg = if stderr.trim().is_empty() {
            format!("screencapture failed with exit code {exit_code}")
        } else {
            format!("screencapture failed: {}", stderr.trim())
        };
        error!(error = %error_msg, "Screenshot capture failed");
        return Err(ScreenshotError::CommandExecution(error_msg));
    }

    // Escape leaves no file behind and still exits 0 on some macOS versions.
    if !path.exists() {
        debug!("No screenshot file written, treating as cancelled");
        return Err(ScreenshotError::Cancelled);
    }
    ensure_written(path)
}
