//! Linux screenshot implementation using whichever region-capture tool is installed.
//!
//! Wayland: `slurp` picks the region and `grim` captures it. X11: `maim -s`. GNOME:
//! `gnome-screenshot -a`. Tools are tried in that order; a missing binary moves on to the next.

use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Output};

use tracing::{debug, error};

use super::{ensure_written, ScreenshotError};

enum Attempt {
    Done,
    NotInstalled,
}

pub(super) fn capture_to_file(path: &Path) -> Result<(), ScreenshotError> {
    let wayland = std::env::var_os("WAYLAND_DISPLAY").is_some();
    let tools: [fn(&Path) -> Result<Attempt, ScreenshotError>; 3] = if wayland {
        [grim_slurp, gnome_screenshot, maim]
    } else {
        [maim, gnome_screenshot, grim_slurp]
    };

    for tool in tools {
        match tool(path)? {
            Attempt::Done => return ensure_written(path),
            Attempt::NotInstalled => continue,
        }
    }

    Err(ScreenshotError::Unsupported(
        "no region capture tool found (install grim+slurp, maim or gnome-screenshot)".to_string(),
    ))
}

fn run(program: &str, args: &[&str]) -> Result<Option<Output>, ScreenshotError> {
    debug!(program, "Running capture tool");
    match Command::new(program).args(args).output() {
        Ok(output) => Ok(Some(output)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(program, "Capture tool not installed");
            Ok(None)
        }
        Err(e) => Err(ScreenshotError::CommandExecution(format!(
            "Failed to execute {program}: {e}"
        ))),
    }
}

/// Maps a finished tool run to a result; non-zero exits count as cancellation when the tool
/// reports nothing on stderr (Escape / right click).
fn check(program: &str, output: &Output) -> Result<(), ScreenshotError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() || stderr.contains("cancel") || stderr.contains("selection") {
        debug!(program, "User cancelled screenshot selection");
        return Err(ScreenshotError::Cancelled);
    }
    error!(program, error = %stderr, "Screenshot capture failed");
    Err(ScreenshotError::CommandExecution(format!(
        "{program} failed: {stderr}"
    )))
}

fn grim_slurp(path: &Path) -> Result<Attempt, ScreenshotError> {
    let Some(selection) = run("slurp", &[])? else {
        return Ok(Attempt::NotInstalled);
    };
    check("slurp", &selection)?;
    let geometry = String::from_utf8_lossy(&selection.stdout).trim().to_string();
    if geometry.is_empty() {
        return Err(ScreenshotError::Cancelled);
    }

    let path_arg = path.to_string_lossy();
    let Some(output) = run("grim", &["-g", &geometry, &path_arg])? else {
        return Ok(Attempt::NotInstalled);
    };
    check("grim", &output)?;
    Ok(Attempt::Done)
}

fn maim(path: &Path) -> Result<Attempt, ScreenshotError> {
    let path_arg = path.to_string_lossy();
    let Some(output) = run("maim", &["-s", &path_arg])? else {
        return Ok(Attempt::NotInstalled);
    };
    check("maim", &output)?;
    Ok(Attempt::Done)
}

fn gnome_screenshot(path: &Path) -> Result<Attempt, ScreenshotError> {
    let path_arg = path.to_string_lossy();
    let Some(output) = run("gnome-screenshot", &["-a", "-f", &path_arg])? else {
        return Ok(Attempt::NotInstalled);
    };
    check("gnome-screenshot", &output)?;
    // gnome-screenshot exits 0 without writing a file when the selection is cancelled
    if !path.exists() {
        return Err(ScreenshotError::Cancelled);
    }
    Ok(Attempt::Done)
}
