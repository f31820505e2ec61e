//! Linux-specific clipboard implementation

use arboard::{Clipboard, LinuxClipboardKind, SetExtLinux};
use tracing::info;

use super::ClipboardError;

/// Sets the CLIPBOARD selection (Ctrl+V, not PRIMARY) and serves it until another
/// application claims ownership.
pub(super) fn set_text_and_wait(clipboard: &mut Clipboard, text: &str) -> Result<(), ClipboardError> {
    info!(
        len = text.len(),
        "Holding clipboard contents until another application takes them over"
    );
    clipboard
        .set()
        .clipboard(LinuxClipboardKind::Clipboard)
        .wait()
        .text(text.to_string())
        .map_err(ClipboardError::Write)
}
