//! Clipboard writing.
//!
//! The app only ever replaces the clipboard contents with a serialized table or extracted text.
//! Clipboard contents are logged by length only.

#[cfg(target_os = "linux")]
mod linux;

use arboard::Clipboard;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("Clipboard unavailable: {0}")]
    Unavailable(#[source] arboard::Error),
    #[error("Failed to write clipboard: {0}")]
    Write(#[source] arboard::Error),
}

/// Owns a clipboard handle for the life of a session.
///
/// On X11/Wayland the clipboard is served by the owning process, so the handle has to outlive
/// the copy for other applications to paste from it.
pub struct ClipboardSink {
    clipboard: Clipboard,
}

impl ClipboardSink {
    pub fn new() -> Result<Self, ClipboardError> {
        let clipboard = Clipboard::new().map_err(ClipboardError::Unavailable)?;
        Ok(Self { clipboard })
    }

    /// Replaces the clipboard contents with `text`.
    pub fn copy(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.clipboard
            .set_text(text.to_string())
            .map_err(ClipboardError::Write)?;
        debug!(len = text.len(), "Copied to clipboard");
        Ok(())
    }

    /// Copies `text` for a process that is about to exit.
    ///
    /// On Linux this blocks until another application takes over the clipboard, so the contents
    /// stay pasteable after the command returns. Elsewhere it is the same as [`Self::copy`].
    pub fn copy_and_wait(&mut self, text: &str) -> Result<(), ClipboardError> {
        #[cfg(target_os = "linux")]
        {
            linux::set_text_and_wait(&mut self.clipboard, text)
        }

        #[cfg(not(target_os = "linux"))]
        {
            self.copy(text)
        }
    }
}
