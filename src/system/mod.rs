//! System interactions (screenshot, clipboard)

mod clipboard;
mod screenshot;

pub use clipboard::{ClipboardError, ClipboardSink};
pub use screenshot::{capture_region, load_image, CapturedImage, Region, ScreenshotError};
