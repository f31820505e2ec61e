//! Screenshot capture: interactive region selection via the platform tool, or an image file.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use image::{DynamicImage, GenericImageView, ImageFormat};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ScreenshotError {
    #[error("Failed to execute capture command: {0}")]
    CommandExecution(String),
    #[error("Failed to read screenshot file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Screenshot selection cancelled by user")]
    Cancelled,
    #[error("Region {region} is outside the {width}x{height} image")]
    RegionOutOfBounds {
        region: Region,
        width: u32,
        height: u32,
    },
    #[error("Screenshot capture not supported on this platform: {0}")]
    Unsupported(String),
}

/// Rectangle in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

impl FromStr for Region {
    type Err = String;

    /// Parses `x,y,width,height`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid region '{s}': {e}"))?;
        match parts.as_slice() {
            [x, y, width, height] if *width > 0 && *height > 0 => Ok(Self {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
            }),
            [_, _, _, _] => Err(format!("region '{s}' must have a non-zero size")),
            _ => Err(format!("region '{s}' must be x,y,width,height")),
        }
    }
}

/// Captured image, PNG encoded.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl CapturedImage {
    fn from_image(img: &DynamicImage) -> Result<Self, ScreenshotError> {
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(Self {
            png,
            width: img.width(),
            height: img.height(),
        })
    }

    /// Decodes raw image bytes (any supported format) and re-encodes as PNG.
    pub fn from_bytes(bytes: &[u8], region: Option<Region>) -> Result<Self, ScreenshotError> {
        let img = image::load_from_memory(bytes)?;
        let img = match region {
            Some(region) => crop(&img, region)?,
            None => img,
        };
        Self::from_image(&img)
    }
}

fn crop(img: &DynamicImage, region: Region) -> Result<DynamicImage, ScreenshotError> {
    let (width, height) = img.dimensions();
    let fits = region
        .x
        .checked_add(region.width)
        .is_some_and(|right| right <= width)
        && region
            .y
            .checked_add(region.height)
            .is_some_and(|bottom| bottom <= height);
    if !fits {
        return Err(ScreenshotError::RegionOutOfBounds {
            region,
            width,
            height,
        });
    }
    Ok(img.crop_imm(region.x, region.y, region.width, region.height))
}

/// Loads an image file, optionally cropped to `region`.
pub fn load_image(path: &Path, region: Option<Region>) -> Result<CapturedImage, ScreenshotError> {
    let bytes = std::fs::read(path)?;
    let captured = CapturedImage::from_bytes(&bytes, region)?;
    debug!(
        path = %path.display(),
        width = captured.width,
        height = captured.height,
        "Image loaded"
    );
    Ok(captured)
}

/// Lets the user select a screen region and returns it as PNG.
pub fn capture_region() -> Result<CapturedImage, ScreenshotError> {
    let path = crate::paths::temp_capture_path();
    debug!(path = %path.display(), "Screenshot will be saved to temp file");

    let result = capture_to_file(&path).and_then(|()| {
        let bytes = std::fs::read(&path)?;
        CapturedImage::from_bytes(&bytes, None)
    });
    if path.exists() {
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(error = %e, path = %path.display(), "Failed to remove capture file");
        }
    }

    let captured = result?;
    info!(
        width = captured.width,
        height = captured.height,
        bytes = captured.png.len(),
        "Screenshot captured successfully"
    );
    Ok(captured)
}

#[cfg(target_os = "macos")]
fn capture_to_file(path: &Path) -> Result<(), ScreenshotError> {
    macos::capture_to_file(path)
}

#[cfg(target_os = "linux")]
fn capture_to_file(path: &Path) -> Result<(), ScreenshotError> {
    linux::capture_to_file(path)
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn capture_to_file(_path: &Path) -> Result<(), ScreenshotError> {
    Err(ScreenshotError::Unsupported(
        "use --image with a saved screenshot".to_string(),
    ))
}

/// Fails with `CommandExecution` unless `path` was written by the capture tool.
#[cfg_attr(not(any(target_os = "macos", target_os = "linux")), allow(dead_code))]
fn ensure_written(path: &Path) -> Result<(), ScreenshotError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => {
            tracing::error!(path = %path.display(), "Screenshot file was not created");
            Err(ScreenshotError::CommandExecution(
                "Screenshot file was not created".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([255, 255, 255, 255]),
        ));
        CapturedImage::from_image(&img).unwrap().png
    }

    #[test]
    fn test_region_parse() {
        assert_eq!(
            "10, 20,300,40".parse::<Region>(),
            Ok(Region {
                x: 10,
                y: 20,
                width: 300,
                height: 40
            })
        );
        assert!("1,2,0,4".parse::<Region>().is_err());
        assert!("1,2,3".parse::<Region>().is_err());
        assert!("a,b,c,d".parse::<Region>().is_err());
    }

    #[test]
    fn test_from_bytes_crops() {
        let png = sample_png(40, 30);
        let region = Region {
            x: 5,
            y: 5,
            width: 10,
            height: 20,
        };
        let captured = CapturedImage::from_bytes(&png, Some(region)).unwrap();
        assert_eq!((captured.width, captured.height), (10, 20));
        assert!(captured.png.starts_with(b"\x89PNG"));
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let png = sample_png(40, 30);
        let region = Region {
            x: 35,
            y: 0,
            width: 10,
            height: 10,
        };
        assert!(matches!(
            CapturedImage::from_bytes(&png, Some(region)),
            Err(ScreenshotError::RegionOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_load_image_missing_file() {
        let err = load_image(Path::new("/definitely/not/here.png"), None).unwrap_err();
        assert!(matches!(err, ScreenshotError::ReadFile(_)));
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(matches!(
            CapturedImage::from_bytes(b"not an image", None),
            Err(ScreenshotError::Image(_))
        ));
    }
}
