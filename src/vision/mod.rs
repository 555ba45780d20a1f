/*!
Vision module for Pixelbot.

This module wires together:
- `capture`: screen frame acquisition behind the `ScreenGrabber` trait
- `matcher`: grayscale template matching over captured frames

Typical usage:
- Construct a grabber (`PlatformGrabber` in real runs, `StaticGrabber` in
  tests), `grab()` a frame, convert it to grayscale, and `locate()` a
  template in it.

Public re-exports:
- `ScreenGrabber`, `PlatformGrabber`, `StaticGrabber`
- `locate`, `TemplateMatch`
- `VisionError`, `load_template`, `to_gray`
*/

use std::path::Path;

use image::{GrayImage, RgbaImage};
use thiserror::Error;

use crate::config::Rect;

pub mod capture;
pub mod matcher;

pub use capture::{PlatformGrabber, ScreenGrabber, StaticGrabber};
pub use matcher::{TemplateMatch, locate};

/// Failures from screen capture and template matching.
#[derive(Debug, Error)]
pub enum VisionError {
    /// Screen capture has no implementation for the current platform.
    #[error("screen capture is not supported on this platform")]
    CaptureUnsupported,

    /// The platform capture path failed (GDI call, buffer conversion).
    #[error("screen capture failed: {0}")]
    Capture(String),

    /// A template cannot fit inside the searched area.
    #[error(
        "template ({template_w}x{template_h}) larger than search area ({search_w}x{search_h})"
    )]
    TemplateTooLarge {
        template_w: u32,
        template_h: u32,
        search_w: u32,
        search_h: u32,
    },

    /// The configured search region lies entirely outside the frame.
    #[error("search region {0:?} lies outside the captured frame")]
    RegionOutOfBounds(Rect),

    /// A reference image could not be read or decoded.
    #[error("failed to load template {path}: {source}")]
    TemplateLoad {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Load a reference template image from disk and convert it to grayscale.
pub fn load_template<P: AsRef<Path>>(path: P) -> Result<GrayImage, VisionError> {
    let path_ref = path.as_ref();
    let img = image::open(path_ref).map_err(|source| VisionError::TemplateLoad {
        path: path_ref.display().to_string(),
        source,
    })?;
    Ok(img.to_luma8())
}

/// Convert a captured RGBA frame to the grayscale space the matcher works in.
#[must_use]
pub fn to_gray(frame: &RgbaImage) -> GrayImage {
    image::DynamicImage::ImageRgba8(frame.clone()).to_luma8()
}

/// Cut a clamped sub-region out of a captured frame (used by screenshot
/// actions with a `region`).
pub fn crop_frame(frame: &RgbaImage, rect: Rect) -> Result<RgbaImage, VisionError> {
    let (x, y, w, h) = matcher::clamp_region(rect, frame.width(), frame.height())
        .ok_or(VisionError::RegionOutOfBounds(rect))?;
    Ok(image::imageops::crop_imm(frame, x, y, w, h).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn to_gray_preserves_dimensions() {
        let frame = RgbaImage::from_pixel(17, 9, Rgba([200, 100, 50, 255]));
        let gray = to_gray(&frame);
        assert_eq!((gray.width(), gray.height()), (17, 9));
    }

    #[test]
    fn load_template_reports_missing_file() {
        let err = load_template("/no/such/template.png").unwrap_err();
        assert!(matches!(err, VisionError::TemplateLoad { .. }));
    }
}
