//! Screen capture behind the [`ScreenGrabber`] trait.
//!
//! Production code uses [`PlatformGrabber`], which captures the primary
//! display via Win32 GDI on Windows and reports capture as unsupported
//! elsewhere. Tests and dry runs can substitute [`StaticGrabber`], which
//! serves a fixed in-memory frame.

use image::RgbaImage;

use crate::vision::VisionError;

/// Produces full-screen frames for the matcher.
///
/// `grab` takes `&mut self` so implementations may keep reusable capture
/// state (device contexts, staging buffers) between frames.
pub trait ScreenGrabber: Send {
    /// Human-readable identifier (used in logs).
    fn name(&self) -> &'static str;

    /// Capture the current contents of the primary display.
    fn grab(&mut self) -> Result<RgbaImage, VisionError>;
}

/// The OS-backed grabber used by real runs.
#[derive(Debug, Default)]
pub struct PlatformGrabber;

impl PlatformGrabber {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ScreenGrabber for PlatformGrabber {
    fn name(&self) -> &'static str {
        "platform"
    }

    fn grab(&mut self) -> Result<RgbaImage, VisionError> {
        grab_impl()
    }
}

/// Serves a fixed frame; used by tests and available to embedders that want
/// to run the matcher against synthetic screens.
#[derive(Debug, Clone)]
pub struct StaticGrabber {
    frame: RgbaImage,
}

impl StaticGrabber {
    #[must_use]
    pub fn new(frame: RgbaImage) -> Self {
        Self { frame }
    }

    /// Replace the served frame.
    pub fn set_frame(&mut self, frame: RgbaImage) {
        self.frame = frame;
    }
}

impl ScreenGrabber for StaticGrabber {
    fn name(&self) -> &'static str {
        "static"
    }

    fn grab(&mut self) -> Result<RgbaImage, VisionError> {
        Ok(self.frame.clone())
    }
}

#[cfg(windows)]
fn grab_impl() -> Result<RgbaImage, VisionError> {
    use windows::Win32::Graphics::Gdi::{
        BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BitBlt, CreateCompatibleBitmap, CreateCompatibleDC,
        DIB_RGB_COLORS, DeleteDC, DeleteObject, GetDC, GetDIBits, ReleaseDC, SRCCOPY, SelectObject,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

    unsafe {
        let width = GetSystemMetrics(SM_CXSCREEN);
        let height = GetSystemMetrics(SM_CYSCREEN);
        if width <= 0 || height <= 0 {
            return Err(VisionError::Capture(format!(
                "invalid screen metrics {width}x{height}"
            )));
        }

        let screen_dc = GetDC(None);
        if screen_dc.is_invalid() {
            return Err(VisionError::Capture("GetDC returned NULL".into()));
        }
        let mem_dc = CreateCompatibleDC(Some(screen_dc));
        let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
        let old = SelectObject(mem_dc, bitmap.into());

        let blit = BitBlt(mem_dc, 0, 0, width, height, Some(screen_dc), 0, 0, SRCCOPY);

        let mut info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width,
                // Negative height requests a top-down DIB.
                biHeight: -height,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut pixels = vec![0u8; (width as usize) * (height as usize) * 4];
        let copied = GetDIBits(
            mem_dc,
            bitmap,
            0,
            height as u32,
            Some(pixels.as_mut_ptr().cast()),
            &mut info,
            DIB_RGB_COLORS,
        );

        SelectObject(mem_dc, old);
        let _ = DeleteObject(bitmap.into());
        let _ = DeleteDC(mem_dc);
        ReleaseDC(None, screen_dc);

        if blit.is_err() {
            return Err(VisionError::Capture("BitBlt failed".into()));
        }
        if copied == 0 {
            return Err(VisionError::Capture("GetDIBits returned 0 lines".into()));
        }

        // GDI hands back BGRA; swap to RGBA in place.
        for px in pixels.chunks_exact_mut(4) {
            px.swap(0, 2);
            px[3] = 255;
        }

        RgbaImage::from_raw(width as u32, height as u32, pixels)
            .ok_or_else(|| VisionError::Capture("pixel buffer size mismatch".into()))
    }
}

#[cfg(not(windows))]
fn grab_impl() -> Result<RgbaImage, VisionError> {
    Err(VisionError::CaptureUnsupported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn static_grabber_serves_its_frame() {
        let frame = RgbaImage::from_pixel(4, 3, Rgba([1, 2, 3, 255]));
        let mut grabber = StaticGrabber::new(frame.clone());
        assert_eq!(grabber.name(), "static");
        assert_eq!(grabber.grab().unwrap(), frame);
    }

    #[test]
    fn static_grabber_frame_can_be_swapped() {
        let mut grabber = StaticGrabber::new(RgbaImage::new(2, 2));
        let next = RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255]));
        grabber.set_frame(next.clone());
        assert_eq!(grabber.grab().unwrap(), next);
    }

    #[cfg(not(windows))]
    #[test]
    fn platform_grabber_is_unsupported_off_windows() {
        let mut grabber = PlatformGrabber::new();
        assert!(matches!(
            grabber.grab(),
            Err(VisionError::CaptureUnsupported)
        ));
    }
}
