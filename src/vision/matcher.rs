//! Grayscale template matching over captured screen frames.
//!
//! Matching uses normalized cross-correlation from `imageproc`; the best
//! scoring location wins if it clears the caller's confidence threshold.
//! Searches may be restricted to a sub-region of the frame; reported
//! coordinates are always in full-frame space.

use image::GrayImage;
use imageproc::template_matching::{MatchTemplateMethod, find_extremes, match_template};
use tracing::trace;

use crate::config::Rect;
use crate::vision::VisionError;

/// A successful template match, in full-frame screen coordinates.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TemplateMatch {
    /// Top-left corner of the matched area.
    pub left: u32,
    pub top: u32,
    /// Center of the matched area (the natural click target).
    pub center_x: u32,
    pub center_y: u32,
    /// Match score in [0.0, 1.0]; higher is better.
    pub score: f32,
}

/// Search `frame` (optionally restricted to `region`) for the single best
/// occurrence of `template`.
///
/// Returns `Ok(None)` when the best score falls below `min_score`. Errors are
/// reserved for structurally impossible searches (template larger than the
/// search area, region entirely off-screen).
pub fn locate(
    frame: &GrayImage,
    template: &GrayImage,
    region: Option<Rect>,
    min_score: f32,
) -> Result<Option<TemplateMatch>, VisionError> {
    let (off_x, off_y, search) = match region {
        Some(rect) => {
            let (x, y, w, h) = clamp_region(rect, frame.width(), frame.height())
                .ok_or(VisionError::RegionOutOfBounds(rect))?;
            (x, y, image::imageops::crop_imm(frame, x, y, w, h).to_image())
        }
        None => (0, 0, frame.clone()),
    };

    if template.width() > search.width() || template.height() > search.height() {
        return Err(VisionError::TemplateTooLarge {
            template_w: template.width(),
            template_h: template.height(),
            search_w: search.width(),
            search_h: search.height(),
        });
    }

    let scores = match_template(
        &search,
        template,
        MatchTemplateMethod::CrossCorrelationNormalized,
    );
    let extremes = find_extremes(&scores);
    // A constant (e.g., all-black) search patch makes the normalization
    // denominator zero; treat the resulting non-finite score as no match.
    if !extremes.max_value.is_finite() {
        return Ok(None);
    }
    let score = extremes.max_value.clamp(0.0, 1.0);
    let (mx, my) = extremes.max_value_location;

    trace!(
        target: "pixelbot::vision",
        score,
        x = off_x + mx,
        y = off_y + my,
        min_score,
        "template match extremes"
    );

    if score < min_score {
        return Ok(None);
    }

    let left = off_x + mx;
    let top = off_y + my;
    Ok(Some(TemplateMatch {
        left,
        top,
        center_x: left + template.width() / 2,
        center_y: top + template.height() / 2,
        score,
    }))
}

/// Clamp a possibly-negative/oversized region to the frame bounds.
/// Returns `None` when nothing of the region lies inside the frame.
pub(crate) fn clamp_region(rect: Rect, frame_w: u32, frame_h: u32) -> Option<(u32, u32, u32, u32)> {
    if rect.width <= 0 || rect.height <= 0 {
        return None;
    }
    let x0 = rect.x.max(0) as u32;
    let y0 = rect.y.max(0) as u32;
    if x0 >= frame_w || y0 >= frame_h {
        return None;
    }
    // Right/bottom edges in frame space, after clipping the negative part.
    let x1 = rect.x.saturating_add(rect.width).max(0) as u32;
    let y1 = rect.y.saturating_add(rect.height).max(0) as u32;
    let x1 = x1.min(frame_w);
    let y1 = y1.min(frame_h);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0, y0, x1 - x0, y1 - y0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Black frame with a white square whose top-left corner is at (x, y).
    fn frame_with_square(w: u32, h: u32, x: u32, y: u32, side: u32) -> GrayImage {
        let mut img = GrayImage::new(w, h);
        for dy in 0..side {
            for dx in 0..side {
                img.put_pixel(x + dx, y + dy, Luma([255u8]));
            }
        }
        img
    }

    fn white_square(side: u32) -> GrayImage {
        GrayImage::from_pixel(side, side, Luma([255u8]))
    }

    #[test]
    fn finds_template_at_expected_position() {
        let frame = frame_with_square(64, 48, 20, 10, 8);
        let m = locate(&frame, &white_square(8), None, 0.9)
            .unwrap()
            .expect("square should be found");
        assert_eq!((m.left, m.top), (20, 10));
        assert_eq!((m.center_x, m.center_y), (24, 14));
        assert!(m.score >= 0.9);
    }

    #[test]
    fn absent_template_is_not_found() {
        let frame = GrayImage::new(64, 48);
        let found = locate(&frame, &white_square(8), None, 0.5).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn region_restricts_search_but_reports_frame_coordinates() {
        // Two identical squares; only the right one is inside the region.
        let mut frame = frame_with_square(100, 40, 10, 10, 6);
        for dy in 0..6 {
            for dx in 0..6 {
                frame.put_pixel(70 + dx, 10 + dy, Luma([255u8]));
            }
        }
        let region = Rect {
            x: 50,
            y: 0,
            width: 50,
            height: 40,
        };
        let m = locate(&frame, &white_square(6), Some(region), 0.9)
            .unwrap()
            .expect("square inside region should be found");
        assert_eq!((m.left, m.top), (70, 10));
    }

    #[test]
    fn oversized_template_is_an_error() {
        let frame = GrayImage::new(10, 10);
        let err = locate(&frame, &white_square(20), None, 0.5).unwrap_err();
        assert!(matches!(err, VisionError::TemplateTooLarge { .. }));
    }

    #[test]
    fn off_screen_region_is_an_error() {
        let frame = GrayImage::new(10, 10);
        let region = Rect {
            x: 100,
            y: 100,
            width: 5,
            height: 5,
        };
        let err = locate(&frame, &white_square(2), Some(region), 0.5).unwrap_err();
        assert!(matches!(err, VisionError::RegionOutOfBounds(_)));
    }

    #[test]
    fn clamp_region_clips_negative_origin() {
        let r = Rect {
            x: -5,
            y: -5,
            width: 20,
            height: 20,
        };
        assert_eq!(clamp_region(r, 100, 100), Some((0, 0, 15, 15)));
    }

    #[test]
    fn clamp_region_rejects_empty() {
        let r = Rect {
            x: 0,
            y: 0,
            width: 0,
            height: 10,
        };
        assert_eq!(clamp_region(r, 100, 100), None);
    }
}
