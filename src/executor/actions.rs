use anyhow::{Context, Result};
use enigo::Keyboard as _;
use enigo::Mouse as _;
use enigo::{Axis, Button as EButton, Coordinate, Direction, Enigo, Settings};
use image::GrayImage;
use rand::random_range;
use std::collections::HashMap;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::models::{LogLevel, MouseButton as CMouseButton, Rect};
use crate::utils::window;
use crate::vision::{self, PlatformGrabber, ScreenGrabber, TemplateMatch};

/// Executes low-level actions (input simulation, timing, screen lookups) with
/// optional dry-run mode. In dry-run mode, input and capture are skipped and
/// every action is reported as succeeding, so a task can be rehearsed end to
/// end on any machine.
pub struct ActionExecutor {
    dry_run: bool,
    enigo: Option<Enigo>,
    grabber: Box<dyn ScreenGrabber>,
    /// Reference images decoded once per run, keyed by resolved path.
    templates: HashMap<String, GrayImage>,
}

impl ActionExecutor {
    /// Create an executor backed by the OS screen grabber.
    pub fn new(dry_run: bool) -> Self {
        Self::with_grabber(dry_run, Box::new(PlatformGrabber::new()))
    }

    /// Create an executor with a caller-provided grabber (tests, embedders).
    pub fn with_grabber(dry_run: bool, grabber: Box<dyn ScreenGrabber>) -> Self {
        Self {
            dry_run,
            enigo: None,
            grabber,
            templates: HashMap::new(),
        }
    }

    /// Returns whether the executor is currently in dry-run mode.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Enable or disable dry-run mode dynamically.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    /// Move mouse cursor to absolute screen coordinates.
    pub fn mouse_move_to(&mut self, x: i32, y: i32) -> Result<()> {
        if self.dry_run {
            info!(target: "pixelbot::actions", x, y, "DRY-RUN mouse_move_to");
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "pixelbot::actions", x, y, "mouse_move_to");
        enigo.move_mouse(x, y, Coordinate::Abs)?;
        Ok(())
    }

    /// Click a mouse button one or more times at the current cursor position.
    pub fn mouse_click(&mut self, button: CMouseButton, count: Option<u8>) -> Result<()> {
        let count = count.unwrap_or(1).max(1);
        if self.dry_run {
            info!(target: "pixelbot::actions", ?button, count, "DRY-RUN mouse_click");
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        let btn = map_mouse_button(button);
        trace!(target: "pixelbot::actions", ?button, count, "mouse_click");
        for _ in 0..count {
            enigo.button(btn, Direction::Click)?;
        }
        Ok(())
    }

    /// Scroll the mouse wheel.
    pub fn mouse_scroll(&mut self, delta_x: i32, delta_y: i32) -> Result<()> {
        if self.dry_run {
            info!(target: "pixelbot::actions", delta_x, delta_y, "DRY-RUN mouse_scroll");
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "pixelbot::actions", delta_x, delta_y, "mouse_scroll");
        if delta_x != 0 {
            let _ = enigo.scroll(delta_x, Axis::Horizontal);
        }
        if delta_y != 0 {
            let _ = enigo.scroll(delta_y, Axis::Vertical);
        }
        Ok(())
    }

    /// Send a key sequence. Supports enigo's special key syntax like "{ENTER}".
    pub fn key_sequence(&mut self, text: &str) -> Result<()> {
        if self.dry_run {
            info!(target: "pixelbot::actions", %text, "DRY-RUN key_sequence");
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "pixelbot::actions", %text, "key_sequence");
        let _ = enigo.text(text);
        Ok(())
    }

    /// Type literal text (unicode).
    pub fn type_text(&mut self, text: &str) -> Result<()> {
        if self.dry_run {
            info!(target: "pixelbot::actions", %text, "DRY-RUN type_text");
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "pixelbot::actions", %text, "type_text");
        let _ = enigo.text(text);
        Ok(())
    }

    /// Sleep for a fixed duration in milliseconds (blocking).
    pub fn sleep_ms(&self, ms: u64) -> Result<()> {
        if self.dry_run {
            info!(target: "pixelbot::actions", ms, "DRY-RUN sleep_ms");
            return Ok(());
        }
        trace!(target: "pixelbot::actions", ms, "sleep_ms");
        thread::sleep(Duration::from_millis(ms));
        Ok(())
    }

    /// Sleep for a random duration in milliseconds within [min, max] inclusive (blocking).
    pub fn sleep_rand_ms(&self, min: u64, max: u64) -> Result<()> {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        let delay = if lo == hi { lo } else { random_range(lo..=hi) };
        if self.dry_run {
            info!(target: "pixelbot::actions", min = lo, max = hi, delay, "DRY-RUN sleep_rand_ms");
            return Ok(());
        }
        trace!(target: "pixelbot::actions", min = lo, max = hi, delay, "sleep_rand_ms");
        thread::sleep(Duration::from_millis(delay));
        Ok(())
    }

    /// Try to focus a window with title containing the substring.
    /// Returns Ok(true) if a window was focused.
    pub fn focus_window(&self, title_contains: &str) -> Result<bool> {
        if self.dry_run {
            info!(target: "pixelbot::actions", %title_contains, "DRY-RUN focus_window");
            return Ok(true);
        }
        trace!(target: "pixelbot::actions", %title_contains, "focus_window");
        let focused = window::focus_window(title_contains)
            .with_context(|| format!("focus_window({title_contains}) failed"))?;
        if focused {
            debug!(target: "pixelbot::actions", %title_contains, "focus_window: focused=true");
        } else {
            warn!(target: "pixelbot::actions", %title_contains, "focus_window: no match");
        }
        Ok(focused)
    }

    /// Log a message with a given level, useful within tasks.
    pub fn log_message(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => trace!(target: "pixelbot", "{message}"),
            LogLevel::Debug => debug!(target: "pixelbot", "{message}"),
            LogLevel::Info => info!(target: "pixelbot", "{message}"),
            LogLevel::Warn => warn!(target: "pixelbot", "{message}"),
            LogLevel::Error => tracing::error!(target: "pixelbot", "{message}"),
        }
    }

    /// Capture the screen once and search it for the template.
    ///
    /// In dry-run mode this reports a synthetic full-score match at the
    /// search origin so rehearsed tasks proceed past recognition steps.
    pub fn find_image(
        &mut self,
        template_path: &str,
        region: Option<Rect>,
        min_score: f32,
    ) -> Result<Option<TemplateMatch>> {
        if self.dry_run {
            info!(
                target: "pixelbot::actions",
                template = %template_path, ?region, min_score,
                "DRY-RUN find_image (reporting synthetic match)"
            );
            return Ok(Some(synthetic_match(region)));
        }

        let frame = self
            .grabber
            .grab()
            .with_context(|| format!("Screen capture failed ({})", self.grabber.name()))?;
        let gray = vision::to_gray(&frame);
        let template = self.template(template_path)?;

        let found = vision::locate(&gray, template, region, min_score)
            .with_context(|| format!("Template search failed for {template_path}"))?;

        match &found {
            Some(m) => debug!(
                target: "pixelbot::actions",
                template = %template_path,
                x = m.center_x, y = m.center_y, score = m.score,
                "find_image: matched"
            ),
            None => trace!(
                target: "pixelbot::actions",
                template = %template_path, min_score,
                "find_image: below threshold"
            ),
        }
        Ok(found)
    }

    /// Poll the screen until the template appears or the timeout elapses.
    /// Returns Ok(None) on timeout; the caller decides whether that fails the run.
    pub fn wait_for_image(
        &mut self,
        template_path: &str,
        region: Option<Rect>,
        min_score: f32,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Option<TemplateMatch>> {
        if self.dry_run {
            info!(
                target: "pixelbot::actions",
                template = %template_path, ?timeout, "DRY-RUN wait_for_image"
            );
            return Ok(Some(synthetic_match(region)));
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(m) = self.find_image(template_path, region, min_score)? {
                return Ok(Some(m));
            }
            if Instant::now() >= deadline {
                warn!(
                    target: "pixelbot::actions",
                    template = %template_path, timeout_ms = timeout.as_millis() as u64,
                    "wait_for_image: timed out"
                );
                return Ok(None);
            }
            thread::sleep(interval);
        }
    }

    /// Poll the screen until the template no longer matches.
    /// Returns Ok(true) once it is gone, Ok(false) on timeout.
    pub fn wait_for_image_gone(
        &mut self,
        template_path: &str,
        region: Option<Rect>,
        min_score: f32,
        timeout: Duration,
        interval: Duration,
    ) -> Result<bool> {
        if self.dry_run {
            info!(
                target: "pixelbot::actions",
                template = %template_path, ?timeout, "DRY-RUN wait_for_image_gone"
            );
            return Ok(true);
        }

        let deadline = Instant::now() + timeout;
        loop {
            if self.find_image(template_path, region, min_score)?.is_none() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                warn!(
                    target: "pixelbot::actions",
                    template = %template_path, timeout_ms = timeout.as_millis() as u64,
                    "wait_for_image_gone: timed out"
                );
                return Ok(false);
            }
            thread::sleep(interval);
        }
    }

    /// Capture the screen (optionally a sub-region) and save it as PNG,
    /// creating parent directories as needed.
    pub fn capture_screen(&mut self, path: &str, region: Option<Rect>) -> Result<()> {
        if self.dry_run {
            info!(target: "pixelbot::actions", %path, ?region, "DRY-RUN capture_screen");
            return Ok(());
        }
        let frame = self
            .grabber
            .grab()
            .with_context(|| format!("Screen capture failed ({})", self.grabber.name()))?;
        let shot = match region {
            Some(rect) => vision::crop_frame(&frame, rect)
                .with_context(|| format!("Invalid capture region {rect:?}"))?,
            None => frame,
        };
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        shot.save(path)
            .with_context(|| format!("Failed to write screenshot to {path}"))?;
        info!(target: "pixelbot::actions", %path, "capture_screen: saved");
        Ok(())
    }

    fn template(&mut self, path: &str) -> Result<&GrayImage> {
        if !self.templates.contains_key(path) {
            trace!(target: "pixelbot::actions", template = %path, "loading template");
            let img = vision::load_template(path)
                .with_context(|| format!("Failed to load template {path}"))?;
            self.templates.insert(path.to_string(), img);
        }
        Ok(&self.templates[path])
    }

    fn ensure_enigo(&mut self) -> Result<&mut Enigo> {
        if self.enigo.is_none() {
            trace!(target: "pixelbot::actions", "Initializing Enigo");
            self.enigo =
                Some(Enigo::new(&Settings::default()).context("Failed to initialize Enigo")?);
        }
        Ok(self.enigo.as_mut().expect("Enigo must be initialized"))
    }
}

/// Dry-run stand-in: a perfect-score match at the search origin.
fn synthetic_match(region: Option<Rect>) -> TemplateMatch {
    let (x, y) = region.map_or((0, 0), |r| (r.x.max(0) as u32, r.y.max(0) as u32));
    TemplateMatch {
        left: x,
        top: y,
        center_x: x,
        center_y: y,
        score: 1.0,
    }
}

fn map_mouse_button(btn: CMouseButton) -> EButton {
    match btn {
        CMouseButton::Left => EButton::Left,
        CMouseButton::Middle => EButton::Middle,
        CMouseButton::Right => EButton::Right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::StaticGrabber;
    use image::{Luma, Rgba, RgbaImage};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEMPLATE_SEQ: AtomicUsize = AtomicUsize::new(0);

    /// Write a white-square template PNG to a temp path and return it.
    fn white_square_template(side: u32) -> PathBuf {
        let dir = std::env::temp_dir().join("pixelbot-actions-tests");
        std::fs::create_dir_all(&dir).unwrap();
        let n = TEMPLATE_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("square-{}-{n}.png", std::process::id()));
        let img = image::GrayImage::from_pixel(side, side, Luma([255u8]));
        img.save(&path).unwrap();
        path
    }

    /// Black RGBA frame with a white square at (x, y).
    fn frame_with_square(w: u32, h: u32, x: u32, y: u32, side: u32) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]));
        for dy in 0..side {
            for dx in 0..side {
                img.put_pixel(x + dx, y + dy, Rgba([255, 255, 255, 255]));
            }
        }
        img
    }

    fn executor_with_frame(frame: RgbaImage) -> ActionExecutor {
        ActionExecutor::with_grabber(false, Box::new(StaticGrabber::new(frame)))
    }

    #[test]
    fn find_image_locates_square_on_static_frame() {
        let template = white_square_template(8);
        let mut ex = executor_with_frame(frame_with_square(64, 48, 30, 12, 8));
        let m = ex
            .find_image(template.to_str().unwrap(), None, 0.9)
            .unwrap()
            .expect("square should match");
        assert_eq!((m.left, m.top), (30, 12));
        assert_eq!((m.center_x, m.center_y), (34, 16));
    }

    #[test]
    fn find_image_misses_on_blank_frame() {
        let template = white_square_template(8);
        let blank = RgbaImage::from_pixel(64, 48, Rgba([0, 0, 0, 255]));
        let mut ex = executor_with_frame(blank);
        let found = ex.find_image(template.to_str().unwrap(), None, 0.9).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn wait_for_image_times_out_quickly_when_absent() {
        let template = white_square_template(4);
        let blank = RgbaImage::from_pixel(32, 32, Rgba([0, 0, 0, 255]));
        let mut ex = executor_with_frame(blank);
        let found = ex
            .wait_for_image(
                template.to_str().unwrap(),
                None,
                0.9,
                Duration::from_millis(60),
                Duration::from_millis(10),
            )
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn wait_for_image_gone_succeeds_when_never_present() {
        let template = white_square_template(4);
        let blank = RgbaImage::from_pixel(32, 32, Rgba([0, 0, 0, 255]));
        let mut ex = executor_with_frame(blank);
        let gone = ex
            .wait_for_image_gone(
                template.to_str().unwrap(),
                None,
                0.9,
                Duration::from_millis(60),
                Duration::from_millis(10),
            )
            .unwrap();
        assert!(gone);
    }

    #[test]
    fn dry_run_reports_synthetic_match_without_capturing() {
        // The template path does not exist; dry-run must not touch it.
        let mut ex = ActionExecutor::new(true);
        let m = ex
            .find_image("/missing/button.png", None, 0.8)
            .unwrap()
            .expect("dry-run always matches");
        assert_eq!(m.score, 1.0);
    }

    #[test]
    fn templates_are_cached_per_path() {
        let template = white_square_template(4);
        let mut ex = executor_with_frame(frame_with_square(32, 32, 5, 5, 4));
        let key = template.to_str().unwrap().to_string();
        ex.find_image(&key, None, 0.9).unwrap();
        assert!(ex.templates.contains_key(&key));
        // Deleting the file no longer matters once cached.
        std::fs::remove_file(&template).unwrap();
        assert!(ex.find_image(&key, None, 0.9).unwrap().is_some());
    }

    #[test]
    fn capture_screen_writes_png() {
        let dir = std::env::temp_dir().join("pixelbot-actions-tests");
        std::fs::create_dir_all(&dir).unwrap();
        let out = dir.join(format!("shot-{}.png", std::process::id()));
        let mut ex = executor_with_frame(frame_with_square(20, 20, 2, 2, 4));
        ex.capture_screen(out.to_str().unwrap(), None).unwrap();
        let saved = image::open(&out).unwrap();
        assert_eq!((saved.width(), saved.height()), (20, 20));
        std::fs::remove_file(&out).unwrap();
    }
}
