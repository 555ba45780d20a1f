use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::config::{ActionDef, Config, MouseButton};
use crate::executor::actions::ActionExecutor;
use crate::utils::interpolation;
use crate::vision::TemplateMatch;

/// Maximum nesting depth for action execution (to protect against cycles).
const MAX_DEPTH: usize = 64;

/// Runtime is responsible for:
/// - executing the batch `steps` top-to-bottom, aborting on the first failure
/// - interpolating strings using run variables and task globals
/// - exposing image-match results as variables for later steps
/// - dispatching actions to the low-level ActionExecutor
pub struct Runtime {
    config: Config,
    executor: ActionExecutor,
}

impl Runtime {
    /// Create a new runtime with the given task config and dry-run mode.
    pub fn new(config: Config, dry_run: bool) -> Self {
        Self {
            config,
            executor: ActionExecutor::new(dry_run),
        }
    }

    /// Create a runtime with a caller-provided executor (tests, embedders).
    pub fn with_executor(config: Config, executor: ActionExecutor) -> Self {
        Self { config, executor }
    }

    /// Returns a reference to the task configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a mutable reference to the configuration (e.g., to tweak globals at runtime).
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Enable or disable dry-run mode at runtime.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.executor.set_dry_run(dry_run);
    }

    /// Is dry-run currently enabled?
    pub fn is_dry_run(&self) -> bool {
        self.executor.is_dry_run()
    }

    /// Execute the task's `steps` once, top-to-bottom.
    ///
    /// The first failing step aborts the run; its error carries the step
    /// index so the operator can find the offending entry in the task file.
    pub fn run_batch(&mut self) -> Result<()> {
        let steps = self.config.steps.clone();
        info!(
            target: "pixelbot::runtime",
            steps = steps.len(),
            dry_run = self.is_dry_run(),
            "Starting batch run"
        );

        let mut vars = HashMap::new();
        for (idx, step) in steps.iter().enumerate() {
            trace!(target: "pixelbot::runtime", step_index = idx, "Executing step");
            self.execute_action(step, &mut vars, 0)
                .with_context(|| format!("Batch failed at step {idx}"))?;
        }

        info!(target: "pixelbot::runtime", "Batch run completed");
        Ok(())
    }

    /// Execute a single action against a caller-owned variables map.
    /// Interactive mode uses this so variables persist across stdin lines.
    pub fn run_action(&mut self, action: &ActionDef, vars: &mut HashMap<String, String>) -> Result<()> {
        self.execute_action(action, vars, 0)
    }

    /// Execute a single action with recursion/sequence support.
    fn execute_action(
        &mut self,
        action: &ActionDef,
        vars: &mut HashMap<String, String>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            bail!("Maximum action nesting depth ({MAX_DEPTH}) exceeded (possible cycle)");
        }

        match action {
            ActionDef::Sequence { steps } => {
                for (i, step) in steps.iter().enumerate() {
                    trace!(target: "pixelbot::runtime", depth, step_index = i, "Sequence step");
                    self.execute_action(step, vars, depth + 1)?;
                }
                Ok(())
            }

            ActionDef::Ref { name } => {
                let referenced = self
                    .config
                    .actions
                    .get(name)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("Referenced action '{}' not found", name))?;
                trace!(target: "pixelbot::runtime", %name, depth, "Resolving Ref action");
                self.execute_action(&referenced, vars, depth + 1)
            }

            // Mouse
            ActionDef::MouseMove { x, y } => self.executor.mouse_move_to(*x, *y),
            ActionDef::MouseClick { button, count } => self.executor.mouse_click(*button, *count),
            ActionDef::MouseScroll { delta_x, delta_y } => {
                self.executor.mouse_scroll(*delta_x, *delta_y)
            }

            // Keyboard
            ActionDef::KeySeq { text } => {
                let s = self.interp(text, vars);
                self.executor.key_sequence(&s)
            }
            ActionDef::TypeText { text } => {
                let s = self.interp(text, vars);
                self.executor.type_text(&s)
            }

            // Timing
            ActionDef::SleepMs { ms } => self.executor.sleep_ms(*ms),
            ActionDef::SleepRandMs { min, max } => self.executor.sleep_rand_ms(*min, *max),

            // Window
            ActionDef::FocusWindow { title_contains } => {
                let title = self.interp(title_contains, vars);
                let focused = self.executor.focus_window(&title)?;
                if !focused {
                    bail!("No window with title containing '{title}' could be focused");
                }
                Ok(())
            }

            // Image recognition
            ActionDef::FindImage {
                template,
                region,
                confidence,
            } => {
                let min_score = self.confidence_or_default(*confidence);
                match self.executor.find_image(template, *region, min_score)? {
                    Some(m) => {
                        store_match_vars(vars, &m);
                        Ok(())
                    }
                    None => bail!("Template '{template}' not found on screen"),
                }
            }

            ActionDef::WaitForImage {
                template,
                region,
                confidence,
                timeout_ms,
                interval_ms,
            } => {
                let min_score = self.confidence_or_default(*confidence);
                let (timeout, interval) = self.polling_or_default(*timeout_ms, *interval_ms);
                match self
                    .executor
                    .wait_for_image(template, *region, min_score, timeout, interval)?
                {
                    Some(m) => {
                        store_match_vars(vars, &m);
                        Ok(())
                    }
                    None => bail!(
                        "Template '{template}' did not appear within {} ms",
                        timeout.as_millis()
                    ),
                }
            }

            ActionDef::WaitForImageGone {
                template,
                region,
                confidence,
                timeout_ms,
                interval_ms,
            } => {
                let min_score = self.confidence_or_default(*confidence);
                let (timeout, interval) = self.polling_or_default(*timeout_ms, *interval_ms);
                if self
                    .executor
                    .wait_for_image_gone(template, *region, min_score, timeout, interval)?
                {
                    Ok(())
                } else {
                    bail!(
                        "Template '{template}' was still on screen after {} ms",
                        timeout.as_millis()
                    )
                }
            }

            ActionDef::ClickImage {
                template,
                region,
                confidence,
                button,
                count,
                offset_x,
                offset_y,
                timeout_ms,
                interval_ms,
            } => {
                let min_score = self.confidence_or_default(*confidence);
                let (timeout, interval) = self.polling_or_default(*timeout_ms, *interval_ms);
                let Some(m) = self
                    .executor
                    .wait_for_image(template, *region, min_score, timeout, interval)?
                else {
                    bail!(
                        "Template '{template}' did not appear within {} ms",
                        timeout.as_millis()
                    );
                };
                store_match_vars(vars, &m);

                let x = i64::from(m.center_x) + i64::from(*offset_x);
                let y = i64::from(m.center_y) + i64::from(*offset_y);
                debug!(
                    target: "pixelbot::runtime",
                    template = %template, x, y, score = m.score,
                    "click_image: clicking match"
                );
                self.executor
                    .mouse_move_to(x as i32, y as i32)
                    .with_context(|| format!("Failed to move to match of '{template}'"))?;
                self.executor
                    .mouse_click(button.unwrap_or(MouseButton::Left), *count)
                    .with_context(|| format!("Failed to click match of '{template}'"))
            }

            ActionDef::CaptureScreen { path, region } => {
                let p = self.interp(path, vars);
                self.executor.capture_screen(&p, *region)
            }

            // Logic & State
            ActionDef::SetVar { name, value } => {
                let k = self.interp(name, vars);
                let v = self.interp(value, vars);
                trace!(target: "pixelbot::runtime", key = %k, value = %v, "SetVar");
                vars.insert(k, v);
                Ok(())
            }
            ActionDef::Conditional {
                when,
                equals,
                then,
                else_,
            } => {
                let lhs = self.interp(when, vars);
                let rhs = self.interp(equals, vars);
                debug!(
                    target: "pixelbot::runtime",
                    when = %lhs, equals = %rhs, depth,
                    "Conditional evaluation"
                );
                if lhs == rhs {
                    self.execute_action(then, vars, depth + 1)
                } else if let Some(else_action) = else_ {
                    self.execute_action(else_action, vars, depth + 1)
                } else {
                    Ok(())
                }
            }

            // Logging
            ActionDef::Log { level, message } => {
                let msg = self.interp(message, vars);
                self.executor.log_message(*level, &msg);
                Ok(())
            }
        }
    }

    fn confidence_or_default(&self, confidence: Option<f32>) -> f32 {
        confidence.unwrap_or(self.config.settings.default_confidence)
    }

    fn polling_or_default(
        &self,
        timeout_ms: Option<u64>,
        interval_ms: Option<u64>,
    ) -> (Duration, Duration) {
        (
            Duration::from_millis(timeout_ms.unwrap_or(self.config.settings.default_timeout_ms)),
            Duration::from_millis(interval_ms.unwrap_or(self.config.settings.default_interval_ms)),
        )
    }

    /// Interpolate a string with the current variables and task globals.
    fn interp(&self, s: &str, vars: &HashMap<String, String>) -> String {
        interpolation::interpolate_string(s, vars, &self.config.globals)
    }
}

/// Expose a match to later steps as `{{match_x}}`, `{{match_y}}`,
/// `{{match_score}}` (center coordinates, screen space).
fn store_match_vars(vars: &mut HashMap<String, String>, m: &TemplateMatch) {
    vars.insert("match_x".into(), m.center_x.to_string());
    vars.insert("match_y".into(), m.center_y.to_string());
    vars.insert("match_score".into(), format!("{:.4}", m.score));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use crate::executor::actions::ActionExecutor;
    use crate::vision::StaticGrabber;
    use image::{Luma, Rgba, RgbaImage};
    use serde_json::Value;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEMPLATE_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn white_square_template(side: u32) -> PathBuf {
        let dir = std::env::temp_dir().join("pixelbot-runtime-tests");
        std::fs::create_dir_all(&dir).unwrap();
        let n = TEMPLATE_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("square-{}-{n}.png", std::process::id()));
        image::GrayImage::from_pixel(side, side, Luma([255u8]))
            .save(&path)
            .unwrap();
        path
    }

    fn frame_with_square(w: u32, h: u32, x: u32, y: u32, side: u32) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]));
        for dy in 0..side {
            for dx in 0..side {
                img.put_pixel(x + dx, y + dy, Rgba([255, 255, 255, 255]));
            }
        }
        img
    }

    fn runtime_with_frame(cfg: Config, frame: RgbaImage) -> Runtime {
        let executor = ActionExecutor::with_grabber(false, Box::new(StaticGrabber::new(frame)));
        Runtime::with_executor(cfg, executor)
    }

    #[test]
    fn batch_with_no_steps_succeeds() {
        let mut rt = Runtime::new(Config::default(), true);
        rt.run_batch().unwrap();
    }

    #[test]
    fn find_image_step_stores_match_vars() {
        let template = white_square_template(6);
        let cfg = Config {
            steps: vec![ActionDef::FindImage {
                template: template.to_str().unwrap().into(),
                region: None,
                confidence: Some(0.9),
            }],
            ..Default::default()
        };
        let mut rt = runtime_with_frame(cfg.clone(), frame_with_square(40, 40, 10, 20, 6));

        // Run the step through run_action so the vars map is observable.
        let mut vars = HashMap::new();
        let step = cfg.steps[0].clone();
        rt.run_action(&step, &mut vars).unwrap();
        assert_eq!(vars.get("match_x").unwrap(), "13");
        assert_eq!(vars.get("match_y").unwrap(), "23");
        assert!(vars.contains_key("match_score"));
    }

    #[test]
    fn wait_for_image_step_fails_batch_when_absent() {
        let template = white_square_template(6);
        let cfg = Config {
            steps: vec![ActionDef::WaitForImage {
                template: template.to_str().unwrap().into(),
                region: None,
                confidence: Some(0.9),
                timeout_ms: Some(50),
                interval_ms: Some(10),
            }],
            ..Default::default()
        };
        let blank = RgbaImage::from_pixel(40, 40, Rgba([0, 0, 0, 255]));
        let mut rt = runtime_with_frame(cfg, blank);
        let err = rt.run_batch().unwrap_err();
        assert!(format!("{err:#}").contains("step 0"));
    }

    #[test]
    fn ref_cycle_hits_depth_limit() {
        let mut cfg = Config::default();
        cfg.actions.insert(
            "loop".into(),
            ActionDef::Ref {
                name: "loop".into(),
            },
        );
        cfg.steps = vec![ActionDef::Ref {
            name: "loop".into(),
        }];
        let mut rt = Runtime::new(cfg, true);
        let err = rt.run_batch().unwrap_err();
        assert!(format!("{err:#}").contains("nesting depth"));
    }

    #[test]
    fn conditional_runs_matching_branch() {
        let cfg = Config {
            steps: vec![
                ActionDef::SetVar {
                    name: "mode".into(),
                    value: "fast".into(),
                },
                ActionDef::Conditional {
                    when: "{{mode}}".into(),
                    equals: "fast".into(),
                    then: Box::new(ActionDef::Log {
                        level: LogLevel::Info,
                        message: "fast path".into(),
                    }),
                    else_: None,
                },
            ],
            ..Default::default()
        };
        let mut rt = Runtime::new(cfg, true);
        rt.run_batch().unwrap();
    }

    #[test]
    fn dry_run_batch_passes_recognition_steps() {
        let cfg = Config {
            steps: vec![ActionDef::ClickImage {
                template: "/missing/button.png".into(),
                region: None,
                confidence: None,
                button: None,
                count: None,
                offset_x: 0,
                offset_y: 0,
                timeout_ms: Some(50),
                interval_ms: Some(10),
            }],
            ..Default::default()
        };
        let mut rt = Runtime::new(cfg, true);
        rt.run_batch().unwrap();
    }

    #[test]
    fn interactive_actions_parse_and_execute() {
        let mut rt = Runtime::new(Config::default(), true);
        let mut vars = HashMap::new();

        let line: Value =
            serde_json::from_str(r#"{"type":"set_var","name":"who","value":"operator"}"#).unwrap();
        let action: ActionDef = serde_json::from_value(line).unwrap();
        rt.run_action(&action, &mut vars).unwrap();
        assert_eq!(vars.get("who").unwrap(), "operator");
    }
}
