use schemars::JsonSchema;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root task configuration for Pixelbot.
///
/// This structure is deserialized from a JSON task file. It captures
/// everything a batch run needs:
/// - run `settings` (countdown, exit delay, window handling, match defaults)
/// - the ordered `steps` the run executes top-to-bottom
/// - reusable/named `actions`
/// - global variables available to interpolation (`globals`)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct Config {
    /// Run-level settings (countdown, exit delay, minimization, defaults).
    #[serde(default)]
    pub settings: Settings,

    /// Ordered batch steps, consumed once, top-to-bottom.
    #[serde(default)]
    pub steps: Vec<ActionDef>,

    /// Reusable named actions (macros, composites, or single actions).
    /// Reference one with: `{ "type": "ref", "name": "my_action" }`.
    #[serde(default)]
    pub actions: NamedActions,

    /// Global variables accessible via interpolation (e.g., `{{@app_name}}`).
    /// Values can be any JSON value (string/number/bool/object/array).
    #[serde(default)]
    pub globals: GlobalsMap,
}

/// A convenient alias for named action map.
pub type NamedActions = BTreeMap<String, ActionDef>;

/// Global variables.
pub type GlobalsMap = BTreeMap<String, serde_json::Value>;

/// Run-level settings with conservative defaults matching the classic
/// batch-tool behavior: a 10 second countdown before the run, a 5 second
/// pause before exit, and console minimization while steps execute.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Settings {
    /// Seconds counted down (and logged) before the first step runs.
    pub countdown_secs: u64,

    /// Seconds to wait after the run finishes before the process exits.
    pub exit_delay_secs: u64,

    /// Minimize the tool's own console window while steps execute.
    pub minimize_window: bool,

    /// Default minimum match score for image actions that omit `confidence`.
    pub default_confidence: f32,

    /// Default polling timeout in milliseconds for `wait_for_image` /
    /// `click_image` actions that omit `timeout_ms`.
    pub default_timeout_ms: u64,

    /// Default polling interval in milliseconds for image wait actions.
    pub default_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            countdown_secs: 10,
            exit_delay_secs: 5,
            minimize_window: true,
            default_confidence: 0.8,
            default_timeout_ms: 10_000,
            default_interval_ms: 250,
        }
    }
}

/// Action definition.
///
/// This is the heart of the runtime. Actions can be:
/// - primitives (mouse, keyboard, timing, logging)
/// - image-recognition actions (find/wait/click against a template image)
/// - composites (`sequence`)
/// - references to named actions (`ref`)
///
/// String fields support interpolation with:
/// - run variables: `{{var_name}}`
/// - globals: `{{@global_key}}`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionDef {
    /// A sequence of actions executed in order.
    Sequence { steps: Vec<ActionDef> },

    /// Reference a named action from the `actions` map.
    Ref {
        /// The name of the action to reference.
        name: String,
    },

    // --- Input: Mouse ---
    /// Move the mouse cursor to an absolute screen position.
    MouseMove { x: i32, y: i32 },

    /// Click a mouse button one or more times at the current cursor position.
    MouseClick {
        button: MouseButton,
        /// Number of clicks (default: 1).
        #[serde(default)]
        count: Option<u8>,
    },

    /// Scroll the mouse wheel. Positive values scroll down/right.
    MouseScroll {
        /// Horizontal scroll delta.
        #[serde(default)]
        delta_x: i32,
        /// Vertical scroll delta.
        #[serde(default)]
        delta_y: i32,
    },

    // --- Input: Keyboard ---
    /// Send a raw key sequence using Enigo's syntax,
    /// e.g., "{WIN}rnotepad{ENTER}".
    KeySeq { text: String },

    /// Type literal text (handles unicode).
    TypeText { text: String },

    // --- Timing ---
    /// Sleep for a fixed duration in milliseconds.
    SleepMs { ms: u64 },

    /// Sleep for a random duration in milliseconds within [min, max].
    SleepRandMs { min: u64, max: u64 },

    // --- Window Management ---
    /// Attempt to focus a window whose title contains the given substring.
    FocusWindow { title_contains: String },

    // --- Image Recognition ---
    /// Locate `template` on the current screen once. On success the match is
    /// exposed to later steps as `{{match_x}}`, `{{match_y}}` (template
    /// center, screen coordinates) and `{{match_score}}`. Not finding the
    /// template fails the step.
    FindImage {
        /// Path to the reference image, relative to the task file.
        template: String,
        /// Optional sub-region of the screen to search.
        #[serde(default)]
        region: Option<Rect>,
        /// Minimum acceptable match score in (0.0, 1.0].
        #[serde(default)]
        confidence: Option<f32>,
    },

    /// Poll the screen until `template` appears or `timeout_ms` elapses.
    /// Timing out fails the step. Stores the same match variables as
    /// `find_image`.
    WaitForImage {
        template: String,
        #[serde(default)]
        region: Option<Rect>,
        #[serde(default)]
        confidence: Option<f32>,
        /// Give up after this many milliseconds (default from settings).
        #[serde(default)]
        timeout_ms: Option<u64>,
        /// Delay between capture attempts (default from settings).
        #[serde(default)]
        interval_ms: Option<u64>,
    },

    /// Poll the screen until `template` no longer matches anywhere in the
    /// search region, or fail once `timeout_ms` elapses.
    WaitForImageGone {
        template: String,
        #[serde(default)]
        region: Option<Rect>,
        #[serde(default)]
        confidence: Option<f32>,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        interval_ms: Option<u64>,
    },

    /// Locate `template` (polling like `wait_for_image`), move the cursor to
    /// the match center plus the optional offset, and click.
    ClickImage {
        template: String,
        #[serde(default)]
        region: Option<Rect>,
        #[serde(default)]
        confidence: Option<f32>,
        /// Button to click (default: left).
        #[serde(default)]
        button: Option<MouseButton>,
        /// Number of clicks (default: 1).
        #[serde(default)]
        count: Option<u8>,
        /// Horizontal offset from the match center.
        #[serde(default)]
        offset_x: i32,
        /// Vertical offset from the match center.
        #[serde(default)]
        offset_y: i32,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        interval_ms: Option<u64>,
    },

    /// Capture a screenshot to a PNG file.
    CaptureScreen {
        /// Output file path (e.g., "shots/after_login.png").
        path: String,
        /// Optional region to capture.
        #[serde(default)]
        region: Option<Rect>,
    },

    // --- Logic & State ---
    /// Set (or override) a run-scoped variable.
    SetVar { name: String, value: String },

    /// Conditionally execute `then` or `else` based on string equality:
    /// if interpolate(when) == interpolate(equals) => then, else otherwise.
    Conditional {
        /// Left-hand side string (interpolated).
        when: String,
        /// Right-hand side string (interpolated).
        equals: String,
        /// Action to run if the condition holds.
        then: Box<ActionDef>,
        /// Optional action to run otherwise.
        #[serde(rename = "else")]
        #[serde(default)]
        else_: Option<Box<ActionDef>>,
    },

    // --- Logging ---
    /// Log a message with a chosen level.
    Log { level: LogLevel, message: String },
}

/// A rectangle region on screen.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Mouse button enumeration.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

/// Logging level enumeration.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_defaults_match_classic_batch_behavior() {
        let s = Settings::default();
        assert_eq!(s.countdown_secs, 10);
        assert_eq!(s.exit_delay_secs, 5);
        assert!(s.minimize_window);
        assert!(s.default_confidence > 0.0 && s.default_confidence <= 1.0);
    }

    #[test]
    fn click_image_deserializes_with_defaults() {
        let v = json!({
            "type": "click_image",
            "template": "buttons/ok.png"
        });
        let action: ActionDef = serde_json::from_value(v).unwrap();
        match action {
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
                assert_eq!(template, "buttons/ok.png");
                assert!(region.is_none());
                assert!(confidence.is_none());
                assert!(button.is_none());
                assert!(count.is_none());
                assert_eq!((offset_x, offset_y), (0, 0));
                assert!(timeout_ms.is_none() && interval_ms.is_none());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn config_deserializes_minimal_task() {
        let cfg: Config = serde_json::from_value(json!({
            "steps": [
                { "type": "wait_for_image", "template": "t.png", "timeout_ms": 500 },
                { "type": "mouse_click", "button": "left" }
            ]
        }))
        .unwrap();
        assert_eq!(cfg.steps.len(), 2);
        assert_eq!(cfg.settings.countdown_secs, 10);
    }
}
