#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Pixelbot — batch UI automation driven by image recognition.
//!
//! The crate executes an ordered list of desktop actions described by a JSON
//! task file. Actions that need to locate something on screen match a
//! reference template image against a capture of the current display before
//! simulating input at the matched position.
//!
//! Modules:
//! - `config`: Task file models, loader, validation, and schema helpers.
//! - `executor`: Action definitions and the batch execution engine.
//! - `vision`: Screen capture and grayscale template matching.
//! - `utils`: Interpolation and OS window helpers.
//!
//! Use `pixelbot::prelude::*` to bring commonly used items into scope quickly.

/// Public module: task configuration (models, loader, schema helpers).
pub mod config;
/// Public module: execution engine (actions and batch runtime).
pub mod executor;
/// Public module: utilities (interpolation, window helpers).
pub mod utils;
/// Public module: screen capture and template matching.
pub mod vision;

/// Crate-level constants for consumers that want to inspect package metadata at runtime.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Process exit code: the batch run completed with every step succeeding.
pub const EXIT_SUCCESS: u8 = 0;
/// Process exit code: execution or image-recognition failure during the run.
pub const EXIT_RUN_FAILURE: u8 = 1;
/// Process exit code: startup/configuration failure before any step ran.
pub const EXIT_CONFIG_FAILURE: u8 = 2;

/// Returns the crate version (e.g., "0.1.0").
#[inline]
pub const fn version() -> &'static str {
    PKG_VERSION
}

/// Initialize tracing (logging) with a reasonable default.
/// - Honors the `RUST_LOG` environment variable if set.
/// - Falls back to `info` level.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_tracing() {
    use tracing::Level;
    use tracing_subscriber::fmt;

    // Parse RUST_LOG as a simple level (trace|debug|info|warn|error)
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| match s.to_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        })
        .unwrap_or(Level::INFO);

    // Ignore the error if the global subscriber was already set.
    let _ = fmt().with_max_level(level).try_init();
}

/// A convenient set of exports for most consumers.
///
/// Bring this into scope with:
/// `use pixelbot::prelude::*;`
pub mod prelude {
    // Common result/error handling
    pub use anyhow::{Context, Error, Result, anyhow, bail, ensure};

    // Serialization
    pub use serde::{Deserialize, Serialize};

    // Tracing macros
    pub use tracing::{debug, error, info, instrument, trace, warn};

    // Timing helpers
    pub use std::time::Duration;
    pub use tokio::time::sleep;

    // External crates (namespaced) if callers want direct access
    pub use crate as pixelbot;
    pub use enigo;
    pub use image;

    // Frequently used internal modules
    pub use crate::{config, executor, utils, vision};
}
