#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

/*!
Executor module for Pixelbot.

This module wires together:
- `actions`: low-level input simulation and screen lookups (mouse, keyboard,
  sleep, logging, window ops, template search)
- `runtime`: batch execution with interpolation and match-variable plumbing

Typical usage:
- Construct a `Runtime` with a loaded `Config`.
- Call `Runtime::run_batch` for batch mode, or `Runtime::run_action` per
  stdin line in interactive mode.

Example:
```no_run
use pixelbot::config::Config;
use pixelbot::executor::Runtime;

let cfg: Config = Default::default();
let mut rt = Runtime::new(cfg, true); // dry-run mode
// rt.run_batch()?;
```

Public re-exports:
- `ActionExecutor`: performs low-level actions (respecting dry-run).
- `Runtime`: executes the batch task and individual actions.
*/

pub mod actions;
pub mod runtime;

// Re-exports for convenient access from `pixelbot::executor::*`
pub use actions::ActionExecutor;
pub use runtime::Runtime;
