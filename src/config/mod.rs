//! Task configuration module for Pixelbot.
//!
//! This module wires together the data models and loading/validation helpers used
//! throughout the crate. Import from here for a convenient, stable API.
//!
//! Example:
//! use pixelbot::config::{Config, load_from_path};
//!
//! let cfg = load_from_path("tasks/login.json")?;

pub mod loader;
pub mod models;

// Re-export core data models
pub use models::{
    ActionDef, Config, GlobalsMap, LogLevel, MouseButton, NamedActions, Rect, Settings,
};

// Re-export loader utilities
pub use loader::{
    generate_schema, load_from_path, load_from_path_async, load_from_reader, load_from_str,
    resolve_template_paths, validate_config, validate_template_files, write_schema_to_writer,
};
