// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs` holds the TOML-backed raw model and the validated types.
//! - `loader.rs` reads a file from disk.
//! - `validate.rs` turns a `RawConfigFile` into a `ConfigFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{
    ConfigFile, ConfigSection, NotifySection, ProgressMode, RawConfigFile, RawConfigSection,
    ThresholdSection, ToolConfig,
};
pub use validate::parse_duration;
