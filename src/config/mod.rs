// src/config/mod.rs

//! Task-file configuration.
//!
//! - `model.rs`: the TOML-backed data model and its conversion into task
//!   definitions.
//! - `loader.rs`: reading a file from disk.
//! - `validate.rs`: checks that do not need the graph.
//! - `duration.rs`: `"500ms"` / `"3s"` / `"2m"` / `"1h"` parsing.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{config_root_dir, default_config_path, load_and_validate, load_from_path, parse_str};
pub use model::{ConfigFile, ModelSection, RawConfigFile, RunSection, TaskConfig};
pub use validate::validate_raw_config;
