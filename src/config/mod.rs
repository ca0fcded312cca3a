// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk and resolve the workspace root (`loader.rs`).
//! - Validate root and exclude patterns (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{config_root_dir, default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, LoggingSection, RawConfigFile, WatchSection, WorkspaceSection};
