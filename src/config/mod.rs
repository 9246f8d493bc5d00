// src/config/mod.rs

//! Job file loading and validation.
//!
//! - `model.rs`: TOML-backed data model.
//! - `loader.rs`: read a job file from disk.
//! - `validate.rs`: dependency and remote-settings checks.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigFile, JobSection, OperationConfig, RawConfigFile, RemoteSection};
