// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a job file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    debug!(path = %path.display(), operations = config.operation.len(), "loaded job file");
    Ok(config)
}

/// Read a job file and validate it.
///
/// Checks for:
/// - at least one operation,
/// - unknown or self `after` references,
/// - dependency cycles,
/// - remote settings sanity (port, probe budget, durations).
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw = load_from_path(&path)?;
    ConfigFile::try_from(raw)
}
