// src/config.rs

//! Configuration loading utilities.

use std::path::Path;

use crate::error::Result;
use crate::models::Config;

/// Load, override and validate the configuration.
///
/// A missing file falls back to defaults. A file that exists but does not
/// parse, or values that fail validation, are errors.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        log::info!("Loading configuration from {}", path.display());
        Config::load(path)?
    } else {
        log::warn!("No config at {}, using defaults", path.display());
        Config::default()
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
