//! Storage Layer
//!
//! Locates the configuration directory and reads the authorized-plate
//! reference table.

pub mod reference;

use anyhow::Result;
use std::path::PathBuf;

pub use reference::{read_reference_table, ReferenceColumns, ReferenceRow};

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "plategate", "PlateGate")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Default location of the configuration file
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.toml"))
}
