//! Application Configuration
//!
//! Database location, matcher tuning and run settings stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::access::ResolverConfig;
use crate::plates::{DuplicatePolicy, MatcherConfig};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Plate database settings
    pub database: DatabaseSettings,
    /// Matcher tuning
    pub matching: MatcherConfig,
    /// Candidate resolution settings
    pub resolver: ResolverConfig,
    /// Batch evaluation settings
    pub batch: BatchSettings,
}

/// Where the authorized-plate reference table and its images live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Reference table (CSV with a header row)
    pub csv_path: PathBuf,
    /// Directory holding the database images named in the table; empty disables the lookup
    pub image_dir: PathBuf,
    /// Header of the plate column
    pub plate_column: String,
    /// Header of the image filename column
    pub file_column: String,
    /// Handling of rows that normalize to an existing plate
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("Rdata/labels.csv"),
            image_dir: PathBuf::from("Rdata/raw_data"),
            plate_column: "plate_number".to_string(),
            file_column: "file_name".to_string(),
            duplicate_policy: DuplicatePolicy::LastWins,
        }
    }
}

impl DatabaseSettings {
    /// Image directory, or `None` when the lookup is disabled
    pub fn image_lookup_dir(&self) -> Option<&Path> {
        if self.image_dir.as_os_str().is_empty() {
            None
        } else {
            Some(&self.image_dir)
        }
    }
}

/// Batch evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Worker threads resolving images
    pub workers: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
