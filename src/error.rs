//! Error taxonomy for the access-decision pipeline
//!
//! Only image decoding and reference-table schema problems are visible to
//! callers as distinguishable outcomes. Detector failures are converted into a
//! decision record by the resolver.

use std::path::PathBuf;
use thiserror::Error;

/// The input image could not be produced
#[derive(Debug, Error)]
pub enum ImageDecodeError {
    #[error("Image not found: {0:?}")]
    NotFound(PathBuf),
    #[error("Failed to load image: {0}")]
    Decode(#[from] image::ImageError),
}

impl ImageDecodeError {
    /// Short message surfaced in a failed decision record
    pub fn user_message(&self) -> &'static str {
        match self {
            ImageDecodeError::NotFound(_) => "Image not found.",
            ImageDecodeError::Decode(_) => "Failed to load image.",
        }
    }
}

/// The reference table could not be read as `(plate, filename)` rows
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Reference table not found: {0:?}")]
    NotFound(PathBuf),
    #[error("Failed to read reference table: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reference table is empty (no header row)")]
    MissingHeader,
    #[error("Reference table missing required columns {expected:?}, found {found:?}")]
    MissingColumns {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// An external OCR engine or region detector failed
#[derive(Debug, Error)]
pub enum DetectionEngineError {
    #[error("text detector failed: {0}")]
    TextDetector(String),
    #[error("region detector failed: {0}")]
    RegionDetector(String),
    #[error("no OCR output available for {0:?}")]
    MissingOutput(PathBuf),
    #[error("malformed OCR output in {path:?}: {source}")]
    MalformedOutput {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The plate index refused to build
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("duplicate plate {key} at row {row} (first seen at row {first_row})")]
    DuplicatePlate {
        key: String,
        row: usize,
        first_row: usize,
    },
}
