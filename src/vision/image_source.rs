//! Decoded input images

use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ImageDecodeError;

/// A decoded image plus the file it came from, if any
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub image: DynamicImage,
    pub path: Option<PathBuf>,
}

impl SourceImage {
    /// Decode an image file
    pub fn open(path: &Path) -> Result<Self, ImageDecodeError> {
        if !path.exists() {
            return Err(ImageDecodeError::NotFound(path.to_path_buf()));
        }
        let image = image::open(path)?;
        debug!("Decoded {:?} ({}x{})", path, image.width(), image.height());

        Ok(Self {
            image,
            path: Some(path.to_path_buf()),
        })
    }

    /// Decode an in-memory encoded image (e.g. an uploaded file)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageDecodeError> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self { image, path: None })
    }

    /// Wrap an already decoded image
    pub fn from_image(image: DynamicImage) -> Self {
        Self { image, path: None }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Path of a file next to this image sharing its stem, e.g. `car.txt`
    pub fn sidecar(&self, extension: &str) -> Option<PathBuf> {
        self.path.as_ref().map(|p| p.with_extension(extension))
    }
}
