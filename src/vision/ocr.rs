//! Precomputed OCR output
//!
//! Adapters for OCR results produced by an external engine ahead of time. The
//! sidecar format is a JSON array next to the image (`car.png` ->
//! `car.ocr.json`), coordinates in full-image pixels:
//!
//! ```json
//! [{ "region": [[10, 20], [110, 20], [110, 60], [10, 60]], "text": "ABC-123", "confidence": 0.92 }]
//! ```
//!
//! `region` may also be an `[x_min, y_min, x_max, y_max]` box.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{Candidate, PixelBox, Region, SourceImage, TextDetector};
use crate::error::DetectionEngineError;

/// Serialized form of one OCR triple
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrRecord {
    pub region: RegionRepr,
    pub text: String,
    pub confidence: f32,
}

/// Either polygon corners or an axis-aligned box
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegionRepr {
    Quad([[f32; 2]; 4]),
    Box([u32; 4]),
}

impl From<OcrRecord> for Candidate {
    fn from(record: OcrRecord) -> Self {
        let region = match record.region {
            RegionRepr::Quad(p) => Region::Quad(p.map(|[x, y]| (x, y))),
            RegionRepr::Box(b) => Region::Box(PixelBox::from(b)),
        };
        Candidate::new(region, record.text, record.confidence)
    }
}

/// Fixed OCR results in full-image coordinates.
///
/// A crop query returns the candidates whose bounding-box center lies inside
/// the crop, translated to crop-local coordinates, in their original order.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedText {
    candidates: Vec<Candidate>,
}

impl PrecomputedText {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    /// Parse sidecar JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let records: Vec<OcrRecord> = serde_json::from_str(json)?;
        Ok(Self::new(records.into_iter().map(Candidate::from).collect()))
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    fn select(&self, crop: Option<PixelBox>) -> Vec<Candidate> {
        let Some(crop) = crop else {
            return self.candidates.clone();
        };

        self.candidates
            .iter()
            .filter(|c| {
                let (x, y) = c.region.bounds().center();
                crop.contains_point(x, y)
            })
            .map(|c| Candidate {
                region: c.region.shifted(-(crop.x_min as i64), -(crop.y_min as i64)),
                ..c.clone()
            })
            .collect()
    }
}

impl TextDetector for PrecomputedText {
    fn recognize(&self, _source: &SourceImage, crop: Option<PixelBox>) -> Result<Vec<Candidate>, DetectionEngineError> {
        Ok(self.select(crop))
    }
}

/// Text detector reading a `.ocr.json` sidecar next to each image.
///
/// The most recently parsed sidecar is kept, so per-crop queries on one image
/// read the file once. Sidecars are assumed not to change while in use.
#[derive(Debug)]
pub struct OcrSidecar {
    extension: String,
    last: Mutex<Option<(PathBuf, Arc<PrecomputedText>)>>,
}

impl Default for OcrSidecar {
    fn default() -> Self {
        Self {
            extension: "ocr.json".to_string(),
            last: Mutex::new(None),
        }
    }
}

impl OcrSidecar {
    pub fn new() -> Self {
        Self::default()
    }

    fn sidecar_path(&self, source: &SourceImage) -> Result<PathBuf, DetectionEngineError> {
        source
            .sidecar(&self.extension)
            .ok_or_else(|| DetectionEngineError::MissingOutput(PathBuf::from("<in-memory image>")))
    }

    /// Sidecar for `source`, reusing the last one parsed when the path matches
    fn cached(&self, source: &SourceImage) -> Result<Arc<PrecomputedText>, DetectionEngineError> {
        let path = self.sidecar_path(source)?;

        if let Some((last_path, text)) = self.last.lock().as_ref() {
            if *last_path == path {
                return Ok(text.clone());
            }
        }

        let text = Arc::new(read_sidecar(&path)?);
        *self.last.lock() = Some((path, text.clone()));
        Ok(text)
    }
}

fn read_sidecar(path: &Path) -> Result<PrecomputedText, DetectionEngineError> {
    if !path.exists() {
        return Err(DetectionEngineError::MissingOutput(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    let text = PrecomputedText::from_json(&content).map_err(|source| DetectionEngineError::MalformedOutput {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("{} OCR candidates from {:?}", text.candidates().len(), path);
    Ok(text)
}

impl TextDetector for OcrSidecar {
    fn recognize(&self, source: &SourceImage, crop: Option<PixelBox>) -> Result<Vec<Candidate>, DetectionEngineError> {
        self.cached(source)?.recognize(source, crop)
    }
}
