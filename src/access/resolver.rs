//! Candidate resolution and the access decision
//!
//! Candidates arrive in groups, one per OCR pass: either a single group for
//! the whole image or one per detector-proposed plate region. Scanning stops
//! at the first candidate that matches the database (first match wins, not
//! best match). Without a match, the highest-confidence readable candidate is
//! reported as denied.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::decision::DecisionRecord;
use crate::error::DetectionEngineError;
use crate::plates::{normalize, Matcher, PlateIndex, PlateKey};
use crate::vision::{Candidate, PixelBox, RegionDetector, SourceImage, TextDetector};

/// Resolver tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Candidates with fewer raw characters are ignored
    pub min_text_len: usize,
    /// Run OCR on detector-proposed regions when a region detector is present
    pub use_detector_regions: bool,
    /// Line thickness of the annotation box in pixels
    pub box_thickness: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_text_len: 3,
            use_detector_regions: true,
            box_thickness: 5,
        }
    }
}

/// OCR candidates from one pass, with the pixel offset of the area that was read
#[derive(Debug, Clone, Default)]
pub struct CandidateGroup {
    /// Top-left corner of the OCR'd area in full-image coordinates
    pub origin: (u32, u32),
    pub candidates: Vec<Candidate>,
}

impl CandidateGroup {
    /// Candidates read from the whole image
    pub fn full_image(candidates: Vec<Candidate>) -> Self {
        Self {
            origin: (0, 0),
            candidates,
        }
    }

    /// Candidates read from `crop`, with crop-local coordinates
    pub fn cropped(crop: PixelBox, candidates: Vec<Candidate>) -> Self {
        Self {
            origin: (crop.x_min, crop.y_min),
            candidates,
        }
    }

    /// Candidate bounds translated to full-image coordinates
    fn full_image_bounds(&self, candidate: &Candidate) -> PixelBox {
        candidate
            .region
            .bounds()
            .shifted(self.origin.0 as i64, self.origin.1 as i64)
    }
}

/// A candidate that matched the database
#[derive(Debug, Clone)]
struct Granted {
    key: PlateKey,
    score: f64,
    detected: PlateKey,
    confidence: f32,
    bounds: PixelBox,
}

/// Best non-matching candidate seen so far
#[derive(Debug, Clone)]
struct Denied {
    detected: PlateKey,
    confidence: f32,
    bounds: PixelBox,
}

/// State of one resolution pass over candidate groups
struct Scan<'a> {
    matcher: &'a Matcher,
    index: &'a PlateIndex,
    min_text_len: usize,
    best_denied: Option<Denied>,
    best_confidence: f32,
}

impl<'a> Scan<'a> {
    fn new(matcher: &'a Matcher, index: &'a PlateIndex, min_text_len: usize) -> Self {
        Self {
            matcher,
            index,
            min_text_len,
            best_denied: None,
            best_confidence: 0.0,
        }
    }

    /// Scan one group in emitted order, returning the first match
    fn feed(&mut self, group: &CandidateGroup) -> Option<Granted> {
        for candidate in &group.candidates {
            if candidate.text.chars().count() < self.min_text_len {
                debug!("Ignoring short candidate {:?}", candidate.text);
                continue;
            }

            let detected = normalize(candidate.text.as_str());

            if let Some(found) = self.matcher.find_normalized(&detected, self.index) {
                debug!(
                    "Candidate {:?} matched {} ({:?}, {:.3})",
                    candidate.text, found.key, found.kind, found.score
                );
                return Some(Granted {
                    key: found.key,
                    score: found.score,
                    detected,
                    confidence: candidate.confidence,
                    bounds: group.full_image_bounds(candidate),
                });
            }

            debug!("Candidate {:?} ({:.2}) not in database", candidate.text, candidate.confidence);

            if !detected.is_empty() && candidate.confidence > self.best_confidence {
                self.best_confidence = candidate.confidence;
                self.best_denied = Some(Denied {
                    detected,
                    confidence: candidate.confidence,
                    bounds: group.full_image_bounds(candidate),
                });
            }
        }

        None
    }

    fn finish(self) -> DecisionRecord {
        match self.best_denied {
            Some(denied) => DecisionRecord::denied(&denied.detected, denied.confidence, denied.bounds),
            None => DecisionRecord::no_detection(),
        }
    }
}

/// Resolves decoded images into access decisions.
///
/// Holds references to the external detectors; it never mutates them, so one
/// resolver can serve many checks.
pub struct AccessResolver<'a> {
    text: &'a dyn TextDetector,
    regions: Option<&'a dyn RegionDetector>,
    matcher: Matcher,
    config: ResolverConfig,
    image_dir: Option<PathBuf>,
}

impl<'a> AccessResolver<'a> {
    /// Create a resolver that reads text with `text`, default matcher and settings
    pub fn new(text: &'a dyn TextDetector) -> Self {
        Self {
            text,
            regions: None,
            matcher: Matcher::new(),
            config: ResolverConfig::default(),
            image_dir: None,
        }
    }

    /// Crop to detector-proposed regions before OCR
    pub fn with_regions(mut self, regions: &'a dyn RegionDetector) -> Self {
        self.regions = Some(regions);
        self
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Directory holding the database images named in the reference table
    pub fn with_image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Decode the image at `path` and resolve it
    pub fn check_path(&self, path: &Path, index: &PlateIndex) -> DecisionRecord {
        match SourceImage::open(path) {
            Ok(source) => self.resolve(&source, index),
            Err(e) => {
                warn!("Cannot check {:?}: {}", path, e);
                DecisionRecord::failed(e.user_message())
            }
        }
    }

    /// Decode an encoded image buffer and resolve it
    pub fn check_bytes(&self, bytes: &[u8], index: &PlateIndex) -> DecisionRecord {
        match SourceImage::from_bytes(bytes) {
            Ok(source) => self.resolve(&source, index),
            Err(e) => {
                warn!("Cannot check uploaded image: {}", e);
                DecisionRecord::failed(e.user_message())
            }
        }
    }

    /// Run OCR (per proposed region, or on the full image) and resolve the candidates
    pub fn resolve(&self, source: &SourceImage, index: &PlateIndex) -> DecisionRecord {
        let crops = match self.plan_crops(source) {
            Ok(crops) => crops,
            Err(e) => {
                warn!("Plate detector failed: {}", e);
                return DecisionRecord::detection_failed(&e);
            }
        };

        // Lazily OCR each area so a match stops further OCR passes
        let groups = crops.into_iter().map(|crop| {
            let candidates = self.text.recognize(source, crop)?;
            Ok(match crop {
                Some(b) => CandidateGroup::cropped(b, candidates),
                None => CandidateGroup::full_image(candidates),
            })
        });

        self.resolve_groups(groups, index)
    }

    /// Resolve already produced candidate groups
    pub fn resolve_groups<I>(&self, groups: I, index: &PlateIndex) -> DecisionRecord
    where
        I: IntoIterator<Item = Result<CandidateGroup, DetectionEngineError>>,
    {
        let mut scan = Scan::new(&self.matcher, index, self.config.min_text_len);

        for group in groups {
            let group = match group {
                Ok(group) => group,
                Err(e) => {
                    warn!("OCR failed: {}", e);
                    return DecisionRecord::detection_failed(&e);
                }
            };

            if let Some(granted) = scan.feed(&group) {
                let record = self.grant(granted, index);
                info!("{}", record.message);
                return record;
            }
        }

        let record = scan.finish();
        info!(
            "{} (detected: {})",
            record.message,
            record.detected_plate.as_deref().unwrap_or("-")
        );
        record
    }

    /// Areas to OCR: detector regions, or `None` for the full image
    fn plan_crops(&self, source: &SourceImage) -> Result<Vec<Option<PixelBox>>, DetectionEngineError> {
        let regions = match self.regions {
            Some(detector) if self.config.use_detector_regions => detector.propose(source)?,
            _ => vec![],
        };

        if regions.is_empty() {
            debug!("Scanning full image");
            return Ok(vec![None]);
        }

        debug!("Scanning {} detector regions", regions.len());
        Ok(regions.into_iter().map(Some).collect())
    }

    fn grant(&self, granted: Granted, index: &PlateIndex) -> DecisionRecord {
        let image_path = index
            .lookup(granted.key.as_str())
            .and_then(|filename| self.database_image(filename));

        DecisionRecord::granted(
            granted.key,
            &granted.detected,
            granted.confidence,
            granted.score,
            granted.bounds,
            image_path,
        )
    }

    /// Path of a database image, if it exists under the image directory
    fn database_image(&self, filename: &str) -> Option<PathBuf> {
        let dir = self.image_dir.as_ref()?;
        if filename.is_empty() {
            return None;
        }

        let path = dir.join(filename);
        if path.exists() {
            debug!("Found database image at {:?}", path);
            Some(path)
        } else {
            warn!("Database image missing at {:?}", path);
            None
        }
    }
}
