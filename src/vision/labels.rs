//! YOLO-format plate labels
//!
//! One line per detected region: `class x_center y_center width height`, with
//! the geometry normalized to the image size.

use tracing::{debug, warn};

use super::{PixelBox, RegionDetector, SourceImage};
use crate::error::DetectionEngineError;

/// Convert YOLO label text into pixel boxes clamped to a `width` x `height` image.
///
/// Malformed lines are skipped; boxes that are empty after clamping are dropped.
pub fn parse_yolo_labels(content: &str, width: u32, height: u32) -> Vec<PixelBox> {
    let (w, h) = (width as f64, height as f64);
    let mut boxes = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }
        if parts.len() < 5 {
            warn!("Skipping label line {}: expected 5 fields, got {}", line_no + 1, parts.len());
            continue;
        }

        let geometry: Result<Vec<f64>, _> = parts[1..5].iter().map(|p| p.parse::<f64>()).collect();
        let geometry = match geometry {
            Ok(g) if g.iter().all(|v| v.is_finite()) => g,
            _ => {
                warn!("Skipping label line {}: invalid number in {:?}", line_no + 1, line);
                continue;
            }
        };

        let (x_c, y_c) = (geometry[0] * w, geometry[1] * h);
        let (half_w, half_h) = (geometry[2] * w / 2.0, geometry[3] * h / 2.0);

        let x_min = (x_c - half_w).max(0.0) as u32;
        let y_min = (y_c - half_h).max(0.0) as u32;
        let x_max = (x_c + half_w).min(w).max(0.0) as u32;
        let y_max = (y_c + half_h).min(h).max(0.0) as u32;

        let b = PixelBox::new(x_min, y_min, x_max, y_max);
        if !b.is_empty() {
            boxes.push(b);
        }
    }

    boxes
}

/// Region detector backed by a label file next to each image (`car.png` -> `car.txt`)
#[derive(Debug, Clone)]
pub struct LabelSidecar {
    extension: String,
}

impl Default for LabelSidecar {
    fn default() -> Self {
        Self {
            extension: "txt".to_string(),
        }
    }
}

impl LabelSidecar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegionDetector for LabelSidecar {
    fn propose(&self, source: &SourceImage) -> Result<Vec<PixelBox>, DetectionEngineError> {
        let Some(path) = source.sidecar(&self.extension) else {
            return Ok(vec![]);
        };
        if !path.exists() {
            debug!("No label file at {:?}, using full image", path);
            return Ok(vec![]);
        }

        let content = std::fs::read_to_string(&path)?;
        let boxes = parse_yolo_labels(&content, source.width(), source.height());
        debug!("{} plate regions from {:?}", boxes.len(), path);
        Ok(boxes)
    }
}
