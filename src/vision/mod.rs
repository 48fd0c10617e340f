//! Vision Layer
//!
//! Geometry and the collaborator interfaces the access pipeline calls into.
//! OCR and plate detection are not performed here: a [`TextDetector`] turns an
//! image (or a crop of it) into text candidates, and an optional
//! [`RegionDetector`] proposes plate regions to crop before OCR.
//! Shipped adapters:
//! - precomputed OCR output, in memory or as a `.ocr.json` sidecar
//! - YOLO-format label files as a `.txt` sidecar

pub mod image_source;
pub mod labels;
pub mod ocr;

pub use image_source::SourceImage;
pub use labels::{parse_yolo_labels, LabelSidecar};
pub use ocr::{OcrSidecar, PrecomputedText};

use serde::{Deserialize, Serialize};

use crate::error::DetectionEngineError;

/// Axis-aligned pixel box, max corner exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "[u32; 4]", from = "[u32; 4]")]
pub struct PixelBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl PixelBox {
    pub fn new(x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> Self {
        Self { x_min, y_min, x_max, y_max }
    }

    pub fn width(&self) -> u32 {
        self.x_max.saturating_sub(self.x_min)
    }

    pub fn height(&self) -> u32 {
        self.y_max.saturating_sub(self.y_min)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Box center in pixel coordinates
    pub fn center(&self) -> (f32, f32) {
        (
            (self.x_min as f32 + self.x_max as f32) / 2.0,
            (self.y_min as f32 + self.y_max as f32) / 2.0,
        )
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x_min as f32 && x <= self.x_max as f32 && y >= self.y_min as f32 && y <= self.y_max as f32
    }

    /// Move the box by `(dx, dy)`, saturating at zero
    pub fn shifted(&self, dx: i64, dy: i64) -> Self {
        let shift = |v: u32, d: i64| (v as i64 + d).clamp(0, u32::MAX as i64) as u32;
        Self {
            x_min: shift(self.x_min, dx),
            y_min: shift(self.y_min, dy),
            x_max: shift(self.x_max, dx),
            y_max: shift(self.y_max, dy),
        }
    }
}

impl From<PixelBox> for [u32; 4] {
    fn from(b: PixelBox) -> Self {
        [b.x_min, b.y_min, b.x_max, b.y_max]
    }
}

impl From<[u32; 4]> for PixelBox {
    fn from(v: [u32; 4]) -> Self {
        PixelBox::new(v[0], v[1], v[2], v[3])
    }
}

/// Geometric region of a candidate
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    /// OCR polygon corners in `tl, tr, br, bl` order
    Quad([(f32, f32); 4]),
    /// Axis-aligned pixel box
    Box(PixelBox),
}

impl Region {
    /// Axis-aligned bounds of the region
    pub fn bounds(&self) -> PixelBox {
        match self {
            Region::Quad(points) => polygon_to_bounds(points),
            Region::Box(b) => *b,
        }
    }

    /// Move the region by `(dx, dy)` pixels
    pub fn shifted(&self, dx: i64, dy: i64) -> Region {
        match self {
            Region::Quad(points) => Region::Quad(points.map(|(x, y)| (x + dx as f32, y + dy as f32))),
            Region::Box(b) => Region::Box(b.shifted(dx, dy)),
        }
    }
}

/// One OCR-reported text span
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub region: Region,
    pub text: String,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
}

impl Candidate {
    pub fn new(region: Region, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            region,
            text: text.into(),
            confidence,
        }
    }
}

/// OCR engine boundary
pub trait TextDetector: Send + Sync {
    /// Read text from the whole image, or from `crop` when given.
    ///
    /// Candidate regions are relative to the crop origin.
    fn recognize(&self, source: &SourceImage, crop: Option<PixelBox>) -> Result<Vec<Candidate>, DetectionEngineError>;
}

/// Plate detector boundary, upstream of OCR
pub trait RegionDetector: Send + Sync {
    /// Propose plate regions in full-image pixel coordinates
    fn propose(&self, source: &SourceImage) -> Result<Vec<PixelBox>, DetectionEngineError>;
}

/// Convert polygon points to an axis-aligned bounding box
fn polygon_to_bounds(polygon: &[(f32, f32)]) -> PixelBox {
    if polygon.is_empty() {
        return PixelBox::new(0, 0, 0, 0);
    }

    let min_x = polygon.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let min_y = polygon.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    let max_x = polygon.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
    let max_y = polygon.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

    PixelBox::new(
        min_x.max(0.0) as u32,
        min_y.max(0.0) as u32,
        max_x.max(0.0) as u32,
        max_y.max(0.0) as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_bounds() {
        let quad = Region::Quad([(10.5, 20.0), (110.0, 22.0), (108.0, 60.9), (9.0, 58.0)]);
        assert_eq!(quad.bounds(), PixelBox::new(9, 20, 110, 60));
    }

    #[test]
    fn test_quad_bounds_negative_clamped() {
        let quad = Region::Quad([(-3.0, -1.0), (5.0, -1.0), (5.0, 4.0), (-3.0, 4.0)]);
        assert_eq!(quad.bounds(), PixelBox::new(0, 0, 5, 4));
    }

    #[test]
    fn test_shifted_region() {
        let quad = Region::Quad([(0.0, 0.0), (10.0, 0.0), (10.0, 5.0), (0.0, 5.0)]);
        assert_eq!(quad.shifted(100, 50).bounds(), PixelBox::new(100, 50, 110, 55));

        let b = Region::Box(PixelBox::new(5, 5, 10, 10));
        assert_eq!(b.shifted(-8, 2).bounds(), PixelBox::new(0, 7, 2, 12));
    }

    #[test]
    fn test_pixel_box_geometry() {
        let b = PixelBox::new(10, 20, 30, 60);
        assert_eq!(b.width(), 20);
        assert_eq!(b.height(), 40);
        assert_eq!(b.center(), (20.0, 40.0));
        assert!(b.contains_point(10.0, 60.0));
        assert!(!b.contains_point(31.0, 30.0));
        assert!(PixelBox::new(5, 5, 5, 9).is_empty());
    }

    #[test]
    fn test_pixel_box_serializes_as_array() {
        let json = serde_json::to_string(&PixelBox::new(1, 2, 3, 4)).unwrap();
        assert_eq!(json, "[1,2,3,4]");
        let parsed: PixelBox = serde_json::from_str("[5,6,7,8]").unwrap();
        assert_eq!(parsed, PixelBox::new(5, 6, 7, 8));
    }
}
