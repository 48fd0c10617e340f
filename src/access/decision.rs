//! Decision records produced by one access check

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::DetectionEngineError;
use crate::plates::PlateKey;
use crate::vision::PixelBox;

pub const MSG_DENIED: &str = "ACCESS DENIED";
pub const MSG_NO_DETECTION: &str = "No Plate Detected";

/// Terminal state of a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The image could not be decoded
    Failed,
    /// A candidate matched the plate database
    Granted,
    /// Text was read but nothing matched
    Denied,
    /// No candidate survived the length filter
    NoDetection,
    /// The OCR engine or plate detector failed
    DetectionFailed,
}

/// Result of one access check.
///
/// Always produced, whatever happened during resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// The input image was decoded
    pub success: bool,
    pub matched: bool,
    pub outcome: Outcome,
    pub matched_plate: Option<PlateKey>,
    /// Normalized text of the granted or best denied candidate
    pub detected_plate: Option<String>,
    /// OCR confidence of the reported candidate
    pub confidence: f32,
    /// Matcher score, when granted
    pub match_score: Option<f64>,
    pub message: String,
    /// `[x_min, y_min, x_max, y_max]` in full-image pixels
    pub annotation_box: Option<PixelBox>,
    /// Database image of the matched plate, when it exists on disk
    pub matched_image_path: Option<PathBuf>,
}

impl DecisionRecord {
    fn base(success: bool, outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            success,
            matched: false,
            outcome,
            matched_plate: None,
            detected_plate: None,
            confidence: 0.0,
            match_score: None,
            message: message.into(),
            annotation_box: None,
            matched_image_path: None,
        }
    }

    /// The image could not be decoded; nothing was matched
    pub fn failed(message: impl Into<String>) -> Self {
        Self::base(false, Outcome::Failed, message)
    }

    /// An external detector failed after the image was decoded
    pub fn detection_failed(error: &DetectionEngineError) -> Self {
        Self::base(true, Outcome::DetectionFailed, format!("OCR Error: {}", error))
    }

    pub fn no_detection() -> Self {
        Self::base(true, Outcome::NoDetection, MSG_NO_DETECTION)
    }

    pub fn denied(detected: &PlateKey, confidence: f32, annotation_box: PixelBox) -> Self {
        Self {
            detected_plate: Some(detected.to_string()),
            confidence,
            annotation_box: Some(annotation_box),
            ..Self::base(true, Outcome::Denied, MSG_DENIED)
        }
    }

    pub fn granted(
        matched: PlateKey,
        detected: &PlateKey,
        confidence: f32,
        score: f64,
        annotation_box: PixelBox,
        matched_image_path: Option<PathBuf>,
    ) -> Self {
        let message = granted_message(&matched);
        Self {
            matched: true,
            matched_plate: Some(matched),
            detected_plate: Some(detected.to_string()),
            confidence,
            match_score: Some(score),
            annotation_box: Some(annotation_box),
            matched_image_path,
            ..Self::base(true, Outcome::Granted, message)
        }
    }

    /// Access decision in one word, for log rows
    pub fn verdict(&self) -> &'static str {
        if self.matched {
            "PASS"
        } else {
            "FAIL"
        }
    }
}

/// Message for a granted check
pub fn granted_message(key: &PlateKey) -> String {
    format!("ACCESS GRANTED (Match: {})", key)
}
