//! Plate Layer
//!
//! Canonical plate keys, the in-memory plate index built from the reference
//! table, and the matcher that resolves OCR text against it.

pub mod index;
pub mod matcher;
pub mod normalize;

pub use index::{DuplicateEntry, DuplicatePolicy, PlateIndex, PlateRecord, PlateRegistry};
pub use matcher::{MatchKind, Matcher, MatcherConfig, PlateMatch, SimilarityMetric};
pub use normalize::{normalize, PlateKey};
