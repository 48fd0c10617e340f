//! Access Layer
//!
//! Turns OCR candidates into a single access decision per image and renders
//! the decision onto the image.

pub mod annotate;
pub mod decision;
pub mod resolver;

pub use annotate::{render_annotation, DENIED_COLOR, GRANTED_COLOR};
pub use decision::{DecisionRecord, Outcome};
pub use resolver::{AccessResolver, CandidateGroup, ResolverConfig};
