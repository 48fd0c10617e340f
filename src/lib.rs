//! plate-gate - license-plate access control
//!
//! Resolves OCR text candidates against a database of authorized plates and
//! decides whether to grant access. OCR and plate detection are external; the
//! crate consumes their output through the traits in [`vision`].

pub mod access;
pub mod batch;
pub mod config;
pub mod error;
pub mod plates;
pub mod storage;
pub mod vision;
