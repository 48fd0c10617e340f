//! Plate key canonicalization

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use unicode_normalization::char::is_combining_mark;

/// Canonical plate identifier: uppercase alphanumerics in original order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlateKey(String);

impl PlateKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in characters (not bytes)
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    /// Character-wise reversal, for plates read right-to-left
    pub fn reversed(&self) -> PlateKey {
        PlateKey(self.0.chars().rev().collect())
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PlateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PlateKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PlateKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Canonicalize any displayable value into a plate key.
///
/// Numeric cells from a loosely typed table go through their textual form
/// first. Combining marks (Arabic harakat, accents written as separate code
/// points) are dropped even though Unicode counts some of them as alphabetic.
/// Uppercasing happens before filtering so that case mappings which
/// expand into several characters cannot leave non-alphanumerics behind, which
/// keeps the transform idempotent.
pub fn normalize<T: fmt::Display + ?Sized>(value: &T) -> PlateKey {
    PlateKey(
        value
            .to_string()
            .chars()
            .flat_map(char::to_uppercase)
            .filter(|&c| c.is_alphanumeric() && !is_combining_mark(c))
            .collect(),
    )
}
