//! Candidate-to-database plate matching
//!
//! Rules are applied in strict priority order and the first satisfied rule
//! wins: exact key, reversed key, then a fuzzy scan over the whole index.

use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;
use tracing::debug;

use super::index::PlateIndex;
use super::normalize::{normalize, PlateKey};

/// Score reported for an exact key hit
pub const EXACT_SCORE: f64 = 1.0;
/// Score reported when the reversed candidate is a key
pub const REVERSED_SCORE: f64 = 0.95;
/// Score assigned when a key is contained in the candidate
pub const SUBSTRING_SCORE: f64 = 0.9;

/// String similarity used by the fuzzy scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Matched characters over total length (Ratcliff/Obershelp)
    #[default]
    SequenceRatio,
    /// One minus edit distance over the longer length
    Levenshtein,
}

impl SimilarityMetric {
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        match self {
            SimilarityMetric::SequenceRatio => sequence_ratio(a, b),
            SimilarityMetric::Levenshtein => normalized_levenshtein(a, b),
        }
    }
}

/// Tunables for the fuzzy stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Keys whose length differs from the candidate by more than this are skipped
    pub length_tolerance: usize,
    /// Score keys contained in the candidate (or its reverse) at 0.9
    pub enable_substring_heuristic: bool,
    /// A fuzzy score must be strictly greater than this to count
    pub fuzzy_threshold: f64,
    /// Similarity function for the fuzzy stage
    pub metric: SimilarityMetric,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            length_tolerance: 1,
            enable_substring_heuristic: false,
            fuzzy_threshold: 0.85,
            metric: SimilarityMetric::SequenceRatio,
        }
    }
}

/// Which rule produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Reversed,
    Fuzzy,
}

/// A resolved database key with its score
#[derive(Debug, Clone, PartialEq)]
pub struct PlateMatch {
    pub key: PlateKey,
    pub score: f64,
    pub kind: MatchKind,
}

/// Resolves candidate strings against a plate index
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    config: MatcherConfig,
}

impl Matcher {
    pub fn new() -> Self {
        Self::with_config(MatcherConfig::default())
    }

    pub fn with_config(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Match raw candidate text, returning `None` when no rule is satisfied
    pub fn find(&self, raw_candidate: &str, index: &PlateIndex) -> Option<PlateMatch> {
        self.find_normalized(&normalize(raw_candidate), index)
    }

    /// `(key, score)` form of [`Matcher::find`]; `(None, 0.0)` when unmatched
    pub fn score(&self, raw_candidate: &str, index: &PlateIndex) -> (Option<PlateKey>, f64) {
        match self.find(raw_candidate, index) {
            Some(m) => (Some(m.key), m.score),
            None => (None, 0.0),
        }
    }

    /// Match an already normalized candidate
    pub fn find_normalized(&self, candidate: &PlateKey, index: &PlateIndex) -> Option<PlateMatch> {
        if candidate.is_empty() {
            return None;
        }

        if index.contains(candidate.as_str()) {
            return Some(PlateMatch {
                key: candidate.clone(),
                score: EXACT_SCORE,
                kind: MatchKind::Exact,
            });
        }

        let reversed = candidate.reversed();
        if index.contains(reversed.as_str()) {
            return Some(PlateMatch {
                key: reversed,
                score: REVERSED_SCORE,
                kind: MatchKind::Reversed,
            });
        }

        self.fuzzy_scan(candidate, &reversed, index)
    }

    fn fuzzy_scan(&self, candidate: &PlateKey, reversed: &PlateKey, index: &PlateIndex) -> Option<PlateMatch> {
        let candidate_len = candidate.char_len();
        let mut best: Option<(&PlateKey, f64)> = None;

        for key in index.keys() {
            if candidate_len.abs_diff(key.char_len()) > self.config.length_tolerance {
                continue;
            }

            let mut score = self.config.metric.similarity(candidate.as_str(), key.as_str());

            if self.config.enable_substring_heuristic
                && (candidate.as_str().contains(key.as_str()) || reversed.as_str().contains(key.as_str()))
            {
                score = score.max(SUBSTRING_SCORE);
            }

            let best_score = best.map_or(0.0, |(_, s)| s);
            if score > self.config.fuzzy_threshold && score > best_score {
                best = Some((key, score));
            }
        }

        best.map(|(key, score)| {
            debug!("Fuzzy match {} -> {} ({:.3})", candidate, key, score);
            PlateMatch {
                key: key.clone(),
                score,
                kind: MatchKind::Fuzzy,
            }
        })
    }
}

/// Sequence-matcher similarity: `2 * M / (len(a) + len(b))`, where `M` is the
/// number of characters in the matching blocks found by repeatedly taking the
/// longest common contiguous block and recursing on both sides of it.
/// Two empty strings are identical (1.0).
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let matched = matching_characters(&a, &b);
    2.0 * matched as f64 / total as f64
}

/// Total size of the matching blocks between `a` and `b`
fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }

    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, size)`.
///
/// Ties go to the block starting earliest in `a`, then earliest in `b`.
fn longest_match(a: &[char], b: &[char], alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    let width = bhi - blo;

    // prev[j - blo]: length of the common run ending at (i - 1, j)
    let mut prev = vec![0usize; width];
    let mut curr = vec![0usize; width];

    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo;
            curr[col] = if a[i] == b[j] {
                let k = if col > 0 { prev[col - 1] + 1 } else { 1 };
                if k > best_size {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_size = k;
                }
                k
            } else {
                0
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    (best_i, best_j, best_size)
}
