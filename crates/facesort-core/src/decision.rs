//! Threshold policy applied to a best-match result.

use crate::types::MatchResult;

/// Default acceptance threshold for ArcFace cosine similarity.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Accept a match when its similarity reaches `threshold` (inclusive).
pub fn accept(result: &MatchResult, threshold: f32) -> bool {
    result.similarity >= threshold
}
