//! # Similarity Engine
//!
//! String similarity between two ingredient names. Two metrics are computed
//! and blended:
//!
//! - **Edit distance similarity**: character-level Levenshtein distance
//!   normalized by the longer string
//! - **Token overlap similarity**: Jaccard index over whitespace tokens
//!
//! All functions are pure and symmetric in their two arguments.

use std::collections::HashSet;

use strsim::levenshtein;

/// Default blend weight given to the token overlap term
pub const DEFAULT_ALPHA: f64 = 0.5;

/// Character-level similarity: `1 - levenshtein(a, b) / max(len(a), len(b))`
///
/// Lengths are counted in characters, not bytes, so multi-byte ingredient
/// names (Hangul, accented Latin) are compared letter by letter.
/// Two empty strings are identical and score `1.0`.
///
/// # Examples
///
/// ```rust
/// use cookit::similarity::edit_distance_similarity;
///
/// assert_eq!(edit_distance_similarity("egg", "egg"), 1.0);
/// assert_eq!(edit_distance_similarity("", ""), 1.0);
/// assert_eq!(edit_distance_similarity("abc", ""), 0.0);
/// ```
pub fn edit_distance_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

fn token_set(s: &str) -> HashSet<String> {
    s.split_whitespace().map(str::to_lowercase).collect()
}

/// Jaccard index of the lowercase whitespace token sets of `a` and `b`
///
/// Returns `0.0` when both strings contain no tokens.
///
/// # Examples
///
/// ```rust
/// use cookit::similarity::token_overlap_similarity;
///
/// assert_eq!(token_overlap_similarity("green onion", "onion"), 0.5);
/// assert_eq!(token_overlap_similarity("   ", ""), 0.0);
/// ```
pub fn token_overlap_similarity(a: &str, b: &str) -> f64 {
    let left = token_set(a);
    let right = token_set(b);

    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = left.intersection(&right).count();
    intersection as f64 / union as f64
}

/// Weighted blend `alpha * token_overlap + (1 - alpha) * edit_distance`
///
/// `alpha` comes from [`MatchingConfig::alpha`](crate::config::MatchingConfig)
/// in production code; [`DEFAULT_ALPHA`] weights both terms equally.
///
/// # Examples
///
/// ```rust
/// use cookit::similarity::{hybrid_similarity, DEFAULT_ALPHA};
///
/// assert_eq!(hybrid_similarity("rice", "rice", DEFAULT_ALPHA), 1.0);
/// ```
pub fn hybrid_similarity(a: &str, b: &str, alpha: f64) -> f64 {
    alpha * token_overlap_similarity(a, b) + (1.0 - alpha) * edit_distance_similarity(a, b)
}
