//! # Match Scorer
//!
//! Scores how well a user's ingredients cover a recipe. The score is
//! asymmetric: every recipe ingredient looks for its best counterpart among
//! the user's ingredients, and the best scores are averaged over the recipe.
//! Extra user ingredients never lower the score.

use crate::recipe::normalize_token;
use crate::similarity::hybrid_similarity;

// Lowercased and trimmed, blanks dropped; duplicates stay so they keep their weight
fn normalized(tokens: &[String]) -> Vec<String> {
    tokens
        .iter()
        .map(|token| normalize_token(token))
        .filter(|token| !token.is_empty())
        .collect()
}

fn best_normalized_match(recipe_token: &str, user_tokens: &[String], alpha: f64) -> f64 {
    user_tokens
        .iter()
        .map(|user_token| hybrid_similarity(recipe_token, user_token, alpha))
        .fold(0.0, f64::max)
}

/// Best hybrid similarity of `recipe_token` against any user token
///
/// Tokens are compared case-insensitively and trimmed. Returns `0.0` when
/// `user_tokens` is empty.
pub fn best_match(recipe_token: &str, user_tokens: &[String], alpha: f64) -> f64 {
    best_normalized_match(&normalize_token(recipe_token), &normalized(user_tokens), alpha)
}

/// Average best-match similarity over the recipe's ingredients
///
/// Both token lists are normalized first (see
/// [`normalize_token`](crate::recipe::normalize_token)), so `"Egg "` and
/// `"egg"` are an exact match. A recipe without ingredient tokens scores
/// `0.0`.
///
/// # Examples
///
/// ```rust
/// use cookit::scoring::score_recipe;
///
/// let user = vec!["egg".to_string(), "rice".to_string()];
/// let recipe = vec!["rice".to_string(), "egg".to_string()];
/// assert_eq!(score_recipe(&user, &recipe, 0.5), 1.0);
/// assert_eq!(score_recipe(&user, &[], 0.5), 0.0);
/// ```
pub fn score_recipe(user_tokens: &[String], recipe_tokens: &[String], alpha: f64) -> f64 {
    let recipe_tokens = normalized(recipe_tokens);
    if recipe_tokens.is_empty() {
        return 0.0;
    }
    let user_tokens = normalized(user_tokens);

    let total: f64 = recipe_tokens
        .iter()
        .map(|recipe_token| best_normalized_match(recipe_token, &user_tokens, alpha))
        .sum();

    total / recipe_tokens.len() as f64
}
