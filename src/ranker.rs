//! # Recipe Ranker
//!
//! Scores the whole corpus against a user's held ingredients and keeps the
//! best matches. The ranking is a stable sort, so recipes with equal scores
//! keep their corpus order.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::MatchingConfig;
use crate::errors::StoreError;
use crate::recipe::{normalize_tokens, tokens_containing, Recipe};
use crate::scoring::score_recipe;
use crate::store::RecipeCorpus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RankError {
    #[error("No ingredients registered")]
    EmptyProfile,

    #[error("No recipes available")]
    EmptyCorpus,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A recipe together with its match against the user's ingredients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecipe {
    pub recipe: Recipe,
    /// Normalized ingredient tokens of the recipe
    pub tokens: Vec<String>,
    /// Average best-match similarity in `[0, 1]`
    pub score: f64,
    /// Recipe tokens containing one of the user's ingredients
    pub matched_ingredients: Vec<String>,
}

impl ScoredRecipe {
    pub fn id(&self) -> &str {
        &self.recipe.id
    }
}

/// Score and order an in-memory list of recipes
///
/// `held` may be raw user input; it is normalized here. The result is sorted
/// by descending score and truncated to `config.shortlist_size`.
pub fn rank_corpus(
    held: &[String],
    recipes: Vec<Recipe>,
    config: &MatchingConfig,
) -> Result<Vec<ScoredRecipe>, RankError> {
    let user_tokens = normalize_tokens(held);
    if user_tokens.is_empty() {
        return Err(RankError::EmptyProfile);
    }
    if recipes.is_empty() {
        return Err(RankError::EmptyCorpus);
    }

    let corpus_size = recipes.len();
    let mut scored: Vec<ScoredRecipe> = recipes
        .into_iter()
        .map(|recipe| {
            let tokens = recipe.ingredient_tokens();
            let score = score_recipe(&user_tokens, &tokens, config.alpha);
            let matched_ingredients = tokens_containing(&tokens, &user_tokens);
            ScoredRecipe {
                recipe,
                tokens,
                score,
                matched_ingredients,
            }
        })
        .collect();

    // sort_by is stable: ties keep corpus order
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(config.shortlist_size);

    debug!(
        "Ranked {} recipes, kept {} (best score {:.3})",
        corpus_size,
        scored.len(),
        scored.first().map(|s| s.score).unwrap_or_default()
    );

    Ok(scored)
}

/// Fetch the corpus and rank it against `held`
///
/// The profile is checked before the corpus is read, so an empty profile
/// never costs a full scan.
pub async fn rank_recipes(
    held: &[String],
    corpus: &dyn RecipeCorpus,
    config: &MatchingConfig,
) -> Result<Vec<ScoredRecipe>, RankError> {
    if normalize_tokens(held).is_empty() {
        return Err(RankError::EmptyProfile);
    }

    let recipes = corpus.all_recipes().await?;
    info!("Loaded {} recipes for ranking", recipes.len());

    rank_corpus(held, recipes, config)
}
