//! Free-text recipe search.
//!
//! Query words that are known ingredient names search the ingredient field;
//! the remaining words, joined back together, search recipe names.

use serde::Serialize;
use tracing::debug;

use crate::catalog::IngredientCatalog;
use crate::errors::CookitError;
use crate::recipe::Recipe;
use crate::store::RecipeCorpus;

/// Score added when the recipe name contains the general query
pub const NAME_MATCH_SCORE: u32 = 100;

/// How the query was split
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchInfo {
    #[serde(rename = "detectedIngredients")]
    pub ingredients: Vec<String>,
    #[serde(rename = "searchTerms")]
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub recipe: Recipe,
    #[serde(rename = "ingredientMatchCount")]
    pub ingredient_matches: u32,
    #[serde(rename = "nameMatchScore")]
    pub name_score: u32,
    #[serde(rename = "totalMatchScore")]
    pub total_score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    #[serde(rename = "searchInfo")]
    pub info: SearchInfo,
    pub recipes: Vec<SearchHit>,
}

/// Split `query` into known ingredient names and the remaining free text
pub fn split_query(query: &str, catalog: &IngredientCatalog) -> SearchInfo {
    let (ingredients, general): (Vec<&str>, Vec<&str>) =
        query.split_whitespace().partition(|term| catalog.is_known(term));

    let remaining = general.join(" ");
    SearchInfo {
        ingredients: ingredients.into_iter().map(str::to_string).collect(),
        terms: if remaining.is_empty() {
            Vec::new()
        } else {
            vec![remaining]
        },
    }
}

/// Score one recipe, `None` when it does not match
pub fn score_hit(recipe: &Recipe, info: &SearchInfo) -> Option<SearchHit> {
    let field = recipe.ingredients_raw.to_lowercase();
    let ingredient_matches = info
        .ingredients
        .iter()
        .filter(|name| field.contains(&name.to_lowercase()))
        .count() as u32;

    let name = recipe.name.to_lowercase();
    let name_score = match info.terms.first() {
        Some(term) if name.contains(&term.to_lowercase()) => NAME_MATCH_SCORE,
        _ => 0,
    };

    if ingredient_matches == 0 && name_score == 0 {
        return None;
    }

    Some(SearchHit {
        recipe: recipe.clone(),
        ingredient_matches,
        name_score,
        total_score: ingredient_matches + name_score,
    })
}

/// Search the corpus, best matches first
///
/// Recipes with equal scores keep their corpus order.
pub async fn smart_search(
    corpus: &dyn RecipeCorpus,
    catalog: &IngredientCatalog,
    query: &str,
) -> Result<SearchResults, CookitError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CookitError::Validation("search query is required".to_string()));
    }

    let info = split_query(query, catalog);
    debug!(
        "Search split into ingredients {:?} and terms {:?}",
        info.ingredients, info.terms
    );

    let mut recipes: Vec<SearchHit> = corpus
        .all_recipes()
        .await?
        .iter()
        .filter_map(|recipe| score_hit(recipe, &info))
        .collect();
    recipes.sort_by(|a, b| b.total_score.cmp(&a.total_score));

    Ok(SearchResults { info, recipes })
}
