//! Saved recipe bookkeeping: users keep snapshots of recipes they liked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::CookitError;
use crate::recipe::Recipe;
use crate::store::{RecipeCorpus, UserStore};

/// A recipe snapshot in a user's saved list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedRecipe {
    #[serde(flatten)]
    pub recipe: Recipe,
    #[serde(rename = "savedAt")]
    pub saved_at: DateTime<Utc>,
}

/// Outcome of [`save_recipe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    AlreadySaved,
}

/// Append a snapshot of `recipe_id` to the user's saved list
///
/// Saving a recipe twice is a no-op.
pub async fn save_recipe(
    corpus: &dyn RecipeCorpus,
    users: &dyn UserStore,
    user_id: &str,
    recipe_id: &str,
) -> Result<SaveOutcome, CookitError> {
    if recipe_id.trim().is_empty() {
        return Err(CookitError::Validation("recipe id is required".to_string()));
    }

    let recipe = corpus
        .recipe(recipe_id)
        .await?
        .ok_or_else(|| CookitError::NotFound(format!("recipe {recipe_id}")))?;

    let mut saved = users.saved_recipes(user_id).await?;
    if saved.iter().any(|s| s.recipe.id == recipe.id) {
        return Ok(SaveOutcome::AlreadySaved);
    }

    saved.push(SavedRecipe {
        recipe,
        saved_at: Utc::now(),
    });
    users.set_saved_recipes(user_id, &saved).await?;

    info!("User {user_id} saved recipe {recipe_id}");
    Ok(SaveOutcome::Saved)
}

/// Saved recipes, most recently saved first
pub async fn list_saved_recipes(
    users: &dyn UserStore,
    user_id: &str,
) -> Result<Vec<SavedRecipe>, CookitError> {
    let mut saved = users.saved_recipes(user_id).await?;
    saved.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
    Ok(saved)
}

/// Remove the entry at `index` of the stored (insertion ordered) list
pub async fn delete_saved_recipe(
    users: &dyn UserStore,
    user_id: &str,
    index: i64,
) -> Result<SavedRecipe, CookitError> {
    let index = usize::try_from(index)
        .map_err(|_| CookitError::Validation(format!("invalid index {index}")))?;

    let mut saved = users.saved_recipes(user_id).await?;
    if index >= saved.len() {
        return Err(CookitError::NotFound(format!("saved recipe at index {index}")));
    }

    let removed = saved.remove(index);
    users.set_saved_recipes(user_id, &saved).await?;

    info!("User {user_id} removed saved recipe {}", removed.recipe.id);
    Ok(removed)
}
