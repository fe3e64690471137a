//! User profile operations: ingredient list updates and taste-profile
//! classification.

use serde::Serialize;
use tracing::info;

use crate::errors::CookitError;
use crate::recipe::UserIngredients;
use crate::store::UserStore;
use crate::taste_profile::{classify, TasteProfile};

/// Replace the user's ingredient lists with their normalized form
///
/// Returns what was stored.
pub async fn update_ingredients(
    users: &dyn UserStore,
    user_id: &str,
    ingredients: &UserIngredients,
) -> Result<UserIngredients, CookitError> {
    let normalized = ingredients.normalized();
    users.update_profile(user_id, &normalized).await?;

    info!(
        "Updated ingredients of user {user_id}: {} held, {} disliked, {} allergic",
        normalized.held.len(),
        normalized.disliked.len(),
        normalized.allergic.len()
    );
    Ok(normalized)
}

/// A classified profile with its description
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TasteProfileReport {
    #[serde(flatten)]
    pub profile: TasteProfile,
    pub description: String,
}

/// Classify the user's stored quiz answers and save the result
///
/// # Errors
///
/// `NotFound` when the user is unknown or no description exists for the
/// resulting code; nothing is saved in that case.
pub async fn calculate_taste_profile(
    users: &dyn UserStore,
    user_id: &str,
) -> Result<TasteProfileReport, CookitError> {
    let responses = users.quiz_responses(user_id).await?;
    let profile = classify(&responses);

    let description = users
        .taste_profile_description(&profile.code)
        .await?
        .ok_or_else(|| CookitError::NotFound(format!("description for {}", profile.code)))?;

    users.save_taste_profile(user_id, &profile).await?;
    info!("User {user_id} classified as {}", profile.code);

    Ok(TasteProfileReport {
        profile,
        description,
    })
}
