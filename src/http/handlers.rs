use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::error::ApiError;
use super::extract::{JsonBody, Language, MultipartBody, PathParam, UserId};
use super::state::AppState;
use crate::detector::{detect_ingredients, ImageUpload};
use crate::errors::CookitError;
use crate::profile::{calculate_taste_profile, update_ingredients};
use crate::recipe::UserIngredients;
use crate::saved::{delete_saved_recipe, list_saved_recipes, save_recipe, SaveOutcome};
use crate::search::smart_search;

pub type ApiResult<T> = Result<T, ApiError>;

/// Multipart field holding the photo
const IMAGE_FIELD: &str = "image";

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn recommend_recipes(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Language(lang): Language,
) -> ApiResult<Json<Value>> {
    let (profile, curation) = state.curator.recommend_for_user(&user_id).await?;

    let fallback = curation.outcome.fallback_reason();
    let mut recipes = curation.recipes().to_vec();
    if fallback.is_some() {
        let rationale = state.localizer.message(&lang, "recommend-fallback-reason");
        for recipe in &mut recipes {
            recipe.rationale = rationale.clone();
        }
    }

    Ok(Json(json!({
        "success": true,
        "recommendedRecipes": recipes,
        "userIngredients": profile,
        "fallback": fallback,
    })))
}

pub async fn upload_ingredient(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Language(lang): Language,
    MultipartBody(mut multipart): MultipartBody,
) -> ApiResult<Json<Value>> {
    let bad_upload = |e: axum::extract::multipart::MultipartError| {
        CookitError::Validation(format!("unreadable upload: {e}"))
    };

    let mut image = None;
    while let Some(field) = multipart.next_field().await.map_err(bad_upload)? {
        if field.name() == Some(IMAGE_FIELD) {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let bytes = field.bytes().await.map_err(bad_upload)?;
            image = Some((filename, bytes.to_vec()));
            break;
        }
    }
    let (filename, bytes) =
        image.ok_or_else(|| CookitError::Validation("image is required".to_string()))?;

    let upload = ImageUpload::validate(bytes, &filename, &state.detector_config)
        .map_err(CookitError::from)?;
    let ingredients = detect_ingredients(
        state.detector.as_ref(),
        &state.catalog,
        &upload,
        state.detector_config.timeout(),
    )
    .await
    .map_err(CookitError::from)?;

    info!("User {user_id} uploaded a photo with {} ingredients", ingredients.len());
    Ok(Json(json!({
        "success": true,
        "detectedIngredients": ingredients,
        "message": state.localizer.message(&lang, "upload-success"),
    })))
}

pub async fn calculate_fmbt(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> ApiResult<Json<Value>> {
    let report = calculate_taste_profile(state.users.as_ref(), &user_id).await?;

    Ok(Json(json!({
        "success": true,
        "fmbt": report.profile.code,
        "fmbtScores": report.profile.scores,
        "description": report.description,
    })))
}

pub async fn update_user_ingredients(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Language(lang): Language,
    JsonBody(ingredients): JsonBody<UserIngredients>,
) -> ApiResult<Json<Value>> {
    let stored = update_ingredients(state.users.as_ref(), &user_id, &ingredients).await?;

    Ok(Json(json!({
        "success": true,
        "userIngredients": stored,
        "message": state.localizer.message(&lang, "ingredients-updated"),
    })))
}

#[derive(Debug, Deserialize)]
pub struct SaveRecipeRequest {
    #[serde(rename = "recipeId", default)]
    pub recipe_id: String,
}

pub async fn save_user_recipe(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Language(lang): Language,
    JsonBody(request): JsonBody<SaveRecipeRequest>,
) -> ApiResult<Json<Value>> {
    let outcome = save_recipe(
        state.corpus.as_ref(),
        state.users.as_ref(),
        &user_id,
        &request.recipe_id,
    )
    .await?;

    let key = match outcome {
        SaveOutcome::Saved => "recipe-saved",
        SaveOutcome::AlreadySaved => "recipe-already-saved",
    };
    Ok(Json(json!({
        "success": true,
        "message": state.localizer.message(&lang, key),
    })))
}

pub async fn saved_recipes(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> ApiResult<Json<Value>> {
    let recipes = list_saved_recipes(state.users.as_ref(), &user_id).await?;

    Ok(Json(json!({
        "success": true,
        "recipes": recipes,
    })))
}

pub async fn delete_saved(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Language(lang): Language,
    PathParam(index): PathParam<i64>,
) -> ApiResult<Json<Value>> {
    let removed = delete_saved_recipe(state.users.as_ref(), &user_id, index).await?;

    Ok(Json(json!({
        "success": true,
        "message": state.localizer.message_with_args(
            &lang,
            "recipe-deleted",
            &[("name", removed.recipe.name.as_str())],
        ),
    })))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(rename = "searchQuery", default)]
    pub query: String,
}

pub async fn search_recipes(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<SearchRequest>,
) -> ApiResult<Json<Value>> {
    let results = smart_search(state.corpus.as_ref(), &state.catalog, &request.query).await?;

    Ok(Json(json!({
        "success": true,
        "searchInfo": results.info,
        "recipes": results.recipes,
    })))
}
