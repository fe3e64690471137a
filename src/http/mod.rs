//! # HTTP Surface
//!
//! JSON API over the recommendation core. Callers identify themselves with
//! an `x-user-id` header; error bodies are localized from `Accept-Language`
//! by the [`error::localize_errors`] middleware.
//!
//! | Method | Path | |
//! |--------|------|-|
//! | POST | `/api/recommend-recipes` | curated recommendation |
//! | POST | `/api/upload-ingredient` | multipart photo, field `image` |
//! | GET | `/api/calculate-fmbt` | classify stored quiz answers |
//! | PUT | `/api/ingredients` | replace ingredient lists |
//! | POST | `/api/save-recipe` | `{ "recipeId" }` |
//! | GET | `/api/saved-recipes` | newest first |
//! | DELETE | `/api/saved-recipe/:index` | |
//! | POST | `/api/smart-search` | `{ "searchQuery" }` |
//! | GET | `/health` | |

pub mod error;
pub mod extract;
pub mod handlers;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

pub use error::ApiError;
pub use state::AppState;

/// Headroom over the image limit for multipart framing
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit =
        usize::try_from(state.detector_config.max_upload_size).unwrap_or(usize::MAX);

    let api = Router::new()
        .route("/recommend-recipes", post(handlers::recommend_recipes))
        .route(
            "/upload-ingredient",
            post(handlers::upload_ingredient)
                .layer(DefaultBodyLimit::max(upload_limit.saturating_add(MULTIPART_OVERHEAD))),
        )
        .route("/calculate-fmbt", get(handlers::calculate_fmbt))
        .route("/ingredients", put(handlers::update_user_ingredients))
        .route("/save-recipe", post(handlers::save_user_recipe))
        .route("/saved-recipes", get(handlers::saved_recipes))
        .route("/saved-recipe/:index", delete(handlers::delete_saved))
        .route("/smart-search", post(handlers::search_recipes));

    Router::new()
        .nest("/api", api)
        .route("/health", get(handlers::health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            error::localize_errors,
        ))
        .with_state(state)
}
