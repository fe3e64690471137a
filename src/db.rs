//! # PostgreSQL Storage
//!
//! Free functions over a [`PgPool`] plus [`PgStore`], which implements the
//! storage traits on top of them. Recipes and user documents are kept as
//! JSONB so passthrough recipe fields and user sub-documents survive a round
//! trip unchanged.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::errors::StoreError;
use crate::history::HistoryRecord;
use crate::recipe::{Recipe, UserIngredients};
use crate::saved::SavedRecipe;
use crate::store::{RecipeCorpus, UserStore};
use crate::taste_profile::{QuizResponses, TasteProfile};

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS recipes (
            id TEXT PRIMARY KEY,
            position BIGSERIAL,
            document JSONB NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create recipes table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS ingredient_labels (
            class_name TEXT PRIMARY KEY,
            display_name TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create ingredient_labels table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS taste_descriptions (
            code TEXT PRIMARY KEY,
            description TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create taste_descriptions table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            ingredients JSONB NOT NULL DEFAULT '{}',
            history JSONB NOT NULL DEFAULT '{}',
            history_version BIGINT NOT NULL DEFAULT 0,
            responses JSONB NOT NULL DEFAULT '{}',
            taste_profile JSONB,
            saved_recipes JSONB NOT NULL DEFAULT '[]',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    info!("Database schema initialized successfully");
    Ok(())
}

/// Insert or replace a recipe document
pub async fn upsert_recipe(pool: &PgPool, recipe: &Recipe) -> Result<()> {
    sqlx::query(
        "INSERT INTO recipes (id, document) VALUES ($1, $2)
         ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document",
    )
    .bind(&recipe.id)
    .bind(Json(recipe))
    .execute(pool)
    .await
    .with_context(|| format!("Failed to upsert recipe {}", recipe.id))?;
    Ok(())
}

/// All recipes in insertion order
pub async fn list_recipes(pool: &PgPool) -> Result<Vec<Recipe>> {
    let rows = sqlx::query("SELECT document FROM recipes ORDER BY position")
        .fetch_all(pool)
        .await
        .context("Failed to list recipes")?;

    rows.into_iter()
        .map(|row| -> Result<Recipe> {
            let Json(recipe): Json<Recipe> = row.try_get("document")?;
            Ok(recipe)
        })
        .collect()
}

pub async fn read_recipe(pool: &PgPool, recipe_id: &str) -> Result<Option<Recipe>> {
    let row = sqlx::query("SELECT document FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .fetch_optional(pool)
        .await
        .context("Failed to read recipe")?;

    match row {
        Some(row) => {
            let Json(recipe): Json<Recipe> = row.try_get("document")?;
            Ok(Some(recipe))
        }
        None => {
            debug!("No recipe found with ID: {}", recipe_id);
            Ok(None)
        }
    }
}

pub async fn upsert_ingredient_label(pool: &PgPool, class_name: &str, display_name: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO ingredient_labels (class_name, display_name) VALUES ($1, $2)
         ON CONFLICT (class_name) DO UPDATE SET display_name = EXCLUDED.display_name",
    )
    .bind(class_name)
    .bind(display_name)
    .execute(pool)
    .await
    .context("Failed to upsert ingredient label")?;
    Ok(())
}

pub async fn list_ingredient_labels(pool: &PgPool) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query("SELECT class_name, display_name FROM ingredient_labels ORDER BY class_name")
        .fetch_all(pool)
        .await
        .context("Failed to list ingredient labels")?;

    rows.into_iter()
        .map(|row| -> Result<(String, String)> {
            Ok((row.try_get("class_name")?, row.try_get("display_name")?))
        })
        .collect()
}

pub async fn upsert_taste_description(pool: &PgPool, code: &str, description: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO taste_descriptions (code, description) VALUES ($1, $2)
         ON CONFLICT (code) DO UPDATE SET description = EXCLUDED.description",
    )
    .bind(code)
    .bind(description)
    .execute(pool)
    .await
    .context("Failed to upsert taste description")?;
    Ok(())
}

pub async fn read_taste_description(pool: &PgPool, code: &str) -> Result<Option<String>> {
    let row = sqlx::query("SELECT description FROM taste_descriptions WHERE code = $1")
        .bind(code)
        .fetch_optional(pool)
        .await
        .context("Failed to read taste description")?;

    Ok(row.map(|row| row.try_get("description")).transpose()?)
}

/// Create a user row with empty documents if it does not exist
pub async fn ensure_user(pool: &PgPool, user_id: &str) -> Result<()> {
    sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to create user")?;
    Ok(())
}

/// Read one JSONB column of a user row, `None` when the user is unknown
async fn read_user_document<T>(pool: &PgPool, user_id: &str, column: &str) -> Result<Option<T>>
where
    T: serde::de::DeserializeOwned + Send + Unpin + 'static,
{
    // Column names come from this module only, never from callers
    let row = sqlx::query(&format!("SELECT {column} FROM users WHERE id = $1"))
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to read {column} of user {user_id}"))?;

    match row {
        Some(row) => {
            let Json(value): Json<T> = row.try_get(column)?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Write one JSONB column of a user row, returning whether the user exists
async fn write_user_document<T>(pool: &PgPool, user_id: &str, column: &str, value: &T) -> Result<bool>
where
    T: serde::Serialize + Sync,
{
    let result = sqlx::query(&format!(
        "UPDATE users SET {column} = $2, updated_at = NOW() WHERE id = $1"
    ))
    .bind(user_id)
    .bind(Json(value))
    .execute(pool)
    .await
    .with_context(|| format!("Failed to write {column} of user {user_id}"))?;

    Ok(result.rows_affected() > 0)
}

pub async fn read_user_ingredients(pool: &PgPool, user_id: &str) -> Result<Option<UserIngredients>> {
    read_user_document(pool, user_id, "ingredients").await
}

/// Replace a user's ingredient lists, creating the user if needed
pub async fn upsert_user_ingredients(
    pool: &PgPool,
    user_id: &str,
    ingredients: &UserIngredients,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (id, ingredients) VALUES ($1, $2)
         ON CONFLICT (id) DO UPDATE SET ingredients = EXCLUDED.ingredients, updated_at = NOW()",
    )
    .bind(user_id)
    .bind(Json(ingredients))
    .execute(pool)
    .await
    .context("Failed to upsert user ingredients")?;

    info!("Stored ingredients for user {}", user_id);
    Ok(())
}

/// Outer `None` for an unknown user, inner `None` before the first quiz
pub async fn read_user_taste_profile(
    pool: &PgPool,
    user_id: &str,
) -> Result<Option<Option<TasteProfile>>> {
    let row = sqlx::query("SELECT taste_profile FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to read user taste profile")?;

    match row {
        Some(row) => {
            let profile: Option<Json<TasteProfile>> = row.try_get("taste_profile")?;
            Ok(Some(profile.map(|Json(profile)| profile)))
        }
        None => Ok(None),
    }
}

/// History document with the version taken from its own column
pub async fn read_user_history(pool: &PgPool, user_id: &str) -> Result<Option<HistoryRecord>> {
    let row = sqlx::query("SELECT history, history_version FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to read user history")?;

    match row {
        Some(row) => {
            let Json(mut record): Json<HistoryRecord> = row.try_get("history")?;
            let version: i64 = row.try_get("history_version")?;
            record.version = u64::try_from(version).context("Negative history version")?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// Replace the history if `record.version` is still the stored version
///
/// Returns `false` when no row matched, either because the user does not
/// exist or because another writer got there first.
pub async fn write_user_history_if_current(
    pool: &PgPool,
    user_id: &str,
    record: &HistoryRecord,
) -> Result<bool> {
    let expected = i64::try_from(record.version).context("History version out of range")?;
    let result = sqlx::query(
        "UPDATE users
         SET history = $2, history_version = history_version + 1, updated_at = NOW()
         WHERE id = $1 AND history_version = $3",
    )
    .bind(user_id)
    .bind(Json(record))
    .bind(expected)
    .execute(pool)
    .await
    .context("Failed to write user history")?;

    Ok(result.rows_affected() > 0)
}

pub async fn user_exists(pool: &PgPool, user_id: &str) -> Result<bool> {
    let row = sqlx::query("SELECT 1 FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to look up user")?;
    Ok(row.is_some())
}

/// Store quiz answers, creating the user if needed
pub async fn upsert_quiz_responses(pool: &PgPool, user_id: &str, responses: &QuizResponses) -> Result<()> {
    ensure_user(pool, user_id).await?;
    write_user_document(pool, user_id, "responses", responses).await?;
    Ok(())
}

/// Storage backend on PostgreSQL
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the schema exists
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        init_database_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    fn missing_user(user_id: &str) -> StoreError {
        StoreError::NotFound(format!("user {user_id}"))
    }

    fn require<T>(user_id: &str, value: Result<Option<T>>) -> Result<T, StoreError> {
        value?.ok_or_else(|| Self::missing_user(user_id))
    }

    async fn write<T>(&self, user_id: &str, column: &str, value: &T) -> Result<(), StoreError>
    where
        T: serde::Serialize + Sync,
    {
        if write_user_document(&self.pool, user_id, column, value).await? {
            Ok(())
        } else {
            Err(Self::missing_user(user_id))
        }
    }
}

#[async_trait]
impl RecipeCorpus for PgStore {
    async fn all_recipes(&self) -> Result<Vec<Recipe>, StoreError> {
        Ok(list_recipes(&self.pool).await?)
    }

    async fn recipe(&self, id: &str) -> Result<Option<Recipe>, StoreError> {
        Ok(read_recipe(&self.pool, id).await?)
    }

    async fn ingredient_labels(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(list_ingredient_labels(&self.pool).await?)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn profile(&self, user_id: &str) -> Result<UserIngredients, StoreError> {
        Self::require(user_id, read_user_ingredients(&self.pool, user_id).await)
    }

    async fn update_profile(
        &self,
        user_id: &str,
        profile: &UserIngredients,
    ) -> Result<(), StoreError> {
        Ok(upsert_user_ingredients(&self.pool, user_id, profile).await?)
    }

    async fn history(&self, user_id: &str) -> Result<HistoryRecord, StoreError> {
        Self::require(user_id, read_user_history(&self.pool, user_id).await)
    }

    async fn set_history(&self, user_id: &str, record: &HistoryRecord) -> Result<(), StoreError> {
        if write_user_history_if_current(&self.pool, user_id, record).await? {
            return Ok(());
        }
        if user_exists(&self.pool, user_id).await? {
            Err(StoreError::Conflict(format!("history of user {user_id}")))
        } else {
            Err(Self::missing_user(user_id))
        }
    }

    async fn quiz_responses(&self, user_id: &str) -> Result<QuizResponses, StoreError> {
        Self::require(user_id, read_user_document(&self.pool, user_id, "responses").await)
    }

    async fn taste_profile(&self, user_id: &str) -> Result<Option<TasteProfile>, StoreError> {
        Self::require(user_id, read_user_taste_profile(&self.pool, user_id).await)
    }

    async fn save_taste_profile(
        &self,
        user_id: &str,
        profile: &TasteProfile,
    ) -> Result<(), StoreError> {
        self.write(user_id, "taste_profile", profile).await
    }

    async fn taste_profile_description(&self, code: &str) -> Result<Option<String>, StoreError> {
        Ok(read_taste_description(&self.pool, code).await?)
    }

    async fn saved_recipes(&self, user_id: &str) -> Result<Vec<SavedRecipe>, StoreError> {
        Self::require(user_id, read_user_document(&self.pool, user_id, "saved_recipes").await)
    }

    async fn set_saved_recipes(
        &self,
        user_id: &str,
        saved: &[SavedRecipe],
    ) -> Result<(), StoreError> {
        self.write(user_id, "saved_recipes", &saved).await
    }
}
