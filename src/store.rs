//! # Storage Interfaces
//!
//! The recommendation core reads recipes and user documents through two
//! narrow traits. [`MemoryStore`] implements both in process and backs the
//! tests and local runs; [`PgStore`](crate::db::PgStore) implements them on
//! PostgreSQL.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::StoreError;
use crate::history::HistoryRecord;
use crate::recipe::{Recipe, UserIngredients};
use crate::saved::SavedRecipe;
use crate::taste_profile::{QuizResponses, TasteProfile};

/// Read access to the recipe corpus and its reference data
#[async_trait]
pub trait RecipeCorpus: Send + Sync {
    /// Every recipe, in corpus order
    async fn all_recipes(&self) -> Result<Vec<Recipe>, StoreError>;

    /// A single recipe, `None` when the ID is unknown
    async fn recipe(&self, id: &str) -> Result<Option<Recipe>, StoreError>;

    /// Detector class name to ingredient display name pairs
    async fn ingredient_labels(&self) -> Result<Vec<(String, String)>, StoreError>;
}

/// Per-user documents
///
/// Reads of an unknown user fail with [`StoreError::NotFound`].
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn profile(&self, user_id: &str) -> Result<UserIngredients, StoreError>;

    /// Replace the user's ingredient lists, creating the user if needed
    async fn update_profile(
        &self,
        user_id: &str,
        profile: &UserIngredients,
    ) -> Result<(), StoreError>;

    async fn history(&self, user_id: &str) -> Result<HistoryRecord, StoreError>;

    /// Write IDs, timestamps and the `recommendedAt` marker in one step
    ///
    /// `record.version` must equal the stored version, otherwise the write is
    /// rejected with [`StoreError::Conflict`]. A successful write bumps the
    /// stored version by one.
    async fn set_history(&self, user_id: &str, record: &HistoryRecord) -> Result<(), StoreError>;

    async fn quiz_responses(&self, user_id: &str) -> Result<QuizResponses, StoreError>;

    async fn taste_profile(&self, user_id: &str) -> Result<Option<TasteProfile>, StoreError>;

    async fn save_taste_profile(
        &self,
        user_id: &str,
        profile: &TasteProfile,
    ) -> Result<(), StoreError>;

    /// Description text for a profile code, `None` when none is stored
    async fn taste_profile_description(&self, code: &str) -> Result<Option<String>, StoreError>;

    async fn saved_recipes(&self, user_id: &str) -> Result<Vec<SavedRecipe>, StoreError>;

    async fn set_saved_recipes(
        &self,
        user_id: &str,
        saved: &[SavedRecipe],
    ) -> Result<(), StoreError>;
}

/// Everything stored for one user
#[derive(Debug, Clone, Default)]
pub struct UserDocument {
    pub ingredients: UserIngredients,
    pub history: HistoryRecord,
    pub responses: QuizResponses,
    pub taste_profile: Option<TasteProfile>,
    pub saved_recipes: Vec<SavedRecipe>,
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    recipes: RwLock<Vec<Recipe>>,
    labels: RwLock<Vec<(String, String)>>,
    descriptions: RwLock<HashMap<String, String>>,
    users: RwLock<HashMap<String, UserDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recipes(self, recipes: Vec<Recipe>) -> Self {
        Self {
            recipes: RwLock::new(recipes),
            ..self
        }
    }

    pub fn with_labels(self, labels: &[(&str, &str)]) -> Self {
        let labels = labels
            .iter()
            .map(|(class, name)| (class.to_string(), name.to_string()))
            .collect();
        Self {
            labels: RwLock::new(labels),
            ..self
        }
    }

    pub fn with_description(mut self, code: &str, description: &str) -> Self {
        self.descriptions
            .get_mut()
            .insert(code.to_string(), description.to_string());
        self
    }

    pub fn with_user(mut self, user_id: &str, document: UserDocument) -> Self {
        self.users.get_mut().insert(user_id.to_string(), document);
        self
    }

    /// Snapshot of a user document, for assertions
    pub async fn user(&self, user_id: &str) -> Option<UserDocument> {
        self.users.read().await.get(user_id).cloned()
    }

    async fn read_user<T>(
        &self,
        user_id: &str,
        read: impl FnOnce(&UserDocument) -> T,
    ) -> Result<T, StoreError> {
        self.users
            .read()
            .await
            .get(user_id)
            .map(read)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))
    }

    async fn write_user<T>(
        &self,
        user_id: &str,
        write: impl FnOnce(&mut UserDocument) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut users = self.users.write().await;
        let document = users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        write(document)
    }
}

#[async_trait]
impl RecipeCorpus for MemoryStore {
    async fn all_recipes(&self) -> Result<Vec<Recipe>, StoreError> {
        Ok(self.recipes.read().await.clone())
    }

    async fn recipe(&self, id: &str) -> Result<Option<Recipe>, StoreError> {
        Ok(self.recipes.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn ingredient_labels(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self.labels.read().await.clone())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn profile(&self, user_id: &str) -> Result<UserIngredients, StoreError> {
        self.read_user(user_id, |doc| doc.ingredients.clone()).await
    }

    async fn update_profile(
        &self,
        user_id: &str,
        profile: &UserIngredients,
    ) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        users.entry(user_id.to_string()).or_default().ingredients = profile.clone();
        Ok(())
    }

    async fn history(&self, user_id: &str) -> Result<HistoryRecord, StoreError> {
        self.read_user(user_id, |doc| doc.history.clone()).await
    }

    async fn set_history(&self, user_id: &str, record: &HistoryRecord) -> Result<(), StoreError> {
        self.write_user(user_id, |doc| {
            if doc.history.version != record.version {
                return Err(StoreError::Conflict(format!("history of user {user_id}")));
            }
            doc.history = HistoryRecord {
                version: record.version + 1,
                ..record.clone()
            };
            Ok(())
        })
        .await
    }

    async fn quiz_responses(&self, user_id: &str) -> Result<QuizResponses, StoreError> {
        self.read_user(user_id, |doc| doc.responses.clone()).await
    }

    async fn taste_profile(&self, user_id: &str) -> Result<Option<TasteProfile>, StoreError> {
        self.read_user(user_id, |doc| doc.taste_profile.clone()).await
    }

    async fn save_taste_profile(
        &self,
        user_id: &str,
        profile: &TasteProfile,
    ) -> Result<(), StoreError> {
        self.write_user(user_id, |doc| {
            doc.taste_profile = Some(profile.clone());
            Ok(())
        })
        .await
    }

    async fn taste_profile_description(&self, code: &str) -> Result<Option<String>, StoreError> {
        Ok(self.descriptions.read().await.get(code).cloned())
    }

    async fn saved_recipes(&self, user_id: &str) -> Result<Vec<SavedRecipe>, StoreError> {
        self.read_user(user_id, |doc| doc.saved_recipes.clone()).await
    }

    async fn set_saved_recipes(
        &self,
        user_id: &str,
        saved: &[SavedRecipe],
    ) -> Result<(), StoreError> {
        self.write_user(user_id, |doc| {
            doc.saved_recipes = saved.to_vec();
            Ok(())
        })
        .await
    }
}
