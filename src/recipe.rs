//! # Recipe and Ingredient Data Model
//!
//! Records shared by the ranking pipeline and the storage layer:
//!
//! - **Recipe**: a corpus entry with a fixed set of known fields and an
//!   opaque bag of presentation fields passed through unchanged
//! - **UserIngredients**: the held / disliked / allergic token lists of a user
//!
//! Corpus documents use the public recipe dataset field names (`RCP_NM`,
//! `RCP_PAT2`, `RCP_PARTS_DTLS`), which the serde attributes map onto
//! readable Rust names.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Lowercase and trim an ingredient label
pub fn normalize_token(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalize a list of labels, dropping empties and duplicates
///
/// First occurrence wins, so the relative order of the input is preserved.
pub fn normalize_tokens<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .map(|item| normalize_token(item.as_ref()))
        .filter(|token| !token.is_empty())
        .filter(|token| seen.insert(token.clone()))
        .collect()
}

/// Split a comma-separated ingredient field into normalized tokens
///
/// # Examples
///
/// ```rust
/// use cookit::recipe::parse_ingredient_field;
///
/// let tokens = parse_ingredient_field(" Egg, RICE ,, salt");
/// assert_eq!(tokens, vec!["egg", "rice", "salt"]);
/// ```
pub fn parse_ingredient_field(field: &str) -> Vec<String> {
    field
        .split(',')
        .map(normalize_token)
        .filter(|token| !token.is_empty())
        .collect()
}

/// A recipe from the corpus
///
/// Only the fields used for matching are typed. Images, manual steps,
/// nutrition and hashtags stay in `presentation` and are serialized back
/// flat, exactly as they were read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Document identifier
    pub id: String,

    /// Display name
    #[serde(rename = "RCP_NM", alias = "name", default)]
    pub name: String,

    /// Category tag (soup, side dish, dessert, ...)
    #[serde(rename = "RCP_PAT2", alias = "category", default)]
    pub category: String,

    /// Raw comma-separated ingredient list
    #[serde(rename = "RCP_PARTS_DTLS", alias = "ingredients", default)]
    pub ingredients_raw: String,

    /// Presentation fields the pipeline never inspects
    #[serde(flatten)]
    pub presentation: Map<String, Value>,
}

impl Recipe {
    /// Create a recipe with no presentation fields
    pub fn new(id: &str, name: &str, category: &str, ingredients_raw: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            ingredients_raw: ingredients_raw.to_string(),
            presentation: Map::new(),
        }
    }

    /// Attach a presentation field
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.presentation.insert(key.to_string(), value);
        self
    }

    /// Normalized ingredient tokens parsed from the raw field
    pub fn ingredient_tokens(&self) -> Vec<String> {
        parse_ingredient_field(&self.ingredients_raw)
    }
}

/// Ingredient lists of a single user
///
/// Field names follow the stored user document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserIngredients {
    /// Ingredients the user has at hand
    #[serde(rename = "ingredients", default)]
    pub held: Vec<String>,

    /// Ingredients the user would rather avoid
    #[serde(rename = "disliked_ingredients", default)]
    pub disliked: Vec<String>,

    /// Ingredients the user must not eat
    #[serde(rename = "allergic_ingredients", default)]
    pub allergic: Vec<String>,
}

impl UserIngredients {
    pub fn new(held: &[&str], disliked: &[&str], allergic: &[&str]) -> Self {
        Self {
            held: held.iter().map(|s| s.to_string()).collect(),
            disliked: disliked.iter().map(|s| s.to_string()).collect(),
            allergic: allergic.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Copy of the profile with every list normalized and deduplicated
    pub fn normalized(&self) -> Self {
        Self {
            held: normalize_tokens(&self.held),
            disliked: normalize_tokens(&self.disliked),
            allergic: normalize_tokens(&self.allergic),
        }
    }
}

/// True when any recipe token contains any of the given (normalized) labels
///
/// Containment is a substring test, so the label "pork" flags "pork belly".
pub fn contains_any(recipe_tokens: &[String], labels: &[String]) -> bool {
    recipe_tokens
        .iter()
        .any(|token| labels.iter().any(|label| token.contains(label.as_str())))
}

/// Recipe tokens that contain at least one of the given labels
pub fn tokens_containing(recipe_tokens: &[String], labels: &[String]) -> Vec<String> {
    recipe_tokens
        .iter()
        .filter(|token| labels.iter().any(|label| token.contains(label.as_str())))
        .cloned()
        .collect()
}
