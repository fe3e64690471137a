//! # Ingredient Catalog
//!
//! Maps detector class names (`"egg"`, `"green_onion"`) to the ingredient
//! names users see and store (`"계란"`, `"대파"`). The catalog is built once
//! at startup, before the server accepts requests, and shared read-only.

use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

use crate::store::RecipeCorpus;

#[derive(Debug, Clone, Default)]
pub struct IngredientCatalog {
    by_class: HashMap<String, String>,
    names: HashSet<String>,
}

impl IngredientCatalog {
    /// Build a catalog from `(class name, display name)` pairs
    ///
    /// Blank entries are skipped; a repeated class name keeps its last
    /// display name.
    pub fn from_pairs<I, C, N>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (C, N)>,
        C: AsRef<str>,
        N: AsRef<str>,
    {
        let by_class: HashMap<String, String> = pairs
            .into_iter()
            .map(|(class, name)| (class.as_ref().trim().to_string(), name.as_ref().trim().to_string()))
            .filter(|(class, name)| !class.is_empty() && !name.is_empty())
            .collect();
        let names = by_class.values().cloned().collect();
        Self { by_class, names }
    }

    /// Load the catalog from a JSON object of `class name -> display name`
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed, or holds no entries.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ingredient catalog {}", path.display()))?;
        let table: HashMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid ingredient catalog {}", path.display()))?;

        let catalog = Self::from_pairs(table);
        if catalog.is_empty() {
            bail!("Ingredient catalog {} is empty", path.display());
        }
        info!("Loaded {} ingredient labels from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Load the catalog from the corpus' label table
    pub async fn from_corpus(corpus: &dyn RecipeCorpus) -> Result<Self> {
        let labels = corpus
            .ingredient_labels()
            .await
            .context("Failed to load ingredient labels")?;

        let catalog = Self::from_pairs(labels);
        if catalog.is_empty() {
            bail!("No ingredient labels stored");
        }
        info!("Loaded {} ingredient labels from store", catalog.len());
        Ok(catalog)
    }

    pub fn display_name(&self, class_name: &str) -> Option<&str> {
        self.by_class.get(class_name.trim()).map(String::as_str)
    }

    /// Map detector classes to display names
    ///
    /// Unknown classes are dropped and each name appears once, in the order
    /// it was first produced.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cookit::catalog::IngredientCatalog;
    ///
    /// let catalog = IngredientCatalog::from_pairs([("egg", "계란"), ("rice", "쌀")]);
    /// let names = catalog.map_detections(["rice", "spoon", "egg", "rice"]);
    /// assert_eq!(names, vec!["쌀", "계란"]);
    /// ```
    pub fn map_detections<I, S>(&self, class_names: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        class_names
            .into_iter()
            .filter_map(|class| self.display_name(class.as_ref()))
            .filter(|name| seen.insert(*name))
            .map(str::to_string)
            .collect()
    }

    /// Whether `name` is a known ingredient display name
    pub fn is_known(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.by_class.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_class.is_empty()
    }
}
