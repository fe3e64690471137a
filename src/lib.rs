//! # Cookit
//!
//! Recipe recommendation backend. Users register the ingredients they have
//! (typed in, or detected in a fridge photo), and the service ranks a recipe
//! corpus by ingredient similarity, then lets a language model pick three
//! recipes from the shortlist while avoiding repeats and allergens.
//!
//! The pipeline, bottom up:
//!
//! - [`similarity`] and [`scoring`]: string similarity and per-recipe scores
//! - [`ranker`]: whole-corpus ranking into a shortlist
//! - [`curator`]: history-aware candidate selection with a deterministic
//!   fallback, and history persistence
//! - [`taste_profile`]: the four-letter eating-habit profile
//!
//! Storage sits behind the traits in [`store`]; [`http`] exposes everything
//! as a JSON API.
//!
//! # Examples
//!
//! ```rust
//! use cookit::config::MatchingConfig;
//! use cookit::ranker::rank_corpus;
//! use cookit::recipe::Recipe;
//!
//! let recipes = vec![
//!     Recipe::new("r1", "Egg Fried Rice", "rice", "egg, rice, green onion"),
//!     Recipe::new("r2", "Tofu Soup", "soup", "tofu, anchovy"),
//! ];
//! let ranked = rank_corpus(&["egg".to_string(), "rice".to_string()], recipes, &MatchingConfig::default()).unwrap();
//! assert_eq!(ranked[0].id(), "r1");
//! ```

pub mod catalog;
pub mod circuit_breaker;
pub mod config;
pub mod curator;
pub mod db;
pub mod detector;
pub mod errors;
pub mod history;
pub mod http;
pub mod localization;
pub mod profile;
pub mod ranker;
pub mod recipe;
pub mod recommender;
pub mod saved;
pub mod scoring;
pub mod search;
pub mod similarity;
pub mod store;
pub mod taste_profile;

pub use errors::{CookitError, StoreError};
