//! # Error Types Module
//!
//! The service-level error taxonomy and the storage error shared by every
//! store backend. Component errors (ranking, curation, detection, the
//! recommender client) live next to their components and convert into
//! [`CookitError`] at the service boundary.

use thiserror::Error;

use crate::curator::CurateError;
use crate::detector::DetectError;
use crate::ranker::RankError;
use crate::recommender::RecommenderError;

/// Errors raised by a [`RecipeCorpus`](crate::store::RecipeCorpus) or
/// [`UserStore`](crate::store::UserStore) backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The addressed document does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// A versioned write lost a race with another writer
    #[error("Version conflict on {0}")]
    Conflict(String),

    /// The backend failed (connection, query, decoding)
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Service-level error taxonomy
#[derive(Error, Debug)]
pub enum CookitError {
    /// Bad or missing input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing user, recipe or description document
    #[error("Not found: {0}")]
    NotFound(String),

    /// Detector or recommender unreachable or answering in an unexpected shape
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Recommender throttling; recovered by the curator, surfaced only by
    /// direct recommender calls
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Detector call exceeded its budget
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Storage failure other than a missing document
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CookitError {
    /// Localization key of the user-facing message for this error
    pub fn message_key(&self) -> &'static str {
        match self {
            CookitError::Validation(_) => "error-validation",
            CookitError::NotFound(_) => "error-not-found",
            CookitError::ExternalService(_) => "error-external-service",
            CookitError::RateLimited(_) => "error-rate-limited",
            CookitError::Timeout(_) => "error-timeout",
            CookitError::Storage(_) => "error-internal",
        }
    }
}

impl From<StoreError> for CookitError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => CookitError::NotFound(what),
            other => CookitError::Storage(other.to_string()),
        }
    }
}

impl From<RankError> for CookitError {
    fn from(err: RankError) -> Self {
        match err {
            RankError::EmptyProfile => CookitError::Validation(err.to_string()),
            RankError::EmptyCorpus => CookitError::NotFound(err.to_string()),
            RankError::Store(store) => store.into(),
        }
    }
}

impl From<RecommenderError> for CookitError {
    fn from(err: RecommenderError) -> Self {
        match err {
            RecommenderError::RateLimited(msg) => CookitError::RateLimited(msg),
            other => CookitError::ExternalService(other.to_string()),
        }
    }
}

impl From<CurateError> for CookitError {
    fn from(err: CurateError) -> Self {
        match err {
            CurateError::ExternalService(inner) => CookitError::ExternalService(inner.to_string()),
            CurateError::Store(store) => store.into(),
        }
    }
}

impl From<DetectError> for CookitError {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::Validation(msg) => CookitError::Validation(msg),
            DetectError::NoIngredients => CookitError::Validation(err.to_string()),
            DetectError::Timeout(_) => CookitError::Timeout(err.to_string()),
            DetectError::CircuitOpen | DetectError::Service(_) => {
                CookitError::ExternalService(err.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Backend(format!("{err:#}"))
    }
}
