//! # Recommendation Curator
//!
//! Narrows a ranked shortlist down to the final recommendation:
//!
//! 1. Drop recipes the user was recently recommended, unless that would
//!    leave fewer than `min_candidate_pool` candidates
//! 2. Annotate candidates with matched, disliked and allergic ingredients
//! 3. Let the external [`Recommender`] pick `picks` recipes
//! 4. Resolve the picks against the corpus, or fall back to the best-scoring
//!    shortlist entries when the recommender is throttled or comes back short
//! 5. Append the final picks to the user's bounded history
//!
//! A request moves through the [`Stage`]s in order. Failures while fetching
//! end the request; recommender failures are routed to the fallback where the
//! rules allow it.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::MatchingConfig;
use crate::errors::{CookitError, StoreError};
use crate::history::RecommendationHistory;
use crate::ranker::{rank_recipes, ScoredRecipe};
use crate::recipe::{contains_any, Recipe, UserIngredients};
use crate::recommender::{
    Candidate, RecommendRequest, Recommender, RecommenderError, Selection, SELECTION_CRITERIA,
};
use crate::store::{RecipeCorpus, UserStore};

/// Rationale attached to recipes chosen by the fallback rule
pub const FALLBACK_RATIONALE: &str = "Top recipe by ingredient match";

#[derive(Error, Debug)]
pub enum CurateError {
    #[error(transparent)]
    ExternalService(RecommenderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Steps of a single recommendation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Curating,
    CallingExternal,
    Resolving,
    FallingBack,
    Persisting,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "fetching",
            Stage::Curating => "curating",
            Stage::CallingExternal => "calling-external",
            Stage::Resolving => "resolving",
            Stage::FallingBack => "falling-back",
            Stage::Persisting => "persisting",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Why the deterministic fallback was used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum FallbackReason {
    /// The recommender throttled the request
    RateLimited,
    /// Fewer valid picks came back than required
    InsufficientSelections { resolved: usize },
}

/// A recipe in the final recommendation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedRecipe {
    #[serde(flatten)]
    pub recipe: Recipe,
    #[serde(rename = "matchScore", skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
    #[serde(rename = "fmbtInfo")]
    pub taste_profile: Option<String>,
    #[serde(rename = "recommendReason")]
    pub rationale: String,
}

/// Result of the selection step, before history is written
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    Chosen(Vec<RecommendedRecipe>),
    Fallback {
        reason: FallbackReason,
        recipes: Vec<RecommendedRecipe>,
    },
}

impl SelectionOutcome {
    pub fn recipes(&self) -> &[RecommendedRecipe] {
        match self {
            SelectionOutcome::Chosen(recipes) => recipes,
            SelectionOutcome::Fallback { recipes, .. } => recipes,
        }
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            SelectionOutcome::Chosen(_) => None,
            SelectionOutcome::Fallback { reason, .. } => Some(*reason),
        }
    }
}

/// Final recommendation plus the history that was persisted with it
#[derive(Debug, Clone)]
pub struct Curation {
    pub outcome: SelectionOutcome,
    pub history: RecommendationHistory,
}

impl Curation {
    pub fn recipes(&self) -> &[RecommendedRecipe] {
        self.outcome.recipes()
    }
}

/// Shortlist entries eligible for recommendation
///
/// Recently recommended recipes are excluded unless fewer than `min_pool`
/// entries would remain, in which case the full shortlist is used.
pub fn candidate_pool<'a>(
    shortlist: &'a [ScoredRecipe],
    history: &RecommendationHistory,
    min_pool: usize,
) -> Vec<&'a ScoredRecipe> {
    let seen = history.id_set();
    let fresh: Vec<&ScoredRecipe> = shortlist
        .iter()
        .filter(|entry| !seen.contains(entry.id()))
        .collect();

    if fresh.len() >= min_pool {
        fresh
    } else {
        debug!(
            "Only {} fresh candidates (minimum {}), restoring full shortlist",
            fresh.len(),
            min_pool
        );
        shortlist.iter().collect()
    }
}

/// Describe a shortlist entry for the recommender
///
/// `profile` must be normalized.
pub fn annotate(
    entry: &ScoredRecipe,
    profile: &UserIngredients,
    history: &RecommendationHistory,
) -> Candidate {
    Candidate {
        id: entry.recipe.id.clone(),
        name: entry.recipe.name.clone(),
        match_score: entry.score,
        matched_ingredients: entry.matched_ingredients.clone(),
        contains_disliked: contains_any(&entry.tokens, &profile.disliked),
        contains_allergic: contains_any(&entry.tokens, &profile.allergic),
        is_previously_recommended: history.contains(entry.id()),
        category: entry.recipe.category.clone(),
    }
}

/// The `picks` best-scoring shortlist entries with the generic rationale
pub fn fallback_selection(
    shortlist: &[ScoredRecipe],
    picks: usize,
    taste_profile: Option<&str>,
) -> Vec<RecommendedRecipe> {
    shortlist
        .iter()
        .take(picks)
        .map(|entry| RecommendedRecipe {
            recipe: entry.recipe.clone(),
            match_score: Some(entry.score),
            taste_profile: taste_profile.map(str::to_string),
            rationale: FALLBACK_RATIONALE.to_string(),
        })
        .collect()
}

/// Runs the curation pipeline against injected collaborators
pub struct Curator {
    corpus: Arc<dyn RecipeCorpus>,
    users: Arc<dyn UserStore>,
    recommender: Arc<dyn Recommender>,
    config: MatchingConfig,
}

impl Curator {
    pub fn new(
        corpus: Arc<dyn RecipeCorpus>,
        users: Arc<dyn UserStore>,
        recommender: Arc<dyn Recommender>,
        config: MatchingConfig,
    ) -> Self {
        Self {
            corpus,
            users,
            recommender,
            config,
        }
    }

    /// Full request: load the user, rank the corpus, curate
    ///
    /// Returns the normalized profile used for matching alongside the
    /// curation.
    pub async fn recommend_for_user(
        &self,
        user_id: &str,
    ) -> Result<(UserIngredients, Curation), CookitError> {
        debug!(user_id, stage = %Stage::Fetching);
        let profile = self.users.profile(user_id).await?.normalized();
        let taste = self.users.taste_profile(user_id).await?.map(|t| t.code);
        let record = self.users.history(user_id).await?;
        let history = RecommendationHistory::from_record(&record, self.config.history_capacity);

        let shortlist = rank_recipes(&profile.held, self.corpus.as_ref(), &self.config).await?;

        let curation = self
            .curate(user_id, &profile, &shortlist, taste.as_deref(), history)
            .await?;
        Ok((profile, curation))
    }

    /// Select the final recipes for `shortlist` and persist the history
    pub async fn curate(
        &self,
        user_id: &str,
        profile: &UserIngredients,
        shortlist: &[ScoredRecipe],
        taste_profile: Option<&str>,
        history: RecommendationHistory,
    ) -> Result<Curation, CurateError> {
        let profile = profile.normalized();
        let outcome = self
            .select(&profile, shortlist, taste_profile, &history)
            .await?;

        debug!(user_id, stage = %Stage::Persisting);
        let picked: Vec<String> = outcome.recipes().iter().map(|r| r.recipe.id.clone()).collect();
        let history = self.persist_history(user_id, history, &picked).await?;

        info!(
            user_id,
            stage = %Stage::Done,
            fallback = outcome.fallback_reason().is_some(),
            "Recommended {} recipes",
            picked.len()
        );
        Ok(Curation { outcome, history })
    }

    /// Candidate selection without side effects on the store
    pub async fn select(
        &self,
        profile: &UserIngredients,
        shortlist: &[ScoredRecipe],
        taste_profile: Option<&str>,
        history: &RecommendationHistory,
    ) -> Result<SelectionOutcome, CurateError> {
        debug!(stage = %Stage::Curating, shortlist = shortlist.len());
        let candidates: Vec<Candidate> =
            candidate_pool(shortlist, history, self.config.min_candidate_pool)
                .into_iter()
                .map(|entry| annotate(entry, profile, history))
                .collect();

        let request = RecommendRequest {
            candidates,
            taste_profile: taste_profile.map(str::to_string),
            user: profile.clone(),
            criteria: SELECTION_CRITERIA.iter().map(|c| c.to_string()).collect(),
            picks: self.config.picks,
        };

        debug!(stage = %Stage::CallingExternal, candidates = request.candidates.len());
        let response = match self.recommender.recommend(&request).await {
            Ok(response) => response,
            Err(RecommenderError::RateLimited(msg)) => {
                warn!(stage = %Stage::FallingBack, "Recommender rate limited: {msg}");
                return Ok(SelectionOutcome::Fallback {
                    reason: FallbackReason::RateLimited,
                    recipes: fallback_selection(shortlist, self.config.picks, taste_profile),
                });
            }
            Err(other) => return Err(CurateError::ExternalService(other)),
        };

        debug!(stage = %Stage::Resolving, selections = response.selections.len());
        let resolved = self
            .resolve(&response.selections, shortlist, taste_profile)
            .await?;

        if resolved.len() < self.config.picks {
            warn!(
                stage = %Stage::FallingBack,
                "Only {} of {} selections resolved",
                resolved.len(),
                self.config.picks
            );
            return Ok(SelectionOutcome::Fallback {
                reason: FallbackReason::InsufficientSelections {
                    resolved: resolved.len(),
                },
                recipes: fallback_selection(shortlist, self.config.picks, taste_profile),
            });
        }

        Ok(SelectionOutcome::Chosen(resolved))
    }

    /// Look up selected IDs in the corpus, dropping unknown and repeated ones
    async fn resolve(
        &self,
        selections: &[Selection],
        shortlist: &[ScoredRecipe],
        taste_profile: Option<&str>,
    ) -> Result<Vec<RecommendedRecipe>, CurateError> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(self.config.picks);

        for selection in selections {
            if resolved.len() == self.config.picks {
                break;
            }
            if !seen.insert(selection.id.as_str()) {
                continue;
            }
            match self.corpus.recipe(&selection.id).await? {
                Some(recipe) => {
                    let match_score = shortlist
                        .iter()
                        .find(|entry| entry.id() == recipe.id)
                        .map(|entry| entry.score);
                    resolved.push(RecommendedRecipe {
                        recipe,
                        match_score,
                        taste_profile: taste_profile.map(str::to_string),
                        rationale: selection.rationale.clone(),
                    });
                }
                None => debug!("Recommender picked unknown recipe {}", selection.id),
            }
        }

        Ok(resolved)
    }

    /// Append `picked` to the history and write it with a version check
    ///
    /// On a version conflict the stored history is re-read and the append
    /// repeated, up to `history_write_attempts` times.
    async fn persist_history(
        &self,
        user_id: &str,
        mut history: RecommendationHistory,
        picked: &[String],
    ) -> Result<RecommendationHistory, CurateError> {
        let mut attempt = 1;
        loop {
            let now = Utc::now();
            let mut updated = history.clone();
            updated.extend(picked.iter().cloned(), now);

            let mut record = updated.to_record(now);
            match self.users.set_history(user_id, &record).await {
                Ok(()) => {
                    record.version += 1;
                    return Ok(RecommendationHistory::from_record(
                        &record,
                        self.config.history_capacity,
                    ));
                }
                Err(StoreError::Conflict(what))
                    if attempt < self.config.history_write_attempts =>
                {
                    warn!("Concurrent update of {what}, retrying (attempt {attempt})");
                    attempt += 1;
                    let current = self.users.history(user_id).await?;
                    history =
                        RecommendationHistory::from_record(&current, self.config.history_capacity);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
