//! # Recommendation Pipeline Tests
//!
//! Ranking and curation end to end against the in-memory store, with a
//! scripted recommender standing in for the language model.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cookit::config::MatchingConfig;
use cookit::curator::{Curator, FallbackReason, SelectionOutcome, FALLBACK_RATIONALE};
use cookit::history::{HistoryRecord, RecommendationHistory};
use cookit::ranker::{rank_corpus, rank_recipes, RankError};
use cookit::recipe::{Recipe, UserIngredients};
use cookit::recommender::{
    RecommendRequest, Recommender, RecommenderError, RecommenderResponse, Selection,
};
use cookit::saved::SavedRecipe;
use cookit::scoring::score_recipe;
use cookit::store::{MemoryStore, RecipeCorpus, UserDocument, UserStore};
use cookit::taste_profile::{AxisScores, QuizResponses, TasteProfile};
use cookit::{CookitError, StoreError};

type Reply = Box<dyn Fn(&RecommendRequest) -> Result<RecommenderResponse, RecommenderError> + Send + Sync>;

/// Recommender answering from a closure and remembering every request
struct ScriptedRecommender {
    reply: Reply,
    requests: Mutex<Vec<RecommendRequest>>,
}

impl ScriptedRecommender {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Picks the first `n` candidates in the order they were offered
    fn first_candidates(n: usize) -> Arc<Self> {
        Self::new(Box::new(move |request: &RecommendRequest| {
            Ok(RecommenderResponse {
                selections: request
                    .candidates
                    .iter()
                    .take(n)
                    .map(|c| selection(&c.id))
                    .collect(),
            })
        }))
    }

    fn returning(ids: &'static [&'static str]) -> Arc<Self> {
        Self::new(Box::new(move |_: &RecommendRequest| {
            Ok(RecommenderResponse {
                selections: ids.iter().map(|id| selection(id)).collect(),
            })
        }))
    }

    fn failing(err: RecommenderError) -> Arc<Self> {
        Self::new(Box::new(move |_: &RecommendRequest| Err(err.clone())))
    }

    fn last_request(&self) -> RecommendRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl Recommender for ScriptedRecommender {
    async fn recommend(
        &self,
        request: &RecommendRequest,
    ) -> Result<RecommenderResponse, RecommenderError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.reply)(request)
    }
}

fn selection(id: &str) -> Selection {
    Selection {
        id: id.to_string(),
        rationale: format!("picked {id}"),
    }
}

fn held(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// `count` recipes `r0..` that all use egg and rice
fn egg_rice_corpus(count: usize) -> Vec<Recipe> {
    (0..count)
        .map(|i| Recipe::new(&format!("r{i}"), &format!("Recipe {i}"), "rice", "egg, rice"))
        .collect()
}

fn egg_rice_user() -> UserDocument {
    UserDocument {
        ingredients: UserIngredients::new(&["egg", "rice"], &[], &[]),
        taste_profile: Some(TasteProfile {
            code: "ESGB".to_string(),
            scores: AxisScores::default(),
        }),
        ..Default::default()
    }
}

fn curator(store: Arc<MemoryStore>, recommender: Arc<ScriptedRecommender>) -> Curator {
    Curator::new(store.clone(), store, recommender, MatchingConfig::default())
}

fn ids(outcome: &SelectionOutcome) -> Vec<String> {
    outcome.recipes().iter().map(|r| r.recipe.id.clone()).collect()
}

#[test]
fn test_egg_rice_scenario() {
    let recipes = vec![
        Recipe::new("R2", "Pepper Steak", "main", "beef, pepper"),
        Recipe::new("R1", "Egg Rice", "rice", "egg, rice, salt"),
    ];
    let user = held(&["egg", "rice"]);

    let r1 = score_recipe(&user, &recipes[1].ingredient_tokens(), 0.5);
    let r2 = score_recipe(&user, &recipes[0].ingredient_tokens(), 0.5);
    assert!(r1 > r2);

    let ranked = rank_corpus(&user, recipes, &MatchingConfig::default()).unwrap();
    assert_eq!(ranked[0].id(), "R1");
}

#[test]
fn test_score_ignores_recipe_token_order() {
    let user = held(&["egg", "green onion", "soy sauce"]);
    let forward = score_recipe(&user, &held(&["egg", "onion", "sauce", "sugar"]), 0.5);
    let backward = score_recipe(&user, &held(&["sugar", "sauce", "onion", "egg"]), 0.5);
    assert!((forward - backward).abs() < 1e-12);
}

#[test]
fn test_ranking_is_sorted_and_bounded() {
    let mut recipes = egg_rice_corpus(30);
    recipes.extend((0..40).map(|i| Recipe::new(&format!("b{i}"), "Beef", "main", "beef, pepper, egg")));
    let ranked = rank_corpus(&held(&["egg", "rice"]), recipes, &MatchingConfig::default()).unwrap();

    assert_eq!(ranked.len(), 50);
    assert!(ranked.windows(2).all(|pair| pair[0].score >= pair[1].score));

    let small = rank_corpus(&held(&["egg"]), egg_rice_corpus(4), &MatchingConfig::default()).unwrap();
    assert_eq!(small.len(), 4);
}

#[tokio::test]
async fn test_rank_recipes_errors() {
    let empty = MemoryStore::new();
    let err = rank_recipes(&held(&["egg"]), &empty, &MatchingConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err, RankError::EmptyCorpus);

    let err = rank_recipes(&[], &empty, &MatchingConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err, RankError::EmptyProfile);
}

#[tokio::test]
async fn test_recommendation_is_resolved_and_recorded() {
    let store = Arc::new(
        MemoryStore::new()
            .with_recipes(egg_rice_corpus(10))
            .with_user("u1", egg_rice_user()),
    );
    let recommender = ScriptedRecommender::first_candidates(3);

    let (profile, curation) = curator(store.clone(), recommender.clone())
        .recommend_for_user("u1")
        .await
        .unwrap();

    assert_eq!(profile.held, vec!["egg", "rice"]);
    assert_eq!(ids(&curation.outcome), vec!["r0", "r1", "r2"]);
    assert!(curation.outcome.fallback_reason().is_none());

    let first = &curation.recipes()[0];
    assert_eq!(first.rationale, "picked r0");
    assert_eq!(first.taste_profile.as_deref(), Some("ESGB"));
    assert_eq!(first.match_score, Some(1.0));

    let request = recommender.last_request();
    assert_eq!(request.candidates.len(), 10);
    assert_eq!(request.taste_profile.as_deref(), Some("ESGB"));
    assert_eq!(request.criteria.len(), 6);

    let stored = store.history("u1").await.unwrap();
    assert_eq!(stored.ids, vec!["r0", "r1", "r2"]);
    assert_eq!(stored.timestamps.len(), 3);
    assert!(stored.recommended_at.is_some());
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn test_previously_recommended_are_excluded_from_pool() {
    let mut user = egg_rice_user();
    user.history = HistoryRecord {
        ids: held(&["r0", "r1", "r2"]),
        timestamps: vec![chrono::Utc::now(); 3],
        recommended_at: None,
        version: 0,
    };
    let store = Arc::new(
        MemoryStore::new()
            .with_recipes(egg_rice_corpus(10))
            .with_user("u1", user),
    );
    let recommender = ScriptedRecommender::first_candidates(3);

    let (_, curation) = curator(store, recommender.clone())
        .recommend_for_user("u1")
        .await
        .unwrap();

    let request = recommender.last_request();
    assert_eq!(request.candidates.len(), 7);
    assert!(request.candidates.iter().all(|c| !c.is_previously_recommended));
    assert_eq!(ids(&curation.outcome), vec!["r3", "r4", "r5"]);
    assert_eq!(curation.history.len(), 6);
}

#[tokio::test]
async fn test_pool_restored_when_all_candidates_were_recommended() {
    let store = Arc::new(MemoryStore::new().with_recipes(egg_rice_corpus(5)));
    let recommender = ScriptedRecommender::first_candidates(3);
    let curator = curator(store, recommender.clone());

    let shortlist =
        rank_corpus(&held(&["egg"]), egg_rice_corpus(5), &MatchingConfig::default()).unwrap();
    let mut history = RecommendationHistory::new(6);
    history.extend(held(&["r0", "r1", "r2", "r3", "r4"]), chrono::Utc::now());

    let profile = UserIngredients::new(&["egg"], &[], &[]);
    let outcome = curator.select(&profile, &shortlist, None, &history).await.unwrap();

    let request = recommender.last_request();
    assert_eq!(request.candidates.len(), 5);
    assert!(request.candidates.iter().all(|c| c.is_previously_recommended));
    assert!(matches!(outcome, SelectionOutcome::Chosen(_)));
}

#[tokio::test]
async fn test_candidates_flag_disliked_and_allergic() {
    let recipes = vec![
        Recipe::new("p", "Peanut Rice", "rice", "rice, peanut"),
        Recipe::new("o", "Onion Rice", "rice", "rice, onion"),
        Recipe::new("e", "Egg Rice", "rice", "rice, egg"),
    ];
    let store = Arc::new(MemoryStore::new().with_recipes(recipes.clone()));
    let recommender = ScriptedRecommender::returning(&["e", "o", "p"]);
    let curator = curator(store, recommender.clone());

    let profile = UserIngredients::new(&["rice", "egg"], &["Onion"], &["PEANUT"]);
    let shortlist = rank_corpus(&profile.held, recipes, &MatchingConfig::default()).unwrap();
    curator
        .select(&profile.normalized(), &shortlist, None, &RecommendationHistory::new(6))
        .await
        .unwrap();

    let request = recommender.last_request();
    let flags: Vec<(&str, bool, bool)> = request
        .candidates
        .iter()
        .map(|c| (c.id.as_str(), c.contains_disliked, c.contains_allergic))
        .collect();
    assert!(flags.contains(&("p", false, true)));
    assert!(flags.contains(&("o", true, false)));
    assert!(flags.contains(&("e", false, false)));
}

#[tokio::test]
async fn test_rate_limit_falls_back_to_top_scores() {
    let store = Arc::new(
        MemoryStore::new()
            .with_recipes(egg_rice_corpus(8))
            .with_user("u1", egg_rice_user()),
    );
    let recommender =
        ScriptedRecommender::failing(RecommenderError::RateLimited("slow down".to_string()));

    let (_, curation) = curator(store.clone(), recommender)
        .recommend_for_user("u1")
        .await
        .unwrap();

    assert_eq!(curation.outcome.fallback_reason(), Some(FallbackReason::RateLimited));
    assert_eq!(ids(&curation.outcome), vec!["r0", "r1", "r2"]);
    assert!(curation.recipes().iter().all(|r| r.rationale == FALLBACK_RATIONALE));

    // Fallback picks are recorded like any other
    assert_eq!(store.history("u1").await.unwrap().ids, vec!["r0", "r1", "r2"]);
}

#[tokio::test]
async fn test_unknown_ids_trigger_fallback() {
    let store = Arc::new(
        MemoryStore::new()
            .with_recipes(egg_rice_corpus(8))
            .with_user("u1", egg_rice_user()),
    );
    let recommender = ScriptedRecommender::returning(&["r5", "ghost", "r6"]);

    let (_, curation) = curator(store, recommender)
        .recommend_for_user("u1")
        .await
        .unwrap();

    assert_eq!(
        curation.outcome.fallback_reason(),
        Some(FallbackReason::InsufficientSelections { resolved: 2 })
    );
    assert_eq!(ids(&curation.outcome), vec!["r0", "r1", "r2"]);
}

#[tokio::test]
async fn test_repeated_ids_count_once() {
    let store = Arc::new(
        MemoryStore::new()
            .with_recipes(egg_rice_corpus(8))
            .with_user("u1", egg_rice_user()),
    );
    let recommender = ScriptedRecommender::returning(&["r7", "r7", "r6", "r5", "r4"]);

    let (_, curation) = curator(store, recommender)
        .recommend_for_user("u1")
        .await
        .unwrap();

    assert!(curation.outcome.fallback_reason().is_none());
    assert_eq!(ids(&curation.outcome), vec!["r7", "r6", "r5"]);
}

#[tokio::test]
async fn test_other_recommender_errors_propagate() {
    let store = Arc::new(
        MemoryStore::new()
            .with_recipes(egg_rice_corpus(8))
            .with_user("u1", egg_rice_user()),
    );
    let recommender = ScriptedRecommender::failing(RecommenderError::Api {
        status: 500,
        message: "boom".to_string(),
    });

    let err = curator(store.clone(), recommender)
        .recommend_for_user("u1")
        .await
        .unwrap_err();

    assert!(matches!(err, CookitError::ExternalService(_)));
    assert_eq!(store.history("u1").await.unwrap().version, 0);
}

#[tokio::test]
async fn test_history_keeps_last_six_after_seven_cycles() {
    let store = Arc::new(
        MemoryStore::new()
            .with_recipes(egg_rice_corpus(30))
            .with_user("u1", egg_rice_user()),
    );
    let curator = curator(store.clone(), ScriptedRecommender::first_candidates(3));

    let mut cycles = Vec::new();
    for _ in 0..7 {
        let (_, curation) = curator.recommend_for_user("u1").await.unwrap();
        assert!(curation.history.len() <= 6);
        cycles.push(ids(&curation.outcome));
    }

    let expected: Vec<String> = cycles[5].iter().chain(cycles[6].iter()).cloned().collect();
    let stored = store.history("u1").await.unwrap();
    assert_eq!(stored.ids, expected);
    assert_eq!(stored.version, 7);
}

#[tokio::test]
async fn test_missing_user_and_empty_profile() {
    let store = Arc::new(
        MemoryStore::new()
            .with_recipes(egg_rice_corpus(3))
            .with_user("empty", UserDocument::default()),
    );
    let curator = curator(store, ScriptedRecommender::first_candidates(3));

    let err = curator.recommend_for_user("ghost").await.unwrap_err();
    assert!(matches!(err, CookitError::NotFound(_)));

    let err = curator.recommend_for_user("empty").await.unwrap_err();
    assert!(matches!(err, CookitError::Validation(_)));
}

/// User store that lets another writer update the history just before the
/// first write goes through
struct RacingStore {
    inner: MemoryStore,
    raced: AtomicBool,
}

#[async_trait]
impl UserStore for RacingStore {
    async fn profile(&self, user_id: &str) -> Result<UserIngredients, StoreError> {
        self.inner.profile(user_id).await
    }

    async fn update_profile(&self, user_id: &str, profile: &UserIngredients) -> Result<(), StoreError> {
        self.inner.update_profile(user_id, profile).await
    }

    async fn history(&self, user_id: &str) -> Result<HistoryRecord, StoreError> {
        self.inner.history(user_id).await
    }

    async fn set_history(&self, user_id: &str, record: &HistoryRecord) -> Result<(), StoreError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let current = self.inner.history(user_id).await?;
            let concurrent = HistoryRecord {
                ids: vec!["other".to_string()],
                timestamps: vec![chrono::Utc::now()],
                recommended_at: Some(chrono::Utc::now()),
                version: current.version,
            };
            self.inner.set_history(user_id, &concurrent).await?;
        }
        self.inner.set_history(user_id, record).await
    }

    async fn quiz_responses(&self, user_id: &str) -> Result<QuizResponses, StoreError> {
        self.inner.quiz_responses(user_id).await
    }

    async fn taste_profile(&self, user_id: &str) -> Result<Option<TasteProfile>, StoreError> {
        self.inner.taste_profile(user_id).await
    }

    async fn save_taste_profile(&self, user_id: &str, profile: &TasteProfile) -> Result<(), StoreError> {
        self.inner.save_taste_profile(user_id, profile).await
    }

    async fn taste_profile_description(&self, code: &str) -> Result<Option<String>, StoreError> {
        self.inner.taste_profile_description(code).await
    }

    async fn saved_recipes(&self, user_id: &str) -> Result<Vec<SavedRecipe>, StoreError> {
        self.inner.saved_recipes(user_id).await
    }

    async fn set_saved_recipes(&self, user_id: &str, saved: &[SavedRecipe]) -> Result<(), StoreError> {
        self.inner.set_saved_recipes(user_id, saved).await
    }
}

#[tokio::test]
async fn test_concurrent_history_write_is_merged() {
    let corpus: Arc<dyn RecipeCorpus> = Arc::new(MemoryStore::new().with_recipes(egg_rice_corpus(10)));
    let users = Arc::new(RacingStore {
        inner: MemoryStore::new().with_user("u1", egg_rice_user()),
        raced: AtomicBool::new(false),
    });
    let curator = Curator::new(
        corpus,
        users.clone(),
        ScriptedRecommender::first_candidates(3),
        MatchingConfig::default(),
    );

    let (_, curation) = curator.recommend_for_user("u1").await.unwrap();
    assert_eq!(curation.history.version(), 2);

    let stored = users.history("u1").await.unwrap();
    assert_eq!(stored.ids, vec!["other", "r0", "r1", "r2"]);
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn test_conflicts_give_up_after_bounded_attempts() {
    struct AlwaysConflicting(MemoryStore);

    #[async_trait]
    impl UserStore for AlwaysConflicting {
        async fn profile(&self, user_id: &str) -> Result<UserIngredients, StoreError> {
            self.0.profile(user_id).await
        }
        async fn update_profile(&self, user_id: &str, profile: &UserIngredients) -> Result<(), StoreError> {
            self.0.update_profile(user_id, profile).await
        }
        async fn history(&self, user_id: &str) -> Result<HistoryRecord, StoreError> {
            self.0.history(user_id).await
        }
        async fn set_history(&self, user_id: &str, _record: &HistoryRecord) -> Result<(), StoreError> {
            Err(StoreError::Conflict(format!("history of user {user_id}")))
        }
        async fn quiz_responses(&self, user_id: &str) -> Result<QuizResponses, StoreError> {
            self.0.quiz_responses(user_id).await
        }
        async fn taste_profile(&self, user_id: &str) -> Result<Option<TasteProfile>, StoreError> {
            self.0.taste_profile(user_id).await
        }
        async fn save_taste_profile(&self, user_id: &str, profile: &TasteProfile) -> Result<(), StoreError> {
            self.0.save_taste_profile(user_id, profile).await
        }
        async fn taste_profile_description(&self, code: &str) -> Result<Option<String>, StoreError> {
            self.0.taste_profile_description(code).await
        }
        async fn saved_recipes(&self, user_id: &str) -> Result<Vec<SavedRecipe>, StoreError> {
            self.0.saved_recipes(user_id).await
        }
        async fn set_saved_recipes(&self, user_id: &str, saved: &[SavedRecipe]) -> Result<(), StoreError> {
            self.0.set_saved_recipes(user_id, saved).await
        }
    }

    let corpus: Arc<dyn RecipeCorpus> = Arc::new(MemoryStore::new().with_recipes(egg_rice_corpus(10)));
    let users = Arc::new(AlwaysConflicting(MemoryStore::new().with_user("u1", egg_rice_user())));
    let curator = Curator::new(
        corpus,
        users,
        ScriptedRecommender::first_candidates(3),
        MatchingConfig::default(),
    );

    let err = curator.recommend_for_user("u1").await.unwrap_err();
    assert!(matches!(err, CookitError::Storage(_)));
}
