//! # External Recommender
//!
//! The language model that picks the final recipes out of the curated
//! candidates. The curator talks to it through the [`Recommender`] trait;
//! [`OpenAiRecommender`] implements the trait against an OpenAI-compatible
//! chat completion endpoint.
//!
//! One request, one response: no streaming and no retries. Throttling is
//! reported as [`RecommenderError::RateLimited`] so the caller can fall back.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RecommenderConfig;
use crate::recipe::UserIngredients;

/// Selection rules sent with every request, in priority order
pub const SELECTION_CRITERIA: [&str; 6] = [
    "Never select a recipe that contains an allergic ingredient (containsAllergic: true)",
    "Avoid recipes that contain a disliked ingredient (containsDisliked: true) whenever possible",
    "Prefer recipes with a high ingredient match score (matchScore)",
    "Take the user's taste profile into account",
    "Prefer a diverse set of categories",
    "Avoid previously recommended recipes (isPreviouslyRecommended: true) whenever possible",
];

/// Meaning of each taste-profile letter, as explained to the model
const TASTE_PROFILE_LEGEND: &str = "\
- E (Exploratory): enjoys trying new dishes
- C (Conservative): prefers familiar food
- F (Fast): eats quickly
- S (Slow): takes time over meals
- S (Solo): prefers eating alone
- G (Group): prefers eating with others
- B (Bold): likes strong, spicy flavors
- M (Mild): prefers mild, healthy food";

lazy_static! {
    // Outermost JSON object of a reply, ignoring code fences and chatter
    static ref JSON_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").expect("JSON object pattern should be valid");
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecommenderError {
    #[error("Recommender rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Malformed recommender response: {0}")]
    Malformed(String),

    #[error("Recommender unreachable: {0}")]
    Network(String),

    #[error("Recommender returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// A curated candidate as presented to the recommender
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub match_score: f64,
    pub matched_ingredients: Vec<String>,
    pub contains_disliked: bool,
    pub contains_allergic: bool,
    pub is_previously_recommended: bool,
    pub category: String,
}

/// Everything the recommender needs for one selection
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendRequest {
    pub candidates: Vec<Candidate>,
    /// Four-letter taste code, if the user has taken the quiz
    pub taste_profile: Option<String>,
    /// Normalized ingredient lists of the user
    pub user: UserIngredients,
    pub criteria: Vec<String>,
    /// Number of recipes to select
    pub picks: usize,
}

/// One selected recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub id: String,
    #[serde(alias = "reason", default)]
    pub rationale: String,
}

/// The recommender's answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommenderResponse {
    #[serde(alias = "recommendedRecipes")]
    pub selections: Vec<Selection>,
}

#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(
        &self,
        request: &RecommendRequest,
    ) -> Result<RecommenderResponse, RecommenderError>;
}

/// Parse the model's text reply into selections
///
/// The reply may wrap the JSON object in a code fence or surround it with
/// prose; the outermost `{...}` span is parsed.
///
/// # Examples
///
/// ```rust
/// use cookit::recommender::parse_response;
///
/// let reply = "```json\n{\"recommendedRecipes\": [{\"id\": \"r1\", \"reason\": \"quick\"}]}\n```";
/// let parsed = parse_response(reply).unwrap();
/// assert_eq!(parsed.selections[0].id, "r1");
/// assert_eq!(parsed.selections[0].rationale, "quick");
/// ```
pub fn parse_response(content: &str) -> Result<RecommenderResponse, RecommenderError> {
    let object = JSON_OBJECT
        .find(content)
        .ok_or_else(|| RecommenderError::Malformed("no JSON object in reply".to_string()))?;

    serde_json::from_str(object.as_str()).map_err(|e| RecommenderError::Malformed(e.to_string()))
}

/// System and user prompts for a request
pub fn build_prompts(request: &RecommendRequest) -> Result<(String, String), RecommenderError> {
    let criteria = request
        .criteria
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}", i + 1, c))
        .collect::<Vec<_>>()
        .join("\n");

    let system = format!(
        "Recommend the best {} recipes out of the candidate list using these criteria:\n{}",
        request.picks, criteria
    );

    let candidates = serde_json::to_string_pretty(&request.candidates)
        .map_err(|e| RecommenderError::Malformed(format!("unserializable candidates: {e}")))?;

    let user = format!(
        "User preferences:\n\
         - Available ingredients: {}\n\
         - Disliked ingredients: {}\n\
         - Allergic ingredients: {}\n\
         - Taste profile: {}\n\
         Taste profile letters:\n{}\n\n\
         Candidate recipes:\n{}\n\n\
         Answer with JSON only, in this shape:\n\
         {{\"recommendedRecipes\": [{{\"id\": \"recipe id\", \"reason\": \"why it was chosen\"}}]}}\n\
         with exactly {} entries.",
        request.user.held.join(", "),
        request.user.disliked.join(", "),
        request.user.allergic.join(", "),
        request.taste_profile.as_deref().unwrap_or("unknown"),
        TASTE_PROFILE_LEGEND,
        candidates,
        request.picks,
    );

    Ok((system, user))
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Recommender backed by an OpenAI-compatible chat completion API
pub struct OpenAiRecommender {
    client: reqwest::Client,
    config: RecommenderConfig,
}

impl OpenAiRecommender {
    pub fn new(config: RecommenderConfig) -> Result<Self, RecommenderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RecommenderError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn classify_failure(status: StatusCode, body: &str) -> RecommenderError {
        let detail = serde_json::from_str::<ApiErrorBody>(body).ok().map(|b| b.error);
        let message = detail
            .as_ref()
            .map(|d| d.message.clone())
            .unwrap_or_else(|| body.to_string());

        let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
            || detail
                .as_ref()
                .and_then(|d| d.code.as_deref())
                .is_some_and(|code| code == "rate_limit_exceeded");

        if rate_limited {
            RecommenderError::RateLimited(message)
        } else {
            RecommenderError::Api {
                status: status.as_u16(),
                message,
            }
        }
    }
}

#[async_trait]
impl Recommender for OpenAiRecommender {
    async fn recommend(
        &self,
        request: &RecommendRequest,
    ) -> Result<RecommenderResponse, RecommenderError> {
        let (system, user) = build_prompts(request)?;
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        debug!(
            model = %self.config.model,
            candidates = request.candidates.len(),
            "Calling recommender"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RecommenderError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RecommenderError::Network(e.to_string()))?;

        if !status.is_success() {
            let err = Self::classify_failure(status, &text);
            warn!("Recommender call failed: {err}");
            return Err(err);
        }

        let completion: ChatCompletion =
            serde_json::from_str(&text).map_err(|e| RecommenderError::Malformed(e.to_string()))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RecommenderError::Malformed("empty completion".to_string()))?;

        parse_response(&content)
    }
}
