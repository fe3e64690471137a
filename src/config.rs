//! # Configuration Module
//!
//! Configuration structures for the recommendation pipeline, the external
//! services it talks to, and the HTTP server. Every structure has a
//! `Default` built from the constants below; [`AppConfig::from_env`] overlays
//! environment variables (a `.env` file is loaded by the binary first).

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::similarity::DEFAULT_ALPHA;

// Matching pipeline
pub const DEFAULT_SHORTLIST_SIZE: usize = 50;
pub const DEFAULT_HISTORY_CAPACITY: usize = 6;
pub const DEFAULT_MIN_CANDIDATE_POOL: usize = 6;
pub const DEFAULT_PICKS: usize = 3;
pub const DEFAULT_HISTORY_WRITE_ATTEMPTS: u32 = 3;

// Ingredient detection
pub const DEFAULT_DETECTOR_URL: &str = "http://localhost:8000";
pub const DEFAULT_DETECTION_TIMEOUT_SECS: u64 = 30;
pub const MAX_UPLOAD_SIZE: u64 = 30 * 1024 * 1024; // 30MB per image
pub const MIN_FORMAT_BYTES: usize = 8;

// External recommender
pub const DEFAULT_RECOMMENDER_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_RECOMMENDER_MODEL: &str = "gpt-4";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_RECOMMENDER_TIMEOUT_SECS: u64 = 60;

// Server
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_LANGUAGE: &str = "ko";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Tuning for scoring, ranking and curation
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// Weight of the token overlap term in the hybrid similarity
    pub alpha: f64,
    /// Number of ranked recipes kept for curation
    pub shortlist_size: usize,
    /// Maximum number of entries in a user's recommendation history
    pub history_capacity: usize,
    /// History exclusion is abandoned when fewer candidates would remain
    pub min_candidate_pool: usize,
    /// Number of recipes in a final recommendation
    pub picks: usize,
    /// Attempts at writing history before a version conflict is reported
    pub history_write_attempts: u32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            shortlist_size: DEFAULT_SHORTLIST_SIZE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            min_candidate_pool: DEFAULT_MIN_CANDIDATE_POOL,
            picks: DEFAULT_PICKS,
            history_write_attempts: DEFAULT_HISTORY_WRITE_ATTEMPTS,
        }
    }
}

/// Circuit breaker settings for an external service
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    /// Seconds the breaker stays open before letting a call through
    pub reset_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_secs: 60, // 1 minute
        }
    }
}

/// Ingredient detection service settings
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Base URL; requests go to `{base_url}/detect/`
    pub base_url: String,
    /// Budget for a whole detection call, upload included
    pub timeout_secs: u64,
    /// Largest accepted image in bytes
    pub max_upload_size: u64,
    /// Bytes required before the image format can be sniffed
    pub min_format_bytes: usize,
    pub breaker: BreakerConfig,
}

impl DetectorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DETECTOR_URL.to_string(),
            timeout_secs: DEFAULT_DETECTION_TIMEOUT_SECS,
            max_upload_size: MAX_UPLOAD_SIZE,
            min_format_bytes: MIN_FORMAT_BYTES,
            breaker: BreakerConfig::default(),
        }
    }
}

/// Language model recommender settings
#[derive(Debug, Clone)]
pub struct RecommenderConfig {
    pub api_key: String,
    /// OpenAI-compatible API root, without the `/chat/completions` suffix
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_RECOMMENDER_URL.to_string(),
            model: DEFAULT_RECOMMENDER_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_RECOMMENDER_TIMEOUT_SECS,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// PostgreSQL URL; the in-memory store is used when unset
    pub database_url: Option<String>,
    /// Attach internal error details to error responses
    pub development: bool,
    /// Language for messages when the client sends no usable preference
    pub default_language: String,
    /// JSON file with the detector class to ingredient name table
    pub ingredient_catalog_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            development: false,
            default_language: DEFAULT_LANGUAGE.to_string(),
            ingredient_catalog_path: None,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub matching: MatchingConfig,
    pub detector: DetectorConfig,
    pub recommender: RecommenderConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Required:
    /// - `OPENAI_KEY`: API key for the recommender
    ///
    /// Optional:
    /// - `PORT`, `DATABASE_URL`, `NODE_ENV` / `APP_ENV` (`development` enables error details)
    /// - `DEFAULT_LANGUAGE`, `INGREDIENT_CATALOG_PATH`
    /// - `FASTAPI_URL`: detector base URL
    /// - `DETECTION_TIMEOUT_SECS`
    /// - `OPENAI_BASE_URL`, `OPENAI_MODEL`, `OPENAI_TEMPERATURE`, `OPENAI_MAX_TOKENS`
    /// - `MATCH_ALPHA`, `SHORTLIST_SIZE`
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::var("OPENAI_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_KEY".to_string()))?;

        let development = env::var("APP_ENV")
            .or_else(|_| env::var("NODE_ENV"))
            .map(|v| v == "development")
            .unwrap_or(false);

        let server = ServerConfig {
            port: try_load("PORT", DEFAULT_PORT)?,
            database_url: env::var("DATABASE_URL").ok(),
            development,
            default_language: env::var("DEFAULT_LANGUAGE")
                .unwrap_or_else(|_| DEFAULT_LANGUAGE.to_string()),
            ingredient_catalog_path: env::var("INGREDIENT_CATALOG_PATH").ok(),
        };

        let alpha: f64 = try_load("MATCH_ALPHA", DEFAULT_ALPHA)?;
        if !(0.0..=1.0).contains(&alpha) {
            return Err(ConfigError::InvalidValue {
                key: "MATCH_ALPHA".to_string(),
                message: format!("{alpha} is outside [0, 1]"),
            });
        }

        let matching = MatchingConfig {
            alpha,
            shortlist_size: try_load("SHORTLIST_SIZE", DEFAULT_SHORTLIST_SIZE)?,
            ..Default::default()
        };

        let detector = DetectorConfig {
            base_url: env::var("FASTAPI_URL").unwrap_or_else(|_| DEFAULT_DETECTOR_URL.to_string()),
            timeout_secs: try_load("DETECTION_TIMEOUT_SECS", DEFAULT_DETECTION_TIMEOUT_SECS)?,
            ..Default::default()
        };

        let recommender = RecommenderConfig {
            api_key,
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_RECOMMENDER_URL.to_string()),
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_RECOMMENDER_MODEL.to_string()),
            temperature: try_load("OPENAI_TEMPERATURE", DEFAULT_TEMPERATURE)?,
            max_tokens: try_load("OPENAI_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
            ..Default::default()
        };

        Ok(Self {
            server,
            matching,
            detector,
            recommender,
        })
    }
}

fn try_load<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
