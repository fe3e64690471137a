use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cookit::catalog::IngredientCatalog;
use cookit::config::AppConfig;
use cookit::curator::Curator;
use cookit::db::PgStore;
use cookit::detector::HttpDetector;
use cookit::http::{self, AppState};
use cookit::localization::Localizer;
use cookit::recommender::OpenAiRecommender;
use cookit::store::{MemoryStore, RecipeCorpus, UserStore};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn open_stores(
    database_url: Option<&str>,
) -> Result<(Arc<dyn RecipeCorpus>, Arc<dyn UserStore>)> {
    match database_url {
        Some(url) => {
            info!("Connecting to PostgreSQL");
            let store = Arc::new(PgStore::connect(url).await?);
            let corpus: Arc<dyn RecipeCorpus> = store.clone();
            let users: Arc<dyn UserStore> = store;
            Ok((corpus, users))
        }
        None => {
            warn!("DATABASE_URL not set, using an empty in-memory store");
            let store = Arc::new(MemoryStore::new());
            let corpus: Arc<dyn RecipeCorpus> = store.clone();
            let users: Arc<dyn UserStore> = store;
            Ok((corpus, users))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    init_tracing();

    info!("Starting Cookit recommendation server");

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let (corpus, users) = open_stores(config.server.database_url.as_deref()).await?;

    // The catalog must be complete before the first upload is served
    let catalog = match &config.server.ingredient_catalog_path {
        Some(path) => IngredientCatalog::from_json_file(Path::new(path))?,
        None => IngredientCatalog::from_corpus(corpus.as_ref()).await?,
    };

    let localizer = Localizer::new(&config.server.default_language)?;
    let recommender = OpenAiRecommender::new(config.recommender.clone())
        .context("Failed to build recommender client")?;
    let detector =
        HttpDetector::new(config.detector.clone()).context("Failed to build detector client")?;

    let curator = Curator::new(
        corpus.clone(),
        users.clone(),
        Arc::new(recommender),
        config.matching.clone(),
    );

    let state = Arc::new(AppState {
        corpus,
        users,
        curator,
        detector: Arc::new(detector),
        catalog,
        localizer,
        detector_config: config.detector.clone(),
        development: config.server.development,
    });

    let app = http::router(state);

    let address = format!("0.0.0.0:{}", config.server.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
