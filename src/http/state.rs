use std::sync::Arc;

use crate::catalog::IngredientCatalog;
use crate::config::DetectorConfig;
use crate::curator::Curator;
use crate::detector::IngredientDetector;
use crate::localization::Localizer;
use crate::store::{RecipeCorpus, UserStore};

/// Shared, read-only state handed to every request
pub struct AppState {
    pub corpus: Arc<dyn RecipeCorpus>,
    pub users: Arc<dyn UserStore>,
    pub curator: Curator,
    pub detector: Arc<dyn IngredientDetector>,
    pub catalog: IngredientCatalog,
    pub localizer: Localizer,
    pub detector_config: DetectorConfig,
    /// Attach internal error details to error responses
    pub development: bool,
}
