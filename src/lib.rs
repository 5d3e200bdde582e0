pub mod algorithms;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::TrainingError;
pub use models::*;

use algorithms::{FeatureExtractor, Trainer};
use services::recommendation::RecommendationService;
use services::serving::{ModelServing, Recommender};
use services::store::{EntityStore, InMemoryStore, InteractionLog};
use services::training::TrainingCoordinator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub serving: Arc<ModelServing>,
    pub recommendation_service: Arc<RecommendationService>,
    pub training_coordinator: Arc<TrainingCoordinator>,
}

impl AppState {
    /// State backed by an empty in-memory store.
    pub fn new(config: Config) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::with_collaborators(config, store.clone(), store)
    }

    pub fn with_collaborators(
        config: Config,
        interactions: Arc<dyn InteractionLog>,
        entities: Arc<dyn EntityStore>,
    ) -> Self {
        let config = Arc::new(config);
        let embedding_dim = config.recommendation.embedding_dim;
        let serving = Arc::new(ModelServing::new());

        let recommendation_service = Arc::new(RecommendationService::new(
            Recommender::new(serving.clone(), embedding_dim),
            interactions.clone(),
            entities.clone(),
            config.clone(),
        ));

        let training_coordinator = Arc::new(TrainingCoordinator::new(
            interactions,
            entities,
            serving.clone(),
            FeatureExtractor::new(config.training.decay_days),
            Trainer::new(config.training.clone(), embedding_dim),
        ));

        Self {
            config,
            serving,
            recommendation_service,
            training_coordinator,
        }
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
