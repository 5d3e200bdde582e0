use crate::algorithms::FeatureExtractor;
use crate::config::Config;
use crate::models::*;
use crate::services::serving::Recommender;
use crate::services::store::{EntityStore, InteractionLog};
use crate::utils::validation::{
    decode_embedding, validate_email, validate_interaction, validate_limit, validate_preferences,
};
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Request-facing operations: ranking ads for a user, embedding lookup, and
/// activity tracking. Never trains; retraining goes through the coordinator.
pub struct RecommendationService {
    recommender: Recommender,
    interactions: Arc<dyn InteractionLog>,
    entities: Arc<dyn EntityStore>,
    extractor: FeatureExtractor,
    config: Arc<Config>,
}

impl RecommendationService {
    pub fn new(
        recommender: Recommender,
        interactions: Arc<dyn InteractionLog>,
        entities: Arc<dyn EntityStore>,
        config: Arc<Config>,
    ) -> Self {
        let extractor = FeatureExtractor::new(config.training.decay_days);
        Self {
            recommender,
            interactions,
            entities,
            extractor,
            config,
        }
    }

    pub fn recommender(&self) -> &Recommender {
        &self.recommender
    }

    /// Ranks every stored ad for `user_id`. `limit` is validated, then capped
    /// at the configured maximum.
    pub async fn get_recommendations(&self, user_id: UserId, limit: usize) -> Result<RecommendationResponse> {
        validate_limit(limit)?;
        let top_k = limit.min(self.config.recommendation.max_recommendations);

        let ads = self.entities.list_ads().await?;
        let candidates: Vec<ItemId> = ads.iter().map(|ad| ad.id).collect();
        let ranked = self.recommender.recommend(user_id, &candidates, top_k);

        let mut by_id: HashMap<ItemId, Ad> = ads.into_iter().map(|ad| (ad.id, ad)).collect();
        let recommendations: Vec<RecommendationItem> = ranked
            .into_iter()
            .filter_map(|(ad_id, similarity_score)| {
                by_id.remove(&ad_id).map(|ad| RecommendationItem { ad, similarity_score })
            })
            .collect();

        info!(
            user_id,
            candidates = candidates.len(),
            returned = recommendations.len(),
            "Generated recommendations"
        );

        Ok(RecommendationResponse {
            user_id,
            recommendations,
            generated_at: Utc::now(),
        })
    }

    pub fn get_user_embedding(&self, user_id: UserId) -> Vec<f32> {
        self.recommender.get_embedding(user_id, EntityKind::User)
    }

    pub fn get_item_embedding(&self, ad_id: ItemId) -> Vec<f32> {
        self.recommender.get_embedding(ad_id, EntityKind::Item)
    }

    /// The embedding last written back to the entity store, if any.
    pub async fn stored_embedding(&self, id: i64, kind: EntityKind) -> Result<Option<Vec<f32>>> {
        let text = match kind {
            EntityKind::User => self.entities.get_user(id).await?.and_then(|u| u.embedding),
            EntityKind::Item => self.entities.get_ad(id).await?.and_then(|a| a.embedding),
        };

        text.map(|t| decode_embedding(&t, self.config.recommendation.embedding_dim))
            .transpose()
    }

    pub async fn user_features(&self, user_id: UserId) -> Result<UserFeatureVector> {
        let history = self.interactions.for_user(user_id).await?;

        let mut prices = HashMap::new();
        for activity in history.iter().filter(|a| a.activity_type == ActivityType::Purchase) {
            if prices.contains_key(&activity.item_id) {
                continue;
            }
            let price = self.entities.get_ad(activity.item_id).await?.and_then(|ad| ad.price);
            prices.insert(activity.item_id, price);
        }

        Ok(self
            .extractor
            .extract_user_features(&history, |ad_id| prices.get(&ad_id).copied().flatten()))
    }

    pub async fn track_activity(&self, interaction: Interaction) -> Result<()> {
        validate_interaction(&interaction)?;

        if self.entities.get_user(interaction.user_id).await?.is_none() {
            return Err(anyhow!("User {} not found", interaction.user_id));
        }
        if self.entities.get_ad(interaction.item_id).await?.is_none() {
            return Err(anyhow!("Ad {} not found", interaction.item_id));
        }

        debug!(
            user_id = interaction.user_id,
            ad_id = interaction.item_id,
            activity = %interaction.activity_type,
            "Tracking activity"
        );
        self.interactions.record(interaction).await
    }

    /// The user's interactions, newest first.
    pub async fn activity_history(&self, user_id: UserId) -> Result<Vec<Interaction>> {
        let mut history = self.interactions.for_user(user_id).await?;
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(history)
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        self.entities.get_user(user_id).await
    }

    /// Rejects malformed and already registered emails before touching the store.
    pub async fn create_user(&self, user: User) -> Result<User> {
        validate_email(&user.email)?;
        if self.entities.get_user_by_email(&user.email).await?.is_some() {
            return Err(anyhow!("Email already registered"));
        }
        self.entities.create_user(user).await
    }

    /// `Ok(None)` when the user does not exist.
    pub async fn update_preferences(
        &self,
        user_id: UserId,
        preferences: UserPreferences,
    ) -> Result<Option<User>> {
        validate_preferences(&preferences)?;
        if self.entities.get_user(user_id).await?.is_none() {
            return Ok(None);
        }

        let user = self.entities.write_user_preferences(user_id, preferences).await?;
        info!(user_id, "Updated user preferences");
        Ok(Some(user))
    }

    /// Distinct ad categories in ascending order.
    pub async fn get_categories(&self) -> Result<Vec<String>> {
        let ads = self.entities.list_ads().await?;
        let categories: BTreeSet<String> = ads.into_iter().map(|ad| ad.category).collect();
        Ok(categories.into_iter().collect())
    }

    pub async fn create_ad(&self, ad: Ad) -> Result<Ad> {
        self.entities.create_ad(ad).await
    }
}
