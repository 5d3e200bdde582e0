use crate::models::{ActivityType, Interaction, ItemId, UserFeatureVector, WeightedTriple};
use crate::utils::exponential_decay;
use chrono::{DateTime, Utc};

pub const DEFAULT_DECAY_DAYS: f64 = 30.0;

/// Turns raw interactions into training signals and per-user aggregates.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    decay_days: f64,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_DECAY_DAYS)
    }
}

impl FeatureExtractor {
    pub fn new(decay_days: f64) -> Self {
        Self { decay_days }
    }

    /// Weighted triples relative to the current wall clock. Two calls over the
    /// same input can differ if a day boundary passes between them.
    pub fn prepare_training_data(&self, interactions: &[Interaction]) -> Vec<WeightedTriple> {
        self.prepare_training_data_at(interactions, Utc::now())
    }

    pub fn prepare_training_data_at(
        &self,
        interactions: &[Interaction],
        now: DateTime<Utc>,
    ) -> Vec<WeightedTriple> {
        interactions
            .iter()
            .map(|interaction| {
                let age_days = now.signed_duration_since(interaction.timestamp).num_days();
                WeightedTriple {
                    user_id: interaction.user_id,
                    item_id: interaction.item_id,
                    weight: self.decayed_weight(interaction.activity_type, age_days),
                }
            })
            .collect()
    }

    /// `base_weight * exp(-age / decay_days)`. Future timestamps count as age 0.
    pub fn decayed_weight(&self, activity: ActivityType, age_days: i64) -> f32 {
        let decay = exponential_decay(age_days, self.decay_days);
        (activity.base_weight() as f64 * decay) as f32
    }

    /// Aggregates one user's activity. `price_of` resolves the price of a
    /// purchased item; unknown prices contribute nothing to `total_spent`.
    pub fn extract_user_features<F>(&self, activities: &[Interaction], price_of: F) -> UserFeatureVector
    where
        F: Fn(ItemId) -> Option<f64>,
    {
        let mut features = UserFeatureVector::default();

        let (Some(earliest), Some(latest)) = (
            activities.iter().map(|a| a.timestamp).min(),
            activities.iter().map(|a| a.timestamp).max(),
        ) else {
            return features;
        };

        for activity in activities {
            match activity.activity_type {
                ActivityType::View => features.view_count += 1.0,
                ActivityType::Click => features.click_count += 1.0,
                ActivityType::Save => features.save_count += 1.0,
                ActivityType::Purchase => {
                    features.purchase_count += 1.0;
                    features.total_spent += price_of(activity.item_id).unwrap_or(0.0);
                }
                ActivityType::Other => {}
            }
        }

        let span_days = latest.signed_duration_since(earliest).num_days();
        features.activity_frequency = activities.len() as f64 / (span_days + 1) as f64;

        features
    }
}
