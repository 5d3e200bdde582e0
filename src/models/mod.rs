use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

pub type UserId = i64;
pub type ItemId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    View,
    Click,
    Save,
    Purchase,
    #[serde(other)]
    Other,
}

impl ActivityType {
    /// Signal strength of an interaction before time decay.
    pub fn base_weight(&self) -> f32 {
        match self {
            ActivityType::View => 0.2,
            ActivityType::Click => 0.5,
            ActivityType::Save => 0.8,
            ActivityType::Purchase => 1.0,
            ActivityType::Other => 0.1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::View => "view",
            ActivityType::Click => "click",
            ActivityType::Save => "save",
            ActivityType::Purchase => "purchase",
            ActivityType::Other => "other",
        }
    }
}

impl From<&str> for ActivityType {
    fn from(value: &str) -> Self {
        match value {
            "view" => ActivityType::View,
            "click" => ActivityType::Click,
            "save" => ActivityType::Save,
            "purchase" => ActivityType::Purchase,
            _ => ActivityType::Other,
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub activity_type: ActivityType,
    pub timestamp: DateTime<Utc>,
}

impl Interaction {
    pub fn new(user_id: UserId, item_id: ItemId, activity_type: ActivityType) -> Self {
        Self {
            user_id,
            item_id,
            activity_type,
            timestamp: Utc::now(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Decayed training signal for one interaction. Rebuilt on every run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedTriple {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub weight: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UserFeatureVector {
    pub view_count: f64,
    pub click_count: f64,
    pub save_count: f64,
    pub purchase_count: f64,
    pub total_spent: f64,
    pub activity_frequency: f64,
}

impl UserFeatureVector {
    pub const LEN: usize = 6;

    pub fn to_array(&self) -> [f64; Self::LEN] {
        [
            self.view_count,
            self.click_count,
            self.save_count,
            self.purchase_count,
            self.total_spent,
            self.activity_frequency,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Item,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::User => f.write_str("user"),
            EntityKind::Item => f.write_str("item"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub preferences: Option<UserPreferences>,
    /// JSON-encoded embedding written back after each training run.
    pub embedding: Option<String>,
}

impl User {
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            is_active: true,
            created_at: Utc::now(),
            preferences: None,
            embedding: None,
        }
    }
}

/// Price bounds a user is interested in. `max: None` means unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: Option<f64>,
}

impl Default for PriceRange {
    fn default() -> Self {
        Self { min: 0.0, max: None }
    }
}

impl PriceRange {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.min && self.max.map_or(true, |max| price <= max)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub price_range: PriceRange,
    #[serde(default)]
    pub custom_preferences: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ad {
    pub id: ItemId,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub category: String,
    pub price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub embedding: Option<String>,
}

impl Ad {
    pub fn new(id: ItemId, title: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            image_url: None,
            category: category.into(),
            price: None,
            created_at: Utc::now(),
            embedding: None,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingStatus {
    Idle,
    Training,
    Completed,
    Failed,
}

/// Singleton record describing the most recent training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRun {
    pub status: TrainingStatus,
    pub last_training: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Default for TrainingRun {
    fn default() -> Self {
        Self {
            status: TrainingStatus::Idle,
            last_training: None,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub ad: Ad,
    pub similarity_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub user_id: UserId,
    pub recommendations: Vec<RecommendationItem>,
    pub generated_at: DateTime<Utc>,
}
