use crate::models::{Ad, Interaction, ItemId, User, UserId, UserPreferences};
use anyhow::{anyhow, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

/// Append-only source of interaction records.
#[async_trait::async_trait]
pub trait InteractionLog: Send + Sync {
    async fn all(&self) -> Result<Vec<Interaction>>;
    async fn for_user(&self, user_id: UserId) -> Result<Vec<Interaction>>;
    async fn record(&self, interaction: Interaction) -> Result<()>;
}

/// User and ad records, including the text-encoded embedding written after training.
#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    /// Fails when the id or the email is already taken.
    async fn create_user(&self, user: User) -> Result<User>;
    async fn write_user_embedding(&self, user_id: UserId, embedding: String) -> Result<()>;
    async fn write_user_preferences(&self, user_id: UserId, preferences: UserPreferences) -> Result<User>;

    /// Ads ordered by id.
    async fn list_ads(&self) -> Result<Vec<Ad>>;
    async fn get_ad(&self, ad_id: ItemId) -> Result<Option<Ad>>;
    async fn create_ad(&self, ad: Ad) -> Result<Ad>;
    async fn write_ad_embedding(&self, ad_id: ItemId, embedding: String) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryStore {
    users: DashMap<UserId, User>,
    emails: DashMap<String, UserId>,
    ads: DashMap<ItemId, Ad>,
    interactions: RwLock<Vec<Interaction>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(users: Vec<User>, ads: Vec<Ad>, interactions: Vec<Interaction>) -> Self {
        let store = Self::new();
        for user in users {
            store.emails.insert(user.email.clone(), user.id);
            store.users.insert(user.id, user);
        }
        for ad in ads {
            store.ads.insert(ad.id, ad);
        }
        *store.interactions.write() = interactions;

        info!(
            users = store.users.len(),
            ads = store.ads.len(),
            interactions = store.interactions.read().len(),
            "Initialized in-memory store"
        );
        store
    }

    pub fn interaction_count(&self) -> usize {
        self.interactions.read().len()
    }
}

#[async_trait::async_trait]
impl InteractionLog for InMemoryStore {
    async fn all(&self) -> Result<Vec<Interaction>> {
        Ok(self.interactions.read().clone())
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Interaction>> {
        Ok(self
            .interactions
            .read()
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn record(&self, interaction: Interaction) -> Result<()> {
        debug!(
            user_id = interaction.user_id,
            item_id = interaction.item_id,
            activity = %interaction.activity_type,
            "Recorded interaction"
        );
        self.interactions.write().push(interaction);
        Ok(())
    }
}

#[async_trait::async_trait]
impl EntityStore for InMemoryStore {
    async fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.users.iter().map(|entry| entry.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let Some(user_id) = self.emails.get(email).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn create_user(&self, user: User) -> Result<User> {
        // Reserve the email first so two creates cannot both claim it.
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => return Err(anyhow!("Email already registered: {}", user.email)),
            Entry::Vacant(slot) => {
                slot.insert(user.id);
            }
        }

        match self.users.entry(user.id) {
            Entry::Occupied(_) => {
                self.emails.remove(&user.email);
                return Err(anyhow!("User {} already exists", user.id));
            }
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
            }
        }
        info!("Created user: {}", user.id);
        Ok(user)
    }

    async fn write_user_preferences(&self, user_id: UserId, preferences: UserPreferences) -> Result<User> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| anyhow!("User {} not found", user_id))?;
        user.preferences = Some(preferences);
        Ok(user.clone())
    }

    async fn write_user_embedding(&self, user_id: UserId, embedding: String) -> Result<()> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| anyhow!("User {} not found", user_id))?;
        user.embedding = Some(embedding);
        Ok(())
    }

    async fn list_ads(&self) -> Result<Vec<Ad>> {
        let mut ads: Vec<Ad> = self.ads.iter().map(|entry| entry.value().clone()).collect();
        ads.sort_by_key(|a| a.id);
        Ok(ads)
    }

    async fn get_ad(&self, ad_id: ItemId) -> Result<Option<Ad>> {
        Ok(self.ads.get(&ad_id).map(|a| a.clone()))
    }

    async fn create_ad(&self, ad: Ad) -> Result<Ad> {
        match self.ads.entry(ad.id) {
            Entry::Occupied(_) => return Err(anyhow!("Ad {} already exists", ad.id)),
            Entry::Vacant(slot) => {
                slot.insert(ad.clone());
            }
        }
        info!("Created ad: {}", ad.id);
        Ok(ad)
    }

    async fn write_ad_embedding(&self, ad_id: ItemId, embedding: String) -> Result<()> {
        let mut ad = self
            .ads
            .get_mut(&ad_id)
            .ok_or_else(|| anyhow!("Ad {} not found", ad_id))?;
        ad.embedding = Some(embedding);
        Ok(())
    }
}
