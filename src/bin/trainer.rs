use adsrec::services::store::InMemoryStore;
use adsrec::services::training::TrainingOutcome;
use adsrec::{init_tracing, ActivityType, Ad, AppState, Config, Interaction, User};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Train the ad model once over a JSON fixture", long_about = None)]
struct Args {
    /// JSON file with `users`, `ads` and `interactions` arrays.
    #[arg(short, long)]
    data: String,

    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Override the configured epoch count.
    #[arg(long)]
    epochs: Option<usize>,

    /// Recommendations printed per user.
    #[arg(short, long, default_value_t = 5)]
    top: usize,
}

#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    users: Vec<FixtureUser>,
    #[serde(default)]
    ads: Vec<FixtureAd>,
    #[serde(default)]
    interactions: Vec<FixtureInteraction>,
}

#[derive(Debug, Deserialize)]
struct FixtureUser {
    id: i64,
    email: String,
}

#[derive(Debug, Deserialize)]
struct FixtureAd {
    id: i64,
    title: String,
    category: String,
    price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FixtureInteraction {
    user_id: i64,
    ad_id: i64,
    activity_type: String,
    timestamp: Option<DateTime<Utc>>,
}

impl Fixture {
    fn load(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
        serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path))
    }

    fn into_store(self) -> InMemoryStore {
        let users = self.users.into_iter().map(|u| User::new(u.id, u.email)).collect();
        let ads = self
            .ads
            .into_iter()
            .map(|a| {
                let ad = Ad::new(a.id, a.title, a.category);
                match a.price {
                    Some(price) => ad.with_price(price),
                    None => ad,
                }
            })
            .collect();
        let interactions = self
            .interactions
            .into_iter()
            .map(|i| {
                let interaction = Interaction::new(i.user_id, i.ad_id, ActivityType::from(i.activity_type.as_str()));
                match i.timestamp {
                    Some(timestamp) => interaction.at(timestamp),
                    None => interaction,
                }
            })
            .collect();

        InMemoryStore::with_records(users, ads, interactions)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing();

    let mut config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };
    if let Some(epochs) = args.epochs {
        config.training.epochs = epochs;
    }
    info!("Training configuration loaded: {:?}", config.training);

    let store = Arc::new(Fixture::load(&args.data)?.into_store());
    let state = AppState::with_collaborators(config, store.clone(), store.clone());

    match state.training_coordinator.run_training().await {
        TrainingOutcome::Completed(generation) => info!(
            generation = generation.generation,
            loss = generation.final_loss,
            "Training finished"
        ),
        TrainingOutcome::Skipped => info!("No interactions in fixture, nothing to train"),
        TrainingOutcome::Failed(e) => error!("Training failed: {}", e),
        TrainingOutcome::Rejected => error!("Training already in progress"),
    }
    info!("Training status: {:?}", state.training_coordinator.get_status());

    let limit = args.top.clamp(1, adsrec::utils::validation::MAX_LIMIT);
    for user in adsrec::services::store::EntityStore::list_users(store.as_ref()).await? {
        let response = state
            .recommendation_service
            .get_recommendations(user.id, limit)
            .await?;
        let ranked: Vec<String> = response
            .recommendations
            .iter()
            .map(|r| format!("{}:{:.3}", r.ad.id, r.similarity_score))
            .collect();
        println!("user {}: {}", user.id, ranked.join(" "));
    }

    Ok(())
}
