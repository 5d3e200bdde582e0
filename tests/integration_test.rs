use adsrec::algorithms::initializer::InitializationMethod;
use adsrec::services::store::{EntityStore, InMemoryStore, InteractionLog};
use adsrec::services::training::{TrainingOutcome, TriggerOutcome};
use adsrec::*;
use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn users_and_ads() -> (Vec<User>, Vec<Ad>) {
    (
        vec![User::new(1, "one@example.com"), User::new(2, "two@example.com")],
        vec![
            Ad::new(10, "Running shoes", "sports").with_price(80.0),
            Ad::new(11, "Trail shoes", "sports").with_price(120.0),
            Ad::new(12, "Cookbook", "books").with_price(25.0),
        ],
    )
}

fn seeded_state() -> (AppState, Arc<InMemoryStore>) {
    let (users, ads) = users_and_ads();
    let now = Utc::now();
    let interactions = vec![
        Interaction::new(1, 10, ActivityType::View).at(now - Duration::days(1)),
        Interaction::new(1, 11, ActivityType::Purchase).at(now - Duration::days(1)),
        Interaction::new(2, 10, ActivityType::Click).at(now - Duration::days(5)),
    ];
    let store = Arc::new(InMemoryStore::with_records(users, ads, interactions));
    let state = AppState::with_collaborators(Config::default(), store.clone(), store.clone());
    (state, store)
}

async fn wait_until_idle(state: &AppState) {
    for _ in 0..500 {
        if !state.training_coordinator.is_training() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("training did not finish in time");
}

/// Interaction log whose contents tests can swap between runs.
#[derive(Default)]
struct ReplaceableLog {
    interactions: Mutex<Vec<Interaction>>,
}

#[async_trait::async_trait]
impl InteractionLog for ReplaceableLog {
    async fn all(&self) -> Result<Vec<Interaction>> {
        Ok(self.interactions.lock().clone())
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Interaction>> {
        Ok(self
            .interactions
            .lock()
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn record(&self, interaction: Interaction) -> Result<()> {
        self.interactions.lock().push(interaction);
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Fault {
    /// Ad embedding writes fail.
    ReadOnlyAds,
    /// Listing users panics.
    PanicOnListUsers,
}

/// Entity store wrapping `InMemoryStore` with one injected fault.
struct FaultyStore {
    inner: InMemoryStore,
    fault: Fault,
}

#[async_trait::async_trait]
impl EntityStore for FaultyStore {
    async fn list_users(&self) -> Result<Vec<User>> {
        if let Fault::PanicOnListUsers = self.fault {
            panic!("user table is corrupt");
        }
        self.inner.list_users().await
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        self.inner.get_user(user_id).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.inner.get_user_by_email(email).await
    }

    async fn create_user(&self, user: User) -> Result<User> {
        self.inner.create_user(user).await
    }

    async fn write_user_embedding(&self, user_id: UserId, embedding: String) -> Result<()> {
        self.inner.write_user_embedding(user_id, embedding).await
    }

    async fn write_user_preferences(&self, user_id: UserId, preferences: UserPreferences) -> Result<User> {
        self.inner.write_user_preferences(user_id, preferences).await
    }

    async fn list_ads(&self) -> Result<Vec<Ad>> {
        self.inner.list_ads().await
    }

    async fn get_ad(&self, ad_id: ItemId) -> Result<Option<Ad>> {
        self.inner.get_ad(ad_id).await
    }

    async fn create_ad(&self, ad: Ad) -> Result<Ad> {
        self.inner.create_ad(ad).await
    }

    async fn write_ad_embedding(&self, ad_id: ItemId, embedding: String) -> Result<()> {
        if let Fault::ReadOnlyAds = self.fault {
            return Err(anyhow!("ads table is read-only (ad {})", ad_id));
        }
        self.inner.write_ad_embedding(ad_id, embedding).await
    }
}

fn faulty_state(fault: Fault) -> (AppState, Arc<FaultyStore>) {
    let (users, ads) = users_and_ads();
    let log = Arc::new(ReplaceableLog::default());
    log.interactions.lock().push(Interaction::new(1, 11, ActivityType::Purchase));
    let entities = Arc::new(FaultyStore {
        inner: InMemoryStore::with_records(users, ads, Vec::new()),
        fault,
    });
    let state = AppState::with_collaborators(Config::default(), log, entities.clone());
    (state, entities)
}

#[tokio::test]
async fn test_completed_run_sets_status_and_timestamp() {
    let (state, _) = seeded_state();
    let started = Utc::now();

    let outcome = state.training_coordinator.run_training().await;
    assert!(outcome.is_completed());

    let run = state.training_coordinator.get_status();
    assert_eq!(run.status, TrainingStatus::Completed);
    assert!(run.last_training.unwrap() >= started);
    assert!(run.error_message.is_none());
    assert_eq!(state.serving.generation(), Some(1));
}

#[tokio::test]
async fn test_background_trigger_and_second_trigger_rejected() {
    let (state, _) = seeded_state();
    let started = Utc::now();

    assert_eq!(state.training_coordinator.trigger(), TriggerOutcome::Scheduled);
    assert_eq!(state.training_coordinator.get_status().status, TrainingStatus::Training);
    assert_eq!(state.training_coordinator.trigger(), TriggerOutcome::AlreadyRunning);

    wait_until_idle(&state).await;

    let run = state.training_coordinator.get_status();
    assert_eq!(run.status, TrainingStatus::Completed);
    assert!(run.last_training.unwrap() >= started);
    assert_eq!(state.serving.generation(), Some(1));

    assert_eq!(state.training_coordinator.trigger(), TriggerOutcome::Scheduled);
    wait_until_idle(&state).await;
    assert_eq!(state.serving.generation(), Some(2));
}

#[tokio::test]
async fn test_empty_data_leaves_model_and_status_unchanged() {
    let log = Arc::new(ReplaceableLog::default());
    let (users, ads) = users_and_ads();
    let entities = Arc::new(InMemoryStore::with_records(users, ads, Vec::new()));
    let state = AppState::with_collaborators(Config::default(), log.clone(), entities);

    assert!(matches!(state.training_coordinator.run_training().await, TrainingOutcome::Skipped));
    assert_eq!(state.training_coordinator.get_status(), TrainingRun::default());
    assert!(state.serving.current().is_none());

    log.record(Interaction::new(1, 10, ActivityType::Purchase)).await.unwrap();
    assert!(state.training_coordinator.run_training().await.is_completed());
    let before_status = state.training_coordinator.get_status();
    let before_model = state.serving.current().unwrap();
    let before_embedding = state.recommendation_service.get_user_embedding(1);

    log.interactions.lock().clear();
    assert!(matches!(state.training_coordinator.run_training().await, TrainingOutcome::Skipped));

    assert_eq!(state.training_coordinator.get_status(), before_status);
    assert!(Arc::ptr_eq(&state.serving.current().unwrap(), &before_model));
    assert_eq!(state.recommendation_service.get_user_embedding(1), before_embedding);
}

#[tokio::test]
async fn test_training_persists_embeddings_for_every_entity() {
    let (state, store) = seeded_state();
    assert!(state.training_coordinator.run_training().await.is_completed());

    let service = &state.recommendation_service;
    let stored = service.stored_embedding(1, EntityKind::User).await.unwrap().unwrap();
    assert_eq!(stored, service.get_user_embedding(1));
    assert_eq!(stored.len(), 64);

    let stored = service.stored_embedding(11, EntityKind::Item).await.unwrap().unwrap();
    assert_eq!(stored, service.get_item_embedding(11));

    // ad 12 never interacted with
    let stored = service.stored_embedding(12, EntityKind::Item).await.unwrap().unwrap();
    assert_eq!(stored, vec![0.0; 64]);

    let raw = store.get_ad(12).await.unwrap().unwrap().embedding.unwrap();
    assert!(raw.starts_with('['));
}

#[tokio::test]
async fn test_persist_failure_marks_run_failed_but_keeps_model() {
    let (state, entities) = faulty_state(Fault::ReadOnlyAds);

    let outcome = state.training_coordinator.run_training().await;
    assert!(matches!(outcome, TrainingOutcome::Failed(TrainingError::Persist { .. })));

    let run = state.training_coordinator.get_status();
    assert_eq!(run.status, TrainingStatus::Failed);
    assert!(run.error_message.unwrap().contains("item 10"));
    assert!(run.last_training.is_none());
    assert!(!state.training_coordinator.is_training());

    // publication happens before write-back; user rows were written first
    assert_eq!(state.serving.generation(), Some(1));
    assert!(entities.get_user(1).await.unwrap().unwrap().embedding.is_some());
}

#[tokio::test]
async fn test_panicking_store_in_background_run_is_reported_as_failed() {
    let (state, _) = faulty_state(Fault::PanicOnListUsers);

    assert_eq!(state.training_coordinator.trigger(), TriggerOutcome::Scheduled);
    wait_until_idle(&state).await;

    let run = state.training_coordinator.get_status();
    assert_eq!(run.status, TrainingStatus::Failed);
    let message = run.error_message.unwrap();
    assert!(message.contains("training task aborted"), "{message}");
    assert!(message.contains("panicked"), "{message}");
    assert!(run.last_training.is_none());

    // the gate is free again and a later trigger is accepted
    assert_eq!(state.training_coordinator.trigger(), TriggerOutcome::Scheduled);
    wait_until_idle(&state).await;
    assert_eq!(state.training_coordinator.get_status().status, TrainingStatus::Failed);
}

#[tokio::test]
async fn test_panicking_store_in_foreground_run_leaves_failed_status() {
    let (state, _) = faulty_state(Fault::PanicOnListUsers);
    let coordinator = state.training_coordinator.clone();

    let joined = tokio::spawn(async move { coordinator.run_training().await }).await;
    assert!(joined.unwrap_err().is_panic());

    let run = state.training_coordinator.get_status();
    assert_eq!(run.status, TrainingStatus::Failed);
    assert!(run.error_message.is_some());
    assert!(!state.training_coordinator.is_training());
}

#[tokio::test]
async fn test_purchase_outranks_view_across_seeds() {
    let seeds = 20;
    let mut wins = 0;
    let mut total_margin = 0.0;

    for seed in 0..seeds {
        let mut config = Config::default();
        config.recommendation.embedding_dim = 8;
        config.training.seed = seed;
        config.training.epochs = 100;
        config.training.learning_rate = 0.05;
        config.training.init = InitializationMethod::Normal { mean: 0.0, std_dev: 0.1 };

        let now = Utc::now();
        let store = Arc::new(InMemoryStore::with_records(
            vec![User::new(1, "one@example.com")],
            vec![Ad::new(10, "viewed", "sports"), Ad::new(11, "bought", "sports")],
            vec![
                Interaction::new(1, 10, ActivityType::View).at(now),
                Interaction::new(1, 11, ActivityType::Purchase).at(now),
            ],
        ));
        let state = AppState::with_collaborators(config, store.clone(), store);
        assert!(state.training_coordinator.run_training().await.is_completed());

        let ranked = state.recommendation_service.recommender().recommend(1, &[10, 11], 2);
        let score = |id: i64| ranked.iter().find(|(item, _)| *item == id).map(|(_, s)| *s).unwrap();
        let margin = score(11) - score(10);
        if margin >= 0.0 {
            wins += 1;
        }
        total_margin += margin;
    }

    assert!(wins >= 15, "purchase ranked first in only {wins}/{seeds} seeds");
    assert!(total_margin > 0.0);
}

#[tokio::test]
async fn test_recommend_with_no_candidates_is_empty() {
    let (state, _) = seeded_state();
    assert!(state.training_coordinator.run_training().await.is_completed());
    assert!(state.recommendation_service.recommender().recommend(5, &[], 3).is_empty());

    let response = state.recommendation_service.get_recommendations(5, 3).await.unwrap();
    assert_eq!(response.recommendations.len(), 3);
    assert!(response.recommendations.iter().all(|r| r.similarity_score == 0.0));
}

#[tokio::test]
async fn test_reader_keeps_consistent_snapshot_across_publish() {
    let (state, store) = seeded_state();
    assert!(state.training_coordinator.run_training().await.is_completed());

    let held = state.serving.current().unwrap();
    let held_user = held.embedding(1, EntityKind::User).unwrap().to_vec();
    let held_items = held.items.len();

    store.record(Interaction::new(2, 12, ActivityType::Save)).await.unwrap();
    assert!(state.training_coordinator.run_training().await.is_completed());

    let current = state.serving.current().unwrap();
    assert_eq!(current.generation, held.generation + 1);
    assert_eq!(current.items.len(), held_items + 1);

    assert_eq!(held.items.len(), held_items);
    assert_eq!(held.embedding(1, EntityKind::User).unwrap(), held_user.as_slice());
    assert!(held.embedding(12, EntityKind::Item).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_see_whole_generations_while_republishing() {
    let (state, store) = seeded_state();
    assert!(state.training_coordinator.run_training().await.is_completed());

    let stop = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let state = state.clone();
            let stop = Arc::clone(&stop);
            tokio::spawn(async move {
                let candidates = [10, 11, 12, 13];
                let mut reads = 0usize;
                let mut last_generation = 0;
                while !stop.load(Ordering::Acquire) {
                    let ranked = state.recommendation_service.recommender().recommend(1, &candidates, 3);
                    assert_eq!(ranked.len(), 3);
                    assert!(ranked.iter().all(|(id, s)| candidates.contains(id) && s.is_finite()));
                    assert!(ranked.windows(2).all(|w| w[0].1 >= w[1].1));

                    let snapshot = state.serving.current().unwrap();
                    assert!(snapshot.generation >= last_generation);
                    last_generation = snapshot.generation;
                    assert_eq!(snapshot.users.len(), snapshot.model.n_users());
                    assert_eq!(snapshot.items.len(), snapshot.model.n_items());
                    for &id in snapshot.items.ids() {
                        assert_eq!(snapshot.embedding(id, EntityKind::Item).unwrap().len(), 64);
                    }

                    reads += 1;
                    tokio::task::yield_now().await;
                }
                reads
            })
        })
        .collect();

    for round in 0..3 {
        store
            .record(Interaction::new(2, 12 + round % 2, ActivityType::Save))
            .await
            .unwrap();
        assert_eq!(state.training_coordinator.trigger(), TriggerOutcome::Scheduled);
        wait_until_idle(&state).await;
        assert_eq!(state.training_coordinator.get_status().status, TrainingStatus::Completed);
    }

    stop.store(true, Ordering::Release);
    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
    assert_eq!(state.serving.generation(), Some(4));
}

#[tokio::test]
async fn test_track_activity_feeds_next_training_run() {
    let (state, _) = seeded_state();
    let service = &state.recommendation_service;

    service
        .track_activity(Interaction::new(2, 12, ActivityType::Purchase))
        .await
        .unwrap();
    let history = service.activity_history(2).await.unwrap();
    assert_eq!(history[0].item_id, 12);

    let features = service.user_features(2).await.unwrap();
    assert_eq!(features.purchase_count, 1.0);
    assert_eq!(features.total_spent, 25.0);

    assert!(state.training_coordinator.run_training().await.is_completed());
    assert_ne!(service.get_item_embedding(12), vec![0.0; 64]);
}
