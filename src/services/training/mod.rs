use crate::algorithms::{FeatureExtractor, ModelGeneration, Trainer};
use crate::error::TrainingError;
use crate::models::{EntityKind, TrainingRun, TrainingStatus};
use crate::services::serving::ModelServing;
use crate::services::store::{EntityStore, InteractionLog};
use crate::utils::encode_embedding;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Scheduled,
    AlreadyRunning,
}

#[derive(Debug)]
pub enum TrainingOutcome {
    Completed(Arc<ModelGeneration>),
    /// No interactions to learn from; model and status left as they were.
    Skipped,
    Failed(TrainingError),
    /// Another run held the gate.
    Rejected,
}

impl TrainingOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TrainingOutcome::Completed(_))
    }
}

/// Releases the single-run gate when dropped, whichever way the run ends.
struct RunPermit {
    in_flight: Arc<AtomicBool>,
}

impl RunPermit {
    fn acquire(in_flight: &Arc<AtomicBool>) -> Option<Self> {
        in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                in_flight: Arc::clone(in_flight),
            })
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

/// Marks the record failed unless disarmed: a panicking collaborator or a
/// dropped run future must not leave the status at `Training`.
struct UnfinishedRun<'a> {
    run: &'a RwLock<TrainingRun>,
    armed: bool,
}

impl<'a> UnfinishedRun<'a> {
    fn new(run: &'a RwLock<TrainingRun>) -> Self {
        Self { run, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for UnfinishedRun<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut run = self.run.write();
        run.status = TrainingStatus::Failed;
        run.error_message = Some("training run ended before completing".to_string());
    }
}

/// Drives extract → train → publish → persist and owns the [`TrainingRun`]
/// record. At most one run is in flight at a time.
pub struct TrainingCoordinator {
    interactions: Arc<dyn InteractionLog>,
    entities: Arc<dyn EntityStore>,
    serving: Arc<ModelServing>,
    extractor: FeatureExtractor,
    trainer: Arc<Trainer>,
    epochs: usize,
    run: RwLock<TrainingRun>,
    in_flight: Arc<AtomicBool>,
}

impl TrainingCoordinator {
    pub fn new(
        interactions: Arc<dyn InteractionLog>,
        entities: Arc<dyn EntityStore>,
        serving: Arc<ModelServing>,
        extractor: FeatureExtractor,
        trainer: Trainer,
    ) -> Self {
        let epochs = trainer.config().epochs;
        Self {
            interactions,
            entities,
            serving,
            extractor,
            trainer: Arc::new(trainer),
            epochs,
            run: RwLock::new(TrainingRun::default()),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn get_status(&self) -> TrainingRun {
        self.run.read().clone()
    }

    pub fn is_training(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Schedules a run on the tokio runtime and returns immediately. Refused
    /// while another run is in flight.
    pub fn trigger(self: &Arc<Self>) -> TriggerOutcome {
        let Some(permit) = RunPermit::acquire(&self.in_flight) else {
            warn!("Training trigger rejected: a run is already in progress");
            return TriggerOutcome::AlreadyRunning;
        };

        let previous = self.begin_run();
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;
            let runner = Arc::clone(&coordinator);
            let run = tokio::spawn(async move { runner.execute(previous).await });

            match run.await {
                Ok(TrainingOutcome::Failed(e)) => error!("Background training failed: {}", e),
                Ok(outcome) => info!(completed = outcome.is_completed(), "Background training finished"),
                Err(join_error) => {
                    let e = TrainingError::Aborted(join_error.to_string());
                    error!("Background training task died: {}", e);
                    coordinator.mark_failed(&e);
                }
            }
        });

        info!("Model training has been scheduled");
        TriggerOutcome::Scheduled
    }

    /// Runs training to completion on the caller's task.
    pub async fn run_training(&self) -> TrainingOutcome {
        let Some(_permit) = RunPermit::acquire(&self.in_flight) else {
            warn!("Training run rejected: a run is already in progress");
            return TrainingOutcome::Rejected;
        };

        let previous = self.begin_run();
        self.execute(previous).await
    }

    fn begin_run(&self) -> TrainingRun {
        let mut run = self.run.write();
        let previous = run.clone();
        run.status = TrainingStatus::Training;
        previous
    }

    fn mark_failed(&self, e: &TrainingError) {
        let mut run = self.run.write();
        run.status = TrainingStatus::Failed;
        run.error_message = Some(e.to_string());
    }

    async fn execute(&self, previous: TrainingRun) -> TrainingOutcome {
        let mut unfinished = UnfinishedRun::new(&self.run);
        let result = self.train_and_persist().await;
        unfinished.disarm();

        match result {
            Ok(Some(generation)) => {
                let mut run = self.run.write();
                run.status = TrainingStatus::Completed;
                run.last_training = Some(Utc::now());
                run.error_message = None;
                info!(generation = generation.generation, "Training completed");
                TrainingOutcome::Completed(generation)
            }
            Ok(None) => {
                *self.run.write() = previous;
                info!("No interactions to train on, keeping current model");
                TrainingOutcome::Skipped
            }
            Err(e) => {
                self.mark_failed(&e);
                TrainingOutcome::Failed(e)
            }
        }
    }

    async fn train_and_persist(&self) -> Result<Option<Arc<ModelGeneration>>, TrainingError> {
        let interactions = self
            .interactions
            .all()
            .await
            .map_err(TrainingError::InteractionLog)?;

        let triples = self.extractor.prepare_training_data(&interactions);
        if triples.is_empty() {
            return Ok(None);
        }
        info!(interactions = interactions.len(), "Starting model training");

        let trainer = Arc::clone(&self.trainer);
        let epochs = self.epochs;
        let fitted = tokio::task::spawn_blocking(move || trainer.train(&triples, epochs))
            .await
            .map_err(|e| TrainingError::Aborted(e.to_string()))??;

        let Some(generation) = fitted else {
            return Ok(None);
        };

        let generation = self.serving.publish(generation);
        self.persist_embeddings(&generation).await?;
        Ok(Some(generation))
    }

    /// Writes one embedding per stored user and ad. Writes are not rolled back
    /// if a later one fails.
    async fn persist_embeddings(&self, generation: &ModelGeneration) -> Result<(), TrainingError> {
        let users = self
            .entities
            .list_users()
            .await
            .map_err(TrainingError::EntityStore)?;
        for user in &users {
            let encoded = encode(generation, user.id, EntityKind::User)?;
            self.entities
                .write_user_embedding(user.id, encoded)
                .await
                .map_err(|cause| TrainingError::Persist {
                    kind: EntityKind::User,
                    id: user.id,
                    cause,
                })?;
        }

        let ads = self
            .entities
            .list_ads()
            .await
            .map_err(TrainingError::EntityStore)?;
        for ad in &ads {
            let encoded = encode(generation, ad.id, EntityKind::Item)?;
            self.entities
                .write_ad_embedding(ad.id, encoded)
                .await
                .map_err(|cause| TrainingError::Persist {
                    kind: EntityKind::Item,
                    id: ad.id,
                    cause,
                })?;
        }

        info!(users = users.len(), ads = ads.len(), "Persisted embeddings");
        Ok(())
    }
}

fn encode(generation: &ModelGeneration, id: i64, kind: EntityKind) -> Result<String, TrainingError> {
    encode_embedding(&generation.embedding_or_zeros(id, kind)).map_err(|e| TrainingError::Persist {
        kind,
        id,
        cause: e.into(),
    })
}
