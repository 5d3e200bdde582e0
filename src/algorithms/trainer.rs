use super::{IndexMapping, LatentFactorModel, ModelGeneration};
use crate::config::TrainingConfig;
use crate::error::TrainingError;
use crate::models::WeightedTriple;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

/// Fits a fresh [`LatentFactorModel`] per call. Holds no model state of its
/// own beyond the generation counter.
pub struct Trainer {
    config: TrainingConfig,
    embedding_dim: usize,
    next_generation: AtomicU64,
}

impl Trainer {
    pub fn new(config: TrainingConfig, embedding_dim: usize) -> Self {
        Self {
            config,
            embedding_dim,
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Runs exactly `epochs` full-batch steps minimizing the mean squared error
    /// between model scores and triple weights. Empty input yields `Ok(None)`.
    pub fn train(
        &self,
        triples: &[WeightedTriple],
        epochs: usize,
    ) -> Result<Option<ModelGeneration>, TrainingError> {
        if triples.is_empty() {
            debug!("No training triples, skipping fit");
            return Ok(None);
        }

        if let Some(bad) = triples.iter().find(|t| !t.weight.is_finite()) {
            return Err(TrainingError::InvalidWeight {
                user_id: bad.user_id,
                item_id: bad.item_id,
                weight: bad.weight,
            });
        }

        let users = IndexMapping::from_ids(triples.iter().map(|t| t.user_id));
        let items = IndexMapping::from_ids(triples.iter().map(|t| t.item_id));

        let samples: Vec<(usize, usize, f32)> = triples
            .iter()
            .filter_map(|t| Some((users.index_of(t.user_id)?, items.index_of(t.item_id)?, t.weight)))
            .collect();

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut model = LatentFactorModel::new(
            users.len(),
            items.len(),
            self.embedding_dim,
            &self.config.init,
            &mut rng,
        );
        let mut optimizer = self.config.optimizer.build(self.config.learning_rate);

        for epoch in 0..epochs {
            let (loss, grads) = model.gradients(&samples);
            if !loss.is_finite() {
                return Err(TrainingError::Diverged { epoch, loss });
            }
            optimizer.begin_step();
            model.apply(optimizer.as_mut(), &grads);
            debug!(epoch, loss, "Training step");
        }

        let final_loss = model.loss(&samples);
        if !final_loss.is_finite() || !model.is_finite() {
            return Err(TrainingError::Diverged {
                epoch: epochs,
                loss: final_loss,
            });
        }

        let generation = ModelGeneration {
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            run_id: Uuid::new_v4(),
            users,
            items,
            model,
            trained_at: Utc::now(),
            final_loss,
        };

        info!(
            generation = generation.generation,
            run_id = %generation.run_id,
            users = generation.users.len(),
            items = generation.items.len(),
            samples = samples.len(),
            epochs,
            loss = final_loss,
            "Model fitted"
        );

        Ok(Some(generation))
    }
}
