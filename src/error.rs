use crate::models::{EntityKind, ItemId, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid training weight {weight} for user {user_id}, item {item_id}")]
    InvalidWeight {
        user_id: UserId,
        item_id: ItemId,
        weight: f32,
    },

    #[error("optimization diverged at epoch {epoch} (loss = {loss})")]
    Diverged { epoch: usize, loss: f32 },

    #[error("failed to read interactions: {0:#}")]
    InteractionLog(anyhow::Error),

    #[error("failed to read entity store: {0:#}")]
    EntityStore(anyhow::Error),

    #[error("failed to persist {kind} {id} embedding: {cause:#}")]
    Persist {
        kind: EntityKind,
        id: i64,
        cause: anyhow::Error,
    },

    #[error("training task aborted: {0}")]
    Aborted(String),
}
