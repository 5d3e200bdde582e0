use crate::algorithms::ModelGeneration;
use crate::models::{EntityKind, ItemId, UserId};
use crate::utils::cosine_similarity;
use parking_lot::RwLock;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::info;

/// Holds the published model generation. Readers take an `Arc` to the whole
/// generation; publishing swaps the pointer, so a reader never observes a
/// partially replaced model.
#[derive(Default)]
pub struct ModelServing {
    current: RwLock<Option<Arc<ModelGeneration>>>,
}

impl ModelServing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<ModelGeneration>> {
        self.current.read().clone()
    }

    pub fn publish(&self, generation: ModelGeneration) -> Arc<ModelGeneration> {
        let generation = Arc::new(generation);
        let previous = self.current.write().replace(Arc::clone(&generation));

        info!(
            generation = generation.generation,
            previous = ?previous.as_ref().map(|g| g.generation),
            users = generation.users.len(),
            items = generation.items.len(),
            "Published model generation"
        );
        generation
    }

    pub fn generation(&self) -> Option<u64> {
        self.current.read().as_ref().map(|g| g.generation)
    }
}

/// Embedding lookup and cosine ranking over the currently published generation.
#[derive(Clone)]
pub struct Recommender {
    serving: Arc<ModelServing>,
    embedding_dim: usize,
}

impl Recommender {
    pub fn new(serving: Arc<ModelServing>, embedding_dim: usize) -> Self {
        Self {
            serving,
            embedding_dim,
        }
    }

    /// Learned vector, or the zero vector for ids absent from the current
    /// generation (and for every id before the first training run).
    pub fn get_embedding(&self, id: i64, kind: EntityKind) -> Vec<f32> {
        let snapshot = self.serving.current();
        embedding_or_zeros(snapshot.as_deref(), self.embedding_dim, id, kind)
    }

    /// Top `top_k` candidates by cosine similarity to the user's embedding.
    pub fn recommend(&self, user_id: UserId, candidates: &[ItemId], top_k: usize) -> Vec<(ItemId, f32)> {
        let snapshot = self.serving.current();
        rank_candidates(snapshot.as_deref(), self.embedding_dim, user_id, candidates, top_k)
    }
}

fn embedding_or_zeros(
    generation: Option<&ModelGeneration>,
    embedding_dim: usize,
    id: i64,
    kind: EntityKind,
) -> Vec<f32> {
    match generation {
        Some(generation) => generation.embedding_or_zeros(id, kind),
        None => vec![0.0; embedding_dim],
    }
}

/// Scores every candidate against one generation. Ties keep candidate order.
pub fn rank_candidates(
    generation: Option<&ModelGeneration>,
    embedding_dim: usize,
    user_id: UserId,
    candidates: &[ItemId],
    top_k: usize,
) -> Vec<(ItemId, f32)> {
    let user = embedding_or_zeros(generation, embedding_dim, user_id, EntityKind::User);

    let mut scored: Vec<(ItemId, f32)> = candidates
        .par_iter()
        .map(|&item_id| {
            let score = match generation.and_then(|g| g.embedding(item_id, EntityKind::Item)) {
                Some(item) => cosine_similarity(&user, item),
                None => 0.0,
            };
            (item_id, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);
    scored
}
