pub mod features;
pub mod initializer;
pub mod optimizer;
pub mod trainer;

pub use features::FeatureExtractor;
pub use trainer::Trainer;

use crate::models::EntityKind;
use crate::utils::dot;
use chrono::{DateTime, Utc};
use initializer::InitializationMethod;
use nalgebra::DVector;
use optimizer::Optimizer;
use rand::Rng;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Dense `0..N` indices over the ids of one training run, assigned in ascending id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexMapping {
    ids: Vec<i64>,
    positions: HashMap<i64, usize>,
}

impl IndexMapping {
    pub fn from_ids<I: IntoIterator<Item = i64>>(ids: I) -> Self {
        let ids: Vec<i64> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let positions = ids.iter().enumerate().map(|(idx, &id)| (id, idx)).collect();
        Self { ids, positions }
    }

    pub fn index_of(&self, id: i64) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn id_at(&self, index: usize) -> Option<i64> {
        self.ids.get(index).copied()
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Gradients of the mean squared error w.r.t. every parameter table.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub user_factors: DVector<f32>,
    pub item_factors: DVector<f32>,
    pub user_bias: DVector<f32>,
    pub item_bias: DVector<f32>,
}

/// Bias-augmented matrix factorization. Embedding tables are stored row-major.
#[derive(Debug, Clone)]
pub struct LatentFactorModel {
    dim: usize,
    n_users: usize,
    n_items: usize,
    user_factors: DVector<f32>,
    item_factors: DVector<f32>,
    user_bias: DVector<f32>,
    item_bias: DVector<f32>,
}

impl LatentFactorModel {
    pub fn new<R: Rng + ?Sized>(
        n_users: usize,
        n_items: usize,
        dim: usize,
        init: &InitializationMethod,
        rng: &mut R,
    ) -> Self {
        let user_factors = DVector::from_vec(init.initialize_table(rng, n_users, dim));
        let item_factors = DVector::from_vec(init.initialize_table(rng, n_items, dim));
        let user_bias = DVector::from_vec(init.initialize(rng, n_users));
        let item_bias = DVector::from_vec(init.initialize(rng, n_items));

        Self {
            dim,
            n_users,
            n_items,
            user_factors,
            item_factors,
            user_bias,
            item_bias,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn n_users(&self) -> usize {
        self.n_users
    }

    pub fn n_items(&self) -> usize {
        self.n_items
    }

    pub fn user_embedding(&self, user_idx: usize) -> Option<&[f32]> {
        (user_idx < self.n_users).then(|| row(&self.user_factors, user_idx, self.dim))
    }

    pub fn item_embedding(&self, item_idx: usize) -> Option<&[f32]> {
        (item_idx < self.n_items).then(|| row(&self.item_factors, item_idx, self.dim))
    }

    pub fn user_bias(&self, user_idx: usize) -> Option<f32> {
        self.user_bias.get(user_idx).copied()
    }

    pub fn item_bias(&self, item_idx: usize) -> Option<f32> {
        self.item_bias.get(item_idx).copied()
    }

    /// Affinity of a (user, item) index pair.
    ///
    /// # Panics
    ///
    /// Panics if either index is outside the model's tables.
    pub fn score(&self, user_idx: usize, item_idx: usize) -> f32 {
        let user = row(&self.user_factors, user_idx, self.dim);
        let item = row(&self.item_factors, item_idx, self.dim);
        dot(user, item) + self.user_bias[user_idx] + self.item_bias[item_idx]
    }

    /// Mean squared error over `(user_idx, item_idx, target)` samples.
    pub fn loss(&self, samples: &[(usize, usize, f32)]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let total: f32 = samples
            .iter()
            .map(|&(u, i, target)| {
                let error = self.score(u, i) - target;
                error * error
            })
            .sum();
        total / samples.len() as f32
    }

    /// Full-batch loss and gradients in a single pass.
    pub fn gradients(&self, samples: &[(usize, usize, f32)]) -> (f32, Gradients) {
        let dim = self.dim;
        let mut grads = Gradients {
            user_factors: DVector::zeros(self.user_factors.len()),
            item_factors: DVector::zeros(self.item_factors.len()),
            user_bias: DVector::zeros(self.n_users),
            item_bias: DVector::zeros(self.n_items),
        };
        if samples.is_empty() {
            return (0.0, grads);
        }

        let n = samples.len() as f32;
        let mut total = 0.0f32;
        for &(u, i, target) in samples {
            let error = self.score(u, i) - target;
            total += error * error;
            let coef = 2.0 * error / n;

            let user = row(&self.user_factors, u, dim);
            let item = row(&self.item_factors, i, dim);
            let gu = &mut grads.user_factors.as_mut_slice()[u * dim..(u + 1) * dim];
            for (g, x) in gu.iter_mut().zip(item) {
                *g += coef * x;
            }
            let gi = &mut grads.item_factors.as_mut_slice()[i * dim..(i + 1) * dim];
            for (g, x) in gi.iter_mut().zip(user) {
                *g += coef * x;
            }
            grads.user_bias[u] += coef;
            grads.item_bias[i] += coef;
        }

        (total / n, grads)
    }

    pub fn apply(&mut self, optimizer: &mut dyn Optimizer, grads: &Gradients) {
        optimizer.update("user_factors", &mut self.user_factors, &grads.user_factors);
        optimizer.update("item_factors", &mut self.item_factors, &grads.item_factors);
        optimizer.update("user_bias", &mut self.user_bias, &grads.user_bias);
        optimizer.update("item_bias", &mut self.item_bias, &grads.item_bias);
    }

    pub fn is_finite(&self) -> bool {
        [&self.user_factors, &self.item_factors, &self.user_bias, &self.item_bias]
            .iter()
            .all(|table| table.iter().all(|v| v.is_finite()))
    }
}

fn row(table: &DVector<f32>, idx: usize, dim: usize) -> &[f32] {
    &table.as_slice()[idx * dim..(idx + 1) * dim]
}

/// One complete, immutable result of a training run: index mappings plus the
/// parameters fitted over them.
#[derive(Debug, Clone)]
pub struct ModelGeneration {
    pub generation: u64,
    pub run_id: Uuid,
    pub users: IndexMapping,
    pub items: IndexMapping,
    pub model: LatentFactorModel,
    pub trained_at: DateTime<Utc>,
    pub final_loss: f32,
}

impl ModelGeneration {
    pub fn dim(&self) -> usize {
        self.model.dim()
    }

    pub fn embedding(&self, id: i64, kind: EntityKind) -> Option<&[f32]> {
        match kind {
            EntityKind::User => self
                .users
                .index_of(id)
                .and_then(|idx| self.model.user_embedding(idx)),
            EntityKind::Item => self
                .items
                .index_of(id)
                .and_then(|idx| self.model.item_embedding(idx)),
        }
    }

    /// Learned vector, or zeros for ids this generation never saw.
    pub fn embedding_or_zeros(&self, id: i64, kind: EntityKind) -> Vec<f32> {
        self.embedding(id, kind)
            .map(<[f32]>::to_vec)
            .unwrap_or_else(|| vec![0.0; self.dim()])
    }

    /// Model affinity for external ids, if both were part of this generation.
    pub fn predict(&self, user_id: i64, item_id: i64) -> Option<f32> {
        let u = self.users.index_of(user_id)?;
        let i = self.items.index_of(item_id)?;
        Some(self.model.score(u, i))
    }
}
