use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Box-Muller transform. `1 - u` keeps the logarithm argument in (0, 1].
pub fn normal<R: Rng + ?Sized>(rng: &mut R, size: usize, mean: f32, std_dev: f32) -> Vec<f32> {
    (0..size)
        .map(|_| {
            let u1: f32 = 1.0 - rng.gen::<f32>();
            let u2: f32 = rng.gen();
            let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
            z0 * std_dev + mean
        })
        .collect()
}

pub fn uniform<R: Rng + ?Sized>(rng: &mut R, size: usize, low: f32, high: f32) -> Vec<f32> {
    if low >= high {
        return vec![low; size];
    }
    (0..size).map(|_| rng.gen_range(low..high)).collect()
}

pub fn xavier_uniform<R: Rng + ?Sized>(rng: &mut R, fan: usize) -> Vec<f32> {
    let limit = (6.0 / fan.max(1) as f32).sqrt();
    uniform(rng, fan, -limit, limit)
}

pub fn zeros(size: usize) -> Vec<f32> {
    vec![0.0; size]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method")]
pub enum InitializationMethod {
    Normal { mean: f32, std_dev: f32 },
    Uniform { low: f32, high: f32 },
    /// Each row drawn with the Xavier limit for its own width.
    XavierUniform,
    Zeros,
}

impl Default for InitializationMethod {
    fn default() -> Self {
        InitializationMethod::Normal {
            mean: 0.0,
            std_dev: 1.0,
        }
    }
}

impl InitializationMethod {
    pub fn initialize<R: Rng + ?Sized>(&self, rng: &mut R, size: usize) -> Vec<f32> {
        match self {
            InitializationMethod::Normal { mean, std_dev } => normal(rng, size, *mean, *std_dev),
            InitializationMethod::Uniform { low, high } => uniform(rng, size, *low, *high),
            InitializationMethod::XavierUniform => xavier_uniform(rng, size),
            InitializationMethod::Zeros => zeros(size),
        }
    }

    /// Row-major `rows x cols` table flattened into one buffer.
    pub fn initialize_table<R: Rng + ?Sized>(&self, rng: &mut R, rows: usize, cols: usize) -> Vec<f32> {
        let mut table = Vec::with_capacity(rows * cols);
        for _ in 0..rows {
            table.extend(self.initialize(rng, cols));
        }
        table
    }
}
