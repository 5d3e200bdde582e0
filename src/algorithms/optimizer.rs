use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Updates named parameter tables in place. One `begin_step` precedes the
/// updates belonging to a single gradient step.
pub trait Optimizer: Send {
    fn begin_step(&mut self);
    fn update(&mut self, key: &str, params: &mut DVector<f32>, gradients: &DVector<f32>);
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

impl OptimizerKind {
    pub fn build(&self, learning_rate: f64) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Adam => Box::new(Adam::with_learning_rate(learning_rate)),
            OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn begin_step(&mut self) {}

    fn update(&mut self, _key: &str, params: &mut DVector<f32>, gradients: &DVector<f32>) {
        params.axpy(-(self.learning_rate as f32), gradients, 1.0);
    }

    fn reset(&mut self) {}
}

#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
    m: HashMap<String, DVector<f32>>,
    v: HashMap<String, DVector<f32>>,
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.001, 0.9, 0.999, 1e-8)
    }
}

impl Adam {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: HashMap::new(),
            v: HashMap::new(),
        }
    }

    pub fn with_learning_rate(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            ..Self::default()
        }
    }

    pub fn steps(&self) -> i32 {
        self.t
    }
}

impl Optimizer for Adam {
    fn begin_step(&mut self) {
        self.t += 1;
    }

    fn update(&mut self, key: &str, params: &mut DVector<f32>, gradients: &DVector<f32>) {
        let t = self.t.max(1);
        let beta1 = self.beta1 as f32;
        let beta2 = self.beta2 as f32;

        let m = self
            .m
            .entry(key.to_string())
            .or_insert_with(|| DVector::zeros(params.len()));
        let v = self
            .v
            .entry(key.to_string())
            .or_insert_with(|| DVector::zeros(params.len()));

        *m = m.scale(beta1) + gradients.scale(1.0 - beta1);
        *v = v.scale(beta2) + gradients.component_mul(gradients).scale(1.0 - beta2);

        let m_hat = m.scale(1.0 / (1.0 - beta1.powi(t)));
        let v_hat = v.scale(1.0 / (1.0 - beta2.powi(t)));

        let epsilon = self.epsilon as f32;
        let denominator = v_hat.map(|x| x.sqrt() + epsilon);
        *params -= m_hat.component_div(&denominator).scale(self.learning_rate as f32);
    }

    fn reset(&mut self) {
        self.t = 0;
        self.m.clear();
        self.v.clear();
    }
}
