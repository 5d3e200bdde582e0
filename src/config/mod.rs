use crate::algorithms::initializer::InitializationMethod;
use crate::algorithms::optimizer::OptimizerKind;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub recommendation: RecommendationConfig,
    pub training: TrainingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    pub embedding_dim: usize,
    /// Upper bound applied to the caller's `limit`.
    pub max_recommendations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: u64,
    pub optimizer: OptimizerKind,
    /// Distribution for embedding tables and biases.
    pub init: InitializationMethod,
    /// Characteristic period of the exponential time decay, in days.
    pub decay_days: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            learning_rate: 0.001,
            seed: 42,
            optimizer: OptimizerKind::Adam,
            init: InitializationMethod::default(),
            decay_days: 30.0,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: num_cpus::get(),
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 64,
            max_recommendations: 10,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            recommendation: RecommendationConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

/// Overrides of the form `ADSREC_SERVER__PORT=9000` or
/// `ADSREC_TRAINING__LEARNING_RATE=0.01`.
fn environment() -> config::Environment {
    config::Environment::with_prefix("ADSREC")
        .prefix_separator("_")
        .separator("__")
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        Self::from_sources(config::File::with_name(path), environment())
    }

    fn from_sources<F>(file: F, env: config::Environment) -> anyhow::Result<Self>
    where
        F: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
