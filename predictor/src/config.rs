use std::{env, num::NonZeroUsize};

use serde::{Deserialize, Serialize};

use crate::projector::DEFAULT_NEIGHBORS;

/// Tunables of the prediction service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Max distance, in degrees, between a fix and its projection on the route.
    pub max_projection_distance: f64,
    /// Nearest route vertices whose segments are candidates for a projection.
    pub neighbor_count: usize,
    /// Route indexes kept in memory.
    pub cache_capacity: NonZeroUsize,
    /// Longest accepted position prediction horizon.
    pub max_prediction_seconds: u32,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            max_projection_distance: 0.001,
            neighbor_count: DEFAULT_NEIGHBORS,
            cache_capacity: NonZeroUsize::new(16).unwrap_or(NonZeroUsize::MIN),
            max_prediction_seconds: 3600,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid value {value:?} for {key}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

impl PredictorConfig {
    /// Defaults overridden by `PREDICTOR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = read_var("PREDICTOR_MAX_DISTANCE_DEG")? {
            config.max_projection_distance = value;
        }
        if let Some(value) = read_var("PREDICTOR_NEIGHBORS")? {
            config.neighbor_count = value;
        }
        if let Some(value) = read_var("PREDICTOR_CACHE_CAPACITY")? {
            config.cache_capacity = value;
        }
        if let Some(value) = read_var("PREDICTOR_MAX_PREDICTION_SECONDS")? {
            config.max_prediction_seconds = value;
        }
        Ok(config)
    }
}

fn read_var<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError { key, value }),
        Err(_) => Ok(None),
    }
}
