pub mod cache;
pub mod config;
pub mod error;
pub mod estimator;
pub mod geo;
pub mod models;
pub mod projector;
pub mod service;
pub mod store;

pub use config::PredictorConfig;
pub use error::PredictionError;
pub use service::{PredictionService, ServiceError};
