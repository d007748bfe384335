use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("point is too far from route: distance {distance} > max allowed {max}")]
    PointNotOnRoute { distance: f64, max: f64 },
    #[error("elapsed time between fixes must be positive, got {seconds}s")]
    InvalidInterval { seconds: f64 },
    #[error("target distance {target}m is outside the route range [{min}m, {max}m]")]
    OutOfRouteRange { target: f64, min: f64, max: f64 },
    #[error("target distance {target}m is behind the current position {current}m")]
    BehindCurrentPosition { target: f64, current: f64 },
    #[error("distance {target} must be between {start} and {end}")]
    OutOfRange { target: f64, start: f64, end: f64 },
    #[error("vehicle is not moving (speed {speed} m/s), arrival cannot be predicted")]
    StationaryVehicle { speed: f64 },
    #[error("arrival {seconds}s ahead is beyond the representable time range")]
    EtaOverflow { seconds: f64 },
    #[error("invalid route: {0}")]
    InvalidRoute(String),
    #[error("fix index {index} is out of bounds for {len} fixes")]
    MissingFix { index: isize, len: usize },
    #[error("no route vertex at ({lat}, {lon})")]
    UnknownVertex { lat: f64, lon: f64 },
    #[error("no route vertex at distance {0}m")]
    UnknownDistance(f64),
    #[error("spatial index rejected route geometry: {0}")]
    SpatialIndex(String),
    #[error("shape lookup failed: {0}")]
    Lookup(#[from] StoreError),
}
