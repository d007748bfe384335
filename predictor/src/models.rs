use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use shared::GeoPoint;

use crate::error::PredictionError;

pub type ShapeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteVertex {
    pub point: GeoPoint,
    pub sequence: u32,
    /// Meters from the start of the route.
    pub dist_traveled: f64,
}

/// Timestamped GPS observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub point: GeoPoint,
    pub timestamp: DateTime<Utc>,
}

/// Polyline with cumulative distances, ordered by sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    vertices: Vec<RouteVertex>,
}

impl Route {
    pub fn new(mut vertices: Vec<RouteVertex>) -> Result<Self, PredictionError> {
        if vertices.len() < 2 {
            return Err(PredictionError::InvalidRoute(format!(
                "route needs at least 2 vertices, got {}",
                vertices.len()
            )));
        }
        vertices.sort_by_key(|v| v.sequence);

        if let Some(v) = vertices
            .iter()
            .find(|v| !v.point.is_finite() || !v.dist_traveled.is_finite())
        {
            return Err(PredictionError::InvalidRoute(format!(
                "vertex {} has non-finite values",
                v.sequence
            )));
        }
        if let Some(w) = vertices
            .windows(2)
            .find(|w| w[1].dist_traveled < w[0].dist_traveled)
        {
            return Err(PredictionError::InvalidRoute(format!(
                "distance decreases from {}m to {}m at vertex {}",
                w[0].dist_traveled, w[1].dist_traveled, w[1].sequence
            )));
        }

        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[RouteVertex] {
        &self.vertices
    }

    pub fn points(&self) -> Vec<GeoPoint> {
        self.vertices.iter().map(|v| v.point).collect()
    }

    /// Cumulative distances, ascending.
    pub fn distance_table(&self) -> Vec<f64> {
        self.vertices.iter().map(|v| v.dist_traveled).collect()
    }

    pub fn min_distance(&self) -> f64 {
        self.vertices[0].dist_traveled
    }

    pub fn max_distance(&self) -> f64 {
        self.vertices[self.vertices.len() - 1].dist_traveled
    }

    pub fn total_distance(&self) -> f64 {
        self.max_distance() - self.min_distance()
    }
}

/// One edge of the route polyline. `index` is the position of `start` in the route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedPosition {
    pub point: GeoPoint,
    /// Error magnitude in degree space.
    pub distance: f64,
    pub segment: Segment,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelMetrics {
    pub distance_traveled: f64,
    pub elapsed_seconds: f64,
    /// m/s
    pub average_speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedEstimate {
    pub metrics: TravelMetrics,
    pub first: CorrectedPosition,
    pub last: CorrectedPosition,
    pub first_distance: f64,
    pub last_distance: f64,
    pub last_timestamp: DateTime<Utc>,
}

impl SpeedEstimate {
    pub fn speed(&self) -> f64 {
        self.metrics.average_speed
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionEstimate {
    pub point: GeoPoint,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrivalEstimate {
    pub eta: DateTime<Utc>,
    pub seconds_to_arrival: f64,
}
