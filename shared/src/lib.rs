use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Geographic position in degrees. Field order is always (lat, lon).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "latitude")]
    pub lat: f64,
    #[serde(rename = "longitude")]
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn interpolate(self, other: Self, t: f64) -> Self {
        Self {
            lat: self.lat + (other.lat - self.lat) * t,
            lon: self.lon + (other.lon - self.lon) * t,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionPredictionRequest {
    pub vehicle_id: String,
    pub shape_id: u32,
    /// Seconds into the future.
    pub prediction_time_seconds: u32,
    #[serde(default = "default_first_index")]
    pub first_index: isize,
    #[serde(default = "default_last_index")]
    pub last_index: isize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimePredictionByCoordinatesRequest {
    pub vehicle_id: String,
    pub shape_id: u32,
    pub target_location: GeoPoint,
    #[serde(default = "default_first_index")]
    pub first_index: isize,
    #[serde(default = "default_last_index")]
    pub last_index: isize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimePredictionByDistanceRequest {
    pub vehicle_id: String,
    pub shape_id: u32,
    /// Cumulative distance along the shape, in meters.
    pub target_distance_traveled: f64,
    #[serde(default = "default_first_index")]
    pub first_index: isize,
    #[serde(default = "default_last_index")]
    pub last_index: isize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionPredictionResponse {
    pub vehicle_id: String,
    pub last_known_distance_traveled: Option<f64>,
    pub predicted_location: GeoPoint,
    pub predicted_distance_traveled: f64,
    pub target_arrival_time: Option<DateTime<Utc>>,
    pub target_seconds_to_arrival: u32,
    /// m/s
    pub average_speed: Option<f64>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimePredictionResponse {
    pub vehicle_id: String,
    pub last_known_distance_traveled: Option<f64>,
    pub target_location: GeoPoint,
    pub target_distance_traveled: Option<f64>,
    pub predicted_arrival_time: Option<DateTime<Utc>>,
    pub predicted_seconds_to_arrival: Option<f64>,
    /// m/s
    pub current_speed: Option<f64>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleDetailsResponse {
    pub vehicle_id: String,
    pub shape_id: u32,
    pub last_position: GeoPoint,
    pub last_distance_traveled: f64,
    pub total_route_distance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeDetailsResponse {
    pub shape_id: u32,
    pub points: Vec<GeoPoint>,
}

pub fn default_first_index() -> isize {
    0
}

pub fn default_last_index() -> isize {
    -1
}
