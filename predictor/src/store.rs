//! Collaborators that supply route geometry and vehicle telemetry.
//!
//! The prediction core only consumes these traits. The in-memory stores back
//! the CLI (loaded from JSON files) and the tests.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{GeoPoint, GpsFix, RouteVertex, ShapeId};

/// Degrees within which a coordinate lookup matches a stored vertex.
pub const COORDINATE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read data file: {0}")]
    Io(#[from] io::Error),
    #[error("invalid data file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("shape {0} not found")]
    UnknownShape(ShapeId),
    #[error("no positions recorded for vehicle {0}")]
    UnknownVehicle(String),
}

/// Relational side: route vertices and per-vertex distance lookups.
pub trait ShapeStore: Send + Sync {
    /// Vertices ordered by sequence.
    fn shape_points(&self, shape: ShapeId) -> Result<Vec<RouteVertex>, StoreError>;

    /// Distance traveled at the vertex nearest to `point`, within [`COORDINATE_TOLERANCE`].
    fn dist_traveled(&self, shape: ShapeId, point: GeoPoint) -> Result<Option<f64>, StoreError>;

    /// Coordinates of the first vertex at exactly `distance`.
    fn coordinates(&self, shape: ShapeId, distance: f64) -> Result<Option<GeoPoint>, StoreError>;
}

/// Time-series side: position history per vehicle.
pub trait TelemetryStore: Send + Sync {
    /// Fixes ordered by timestamp, oldest first.
    fn positions(&self, vehicle: &str) -> Result<Vec<GpsFix>, StoreError>;
}

/// Returns the vertex nearest to `point` among those within tolerance on both axes.
///
/// Equally near vertices resolve to the earliest in sequence.
pub fn vertex_near(vertices: &[RouteVertex], point: GeoPoint) -> Option<&RouteVertex> {
    vertices
        .iter()
        .filter_map(|v| {
            let dlat = (v.point.lat - point.lat).abs();
            let dlon = (v.point.lon - point.lon).abs();
            (dlat < COORDINATE_TOLERANCE && dlon < COORDINATE_TOLERANCE)
                .then(|| (v, dlat * dlat + dlon * dlon))
        })
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(v, _)| v)
}

pub fn vertex_at_distance(vertices: &[RouteVertex], distance: f64) -> Option<&RouteVertex> {
    vertices.iter().find(|v| v.dist_traveled == distance)
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryShapeStore {
    shapes: HashMap<ShapeId, Vec<RouteVertex>>,
}

impl InMemoryShapeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, shape: ShapeId, mut vertices: Vec<RouteVertex>) {
        vertices.sort_by_key(|v| v.sequence);
        self.shapes.insert(shape, vertices);
    }

    pub fn from_files(files: impl IntoIterator<Item = ShapeFile>) -> Self {
        let mut store = Self::new();
        for file in files {
            let shape_id = file.shape_id;
            store.insert(shape_id, file.into_vertices());
        }
        store
    }

    fn vertices(&self, shape: ShapeId) -> Result<&[RouteVertex], StoreError> {
        self.shapes
            .get(&shape)
            .map(Vec::as_slice)
            .ok_or(StoreError::UnknownShape(shape))
    }
}

impl ShapeStore for InMemoryShapeStore {
    fn shape_points(&self, shape: ShapeId) -> Result<Vec<RouteVertex>, StoreError> {
        self.vertices(shape).map(<[RouteVertex]>::to_vec)
    }

    fn dist_traveled(&self, shape: ShapeId, point: GeoPoint) -> Result<Option<f64>, StoreError> {
        Ok(vertex_near(self.vertices(shape)?, point).map(|v| v.dist_traveled))
    }

    fn coordinates(&self, shape: ShapeId, distance: f64) -> Result<Option<GeoPoint>, StoreError> {
        Ok(vertex_at_distance(self.vertices(shape)?, distance).map(|v| v.point))
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryTelemetryStore {
    tracks: HashMap<String, Vec<GpsFix>>,
}

impl InMemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, vehicle: impl Into<String>, mut fixes: Vec<GpsFix>) {
        fixes.sort_by_key(|f| f.timestamp);
        self.tracks.insert(vehicle.into(), fixes);
    }

    pub fn from_files(files: impl IntoIterator<Item = TrackFile>) -> Self {
        let mut store = Self::new();
        for file in files {
            let vehicle = file.vehicle_id.clone();
            store.insert(vehicle, file.into_fixes());
        }
        store
    }
}

impl TelemetryStore for InMemoryTelemetryStore {
    fn positions(&self, vehicle: &str) -> Result<Vec<GpsFix>, StoreError> {
        self.tracks
            .get(vehicle)
            .filter(|fixes| !fixes.is_empty())
            .cloned()
            .ok_or_else(|| StoreError::UnknownVehicle(vehicle.to_string()))
    }
}

/// On-disk shape: one row per vertex, as exported from a GTFS `shapes` table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShapeFile {
    pub shape_id: ShapeId,
    pub points: Vec<ShapePointRecord>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ShapePointRecord {
    pub lat: f64,
    pub lon: f64,
    pub sequence: u32,
    pub dist_traveled: f64,
}

impl ShapeFile {
    pub fn read_from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, StoreError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn into_vertices(self) -> Vec<RouteVertex> {
        self.points
            .into_iter()
            .map(|record| RouteVertex {
                point: GeoPoint::new(record.lat, record.lon),
                sequence: record.sequence,
                dist_traveled: record.dist_traveled,
            })
            .collect()
    }
}

/// On-disk position history of one vehicle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackFile {
    pub vehicle_id: String,
    pub fixes: Vec<FixRecord>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FixRecord {
    pub lat: f64,
    pub lon: f64,
    pub time: DateTime<Utc>,
}

impl TrackFile {
    pub fn read_from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, StoreError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn into_fixes(self) -> Vec<GpsFix> {
        self.fixes
            .into_iter()
            .map(|record| GpsFix {
                point: GeoPoint::new(record.lat, record.lon),
                timestamp: record.time,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SHAPE_JSON: &str = r#"{
        "shape_id": 42,
        "points": [
            {"lat": 40.001, "lon": -3.7, "sequence": 2, "dist_traveled": 111.2},
            {"lat": 40.0, "lon": -3.7, "sequence": 1, "dist_traveled": 0.0}
        ]
    }"#;

    const TRACK_JSON: &str = r#"{
        "vehicle_id": "buses:712",
        "fixes": [
            {"lat": 40.0008, "lon": -3.7, "time": "2025-05-01T08:01:00Z"},
            {"lat": 40.0002, "lon": -3.7, "time": "2025-05-01T08:00:00Z"}
        ]
    }"#;

    fn shape_store() -> InMemoryShapeStore {
        InMemoryShapeStore::from_files([ShapeFile::from_reader(SHAPE_JSON.as_bytes()).unwrap()])
    }

    #[test]
    fn shape_file_keeps_lat_lon_order() {
        let vertices = shape_store().shape_points(42).unwrap();
        assert_eq!(vertices[0].point, GeoPoint::new(40.0, -3.7));
        assert_eq!(vertices[1].point.lat, 40.001);
        assert_eq!(vertices[1].point.lon, -3.7);
    }

    #[test]
    fn shape_points_are_ordered_by_sequence() {
        let vertices = shape_store().shape_points(42).unwrap();
        let sequences: Vec<u32> = vertices.iter().map(|v| v.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[test]
    fn dist_traveled_matches_within_tolerance() {
        let store = shape_store();
        let near = GeoPoint::new(40.001 + 5e-7, -3.7 - 5e-7);
        assert_eq!(store.dist_traveled(42, near).unwrap(), Some(111.2));
        let off = GeoPoint::new(40.001 + 5e-6, -3.7);
        assert_eq!(store.dist_traveled(42, off).unwrap(), None);
    }

    #[test]
    fn dist_traveled_prefers_nearest_vertex_on_closed_loop() {
        let mut store = InMemoryShapeStore::new();
        store.insert(
            5,
            [(40.0, 0.0), (40.001, 111.2), (40.0000005, 222.4)]
                .iter()
                .enumerate()
                .map(|(i, (lat, d))| RouteVertex {
                    point: GeoPoint::new(*lat, -3.7),
                    sequence: i as u32,
                    dist_traveled: *d,
                })
                .collect(),
        );
        assert_eq!(store.dist_traveled(5, GeoPoint::new(40.0000005, -3.7)).unwrap(), Some(222.4));
        assert_eq!(store.dist_traveled(5, GeoPoint::new(40.0, -3.7)).unwrap(), Some(0.0));
        assert_eq!(store.dist_traveled(5, GeoPoint::new(40.0000004, -3.7)).unwrap(), Some(222.4));
    }

    #[test]
    fn dist_traveled_rejects_swapped_coordinates() {
        let store = shape_store();
        assert_eq!(store.dist_traveled(42, GeoPoint::new(-3.7, 40.0)).unwrap(), None);
    }

    #[test]
    fn coordinates_by_distance() {
        let store = shape_store();
        assert_eq!(
            store.coordinates(42, 111.2).unwrap(),
            Some(GeoPoint::new(40.001, -3.7))
        );
        assert_eq!(store.coordinates(42, 50.0).unwrap(), None);
    }

    #[test]
    fn unknown_shape_is_an_error() {
        assert!(matches!(
            shape_store().shape_points(1),
            Err(StoreError::UnknownShape(1))
        ));
    }

    #[test]
    fn track_is_sorted_by_time() {
        let track = TrackFile::from_reader(TRACK_JSON.as_bytes()).unwrap();
        let store = InMemoryTelemetryStore::from_files([track]);
        let fixes = store.positions("buses:712").unwrap();
        assert!(fixes[0].timestamp < fixes[1].timestamp);
        assert_eq!(fixes[0].point, GeoPoint::new(40.0002, -3.7));
    }

    #[test]
    fn unknown_vehicle_is_an_error() {
        let store = InMemoryTelemetryStore::new();
        assert!(matches!(
            store.positions("buses:1"),
            Err(StoreError::UnknownVehicle(_))
        ));
    }

    #[test]
    fn files_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SHAPE_JSON.as_bytes()).unwrap();
        let shape = ShapeFile::read_from_path(file.path()).unwrap();
        assert_eq!(shape.shape_id, 42);
        assert_eq!(shape.points.len(), 2);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        assert!(matches!(
            ShapeFile::from_reader(&b"{\"shape_id\": 1}"[..]),
            Err(StoreError::Parse(_))
        ));
        assert!(matches!(
            TrackFile::read_from_path("/nonexistent/track.json"),
            Err(StoreError::Io(_))
        ));
    }
}
