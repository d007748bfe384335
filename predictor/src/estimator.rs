use chrono::{DateTime, TimeDelta, Utc};

use crate::error::PredictionError;
use crate::geo::{distance_along_route, find_surrounding_distances, interpolate_point};
use crate::models::{
    ArrivalEstimate, CorrectedPosition, GeoPoint, GpsFix, PositionEstimate, Route, ShapeId,
    SpeedEstimate, TravelMetrics,
};
use crate::projector::RouteProjector;
use crate::store::{ShapeStore, vertex_at_distance, vertex_near};

/// Scalar lookups against a route's cumulative-distance table.
pub trait ShapeLookup: Sync {
    /// Cumulative distance of the vertex at `point`.
    fn distance_traveled(&self, point: GeoPoint) -> Result<f64, PredictionError>;

    /// Coordinates of the vertex at cumulative `distance`.
    fn coordinates_at(&self, distance: f64) -> Result<GeoPoint, PredictionError>;
}

impl ShapeLookup for Route {
    fn distance_traveled(&self, point: GeoPoint) -> Result<f64, PredictionError> {
        vertex_near(self.vertices(), point)
            .map(|v| v.dist_traveled)
            .ok_or(PredictionError::UnknownVertex {
                lat: point.lat,
                lon: point.lon,
            })
    }

    fn coordinates_at(&self, distance: f64) -> Result<GeoPoint, PredictionError> {
        vertex_at_distance(self.vertices(), distance)
            .map(|v| v.point)
            .ok_or(PredictionError::UnknownDistance(distance))
    }
}

/// Lookups answered by a [`ShapeStore`] for one shape.
pub struct StoredShape<'a, S> {
    store: &'a S,
    shape: ShapeId,
}

impl<'a, S: ShapeStore> StoredShape<'a, S> {
    pub fn new(store: &'a S, shape: ShapeId) -> Self {
        Self { store, shape }
    }
}

impl<S: ShapeStore> ShapeLookup for StoredShape<'_, S> {
    fn distance_traveled(&self, point: GeoPoint) -> Result<f64, PredictionError> {
        self.store
            .dist_traveled(self.shape, point)?
            .ok_or(PredictionError::UnknownVertex {
                lat: point.lat,
                lon: point.lon,
            })
    }

    fn coordinates_at(&self, distance: f64) -> Result<GeoPoint, PredictionError> {
        self.store
            .coordinates(self.shape, distance)?
            .ok_or(PredictionError::UnknownDistance(distance))
    }
}

/// Turns corrected route positions into speeds and extrapolations.
pub struct TravelEstimator<'a, L> {
    projector: &'a RouteProjector,
    lookup: &'a L,
    /// Projection tolerance in degrees.
    max_distance: f64,
}

impl<'a, L: ShapeLookup> TravelEstimator<'a, L> {
    pub fn new(projector: &'a RouteProjector, lookup: &'a L, max_distance: f64) -> Self {
        Self {
            projector,
            lookup,
            max_distance,
        }
    }

    /// Absolute distance along the route of an already corrected position.
    pub fn absolute_distance(&self, corrected: &CorrectedPosition) -> Result<f64, PredictionError> {
        let (start, end) = rayon::join(
            || self.lookup.distance_traveled(corrected.segment.start),
            || self.lookup.distance_traveled(corrected.segment.end),
        );
        Ok(along_segment(corrected, start?, end?))
    }

    /// Projects `point` onto the route and returns it with its absolute distance.
    pub fn locate(&self, point: GeoPoint) -> Result<(CorrectedPosition, f64), PredictionError> {
        let corrected = self.projector.project(point, self.max_distance)?;
        let distance = self.absolute_distance(&corrected)?;
        Ok((corrected, distance))
    }

    /// Average speed between two fixes of the history.
    ///
    /// Indices follow slice semantics with negative values counted from the
    /// end, so `(0, -1)` spans the whole history.
    pub fn estimate_speed(
        &self,
        fixes: &[GpsFix],
        first_index: isize,
        last_index: isize,
    ) -> Result<SpeedEstimate, PredictionError> {
        let first_fix = fixes[resolve_index(fixes.len(), first_index)?];
        let last_fix = fixes[resolve_index(fixes.len(), last_index)?];
        tracing::debug!("first position: {:?}", first_fix.point);
        tracing::debug!("last position: {:?}", last_fix.point);

        let first = self.projector.project(first_fix.point, self.max_distance)?;
        let last = self.projector.project(last_fix.point, self.max_distance)?;

        // The four endpoint lookups are independent of each other.
        let ((first_a, first_b), (last_a, last_b)) = rayon::join(
            || {
                rayon::join(
                    || self.lookup.distance_traveled(first.segment.start),
                    || self.lookup.distance_traveled(first.segment.end),
                )
            },
            || {
                rayon::join(
                    || self.lookup.distance_traveled(last.segment.start),
                    || self.lookup.distance_traveled(last.segment.end),
                )
            },
        );
        let (first_a, first_b, last_a, last_b) = (first_a?, first_b?, last_a?, last_b?);
        tracing::debug!(
            "segment endpoint distances: first [{first_a}m, {first_b}m], last [{last_a}m, {last_b}m]"
        );

        let first_distance = along_segment(&first, first_a, first_b);
        let last_distance = along_segment(&last, last_a, last_b);
        tracing::info!(
            "first point distance traveled: {first_distance:.2}m | last point distance traveled: {last_distance:.2}m"
        );

        let elapsed_seconds = seconds_between(first_fix.timestamp, last_fix.timestamp);
        if elapsed_seconds <= 0.0 {
            return Err(PredictionError::InvalidInterval {
                seconds: elapsed_seconds,
            });
        }

        let distance_traveled = (last_distance - first_distance).abs();
        let average_speed = distance_traveled / elapsed_seconds;
        tracing::info!(
            "time elapsed: {elapsed_seconds}s, average speed: {average_speed:.3} m/s or {:.2} km/h",
            average_speed * 3.6
        );

        Ok(SpeedEstimate {
            metrics: TravelMetrics {
                distance_traveled,
                elapsed_seconds,
                average_speed,
            },
            first,
            last,
            first_distance,
            last_distance,
            last_timestamp: last_fix.timestamp,
        })
    }

    /// Where the vehicle will be after `seconds` at constant `speed`.
    pub fn predict_position_after(
        &self,
        seconds: f64,
        speed: f64,
        last_distance: f64,
        table: &[f64],
    ) -> Result<PositionEstimate, PredictionError> {
        let target = last_distance + speed * seconds;
        self.position_at_distance(table, target)
    }

    /// Interpolated coordinates at cumulative `distance` along the route.
    pub fn position_at_distance(
        &self,
        table: &[f64],
        distance: f64,
    ) -> Result<PositionEstimate, PredictionError> {
        let (left, right) = find_surrounding_distances(table, distance)?;
        let (left_point, right_point) = rayon::join(
            || self.lookup.coordinates_at(left),
            || self.lookup.coordinates_at(right),
        );
        let point = interpolate_point(left_point?, left, right_point?, right, distance)?;
        tracing::debug!("position at {distance:.2}m lies between {left}m and {right}m");
        Ok(PositionEstimate { point, distance })
    }
}

/// Time to reach `target_distance` from `last_distance` at constant `speed`.
pub fn predict_arrival(
    target_distance: f64,
    speed: f64,
    last_distance: f64,
    last_timestamp: DateTime<Utc>,
) -> Result<ArrivalEstimate, PredictionError> {
    if target_distance < last_distance {
        return Err(PredictionError::BehindCurrentPosition {
            target: target_distance,
            current: last_distance,
        });
    }
    if target_distance == last_distance {
        return Ok(ArrivalEstimate {
            eta: last_timestamp,
            seconds_to_arrival: 0.0,
        });
    }
    if !(speed.is_finite() && speed > 0.0) {
        return Err(PredictionError::StationaryVehicle { speed });
    }

    let seconds_to_arrival = (target_distance - last_distance) / speed;
    let eta = offset_by_seconds(last_timestamp, seconds_to_arrival)
        .ok_or(PredictionError::EtaOverflow {
            seconds: seconds_to_arrival,
        })?;
    Ok(ArrivalEstimate {
        eta,
        seconds_to_arrival,
    })
}

pub fn offset_by_seconds(timestamp: DateTime<Utc>, seconds: f64) -> Option<DateTime<Utc>> {
    let millis = (seconds * 1000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    TimeDelta::try_milliseconds(millis as i64).and_then(|delta| timestamp.checked_add_signed(delta))
}

/// Elapsed seconds with microsecond resolution.
fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(micros) => micros as f64 / 1e6,
        None => delta.num_milliseconds() as f64 / 1000.0,
    }
}

fn along_segment(corrected: &CorrectedPosition, start_distance: f64, end_distance: f64) -> f64 {
    start_distance
        + distance_along_route(
            corrected.segment.start,
            corrected.segment.end,
            corrected.point,
            end_distance - start_distance,
        )
}

fn resolve_index(len: usize, index: isize) -> Result<usize, PredictionError> {
    let resolved = if index < 0 {
        len.checked_sub(index.unsigned_abs())
    } else {
        Some(index.unsigned_abs()).filter(|i| *i < len)
    };
    resolved.ok_or(PredictionError::MissingFix { index, len })
}
