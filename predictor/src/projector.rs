use std::collections::BTreeSet;

use kdtree::KdTree;
use kdtree::distance::squared_euclidean;

use crate::error::PredictionError;
use crate::models::{CorrectedPosition, GeoPoint, Segment};

pub const DEFAULT_NEIGHBORS: usize = 2;

/// Snaps arbitrary points onto a route polyline.
///
/// # Algorithm
///
/// 1. Query the `k` route vertices closest to the target in the KD-Tree.
/// 2. Collect every segment touching one of them (predecessor and successor).
/// 3. Project the target onto each candidate, clamped to the segment, and keep
///    the closest projection.
///
/// Scoring happens in coordinate (degree) space. Meter distances are computed
/// with [`crate::geo::haversine_m`] elsewhere.
///
/// Restricting candidates to segments around the nearest vertices avoids a scan
/// over the whole route. It can pick the wrong segment when the route doubles
/// back on itself between vertices that are close in space but far apart along
/// the route; raising `k` with [`RouteProjector::with_neighbors`] helps there.
#[derive(Clone)]
pub struct RouteProjector {
    points: Vec<GeoPoint>,
    /// Spatial index over `[lat, lon]` for O(log N) nearest vertex lookup
    spatial_index: KdTree<f64, usize, [f64; 2]>,
    neighbors: usize,
}

impl RouteProjector {
    pub fn new(points: &[GeoPoint]) -> Result<Self, PredictionError> {
        if points.len() < 2 {
            return Err(PredictionError::InvalidRoute(format!(
                "route needs at least 2 points, got {}",
                points.len()
            )));
        }
        let spatial_index = Self::build_spatial_index(points)?;

        Ok(Self {
            points: points.to_vec(),
            spatial_index,
            neighbors: DEFAULT_NEIGHBORS,
        })
    }

    /// Number of nearest vertices whose incident segments are considered.
    pub fn with_neighbors(mut self, neighbors: usize) -> Self {
        self.neighbors = neighbors.max(1);
        self
    }

    pub fn neighbors(&self) -> usize {
        self.neighbors
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    fn build_spatial_index(
        points: &[GeoPoint],
    ) -> Result<KdTree<f64, usize, [f64; 2]>, PredictionError> {
        let mut tree = KdTree::new(2);
        for (idx, point) in points.iter().enumerate() {
            tree.add([point.lat, point.lon], idx)
                .map_err(|err| PredictionError::SpatialIndex(format!("{err:?} at vertex {idx}")))?;
        }
        Ok(tree)
    }

    /// Closest point of the route to `target`.
    ///
    /// Fails with [`PredictionError::PointNotOnRoute`] when that point is
    /// farther than `max_distance` degrees.
    pub fn project(
        &self,
        target: GeoPoint,
        max_distance: f64,
    ) -> Result<CorrectedPosition, PredictionError> {
        let nearest = self
            .spatial_index
            .nearest(&[target.lat, target.lon], self.neighbors, &squared_euclidean)
            .map_err(|err| PredictionError::SpatialIndex(format!("{err:?}")))?;

        let mut best: Option<CorrectedPosition> = None;
        for index in self.candidate_segments(nearest.iter().map(|(_, idx)| **idx)) {
            let segment = Segment {
                start: self.points[index],
                end: self.points[index + 1],
                index,
            };
            let (point, distance) = project_onto_segment(target, segment.start, segment.end);
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(CorrectedPosition {
                    point,
                    distance,
                    segment,
                });
            }
        }

        match best {
            Some(corrected) if corrected.distance <= max_distance => {
                tracing::debug!(
                    "projected ({}, {}) onto segment {} at distance {:.8}",
                    target.lat,
                    target.lon,
                    corrected.segment.index,
                    corrected.distance
                );
                Ok(corrected)
            }
            Some(corrected) => Err(PredictionError::PointNotOnRoute {
                distance: corrected.distance,
                max: max_distance,
            }),
            None => Err(PredictionError::PointNotOnRoute {
                distance: f64::INFINITY,
                max: max_distance,
            }),
        }
    }

    /// Start indices of the segments incident to the given vertices, in route order.
    fn candidate_segments(&self, vertices: impl Iterator<Item = usize>) -> BTreeSet<usize> {
        let last = self.points.len() - 1;
        let mut segments = BTreeSet::new();
        for idx in vertices {
            if idx > 0 {
                segments.insert(idx - 1);
            }
            if idx < last {
                segments.insert(idx);
            }
        }
        segments
    }
}

/// One-shot projection that builds the spatial index for this call only.
pub fn project(
    route: &[GeoPoint],
    target: GeoPoint,
    max_distance: f64,
) -> Result<CorrectedPosition, PredictionError> {
    RouteProjector::new(route)?.project(target, max_distance)
}

/// Orthogonal projection of `target` onto segment `p1`-`p2`, clamped to its ends.
/// Returns the projected point and its Euclidean distance to `target`.
fn project_onto_segment(target: GeoPoint, p1: GeoPoint, p2: GeoPoint) -> (GeoPoint, f64) {
    let v = (p2.lat - p1.lat, p2.lon - p1.lon);
    let w = (target.lat - p1.lat, target.lon - p1.lon);
    let b = v.0 * v.0 + v.1 * v.1;

    if b == 0.0 {
        return (p1, w.0.hypot(w.1));
    }

    let c = w.0 * v.0 + w.1 * v.1;
    let t = (c / b).clamp(0.0, 1.0);
    let point = GeoPoint::new(p1.lat + t * v.0, p1.lon + t * v.1);
    let distance = (target.lat - point.lat).hypot(target.lon - point.lon);
    (point, distance)
}
