use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    num::NonZeroUsize,
    sync::{Arc, Mutex, MutexGuard},
};

use lru::LruCache;

use crate::error::PredictionError;
use crate::models::{Route, ShapeId};
use crate::projector::RouteProjector;

struct CachedIndex {
    fingerprint: u64,
    projector: Arc<RouteProjector>,
}

/// LRU cache of route spatial indexes, keyed by shape id.
///
/// Cached projectors are immutable and shared through `Arc`. An entry whose
/// geometry no longer matches the route it was built from is rebuilt.
pub struct RouteIndexCache {
    entries: Mutex<LruCache<ShapeId, CachedIndex>>,
}

impl RouteIndexCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get_or_build(
        &self,
        shape_id: ShapeId,
        route: &Route,
        neighbors: usize,
    ) -> Result<Arc<RouteProjector>, PredictionError> {
        let fingerprint = geometry_fingerprint(route, neighbors);

        if let Some(entry) = self.lock().get(&shape_id) {
            if entry.fingerprint == fingerprint {
                tracing::debug!("route index cache hit for shape {shape_id}");
                return Ok(Arc::clone(&entry.projector));
            }
            tracing::info!("geometry of shape {shape_id} changed, rebuilding index");
        }

        // Built outside the lock so concurrent requests on other shapes don't wait.
        let projector = Arc::new(RouteProjector::new(&route.points())?.with_neighbors(neighbors));
        self.lock().put(
            shape_id,
            CachedIndex {
                fingerprint,
                projector: Arc::clone(&projector),
            },
        );
        tracing::debug!(
            "cached route index for shape {shape_id} ({} vertices)",
            route.vertices().len()
        );
        Ok(projector)
    }

    pub fn invalidate(&self, shape_id: ShapeId) -> bool {
        self.lock().pop(&shape_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<ShapeId, CachedIndex>> {
        // Entries are never left half-written, so a poisoned lock is still usable.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn geometry_fingerprint(route: &Route, neighbors: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    neighbors.hash(&mut hasher);
    for vertex in route.vertices() {
        vertex.point.lat.to_bits().hash(&mut hasher);
        vertex.point.lon.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}
