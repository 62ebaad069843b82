//! Route geometry reference.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use geometry::{GeoPoint, LocalProjection, PlanarPoint, Polyline, Projection};

use crate::models::Direction;

/// Planar geometry for both directions of a route.
#[derive(Debug, Clone)]
pub struct RouteShape {
    short_name: String,
    directions: [Polyline; 2],
    projection: LocalProjection,
}

impl RouteShape {
    /// Build a route from geographic shapes, deriving cumulative distances in
    /// meters.
    ///
    /// # Errors
    ///
    /// Returns an error when either shape has fewer than two distinct points.
    pub fn new(
        short_name: impl Into<String>, projection: LocalProjection, outbound: &[GeoPoint],
        inbound: &[GeoPoint],
    ) -> geometry::Result<Self> {
        Ok(Self {
            short_name: short_name.into(),
            directions: [measured(&projection, outbound)?, measured(&projection, inbound)?],
            projection,
        })
    }

    /// Build a route from geographic shapes carrying their own cumulative
    /// distances, such as GTFS `shape_dist_traveled`.
    ///
    /// # Errors
    ///
    /// Returns an error when either shape has fewer than two distinct points
    /// or its distances are negative or decreasing.
    pub fn with_distances(
        short_name: impl Into<String>, projection: LocalProjection, outbound: &[(GeoPoint, f64)],
        inbound: &[(GeoPoint, f64)],
    ) -> geometry::Result<Self> {
        let project = |shape: &[(GeoPoint, f64)]| {
            Polyline::with_distances(
                shape.iter().map(|(point, distance)| (projection.to_planar(*point), *distance)),
            )
        };

        Ok(Self {
            short_name: short_name.into(),
            directions: [project(outbound)?, project(inbound)?],
            projection,
        })
    }

    /// Pub/sub topic for the route.
    #[must_use]
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    #[must_use]
    pub const fn polyline(&self, direction: Direction) -> &Polyline {
        &self.directions[direction.index()]
    }

    #[must_use]
    pub const fn projection(&self) -> &LocalProjection {
        &self.projection
    }
}

fn measured(projection: &LocalProjection, shape: &[GeoPoint]) -> geometry::Result<Polyline> {
    let meters_per_pixel = projection.meters_per_pixel(projection.center().lat);
    let mut previous: Option<PlanarPoint> = None;
    let mut travelled = 0.0;

    let points = shape.iter().map(|point| {
        let planar = projection.to_planar(*point);
        if let Some(previous) = previous {
            travelled += previous.distance(planar) * meters_per_pixel;
        }
        previous = Some(planar);
        (planar, travelled)
    });

    Polyline::with_distances(points)
}

/// Looks up route geometry by route id.
pub trait RouteGeometry: Send + Sync {
    /// Geometry for `route_id`, or `None` when the route is not loaded.
    fn route(&self, route_id: &str) -> Option<Arc<RouteShape>>;
}

/// Route lookup table that can be swapped while in use.
///
/// Readers take a snapshot of the whole table, so a concurrent
/// [`RouteTable::replace`] is observed either entirely or not at all.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: RwLock<Arc<HashMap<String, Arc<RouteShape>>>>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole table, e.g. on a schedule version rollover.
    pub fn replace(&self, routes: HashMap<String, RouteShape>) {
        let routes = routes.into_iter().map(|(id, shape)| (id, Arc::new(shape))).collect();
        *self.routes.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(routes);
    }

    /// Add or replace a single route.
    pub fn insert(&self, route_id: impl Into<String>, shape: RouteShape) {
        let mut guard = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let mut routes = HashMap::clone(&guard);
        routes.insert(route_id.into(), Arc::new(shape));
        *guard = Arc::new(routes);
    }

    /// Snapshot of the current table.
    #[must_use]
    pub fn snapshot(&self) -> Arc<HashMap<String, Arc<RouteShape>>> {
        Arc::clone(&self.routes.read().unwrap_or_else(PoisonError::into_inner))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

impl RouteGeometry for RouteTable {
    fn route(&self, route_id: &str) -> Option<Arc<RouteShape>> {
        self.snapshot().get(route_id).cloned()
    }
}
