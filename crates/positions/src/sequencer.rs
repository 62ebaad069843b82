//! Update sequencing and route snapping.

use std::time::Duration;

use geometry::{GeoPoint, Projection};
use realtime::{Clock, Message, Publisher, Result};
use tracing::{debug, error, info, warn};
use ttl_cache::TtlCache;

use crate::Provider;
use crate::feed::RawUpdate;
use crate::models::{Observation, VehicleState};
use crate::routes::{RouteGeometry, RouteShape};

/// Sequencer tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerConfig {
    /// How long a vehicle's state is kept without a newer report.
    pub state_ttl: Duration,

    /// Reports older than this on arrival are dropped.
    pub stale_after: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self { state_ttl: Duration::from_secs(120), stale_after: Duration::from_secs(120) }
    }
}

/// Why a report was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Older than the staleness window on arrival.
    Stale,
    /// Route geometry is not loaded.
    UnknownRoute,
    /// A newer report for the vehicle has already been applied.
    OutOfOrder,
    /// The report carried no usable position.
    NoPosition,
}

/// Result of processing a report.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accepted(VehicleState),
    Rejected(Rejection),
}

/// Applies vehicle reports in source-timestamp order and publishes the
/// snapped state of each accepted report.
pub struct Sequencer<P> {
    provider: P,
    config: SequencerConfig,
    states: TtlCache<String, VehicleState>,
}

impl<P: Provider> Sequencer<P> {
    pub fn new(provider: P, config: SequencerConfig) -> Self {
        Self { provider, config, states: TtlCache::new() }
    }

    /// Normalize and apply a raw report.
    ///
    /// # Errors
    ///
    /// Returns an error when the report fails normalization. Rejections are
    /// reported through [`Outcome::Rejected`].
    pub async fn process(&mut self, raw: RawUpdate) -> Result<Outcome> {
        let observation = raw.normalize()?;
        Ok(self.apply(observation).await)
    }

    /// Apply a normalized report.
    pub async fn apply(&mut self, observation: Observation) -> Outcome {
        let vehicle_id = observation.vehicle_id.as_str();

        let now = Clock::now(&self.provider).timestamp();
        let window = i64::try_from(self.config.stale_after.as_secs()).unwrap_or(i64::MAX);
        if observation.timestamp < now.saturating_sub(window) {
            debug!(vehicle_id, timestamp = observation.timestamp, source = %observation.source, "stale update");
            return Outcome::Rejected(Rejection::Stale);
        }

        let Some(route) = RouteGeometry::route(&self.provider, &observation.route_id) else {
            warn!(
                monotonic_counter.route_not_loaded = 1,
                vehicle_id,
                route_id = %observation.route_id,
                "route geometry not loaded"
            );
            return Outcome::Rejected(Rejection::UnknownRoute);
        };

        if let Some(current) = self.states.get(vehicle_id)
            && current.timestamp > observation.timestamp
        {
            debug!(
                vehicle_id,
                current = current.timestamp,
                timestamp = observation.timestamp,
                source = %observation.source,
                "out of order update"
            );
            return Outcome::Rejected(Rejection::OutOfOrder);
        }

        let Some(position) = observation.position else {
            debug!(vehicle_id, "update has no position");
            return Outcome::Rejected(Rejection::NoPosition);
        };

        let state = locate(&route, observation, position);
        self.states.set(state.vehicle_id.clone(), state.clone(), self.config.state_ttl);
        self.publish(route.short_name(), &state).await;

        Outcome::Accepted(state)
    }

    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Current state of a vehicle.
    pub fn state(&self, vehicle_id: &str) -> Option<&VehicleState> {
        self.states.get(vehicle_id)
    }

    /// States of every vehicle with a live report.
    pub fn states(&self) -> impl Iterator<Item = &VehicleState> {
        self.states.values()
    }

    /// Evict expired vehicle states. Returns the number evicted.
    pub fn sweep(&mut self) -> usize {
        let evicted = self.states.purge_expired();
        for (vehicle_id, state) in &evicted {
            debug!(vehicle_id, route_id = %state.route_id, "vehicle state expired");
        }
        debug!(gauge.vehicle_states = self.states.len(), "swept vehicle states");
        evicted.len()
    }

    /// Drop every vehicle state.
    pub fn clear(&mut self) {
        self.states.clear();
    }

    // Best-effort: failures are logged and never returned.
    async fn publish(&self, topic: &str, state: &VehicleState) {
        let payload = match serde_json::to_vec(state) {
            Ok(payload) => payload,
            Err(e) => {
                error!("failed to serialize vehicle state: {e}");
                return;
            }
        };
        let message = Message::new(&payload).with_header("key", &state.vehicle_id);

        match Publisher::send(&self.provider, topic, &message).await {
            Ok(()) => info!(
                monotonic_counter.position_published = 1,
                vehicle_id = %state.vehicle_id,
                topic,
                "published vehicle position"
            ),
            Err(e) => error!(
                monotonic_counter.position_publish_failed = 1,
                vehicle_id = %state.vehicle_id,
                topic,
                "failed to publish vehicle position: {e}"
            ),
        }
    }
}

fn locate(route: &RouteShape, observation: Observation, position: GeoPoint) -> VehicleState {
    let projection = route.projection();
    let polyline = route.polyline(observation.direction);

    let snap = polyline.snap(projection.to_planar(position));

    VehicleState {
        vehicle_id: observation.vehicle_id,
        route_id: observation.route_id,
        direction_id: observation.direction,
        position,
        timestamp: observation.timestamp,
        snapped: projection.to_geo(snap.point, true),
        deviation: snap.offset * projection.meters_per_pixel(position.lat),
        bearing: polyline.bearing_at(&snap),
        distance_along: snap.distance_along,
        occupancy_status: observation.occupancy_status,
    }
}
