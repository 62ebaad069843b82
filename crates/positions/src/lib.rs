//! # Vehicle Positions
//!
//! Reconciles vehicle reports from a push stream and a periodic pull into
//! one canonical state per vehicle, ordered by report timestamp. Accepted
//! reports are snapped onto their route's geometry and published to the
//! route's topic.

mod feed;
mod models;
mod pull;
mod routes;
mod sequencer;

pub use realtime::{Clock, Error, HttpRequest, Message, Publisher, Result, SystemClock};

pub use self::feed::*;
pub use self::models::*;
pub use self::pull::fetch;
pub use self::routes::*;
pub use self::sequencer::*;

/// Provider entry point implemented by the host application.
pub trait Provider: HttpRequest + Publisher + Clock + RouteGeometry {}

impl<T> Provider for T where T: HttpRequest + Publisher + Clock + RouteGeometry {}
