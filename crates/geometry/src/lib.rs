//! # Geometry
//!
//! Converts geographic coordinates to a planar coordinate system and snaps
//! noisy positions onto route polylines.

mod error;
mod point;
mod polyline;
mod projection;

pub use self::error::Error;
pub use self::point::{GeoPoint, PlanarPoint};
pub use self::polyline::{Polyline, Snap, bearing};
pub use self::projection::{GlobalProjection, LocalProjection, Projection, TILE_SIZE};

/// Result type for geometry construction.
pub type Result<T> = std::result::Result<T, Error>;
