//! # Geometry Errors

use thiserror::Error;

/// Errors raised while constructing projections and polylines.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum Error {
    #[error("code: too_few_points, description: polyline needs 2 distinct points, got {0}")]
    TooFewPoints(usize),

    #[error("code: invalid_distances, description: {0}")]
    InvalidDistances(String),

    #[error("code: invalid_radius, description: {0}")]
    InvalidRadius(f64),

    #[error("code: invalid_center, description: centre {0} is outside the projectable range")]
    InvalidCenter(String),
}

impl Error {
    /// Returns the error code.
    #[must_use]
    pub const fn code(&self) -> &str {
        match self {
            Self::TooFewPoints(_) => "too_few_points",
            Self::InvalidDistances(_) => "invalid_distances",
            Self::InvalidRadius(_) => "invalid_radius",
            Self::InvalidCenter(_) => "invalid_center",
        }
    }
}
