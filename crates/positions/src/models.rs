use std::fmt;
use std::str::FromStr;

use geometry::GeoPoint;
use realtime::{Error, invalid_format};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Direction of travel along a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Direction {
    Outbound = 0,
    Inbound = 1,
}

impl Direction {
    /// Index of the route polyline for this direction.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<i64> for Direction {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Outbound),
            1 => Ok(Self::Inbound),
            _ => Err(invalid_format!("direction {value}")),
        }
    }
}

/// Passenger occupancy, as named by GTFS-realtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OccupancyStatus {
    Empty,
    ManySeatsAvailable,
    FewSeatsAvailable,
    StandingRoomOnly,
    CrushedStandingRoomOnly,
    Full,
    NotAcceptingPassengers,
    NoDataAvailable,
    NotBoardable,
}

impl FromStr for OccupancyStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "EMPTY" => Self::Empty,
            "MANY_SEATS_AVAILABLE" => Self::ManySeatsAvailable,
            "FEW_SEATS_AVAILABLE" => Self::FewSeatsAvailable,
            "STANDING_ROOM_ONLY" => Self::StandingRoomOnly,
            "CRUSHED_STANDING_ROOM_ONLY" => Self::CrushedStandingRoomOnly,
            "FULL" => Self::Full,
            "NOT_ACCEPTING_PASSENGERS" => Self::NotAcceptingPassengers,
            "NO_DATA_AVAILABLE" => Self::NoDataAvailable,
            "NOT_BOARDABLE" => Self::NotBoardable,
            _ => return Err(invalid_format!("occupancy status {s}")),
        };
        Ok(status)
    }
}

/// Feed a report arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Push,
    Pull,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Pull => write!(f, "pull"),
        }
    }
}

/// A vehicle report after normalization, before sequencing.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub vehicle_id: String,
    pub route_id: String,
    pub direction: Direction,

    /// Reported position. Absent when the report carried no usable
    /// coordinates.
    pub position: Option<GeoPoint>,

    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub occupancy_status: Option<OccupancyStatus>,
    pub source: Source,
}

/// Latest accepted state of a vehicle, as published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleState {
    pub vehicle_id: String,
    pub route_id: String,
    pub direction_id: Direction,

    /// Position as reported by the vehicle.
    pub position: GeoPoint,

    /// Report time in seconds since the Unix epoch.
    pub timestamp: i64,

    /// Position snapped onto the route.
    pub snapped: GeoPoint,

    /// Distance in meters between the reported and snapped positions.
    pub deviation: f64,

    /// Compass bearing of the route at the snapped position.
    pub bearing: f64,

    /// Distance along the route to the snapped position.
    pub distance_along: f64,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub occupancy_status: Option<OccupancyStatus>,
}
