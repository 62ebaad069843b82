//! Push and pull feed wire shapes and their normalization.
//!
//! The push feed uses camelCase names, string enums and (usually string)
//! timestamps; the pull feed uses snake_case names, numeric enums and integer
//! timestamps. Both converge on [`Observation`].

use chrono::DateTime;
use geometry::GeoPoint;
use realtime::{Error, Result, invalid_format};
use serde::{Deserialize, Deserializer};
use serde_repr::Deserialize_repr;

use crate::models::{Direction, Observation, OccupancyStatus, Source};

/// A raw report from either feed.
#[derive(Debug, Clone, PartialEq)]
pub enum RawUpdate {
    Push(PushMessage),
    Pull(PullEntity),
}

impl RawUpdate {
    /// Decode a push feed message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] when the payload is not a push message.
    pub fn from_push(payload: &[u8]) -> Result<Self> {
        let message = serde_json::from_slice(payload)?;
        Ok(Self::Push(message))
    }

    /// Convert to the canonical field set.
    ///
    /// # Errors
    ///
    /// Returns an error when a required field is missing or malformed.
    pub fn normalize(self) -> Result<Observation> {
        match self {
            Self::Push(message) => message.normalize(),
            Self::Pull(entity) => entity.normalize(),
        }
    }

    #[must_use]
    pub const fn source(&self) -> Source {
        match self {
            Self::Push(_) => Source::Push,
            Self::Pull(_) => Source::Pull,
        }
    }
}

/// Coordinates as sent by both feeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct WirePosition {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl WirePosition {
    // Both coordinates must be present and in range; nothing defaults to zero.
    fn geo(self) -> Option<GeoPoint> {
        let (Some(lat), Some(lng)) = (self.latitude, self.longitude) else {
            return None;
        };
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        valid.then_some(GeoPoint::new(lat, lng))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VehicleDescriptor {
    pub id: Option<String>,
    pub label: Option<String>,
}

/// Number that may arrive as a JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MaybeString {
    Number(i64),
    String(String),
}

impl MaybeString {
    fn as_i64(&self) -> Result<i64> {
        match self {
            Self::Number(value) => Ok(*value),
            Self::String(value) => {
                value.trim().parse().map_err(|e| invalid_format!("expected a number, got {value}: {e}"))
            }
        }
    }
}

/// Push feed message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub id: Option<String>,
    pub vehicle: Option<PushVehicle>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushVehicle {
    pub trip: Option<PushTrip>,
    pub position: Option<WirePosition>,
    pub vehicle: Option<VehicleDescriptor>,
    pub timestamp: Option<MaybeString>,
    pub occupancy_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushTrip {
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub direction_id: Option<MaybeString>,
    pub timestamp: Option<MaybeString>,
}

impl PushMessage {
    fn normalize(self) -> Result<Observation> {
        let vehicle = self.vehicle.ok_or_else(|| missing("vehicle"))?;
        let trip = vehicle.trip.ok_or_else(|| missing("vehicle.trip"))?;

        let vehicle_id = required(vehicle.vehicle.and_then(|v| v.id), "vehicle.vehicle.id")?;
        let route_id = required(trip.route_id, "vehicle.trip.routeId")?;
        let direction = trip.direction_id.ok_or_else(|| missing("vehicle.trip.directionId"))?;
        let direction = Direction::try_from(direction.as_i64()?)?;

        let timestamp = vehicle.timestamp.or(trip.timestamp).ok_or_else(|| missing("timestamp"))?;
        let timestamp = parse_timestamp(&timestamp)?;

        // unknown constants are dropped rather than failing the report
        let occupancy_status =
            vehicle.occupancy_status.as_deref().and_then(|status| status.parse().ok());

        Ok(Observation {
            vehicle_id,
            route_id,
            direction,
            position: vehicle.position.and_then(WirePosition::geo),
            timestamp,
            occupancy_status,
            source: Source::Push,
        })
    }
}

/// Pull feed entity.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PullEntity {
    pub id: Option<String>,
    pub vehicle: Option<PullVehicle>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PullVehicle {
    pub trip: Option<PullTrip>,
    pub position: Option<WirePosition>,
    pub vehicle: Option<VehicleDescriptor>,
    pub timestamp: Option<i64>,
    #[serde(default, deserialize_with = "lenient_occupancy")]
    pub occupancy_status: Option<OccupancyCode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PullTrip {
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub direction_id: Option<MaybeString>,
}

/// Numeric occupancy status used by the pull feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize_repr)]
#[repr(u8)]
pub enum OccupancyCode {
    Empty = 0,
    ManySeatsAvailable = 1,
    FewSeatsAvailable = 2,
    StandingRoomOnly = 3,
    CrushedStandingRoomOnly = 4,
    Full = 5,
    NotAcceptingPassengers = 6,
    NoDataAvailable = 7,
    NotBoardable = 8,
}

impl From<OccupancyCode> for OccupancyStatus {
    fn from(code: OccupancyCode) -> Self {
        match code {
            OccupancyCode::Empty => Self::Empty,
            OccupancyCode::ManySeatsAvailable => Self::ManySeatsAvailable,
            OccupancyCode::FewSeatsAvailable => Self::FewSeatsAvailable,
            OccupancyCode::StandingRoomOnly => Self::StandingRoomOnly,
            OccupancyCode::CrushedStandingRoomOnly => Self::CrushedStandingRoomOnly,
            OccupancyCode::Full => Self::Full,
            OccupancyCode::NotAcceptingPassengers => Self::NotAcceptingPassengers,
            OccupancyCode::NoDataAvailable => Self::NoDataAvailable,
            OccupancyCode::NotBoardable => Self::NotBoardable,
        }
    }
}

// Unknown codes are dropped rather than failing the entity.
fn lenient_occupancy<'de, D>(deserializer: D) -> std::result::Result<Option<OccupancyCode>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|code| OccupancyCode::deserialize(code).ok()))
}

impl PullEntity {
    fn normalize(self) -> Result<Observation> {
        let vehicle = self.vehicle.ok_or_else(|| missing("vehicle"))?;
        let trip = vehicle.trip.ok_or_else(|| missing("vehicle.trip"))?;

        let vehicle_id = required(vehicle.vehicle.and_then(|v| v.id), "vehicle.vehicle.id")?;
        let route_id = required(trip.route_id, "vehicle.trip.route_id")?;
        let direction = trip.direction_id.ok_or_else(|| missing("vehicle.trip.direction_id"))?;
        let direction = Direction::try_from(direction.as_i64()?)?;
        let timestamp = vehicle.timestamp.ok_or_else(|| missing("vehicle.timestamp"))?;

        Ok(Observation {
            vehicle_id,
            route_id,
            direction,
            position: vehicle.position.and_then(WirePosition::geo),
            timestamp,
            occupancy_status: vehicle.occupancy_status.map(OccupancyStatus::from),
            source: Source::Pull,
        })
    }
}

fn missing(field: &str) -> Error {
    Error::MissingField(field.to_string())
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| missing(field))
}

// Integer seconds since the epoch, or an RFC 3339 date-time.
fn parse_timestamp(value: &MaybeString) -> Result<i64> {
    let value = match value {
        MaybeString::Number(seconds) => return Ok(*seconds),
        MaybeString::String(value) => value.trim(),
    };
    if let Ok(seconds) = value.parse::<i64>() {
        return Ok(seconds);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|datetime| datetime.timestamp())
        .map_err(|e| Error::InvalidTimestamp(format!("{value}: {e}")))
}
