//! Geographic to planar projections.
//!
//! [`GlobalProjection`] is a Web Mercator projection onto a single world
//! tile. [`LocalProjection`] linearises the global projection around a centre
//! point so per-update conversions avoid transcendental functions. It is only
//! accurate within the radius it was built for.

use std::f64::consts::PI;

use crate::error::Error;
use crate::point::{GeoPoint, PlanarPoint};

/// Width and height of the world tile in pixels.
pub const TILE_SIZE: f64 = 256.0;

/// WGS84 equatorial radius, used by the Mercator scale.
const EQUATORIAL_RADIUS_M: f64 = 6_378_137.0;

/// Mean earth radius, used to offset the local projection's sample points.
const MEAN_RADIUS_M: f64 = 6_371_008.8;

/// Highest latitude Web Mercator covers on a square tile.
const MAX_LATITUDE: f64 = 85.051_128_78;

/// Keeps `ln((1 + sin) / (1 - sin))` finite at the poles.
const SIN_LIMIT: f64 = 1.0 - 1e-15;

/// Conversion between geographic and planar coordinates.
pub trait Projection {
    /// Project a geographic point onto the plane.
    fn to_planar(&self, point: GeoPoint) -> PlanarPoint;

    /// Convert a planar point back to geographic coordinates. When `wrap` is
    /// set the longitude is normalised into `[-180, 180)`.
    fn to_geo(&self, point: PlanarPoint, wrap: bool) -> GeoPoint;

    /// Ground distance covered by one planar unit at the given latitude.
    fn meters_per_pixel(&self, lat: f64) -> f64;
}

/// Web Mercator projection over a fixed tile.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalProjection;

impl Projection for GlobalProjection {
    fn to_planar(&self, point: GeoPoint) -> PlanarPoint {
        let sin_lat = point.lat.to_radians().sin().clamp(-SIN_LIMIT, SIN_LIMIT);
        let x = TILE_SIZE * (0.5 + point.lng / 360.0);
        let y = TILE_SIZE * (0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * PI));
        PlanarPoint { x, y }
    }

    fn to_geo(&self, point: PlanarPoint, wrap: bool) -> GeoPoint {
        let mut lng = (point.x / TILE_SIZE - 0.5) * 360.0;
        if wrap {
            lng = wrap_longitude(lng);
        }
        let psi = 2.0 * PI * (0.5 - point.y / TILE_SIZE);
        let lat = 2.0f64.mul_add(psi.exp().atan(), -PI / 2.0).to_degrees();
        GeoPoint { lat, lng }
    }

    fn meters_per_pixel(&self, lat: f64) -> f64 {
        lat.to_radians().cos() * 2.0 * PI * EQUATORIAL_RADIUS_M / TILE_SIZE
    }
}

/// Linear projection accurate within `radius` meters of `center`.
///
/// Scale factors are sampled from [`GlobalProjection`] at the four cardinal
/// offsets of the radius. The plane shares the global projection's origin and
/// units near the centre and uses a single scale on both axes, so planar
/// distances are isotropic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalProjection {
    center: GeoPoint,
    radius: f64,
    origin: PlanarPoint,
    meters_per_pixel: f64,
    meters_per_degree_lat: f64,
    meters_per_degree_lng: f64,
}

impl LocalProjection {
    /// Build a projection for `center` valid within `radius` meters.
    ///
    /// # Errors
    ///
    /// Returns an error when the radius is not a positive, finite number or
    /// the centre lies outside the Mercator latitude range.
    pub fn new(center: GeoPoint, radius: f64) -> Result<Self, Error> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(Error::InvalidRadius(radius));
        }
        if !center.lng.is_finite() || !center.lat.is_finite() || center.lat.abs() >= MAX_LATITUDE {
            return Err(Error::InvalidCenter(format!("({}, {})", center.lat, center.lng)));
        }

        let global = GlobalProjection;
        let angle = (radius / MEAN_RADIUS_M).to_degrees();
        let lng_angle = angle / center.lat.to_radians().cos();

        let north = GeoPoint::new(center.lat + angle, center.lng);
        let south = GeoPoint::new(center.lat - angle, center.lng);
        let east = GeoPoint::new(center.lat, center.lng + lng_angle);
        let west = GeoPoint::new(center.lat, center.lng - lng_angle);

        let span = 2.0 * radius;
        let mpp_x = span / (global.to_planar(east).x - global.to_planar(west).x);
        let mpp_y = span / (global.to_planar(south).y - global.to_planar(north).y);

        Ok(Self {
            center,
            radius,
            origin: global.to_planar(center),
            meters_per_pixel: (mpp_x + mpp_y) / 2.0,
            meters_per_degree_lat: span / (north.lat - south.lat),
            meters_per_degree_lng: span / (east.lng - west.lng),
        })
    }

    #[must_use]
    pub const fn center(&self) -> GeoPoint {
        self.center
    }

    #[must_use]
    pub const fn radius(&self) -> f64 {
        self.radius
    }
}

impl Projection for LocalProjection {
    fn to_planar(&self, point: GeoPoint) -> PlanarPoint {
        let x = (point.lng - self.center.lng) * self.meters_per_degree_lng / self.meters_per_pixel;
        let y = (point.lat - self.center.lat) * self.meters_per_degree_lat / self.meters_per_pixel;
        PlanarPoint { x: self.origin.x + x, y: self.origin.y - y }
    }

    fn to_geo(&self, point: PlanarPoint, wrap: bool) -> GeoPoint {
        let dx = (point.x - self.origin.x) * self.meters_per_pixel;
        let dy = (self.origin.y - point.y) * self.meters_per_pixel;
        let mut lng = self.center.lng + dx / self.meters_per_degree_lng;
        if wrap {
            lng = wrap_longitude(lng);
        }
        GeoPoint { lat: self.center.lat + dy / self.meters_per_degree_lat, lng }
    }

    fn meters_per_pixel(&self, _lat: f64) -> f64 {
        self.meters_per_pixel
    }
}

fn wrap_longitude(lng: f64) -> f64 {
    let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid can round up to the modulus for tiny negative inputs
    if wrapped >= 180.0 { wrapped - 360.0 } else { wrapped }
}
