//! Route polylines and nearest-point snapping.

use crate::error::Error;
use crate::point::PlanarPoint;

/// An ordered path of planar points with cumulative distance from the start.
///
/// Consecutive duplicate points are dropped at construction; at least two
/// distinct points must remain.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    points: Vec<PlanarPoint>,
    distances: Vec<f64>,
}

/// The closest point on a polyline to a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snap {
    /// Closest point on the polyline.
    pub point: PlanarPoint,

    /// Distance from the start of the polyline to `point`, in the polyline's
    /// distance units.
    pub distance_along: f64,

    /// Planar distance between the query point and `point`.
    pub offset: f64,

    /// Index of the segment (`segment` to `segment + 1`) containing `point`.
    pub segment: usize,
}

impl Polyline {
    /// Build a polyline whose distances are the cumulative planar lengths.
    ///
    /// # Errors
    ///
    /// Returns an error when fewer than two distinct points are supplied.
    pub fn new(points: impl IntoIterator<Item = PlanarPoint>) -> Result<Self, Error> {
        let mut deduped: Vec<PlanarPoint> = Vec::new();
        for point in points {
            if deduped.last() != Some(&point) {
                deduped.push(point);
            }
        }
        if deduped.len() < 2 {
            return Err(Error::TooFewPoints(deduped.len()));
        }

        let mut distances = Vec::with_capacity(deduped.len());
        let mut total = 0.0;
        distances.push(total);
        for pair in deduped.windows(2) {
            total += pair[0].distance(pair[1]);
            distances.push(total);
        }

        Ok(Self { points: deduped, distances })
    }

    /// Build a polyline from points paired with caller-supplied cumulative
    /// distances, such as a GTFS shape's `shape_dist_traveled`.
    ///
    /// When consecutive points coincide the first is kept.
    ///
    /// # Errors
    ///
    /// Returns an error when fewer than two distinct points are supplied or
    /// the distances are negative, non-finite or decreasing.
    pub fn with_distances(
        points: impl IntoIterator<Item = (PlanarPoint, f64)>,
    ) -> Result<Self, Error> {
        let mut deduped: Vec<PlanarPoint> = Vec::new();
        let mut distances: Vec<f64> = Vec::new();

        for (point, distance) in points {
            if !distance.is_finite() || distance < 0.0 {
                return Err(Error::InvalidDistances(format!("distance {distance} at {point:?}")));
            }
            if let Some(&previous) = distances.last()
                && distance < previous
            {
                return Err(Error::InvalidDistances(format!(
                    "distance decreases from {previous} to {distance}"
                )));
            }
            if deduped.last() == Some(&point) {
                continue;
            }
            deduped.push(point);
            distances.push(distance);
        }
        if deduped.len() < 2 {
            return Err(Error::TooFewPoints(deduped.len()));
        }

        Ok(Self { points: deduped, distances })
    }

    #[must_use]
    pub fn points(&self) -> &[PlanarPoint] {
        &self.points
    }

    #[must_use]
    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// Cumulative distance at the final point.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.distances.last().copied().unwrap_or_default()
    }

    /// Find the point on the polyline closest to `point`.
    ///
    /// The nearest vertex is found by exhaustive scan (ties go to the lower
    /// index), then only the one or two segments adjacent to it are searched.
    #[must_use]
    pub fn snap(&self, point: PlanarPoint) -> Snap {
        let anchor = self.nearest_vertex(point);
        if self.points[anchor] == point {
            return self.vertex_snap(anchor, point);
        }

        // the segment toward the lower index is tested first and wins ties
        let mut best: Option<Snap> = None;
        let segments = [anchor.checked_sub(1), (anchor + 1 < self.points.len()).then_some(anchor)];
        for segment in segments.into_iter().flatten() {
            let Some(candidate) = self.project(segment, point) else {
                continue;
            };
            if best.is_none_or(|current| candidate.offset < current.offset) {
                best = Some(candidate);
            }
        }

        best.unwrap_or_else(|| self.vertex_snap(anchor, point))
    }

    /// Compass bearing of the segment containing a snap, in degrees
    /// clockwise from north.
    #[must_use]
    pub fn bearing_at(&self, snap: &Snap) -> f64 {
        let segment = snap.segment.min(self.points.len() - 2);
        bearing(self.points[segment], self.points[segment + 1])
    }

    fn nearest_vertex(&self, point: PlanarPoint) -> usize {
        let mut nearest = 0;
        let mut nearest_sq = f64::INFINITY;
        for (index, vertex) in self.points.iter().enumerate() {
            let distance_sq = vertex.distance_squared(point);
            if distance_sq < nearest_sq {
                nearest = index;
                nearest_sq = distance_sq;
            }
        }
        nearest
    }

    // Perpendicular foot of `point` on the segment, or None when the foot
    // falls outside it.
    fn project(&self, segment: usize, point: PlanarPoint) -> Option<Snap> {
        let start = self.points[segment];
        let end = self.points[segment + 1];

        let dx = end.x - start.x;
        let dy = end.y - start.y;
        let length_sq = dx.mul_add(dx, dy * dy);
        let t = (point.x - start.x).mul_add(dx, (point.y - start.y) * dy) / length_sq;
        if !(0.0..=1.0).contains(&t) {
            return None;
        }

        let foot = PlanarPoint::new(t.mul_add(dx, start.x), t.mul_add(dy, start.y));
        let from = self.distances[segment];
        let to = self.distances[segment + 1];

        Some(Snap {
            point: foot,
            distance_along: t.mul_add(to - from, from),
            offset: (foot.distance_squared(point)).sqrt(),
            segment,
        })
    }

    fn vertex_snap(&self, index: usize, point: PlanarPoint) -> Snap {
        let vertex = self.points[index];
        Snap {
            point: vertex,
            distance_along: self.distances[index],
            offset: vertex.distance(point),
            segment: index.min(self.points.len() - 2),
        }
    }
}

/// Compass bearing from `from` to `to` in `[0, 360)` degrees, clockwise from
/// north. Planar `y` grows southward.
#[must_use]
pub fn bearing(from: PlanarPoint, to: PlanarPoint) -> f64 {
    let degrees = (to.x - from.x).atan2(from.y - to.y).to_degrees().rem_euclid(360.0);
    if degrees >= 360.0 { 0.0 } else { degrees }
}
