//! # Geographic Utilities
//!
//! Core geographic computations for segment matching.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`polyline_length`] | Total length of a polyline in meters |
//! | [`project_onto_polyline`] | Nearest point on a polyline, with distance and position |
//!
//! ## Coordinate System
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees),
//! the standard used by GPS receivers and mapping services. Distances are
//! returned in meters.

use crate::GeoPoint;
use geo::{Distance, Haversine, Point};

/// Meters per degree of latitude (and of longitude at the equator).
const METERS_PER_DEGREE: f64 = 111_320.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two GPS points using the
/// Haversine formula.
///
/// Returns the distance in meters along the Earth's surface (assuming a
/// spherical Earth with radius 6,371 km), accurate to within 0.3% for
/// practical GPS work.
///
/// # Example
///
/// ```rust
/// use roadmetrics::{GeoPoint, geo_utils};
///
/// let london = GeoPoint::new(51.5074, -0.1278);
/// let paris = GeoPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Calculate the total length of a polyline in meters.
///
/// Sums the haversine distance between consecutive points. Empty or
/// single-point polylines return 0.0.
pub fn polyline_length(coords: &[GeoPoint]) -> f64 {
    if coords.len() < 2 {
        return 0.0;
    }

    coords
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Point-to-Polyline Projection
// =============================================================================

/// Result of projecting a point onto a polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolylineProjection {
    /// Minimum perpendicular distance from the point to the polyline, meters.
    pub distance_meters: f64,
    /// Fractional position of the nearest point along the cumulative
    /// polyline length: 0.0 = start vertex, 1.0 = end vertex.
    pub position_fraction: f64,
    /// The nearest point on the polyline.
    pub nearest: GeoPoint,
}

/// Find the nearest point on a polyline to a query point.
///
/// Each pair of consecutive vertices is treated as a straight segment in a
/// local planar frame centered on the query point (equirectangular
/// approximation, valid at the sub-kilometer scale of road matching); the
/// reported distance to the projected point is haversine.
///
/// Returns `None` for polylines with fewer than 2 vertices.
///
/// # Example
///
/// ```rust
/// use roadmetrics::{GeoPoint, geo_utils};
///
/// let road = vec![
///     GeoPoint::new(51.5000, -0.1300),
///     GeoPoint::new(51.5100, -0.1200),
/// ];
/// let fix = GeoPoint::new(51.5050, -0.1250);
///
/// let proj = geo_utils::project_onto_polyline(&fix, &road).unwrap();
/// assert!(proj.distance_meters < 15.0); // fix is near the midpoint
/// assert!((proj.position_fraction - 0.5).abs() < 0.05);
/// ```
pub fn project_onto_polyline(point: &GeoPoint, coords: &[GeoPoint]) -> Option<PolylineProjection> {
    if coords.len() < 2 {
        return None;
    }

    let total_length = polyline_length(coords);

    // Local planar frame: meters east/north of the query point
    let lat_scale = METERS_PER_DEGREE;
    let lon_scale = METERS_PER_DEGREE * point.latitude.to_radians().cos();
    let to_plane = |p: &GeoPoint| -> (f64, f64) {
        (
            (p.longitude - point.longitude) * lon_scale,
            (p.latitude - point.latitude) * lat_scale,
        )
    };

    let mut best: Option<PolylineProjection> = None;
    let mut length_before = 0.0;

    for pair in coords.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let (ax, ay) = to_plane(a);
        let (bx, by) = to_plane(b);
        let (dx, dy) = (bx - ax, by - ay);

        let seg_len_sq = dx * dx + dy * dy;
        let t = if seg_len_sq > 0.0 {
            // Query point is the origin of the local frame
            (-(ax * dx + ay * dy) / seg_len_sq).clamp(0.0, 1.0)
        } else {
            // Coincident vertices: nearest point is the vertex itself
            0.0
        };

        let nearest = GeoPoint::new(
            a.latitude + t * (b.latitude - a.latitude),
            a.longitude + t * (b.longitude - a.longitude),
        );
        let distance = haversine_distance(point, &nearest);

        let seg_length = haversine_distance(a, b);
        let position = if total_length > 0.0 {
            ((length_before + t * seg_length) / total_length).clamp(0.0, 1.0)
        } else {
            0.0
        };

        if best.map_or(true, |b| distance < b.distance_meters) {
            best = Some(PolylineProjection {
                distance_meters: distance,
                position_fraction: position,
                nearest,
            });
        }

        length_before += seg_length;
    }

    best
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = GeoPoint::new(51.5074, -0.1278);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // London to Paris is approximately 344 km
        let london = GeoPoint::new(51.5074, -0.1278);
        let paris = GeoPoint::new(48.8566, 2.3522);
        let dist = haversine_distance(&london, &paris);
        assert!(approx_eq(dist, 343_560.0, 5000.0)); // Within 5km
    }

    #[test]
    fn test_polyline_length_degenerate() {
        let empty: Vec<GeoPoint> = vec![];
        assert_eq!(polyline_length(&empty), 0.0);
        assert_eq!(polyline_length(&[GeoPoint::new(51.5, -0.1)]), 0.0);
    }

    #[test]
    fn test_polyline_length_two_points() {
        let line = vec![
            GeoPoint::new(51.5074, -0.1278),
            GeoPoint::new(51.5080, -0.1280),
        ];
        let length = polyline_length(&line);
        assert!(length > 0.0);
        assert!(length < 100.0); // About 68m
    }

    #[test]
    fn test_projection_on_vertex() {
        let line = vec![GeoPoint::new(51.50, -0.13), GeoPoint::new(51.51, -0.12)];
        let proj = project_onto_polyline(&GeoPoint::new(51.50, -0.13), &line).unwrap();
        assert!(proj.distance_meters < 0.01);
        assert_eq!(proj.position_fraction, 0.0);

        let proj = project_onto_polyline(&GeoPoint::new(51.51, -0.12), &line).unwrap();
        assert!(proj.distance_meters < 0.01);
        assert!(approx_eq(proj.position_fraction, 1.0, 1e-9));
    }

    #[test]
    fn test_projection_midpoint() {
        // North-south line, query point exactly halfway and on the line
        let line = vec![GeoPoint::new(51.50, -0.13), GeoPoint::new(51.52, -0.13)];
        let proj = project_onto_polyline(&GeoPoint::new(51.51, -0.13), &line).unwrap();
        assert!(proj.distance_meters < 0.01);
        assert!(approx_eq(proj.position_fraction, 0.5, 0.001));
    }

    #[test]
    fn test_projection_perpendicular_offset() {
        // Point ~111m east of a north-south line
        let line = vec![GeoPoint::new(51.50, -0.13), GeoPoint::new(51.52, -0.13)];
        let proj = project_onto_polyline(&GeoPoint::new(51.51, -0.1284), &line).unwrap();
        assert!(approx_eq(proj.distance_meters, 111.0, 5.0));
        assert!(approx_eq(proj.position_fraction, 0.5, 0.001));
    }

    #[test]
    fn test_projection_beyond_endpoint_clamps() {
        // Query point north of the line's end: nearest is the end vertex
        let line = vec![GeoPoint::new(51.50, -0.13), GeoPoint::new(51.51, -0.13)];
        let proj = project_onto_polyline(&GeoPoint::new(51.52, -0.13), &line).unwrap();
        assert!(approx_eq(proj.position_fraction, 1.0, 1e-9));
        assert!(approx_eq(proj.distance_meters, 1113.0, 15.0));
    }

    #[test]
    fn test_projection_needs_two_vertices() {
        assert!(project_onto_polyline(&GeoPoint::new(51.5, -0.1), &[]).is_none());
        assert!(
            project_onto_polyline(&GeoPoint::new(51.5, -0.1), &[GeoPoint::new(51.5, -0.1)])
                .is_none()
        );
    }

    #[test]
    fn test_projection_multi_vertex_picks_nearest_leg() {
        // L-shaped polyline; query point close to the second leg
        let line = vec![
            GeoPoint::new(51.50, -0.13),
            GeoPoint::new(51.51, -0.13),
            GeoPoint::new(51.51, -0.12),
        ];
        let proj = project_onto_polyline(&GeoPoint::new(51.5102, -0.125), &line).unwrap();
        // Position is past the first leg
        assert!(proj.position_fraction > 0.5);
        assert!(proj.distance_meters < 50.0);
    }
}
