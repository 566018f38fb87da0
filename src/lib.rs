//! # Roadmetrics
//!
//! Batch analysis of drive recordings: road-surface roughness scoring and
//! traffic congestion detection.
//!
//! The library consumes a completed drive's raw GPS and accelerometer sample
//! sequences plus a road-segment catalog, and produces:
//! - GPS-to-segment matches (nearest segment within a distance threshold)
//! - Congestion events with severity and calendar features
//! - Rolling per-segment statistics for heatmap/trend rendering
//! - A 0-100 road roughness score from vertical acceleration variance
//!
//! ## Features
//!
//! - **`parallel`** - Parallel batch matching with rayon
//! - **`serde`** - Serde derives on public types
//!
//! ## Quick Start
//!
//! ```rust
//! use roadmetrics::{GeoPoint, RoadSegment, match_point_to_segments};
//!
//! // A short diagonal road segment
//! let segment = RoadSegment::new(
//!     "elm-st",
//!     vec![
//!         GeoPoint::new(51.5074, -0.1278),
//!         GeoPoint::new(51.5090, -0.1260),
//!     ],
//! ).unwrap();
//!
//! // A GPS fix on the segment
//! let point = GeoPoint::new(51.5074, -0.1278);
//! let matches = match_point_to_segments(&point, &[segment], 50.0);
//!
//! assert_eq!(matches[0].segment_id, "elm-st");
//! assert!(matches[0].distance_meters < 1.0);
//! ```

pub mod congestion;
pub mod geo_utils;
pub mod matching;
pub mod pipeline;
pub mod roughness;
pub mod stats;

pub use congestion::{
    detect_congestion, CongestionEvent, CongestionThresholds, Severity,
};
pub use matching::{
    match_drive, match_point_to_segments, PolylineMatch, SegmentIndex, SegmentMatch,
    DEFAULT_MATCH_THRESHOLD_METERS,
};
pub use pipeline::{
    analyze_drive, AnalysisConfig, AnalysisError, AnalysisSummary, DriveAnalysis,
};
pub use roughness::{analyze_roughness, RoughnessBreakdown, RoughnessConfig, RoughnessResult};
pub use stats::{SegmentStatistics, StatKey, StatisticsStore};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude (WGS84 degrees).
///
/// # Example
/// ```
/// use roadmetrics::GeoPoint;
/// let point = GeoPoint::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Axis-aligned bounding box for a segment's geometry.
///
/// Stored alongside the segment and must exactly bound its coordinates
/// (recomputed whenever the geometry changes). Used as a
/// necessary-not-sufficient prefilter before point-to-polyline distance
/// calculations.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Compute the bounding box of a coordinate list (min/max reduction).
    ///
    /// Returns `None` for empty input.
    pub fn from_coords(coords: &[GeoPoint]) -> Option<Self> {
        if coords.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lon = f64::MAX;
        let mut max_lon = f64::MIN;

        for p in coords {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lon = min_lon.min(p.longitude);
            max_lon = max_lon.max(p.longitude);
        }

        Some(Self { min_lat, max_lat, min_lon, max_lon })
    }

    /// Inclusive containment check: a point exactly on the boundary is inside.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lon
            && point.longitude <= self.max_lon
    }
}

/// An immutable road segment: an identified polyline with a precomputed
/// bounding box.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoadSegment {
    pub id: String,
    pub coordinates: Vec<GeoPoint>,
    pub bbox: BoundingBox,
}

impl RoadSegment {
    /// Create a segment, validating its geometry and computing its bbox.
    ///
    /// Geometry must have at least 2 coordinate pairs, each within
    /// [-90, 90] x [-180, 180].
    pub fn new(
        id: &str,
        coordinates: Vec<GeoPoint>,
    ) -> Result<Self, AnalysisError> {
        if coordinates.len() < 2 {
            return Err(AnalysisError::InvalidGeometry(format!(
                "segment {} has {} coordinates, need at least 2",
                id,
                coordinates.len()
            )));
        }
        if let Some(bad) = coordinates.iter().find(|c| !c.is_valid()) {
            return Err(AnalysisError::InvalidGeometry(format!(
                "segment {} has out-of-range coordinate ({}, {})",
                id, bad.latitude, bad.longitude
            )));
        }

        // from_coords cannot fail here: the list is non-empty
        let bbox = BoundingBox::from_coords(&coordinates)
            .ok_or_else(|| AnalysisError::InvalidGeometry(format!("segment {} is empty", id)))?;

        Ok(Self { id: id.to_string(), coordinates, bbox })
    }

    /// Replace the geometry, re-validating and recomputing the bbox.
    pub fn set_coordinates(&mut self, coordinates: Vec<GeoPoint>) -> Result<(), AnalysisError> {
        let updated = RoadSegment::new(&self.id, coordinates)?;
        self.coordinates = updated.coordinates;
        self.bbox = updated.bbox;
        Ok(())
    }
}

/// One GPS fix within a drive, ordered by timestamp.
///
/// `distance_from_prev_m` is populated by upstream ingestion;
/// `matched_segment_id` is populated by the matcher (re-running matching
/// overwrites it).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpsSample {
    pub id: String,
    pub drive_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Speed over ground in m/s; `None` when the receiver had no fix.
    pub speed_mps: Option<f64>,
    pub timestamp_ms: i64,
    pub distance_from_prev_m: Option<f64>,
    pub matched_segment_id: Option<String>,
}

impl GpsSample {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// One 3-axis accelerometer reading in the device frame (m/s^2).
///
/// Z is gravity-dominated (~+9.8 when stationary and level). No frame
/// rotation is performed; the device is assumed mounted with Z roughly
/// vertical.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AccelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp_ms: i64,
}

impl AccelSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp_ms: i64) -> Self {
        Self { x, y, z, timestamp_ms }
    }

    /// Magnitude of the acceleration vector.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_validation() {
        assert!(GeoPoint::new(51.5074, -0.1278).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 181.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_accel_magnitude() {
        // 3-4-12 right triangle in 3D
        let sample = AccelSample::new(3.0, 4.0, 12.0, 0);
        assert_eq!(sample.magnitude(), 13.0);
    }

    #[test]
    fn test_bounding_box_from_coords() {
        let coords = vec![
            GeoPoint::new(51.50, -0.13),
            GeoPoint::new(51.51, -0.12),
            GeoPoint::new(51.505, -0.125),
        ];
        let bbox = BoundingBox::from_coords(&coords).unwrap();
        assert_eq!(bbox.min_lat, 51.50);
        assert_eq!(bbox.max_lat, 51.51);
        assert_eq!(bbox.min_lon, -0.13);
        assert_eq!(bbox.max_lon, -0.12);
    }

    #[test]
    fn test_bounding_box_empty() {
        assert!(BoundingBox::from_coords(&[]).is_none());
    }

    #[test]
    fn test_bounding_box_contains_is_inclusive() {
        let bbox = BoundingBox::from_coords(&[
            GeoPoint::new(51.50, -0.13),
            GeoPoint::new(51.51, -0.12),
        ])
        .unwrap();

        // Exactly on the boundary counts as inside
        assert!(bbox.contains(&GeoPoint::new(51.50, -0.13)));
        assert!(bbox.contains(&GeoPoint::new(51.51, -0.12)));
        assert!(bbox.contains(&GeoPoint::new(51.505, -0.125)));
        assert!(!bbox.contains(&GeoPoint::new(51.52, -0.125)));
    }

    #[test]
    fn test_segment_requires_two_points() {
        let result = RoadSegment::new("s1", vec![GeoPoint::new(51.5, -0.1)]);
        assert!(matches!(result, Err(AnalysisError::InvalidGeometry(_))));
    }

    #[test]
    fn test_segment_rejects_out_of_range() {
        let result = RoadSegment::new(
            "s1",
            vec![GeoPoint::new(51.5, -0.1), GeoPoint::new(95.0, -0.1)],
        );
        assert!(matches!(result, Err(AnalysisError::InvalidGeometry(_))));
    }

    #[test]
    fn test_segment_bbox_recomputed_on_geometry_change() {
        let mut segment = RoadSegment::new(
            "s1",
            vec![GeoPoint::new(51.50, -0.13), GeoPoint::new(51.51, -0.12)],
        )
        .unwrap();
        assert_eq!(segment.bbox.max_lat, 51.51);

        segment
            .set_coordinates(vec![GeoPoint::new(51.50, -0.13), GeoPoint::new(51.60, -0.12)])
            .unwrap();
        assert_eq!(segment.bbox.max_lat, 51.60);
    }
}
