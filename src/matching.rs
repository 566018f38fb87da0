//! # Segment Matching
//!
//! Matches GPS fixes to road segments: a quick bounding-box prefilter
//! followed by point-to-polyline distance, keeping only segments within a
//! distance threshold, nearest first.
//!
//! Two forms are provided:
//! - [`match_point_to_segments`] - one point against a segment slice
//! - [`SegmentIndex`] + [`match_drive`] - a whole drive against an R-tree
//!   indexed catalog, tagging each sample with its nearest segment
//!
//! The bbox prefilter uses the segment's own stored bbox with no padding, so
//! a point just outside the box never matches even when it is geometrically
//! within threshold of the line. This is intentional: the filter is
//! necessary-not-sufficient and exists purely for performance.

use crate::geo_utils::project_onto_polyline;
use crate::{GeoPoint, GpsSample, RoadSegment};
use log::debug;
use rstar::{RTree, RTreeObject, AABB};

/// Default matching threshold: GPS points further than this from a segment's
/// centerline won't match.
pub const DEFAULT_MATCH_THRESHOLD_METERS: f64 = 50.0;

/// A candidate match between one GPS point and one segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PolylineMatch {
    pub segment_id: String,
    /// Meters from the GPS point to the segment centerline.
    pub distance_meters: f64,
    /// 0.0 to 1.0 along the segment.
    pub position_fraction: f64,
}

/// A persisted GPS-sample-to-segment match (one row per matched sample,
/// the nearest segment only).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentMatch {
    pub gps_sample_id: String,
    pub segment_id: String,
    pub distance_meters: f64,
    pub position_fraction: f64,
}

/// Match a GPS point to road segments.
///
/// Algorithm:
/// 1. Filter segments by bounding box (inclusive bounds)
/// 2. Compute perpendicular distance to each surviving segment's polyline
/// 3. Keep matches with distance <= `threshold_meters` (inclusive)
/// 4. Sort ascending by distance; ties keep catalog order
///
/// Callers typically take only the first (nearest) match.
pub fn match_point_to_segments(
    point: &GeoPoint,
    segments: &[RoadSegment],
    threshold_meters: f64,
) -> Vec<PolylineMatch> {
    let mut matches: Vec<PolylineMatch> = segments
        .iter()
        .filter(|segment| segment.bbox.contains(point))
        .filter_map(|segment| {
            let proj = project_onto_polyline(point, &segment.coordinates)?;
            if proj.distance_meters <= threshold_meters {
                Some(PolylineMatch {
                    segment_id: segment.id.clone(),
                    distance_meters: proj.distance_meters,
                    position_fraction: proj.position_fraction,
                })
            } else {
                None
            }
        })
        .collect();

    matches.sort_by(|a, b| {
        a.distance_meters
            .partial_cmp(&b.distance_meters)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches
}

// ============================================================================
// R-tree Indexed Catalog
// ============================================================================

/// A segment's bbox with its catalog index, for R-tree queries.
#[derive(Debug, Clone)]
struct SegmentEnvelope {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for SegmentEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree spatial index over a road-segment catalog.
///
/// Queries return the same results as the linear [`match_point_to_segments`]
/// scan: the R-tree point query is the same inclusive bbox containment test,
/// just sublinear in the catalog size.
pub struct SegmentIndex<'a> {
    segments: &'a [RoadSegment],
    rtree: RTree<SegmentEnvelope>,
}

impl<'a> SegmentIndex<'a> {
    /// Build an index over a segment catalog.
    pub fn new(segments: &'a [RoadSegment]) -> Self {
        let envelopes: Vec<SegmentEnvelope> = segments
            .iter()
            .enumerate()
            .map(|(index, s)| SegmentEnvelope {
                index,
                envelope: AABB::from_corners(
                    [s.bbox.min_lon, s.bbox.min_lat],
                    [s.bbox.max_lon, s.bbox.max_lat],
                ),
            })
            .collect();

        Self {
            segments,
            rtree: RTree::bulk_load(envelopes),
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Match one point against the indexed catalog, nearest first.
    pub fn match_point(&self, point: &GeoPoint, threshold_meters: f64) -> Vec<PolylineMatch> {
        let query = AABB::from_point([point.longitude, point.latitude]);

        let mut candidates: Vec<(usize, PolylineMatch)> = self
            .rtree
            .locate_in_envelope_intersecting(&query)
            .filter_map(|env| {
                let segment = &self.segments[env.index];
                let proj = project_onto_polyline(point, &segment.coordinates)?;
                if proj.distance_meters <= threshold_meters {
                    Some((
                        env.index,
                        PolylineMatch {
                            segment_id: segment.id.clone(),
                            distance_meters: proj.distance_meters,
                            position_fraction: proj.position_fraction,
                        },
                    ))
                } else {
                    None
                }
            })
            .collect();

        // R-tree iteration order is arbitrary; sort by distance, then by
        // catalog index so ties are deterministic
        candidates.sort_by(|(ia, a), (ib, b)| {
            a.distance_meters
                .partial_cmp(&b.distance_meters)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ia.cmp(ib))
        });

        candidates.into_iter().map(|(_, m)| m).collect()
    }
}

// ============================================================================
// Drive-Level Matching
// ============================================================================

/// Tag every sample in a drive with its nearest segment (or none).
///
/// Overwrites `matched_segment_id` on each sample and returns one
/// [`SegmentMatch`] row per sample that matched within threshold, in sample
/// order. Unmatched samples get `matched_segment_id = None` and no row.
pub fn match_drive(
    samples: &mut [GpsSample],
    index: &SegmentIndex<'_>,
    threshold_meters: f64,
) -> Vec<SegmentMatch> {
    let mut matches = Vec::new();

    for sample in samples.iter_mut() {
        let best = index
            .match_point(&sample.position(), threshold_meters)
            .into_iter()
            .next();

        match best {
            Some(m) => {
                sample.matched_segment_id = Some(m.segment_id.clone());
                matches.push(SegmentMatch {
                    gps_sample_id: sample.id.clone(),
                    segment_id: m.segment_id,
                    distance_meters: m.distance_meters,
                    position_fraction: m.position_fraction,
                });
            }
            None => {
                sample.matched_segment_id = None;
            }
        }
    }

    debug!(
        "matched {} of {} samples against {} segments",
        matches.len(),
        samples.len(),
        index.len()
    );
    matches
}

/// Parallel version of [`match_drive`], using rayon for the per-sample
/// lookups. Results are identical to the sequential form.
#[cfg(feature = "parallel")]
pub fn match_drive_parallel(
    samples: &mut [GpsSample],
    index: &SegmentIndex<'_>,
    threshold_meters: f64,
) -> Vec<SegmentMatch> {
    use log::info;
    use rayon::prelude::*;

    let best: Vec<Option<PolylineMatch>> = samples
        .par_iter()
        .map(|sample| {
            index
                .match_point(&sample.position(), threshold_meters)
                .into_iter()
                .next()
        })
        .collect();

    let mut matches = Vec::new();
    for (sample, best) in samples.iter_mut().zip(best) {
        match best {
            Some(m) => {
                sample.matched_segment_id = Some(m.segment_id.clone());
                matches.push(SegmentMatch {
                    gps_sample_id: sample.id.clone(),
                    segment_id: m.segment_id,
                    distance_meters: m.distance_meters,
                    position_fraction: m.position_fraction,
                });
            }
            None => {
                sample.matched_segment_id = None;
            }
        }
    }

    info!(
        "parallel-matched {} of {} samples against {} segments",
        matches.len(),
        samples.len(),
        index.len()
    );
    matches
}

// ============================================================================
// Tests
// ============================================================================
