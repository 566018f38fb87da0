//! # Drive Analysis Pipeline
//!
//! Batch entry point for one completed drive: validate the raw sample
//! sequences, match GPS fixes to the segment catalog, detect congestion
//! events, fold them into the statistics store, and score roughness from
//! the accelerometer sequence.
//!
//! The pipeline validates its whole input before touching any state, so a
//! malformed batch is rejected loudly rather than partially applied.
//! Sparse data is not an error: a drive with no GPS samples, no matched
//! samples, or too few accelerometer samples produces empty collections and
//! a `None` roughness score.

use crate::congestion::{detect_congestion, CongestionEvent, CongestionThresholds};
use crate::matching::{match_drive, SegmentIndex, SegmentMatch, DEFAULT_MATCH_THRESHOLD_METERS};
use crate::roughness::{analyze_roughness, RoughnessConfig, RoughnessResult};
use crate::stats::StatisticsStore;
use crate::{AccelSample, GpsSample, RoadSegment};
use chrono::TimeZone;
use log::info;
use thiserror::Error;

/// Errors that fail an analysis batch. Insufficient data is never an error;
/// these indicate corrupt input that must not reach the aggregates.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid segment geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid coordinate on GPS sample {0}")]
    InvalidCoordinate(String),

    #[error("timestamps out of order at {0}")]
    UnorderedTimestamps(String),
}

/// Configuration for one pipeline run. Defaults match the recording
/// system's documented thresholds.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisConfig {
    /// Segment matching threshold in meters.
    pub match_threshold_meters: f64,
    pub congestion: CongestionThresholds,
    pub roughness: RoughnessConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            match_threshold_meters: DEFAULT_MATCH_THRESHOLD_METERS,
            congestion: CongestionThresholds::default(),
            roughness: RoughnessConfig::default(),
        }
    }
}

/// Headline numbers for the completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisSummary {
    /// GPS-segment matches created.
    pub match_count: usize,
    /// Congestion events detected.
    pub event_count: usize,
    /// Total congestion time in milliseconds.
    pub total_congestion_ms: i64,
}

/// Everything one pipeline run produces for its collaborators.
#[derive(Debug, Clone)]
pub struct DriveAnalysis {
    /// One row per matched GPS sample, for persistence as a join table.
    pub matches: Vec<SegmentMatch>,
    pub events: Vec<CongestionEvent>,
    /// `None` when the accelerometer sequence was too short.
    pub roughness: Option<RoughnessResult>,
    pub summary: AnalysisSummary,
}

/// Reject corrupt input before any stage runs.
fn validate_input(gps: &[GpsSample], accel: &[AccelSample]) -> Result<(), AnalysisError> {
    let mut prev_ts: Option<i64> = None;
    for sample in gps {
        if !sample.position().is_valid() {
            return Err(AnalysisError::InvalidCoordinate(sample.id.clone()));
        }
        if let Some(prev) = prev_ts {
            if sample.timestamp_ms < prev {
                return Err(AnalysisError::UnorderedTimestamps(format!(
                    "GPS sample {}",
                    sample.id
                )));
            }
        }
        prev_ts = Some(sample.timestamp_ms);
    }

    let mut prev_ts: Option<i64> = None;
    for (i, sample) in accel.iter().enumerate() {
        if let Some(prev) = prev_ts {
            if sample.timestamp_ms < prev {
                return Err(AnalysisError::UnorderedTimestamps(format!(
                    "accelerometer sample #{i}"
                )));
            }
        }
        prev_ts = Some(sample.timestamp_ms);
    }

    Ok(())
}

/// Run the full analysis pass for a completed drive.
///
/// Tags each GPS sample in place with its nearest segment, detects
/// congestion events, folds them into `store`, and scores roughness.
/// Calendar fields use the supplied time zone (`chrono::Local` for the
/// recording device's wall clock, `Utc` in tests).
pub fn analyze_drive<Tz: TimeZone>(
    gps: &mut [GpsSample],
    accel: &[AccelSample],
    segments: &[RoadSegment],
    config: &AnalysisConfig,
    tz: &Tz,
    store: &mut StatisticsStore,
) -> Result<DriveAnalysis, AnalysisError> {
    validate_input(gps, accel)?;

    let (matches, events) = if gps.is_empty() || segments.is_empty() {
        (Vec::new(), Vec::new())
    } else {
        let index = SegmentIndex::new(segments);
        let matches = match_drive(gps, &index, config.match_threshold_meters);
        let events = detect_congestion(gps, &config.congestion, tz);
        store.apply_batch(&events, tz);
        (matches, events)
    };

    let roughness = analyze_roughness(accel, &config.roughness);

    let summary = AnalysisSummary {
        match_count: matches.len(),
        event_count: events.len(),
        total_congestion_ms: events.iter().map(|e| e.duration_ms).sum(),
    };

    info!(
        "drive analysis complete: {} matches, {} events, {}ms congestion, roughness {}",
        summary.match_count,
        summary.event_count,
        summary.total_congestion_ms,
        roughness
            .as_ref()
            .map_or_else(|| "n/a".to_string(), |r| r.score.to_string()),
    );

    Ok(DriveAnalysis { matches, events, roughness, summary })
}

// ============================================================================
// Tests
// ============================================================================
