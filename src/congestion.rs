//! # Congestion Detection
//!
//! Scans per-segment GPS time series for sustained below-free-flow speed and
//! emits discrete congestion events, classified by severity and annotated
//! with calendar features (day-of-week, hour-of-day, ISO week) for temporal
//! aggregation.
//!
//! Detection is generic over [`chrono::TimeZone`]: production callers pass
//! `chrono::Local` to get wall-clock calendar fields, tests pass `Utc` for
//! determinism.

use crate::GpsSample;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use log::{debug, info};
use std::collections::BTreeMap;
use std::fmt;

/// Congestion severity, ordered fastest to slowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    FreeFlow,
    Slow,
    Congested,
    Heavy,
    Gridlock,
}

impl Severity {
    /// Stable tier index, fastest first. Used for severity histograms.
    pub fn index(&self) -> usize {
        match self {
            Severity::FreeFlow => 0,
            Severity::Slow => 1,
            Severity::Congested => 2,
            Severity::Heavy => 3,
            Severity::Gridlock => 4,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::FreeFlow => "FREE_FLOW",
            Severity::Slow => "SLOW",
            Severity::Congested => "CONGESTED",
            Severity::Heavy => "HEAVY",
            Severity::Gridlock => "GRIDLOCK",
        };
        f.write_str(label)
    }
}

/// Speed and duration thresholds for event detection.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CongestionThresholds {
    /// At or above this speed, traffic is free-flowing (m/s).
    pub free_flow_mps: f64,
    /// Severity boundary: at or above is SLOW (m/s).
    pub slow_mps: f64,
    /// Severity boundary: at or above is CONGESTED (m/s).
    pub congested_mps: f64,
    /// Severity boundary: at or above is HEAVY, below is GRIDLOCK (m/s).
    pub heavy_mps: f64,
    /// Nominal gridlock speed (m/s). Kept for display scales; anything
    /// below `heavy_mps` already classifies as GRIDLOCK.
    pub gridlock_mps: f64,
    /// Candidate events shorter than this are discarded as brief stops
    /// (red lights and the like).
    pub min_duration_ms: i64,
}

impl Default for CongestionThresholds {
    fn default() -> Self {
        Self {
            free_flow_mps: 15.0,  // 33 mph
            slow_mps: 8.0,        // 18 mph
            congested_mps: 5.0,   // 11 mph
            heavy_mps: 2.78,      // 6 mph
            gridlock_mps: 1.0,    // 2 mph
            min_duration_ms: 30_000,
        }
    }
}

/// One contiguous below-free-flow-speed period on one segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CongestionEvent {
    pub drive_id: String,
    pub segment_id: String,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub duration_ms: i64,
    /// 0 = Sunday .. 6 = Saturday, in the detection time zone.
    pub day_of_week: u8,
    /// 0-23, in the detection time zone.
    pub hour_of_day: u8,
    /// ISO-8601 week number (1-53), Monday-start weeks.
    pub iso_week: u8,
    pub severity: Severity,
    pub avg_speed_mps: f64,
    pub min_speed_mps: f64,
    pub max_speed_mps: f64,
    pub distance_meters: f64,
    pub start_gps_id: String,
    pub end_gps_id: String,
}

/// Classify severity from average speed using inclusive `>=` thresholds:
/// a speed exactly at a boundary lands in the faster tier.
pub fn classify_severity(avg_speed_mps: f64, thresholds: &CongestionThresholds) -> Severity {
    if avg_speed_mps >= thresholds.free_flow_mps {
        Severity::FreeFlow
    } else if avg_speed_mps >= thresholds.slow_mps {
        Severity::Slow
    } else if avg_speed_mps >= thresholds.congested_mps {
        Severity::Congested
    } else if avg_speed_mps >= thresholds.heavy_mps {
        Severity::Heavy
    } else {
        Severity::Gridlock
    }
}

/// Convert a millisecond timestamp to a zoned datetime.
///
/// `None` only for timestamps outside chrono's representable range.
fn zoned<Tz: TimeZone>(timestamp_ms: i64, tz: &Tz) -> Option<DateTime<Tz>> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map(|utc| utc.with_timezone(tz))
}

/// Timestamp (ms) of the Monday 00:00:00 starting the week that contains
/// `timestamp_ms`, in the given time zone. Used as the weekly aggregation
/// bucket key.
pub fn week_start_ms<Tz: TimeZone>(timestamp_ms: i64, tz: &Tz) -> Option<i64> {
    let local = zoned(timestamp_ms, tz)?;
    let monday =
        local.date_naive() - Duration::days(local.weekday().num_days_from_monday() as i64);
    let midnight = monday.and_hms_opt(0, 0, 0)?;
    // `earliest` resolves the rare DST gap at midnight
    let start = tz.from_local_datetime(&midnight).earliest()?;
    Some(start.timestamp_millis())
}

/// Finalize a candidate event from a contiguous low-speed sample window.
///
/// Discards the candidate when it is shorter than the minimum duration or
/// when no sample in the window carried a speed.
fn finalize_event<Tz: TimeZone>(
    segment_id: &str,
    window: &[&GpsSample],
    thresholds: &CongestionThresholds,
    tz: &Tz,
) -> Option<CongestionEvent> {
    let start = window.first()?;
    let end = window.last()?;

    let duration_ms = end.timestamp_ms - start.timestamp_ms;
    if duration_ms < thresholds.min_duration_ms {
        return None;
    }

    let speeds: Vec<f64> = window.iter().filter_map(|s| s.speed_mps).collect();
    if speeds.is_empty() {
        return None;
    }

    let avg_speed_mps = speeds.iter().sum::<f64>() / speeds.len() as f64;
    let min_speed_mps = speeds.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_speed_mps = speeds.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let distance_meters: f64 = window
        .iter()
        .map(|s| s.distance_from_prev_m.unwrap_or(0.0))
        .sum();

    let local_start = zoned(start.timestamp_ms, tz)?;

    Some(CongestionEvent {
        drive_id: start.drive_id.clone(),
        segment_id: segment_id.to_string(),
        start_time_ms: start.timestamp_ms,
        end_time_ms: end.timestamp_ms,
        duration_ms,
        day_of_week: local_start.weekday().num_days_from_sunday() as u8,
        hour_of_day: local_start.hour() as u8,
        iso_week: local_start.iso_week().week() as u8,
        severity: classify_severity(avg_speed_mps, thresholds),
        avg_speed_mps,
        min_speed_mps,
        max_speed_mps,
        distance_meters,
        start_gps_id: start.id.clone(),
        end_gps_id: end.id.clone(),
    })
}

/// Detect congestion events from matched GPS samples.
///
/// Per segment (samples grouped by `matched_segment_id`, unmatched samples
/// discarded, sorted by timestamp): a sample with speed below the free-flow
/// threshold (missing speed counts as stopped) opens or extends an event; a
/// fast sample, or the end of the sequence, closes it. Candidates shorter
/// than the minimum duration are dropped.
///
/// Events are never merged across segments, even when temporally adjacent.
/// A drive with no samples, or no matched samples, yields an empty result.
pub fn detect_congestion<Tz: TimeZone>(
    samples: &[GpsSample],
    thresholds: &CongestionThresholds,
    tz: &Tz,
) -> Vec<CongestionEvent> {
    // BTreeMap keeps per-segment output order deterministic
    let mut by_segment: BTreeMap<&str, Vec<&GpsSample>> = BTreeMap::new();
    for sample in samples {
        if let Some(segment_id) = sample.matched_segment_id.as_deref() {
            by_segment.entry(segment_id).or_default().push(sample);
        }
    }

    let mut events = Vec::new();

    for (segment_id, mut segment_samples) in by_segment {
        segment_samples.sort_by_key(|s| s.timestamp_ms);

        let mut window: Vec<&GpsSample> = Vec::new();

        for sample in segment_samples {
            let speed = sample.speed_mps.unwrap_or(0.0);

            if speed < thresholds.free_flow_mps {
                window.push(sample);
            } else if !window.is_empty() {
                if let Some(event) = finalize_event(segment_id, &window, thresholds, tz) {
                    events.push(event);
                }
                window.clear();
            }
        }

        // Event still open at end of drive
        if !window.is_empty() {
            if let Some(event) = finalize_event(segment_id, &window, thresholds, tz) {
                events.push(event);
            }
        }
    }

    if events.is_empty() {
        debug!("no congestion events in {} samples", samples.len());
    } else {
        info!(
            "detected {} congestion events from {} samples",
            events.len(),
            samples.len()
        );
    }

    events
}

// ============================================================================
// Tests
// ============================================================================
