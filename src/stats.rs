//! # Segment Statistics Aggregation
//!
//! Folds batches of congestion events into rolling per-segment aggregates.
//! Each event contributes to five aggregation keys: all-time, per-weekday,
//! per-hour, per-weekday-and-hour, and per-ISO-week bucket.
//!
//! Merge semantics per key: `event_count` and `total_duration_ms` are true
//! cumulative counters and increment across batches; `avg_speed_mps`, the
//! severity percentages, and the derived `congestion_score` are overwritten
//! with the latest batch's values. The asymmetry mirrors the recording
//! system's observed behavior and is pinned by tests; a cumulative variant
//! would be a deliberate, reviewed change.
//!
//! The store assumes serialized access: concurrent batches updating the same
//! key must be serialized by the caller (for example one transaction per
//! drive), or the counter increments would double-apply.

use crate::congestion::{week_start_ms, CongestionEvent, Severity};
use chrono::TimeZone;
use log::info;
use std::collections::HashMap;

/// Aggregation key: `None` dimensions mean "any".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatKey {
    pub segment_id: String,
    /// 0 = Sunday .. 6 = Saturday, or `None` for all days.
    pub day_of_week: Option<u8>,
    /// 0-23, or `None` for all hours.
    pub hour_of_day: Option<u8>,
    /// Monday-00:00 timestamp (ms) of the week bucket, or `None` for all weeks.
    pub week_start_ms: Option<i64>,
}

impl StatKey {
    pub fn all_time(segment_id: &str) -> Self {
        Self {
            segment_id: segment_id.to_string(),
            day_of_week: None,
            hour_of_day: None,
            week_start_ms: None,
        }
    }
}

/// A rolling aggregate row for one key.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentStatistics {
    /// Cumulative event count across all processed batches.
    pub event_count: u64,
    /// Cumulative congestion time in milliseconds.
    pub total_duration_ms: i64,
    /// Mean event speed of the latest batch (m/s).
    pub avg_speed_mps: f64,
    /// Severity mix of the latest batch, percentages summing to 100.
    pub pct_free_flow: f64,
    pub pct_slow: f64,
    pub pct_congested: f64,
    pub pct_heavy: f64,
    pub pct_gridlock: f64,
    /// 0-100, 100 = always free-flowing; derived from the latest batch's mix.
    pub congestion_score: f64,
}

/// Per-key accumulation for one batch.
#[derive(Debug, Default)]
struct BatchAccumulator {
    event_count: u64,
    total_duration_ms: i64,
    speed_sum: f64,
    severity_counts: [u64; 5],
}

impl BatchAccumulator {
    fn add(&mut self, event: &CongestionEvent) {
        self.event_count += 1;
        self.total_duration_ms += event.duration_ms;
        self.speed_sum += event.avg_speed_mps;
        self.severity_counts[event.severity.index()] += 1;
    }

    fn percentages(&self) -> [f64; 5] {
        let total: u64 = self.severity_counts.iter().sum();
        if total == 0 {
            return [0.0; 5];
        }
        let mut pct = [0.0; 5];
        for (p, &count) in pct.iter_mut().zip(self.severity_counts.iter()) {
            *p = count as f64 / total as f64 * 100.0;
        }
        pct
    }
}

/// Weighted-tier score from a severity percentage mix.
fn congestion_score(pct: &[f64; 5]) -> f64 {
    (pct[Severity::FreeFlow.index()] * 100.0
        + pct[Severity::Slow.index()] * 75.0
        + pct[Severity::Congested.index()] * 50.0
        + pct[Severity::Heavy.index()] * 25.0)
        / 100.0
}

/// In-memory per-segment aggregate store, queryable by
/// `(segment, day_of_week?, hour_of_day?, week_start?)`.
#[derive(Debug, Default)]
pub struct StatisticsStore {
    rows: HashMap<StatKey, SegmentStatistics>,
}

impl StatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one batch of events (typically one completed drive's worth)
    /// into the store.
    pub fn apply_batch<Tz: TimeZone>(&mut self, events: &[CongestionEvent], tz: &Tz) {
        if events.is_empty() {
            return;
        }

        // Group the batch by aggregation key first, then merge per key
        let mut batch: HashMap<StatKey, BatchAccumulator> = HashMap::new();

        for event in events {
            for key in aggregation_keys(event, tz) {
                batch.entry(key).or_default().add(event);
            }
        }

        let key_count = batch.len();
        for (key, acc) in batch {
            let pct = acc.percentages();
            let avg_speed_mps = acc.speed_sum / acc.event_count as f64;
            let score = congestion_score(&pct);

            match self.rows.get_mut(&key) {
                Some(row) => {
                    // Counters accumulate; the rest is latest-batch-wins
                    row.event_count += acc.event_count;
                    row.total_duration_ms += acc.total_duration_ms;
                    row.avg_speed_mps = avg_speed_mps;
                    row.pct_free_flow = pct[0];
                    row.pct_slow = pct[1];
                    row.pct_congested = pct[2];
                    row.pct_heavy = pct[3];
                    row.pct_gridlock = pct[4];
                    row.congestion_score = score;
                }
                None => {
                    self.rows.insert(
                        key,
                        SegmentStatistics {
                            event_count: acc.event_count,
                            total_duration_ms: acc.total_duration_ms,
                            avg_speed_mps,
                            pct_free_flow: pct[0],
                            pct_slow: pct[1],
                            pct_congested: pct[2],
                            pct_heavy: pct[3],
                            pct_gridlock: pct[4],
                            congestion_score: score,
                        },
                    );
                }
            }
        }

        info!(
            "folded {} events into {} statistics rows",
            events.len(),
            key_count
        );
    }

    /// Look up one aggregate row.
    pub fn get(&self, key: &StatKey) -> Option<&SegmentStatistics> {
        self.rows.get(key)
    }

    /// Look up by dimensions; `None` dimensions select the "any" rollup.
    pub fn query(
        &self,
        segment_id: &str,
        day_of_week: Option<u8>,
        hour_of_day: Option<u8>,
        week_start_ms: Option<i64>,
    ) -> Option<&SegmentStatistics> {
        self.rows.get(&StatKey {
            segment_id: segment_id.to_string(),
            day_of_week,
            hour_of_day,
            week_start_ms,
        })
    }

    /// All rows, in arbitrary order.
    pub fn rows(&self) -> impl Iterator<Item = (&StatKey, &SegmentStatistics)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The five aggregation keys one event contributes to.
fn aggregation_keys<Tz: TimeZone>(event: &CongestionEvent, tz: &Tz) -> Vec<StatKey> {
    let segment_id = event.segment_id.clone();
    let mut keys = vec![
        StatKey::all_time(&segment_id),
        StatKey {
            segment_id: segment_id.clone(),
            day_of_week: Some(event.day_of_week),
            hour_of_day: None,
            week_start_ms: None,
        },
        StatKey {
            segment_id: segment_id.clone(),
            day_of_week: None,
            hour_of_day: Some(event.hour_of_day),
            week_start_ms: None,
        },
        StatKey {
            segment_id: segment_id.clone(),
            day_of_week: Some(event.day_of_week),
            hour_of_day: Some(event.hour_of_day),
            week_start_ms: None,
        },
    ];

    if let Some(week) = week_start_ms(event.start_time_ms, tz) {
        keys.push(StatKey {
            segment_id,
            day_of_week: None,
            hour_of_day: None,
            week_start_ms: Some(week),
        });
    }

    keys
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congestion::Severity;
    use chrono::Utc;

    /// 2024-01-01T00:00:00Z, a Monday.
    const MONDAY_MS: i64 = 1_704_067_200_000;

    fn event(segment: &str, severity: Severity, avg_speed: f64, start_ms: i64) -> CongestionEvent {
        CongestionEvent {
            drive_id: "drive-1".to_string(),
            segment_id: segment.to_string(),
            start_time_ms: start_ms,
            end_time_ms: start_ms + 60_000,
            duration_ms: 60_000,
            day_of_week: 1,
            hour_of_day: 0,
            iso_week: 1,
            severity,
            avg_speed_mps: avg_speed,
            min_speed_mps: avg_speed,
            max_speed_mps: avg_speed,
            distance_meters: 100.0,
            start_gps_id: "g0".to_string(),
            end_gps_id: "g1".to_string(),
        }
    }

    #[test]
    fn test_single_event_creates_five_rows() {
        let mut store = StatisticsStore::new();
        store.apply_batch(&[event("s1", Severity::Slow, 6.0, MONDAY_MS)], &Utc);

        assert_eq!(store.len(), 5);
        assert!(store.query("s1", None, None, None).is_some());
        assert!(store.query("s1", Some(1), None, None).is_some());
        assert!(store.query("s1", None, Some(0), None).is_some());
        assert!(store.query("s1", Some(1), Some(0), None).is_some());
        assert!(store.query("s1", None, None, Some(MONDAY_MS)).is_some());
    }

    #[test]
    fn test_all_time_row_values() {
        let mut store = StatisticsStore::new();
        store.apply_batch(&[event("s1", Severity::Slow, 6.0, MONDAY_MS)], &Utc);

        let row = store.query("s1", None, None, None).unwrap();
        assert_eq!(row.event_count, 1);
        assert_eq!(row.total_duration_ms, 60_000);
        assert!((row.avg_speed_mps - 6.0).abs() < 1e-9);
        assert_eq!(row.pct_slow, 100.0);
        assert_eq!(row.pct_free_flow, 0.0);
        assert!((row.congestion_score - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_counters_increment_scores_overwrite() {
        let mut store = StatisticsStore::new();

        // Batch 1: a SLOW event (score 75)
        store.apply_batch(&[event("s1", Severity::Slow, 6.0, MONDAY_MS)], &Utc);
        // Batch 2: a GRIDLOCK event (score 0)
        store.apply_batch(&[event("s1", Severity::Gridlock, 0.5, MONDAY_MS + 3_600_000)], &Utc);

        let row = store.query("s1", None, None, None).unwrap();
        // Counters are lifetime-cumulative...
        assert_eq!(row.event_count, 2);
        assert_eq!(row.total_duration_ms, 120_000);
        // ...but the mix and score reflect only the second batch
        assert_eq!(row.pct_gridlock, 100.0);
        assert_eq!(row.pct_slow, 0.0);
        assert_eq!(row.congestion_score, 0.0);
        assert!((row.avg_speed_mps - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_mixed_batch_percentages() {
        let mut store = StatisticsStore::new();
        store.apply_batch(
            &[
                event("s1", Severity::Slow, 6.0, MONDAY_MS),
                event("s1", Severity::Gridlock, 0.5, MONDAY_MS + 60_000),
            ],
            &Utc,
        );

        let row = store.query("s1", None, None, None).unwrap();
        assert_eq!(row.event_count, 2);
        assert_eq!(row.pct_slow, 50.0);
        assert_eq!(row.pct_gridlock, 50.0);
        // (50*75 + 50*0) / 100
        assert!((row.congestion_score - 37.5).abs() < 1e-9);
        assert!((row.avg_speed_mps - 3.25).abs() < 1e-9);
    }

    #[test]
    fn test_week_bucket_key() {
        let mut store = StatisticsStore::new();
        // Wednesday of the same ISO week
        let wednesday = MONDAY_MS + 2 * 86_400_000;
        store.apply_batch(&[event("s1", Severity::Heavy, 2.0, wednesday)], &Utc);

        let row = store.query("s1", None, None, Some(MONDAY_MS)).unwrap();
        assert_eq!(row.event_count, 1);
        assert!((row.congestion_score - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_segments_are_independent() {
        let mut store = StatisticsStore::new();
        store.apply_batch(
            &[
                event("s1", Severity::Slow, 6.0, MONDAY_MS),
                event("s2", Severity::Gridlock, 0.5, MONDAY_MS),
            ],
            &Utc,
        );

        assert_eq!(store.len(), 10);
        let s1 = store.query("s1", None, None, None).unwrap();
        let s2 = store.query("s2", None, None, None).unwrap();
        assert_eq!(s1.pct_slow, 100.0);
        assert_eq!(s2.pct_gridlock, 100.0);
        // Each segment owns exactly half the rows
        assert_eq!(store.rows().filter(|(k, _)| k.segment_id == "s1").count(), 5);
        assert_eq!(store.rows().filter(|(k, _)| k.segment_id == "s2").count(), 5);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut store = StatisticsStore::new();
        store.apply_batch(&[], &Utc);
        assert!(store.is_empty());
    }
}
