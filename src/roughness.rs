//! # Road Roughness Analysis
//!
//! Scores road surface quality from accelerometer Z-axis data. A rolling
//! standard deviation of vertical acceleration is the bump/vibration proxy:
//! each retained window value is bucketed into one of five severity tiers,
//! and the tier mix reduces to a single 0-100 score (100 = smoothest).
//!
//! The analysis assumes a gravity-dominated, roughly-level device mounting
//! (Z ~ +9.8 m/s^2 at rest) and performs no frame rotation and no speed
//! normalization.

use crate::AccelSample;
use log::debug;

/// Configuration for roughness analysis.
///
/// The tier bounds are thresholds on the rolling standard deviation of Z
/// acceleration, in m/s^2.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoughnessConfig {
    /// Rolling window length in samples. Sequences shorter than this
    /// produce no result.
    pub window_size: usize,
    /// Values below this are "smooth".
    pub smooth_below: f64,
    /// Values below this (and not smooth) are "light".
    pub light_below: f64,
    /// Values below this (and not lighter) are "moderate".
    pub moderate_below: f64,
    /// Values below this are "rough"; at or above, "very rough".
    pub rough_below: f64,
}

impl Default for RoughnessConfig {
    fn default() -> Self {
        Self {
            window_size: 15,
            smooth_below: 0.5,
            light_below: 1.5,
            moderate_below: 3.0,
            rough_below: 5.0,
        }
    }
}

/// Percentage of retained window values in each severity tier.
/// Always sums to exactly 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoughnessBreakdown {
    pub smooth: u8,
    pub light: u8,
    pub moderate: u8,
    pub rough: u8,
    pub very_rough: u8,
}

/// Result of analyzing one drive's accelerometer sequence.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoughnessResult {
    /// 0-100, 100 = perfectly smooth.
    pub score: u8,
    pub breakdown: RoughnessBreakdown,
    /// Mean of the retained std-dev values (diagnostic).
    pub avg_roughness: f64,
    /// Peak std-dev value detected (diagnostic).
    pub max_roughness: f64,
}

/// Per-tier point values for the weighted score.
const TIER_WEIGHTS: [u32; 5] = [100, 75, 50, 25, 0];

/// Rolling population standard deviation of Z, one value per input sample.
/// The window grows from 1 up to `window_size`, then slides.
fn rolling_std_dev(samples: &[AccelSample], window_size: usize) -> Vec<f64> {
    let mut std_devs = Vec::with_capacity(samples.len());

    for i in 0..samples.len() {
        let start = (i + 1).saturating_sub(window_size);
        let window = &samples[start..=i];

        if window.len() < 2 {
            std_devs.push(0.0);
            continue;
        }

        let n = window.len() as f64;
        let mean = window.iter().map(|s| s.z).sum::<f64>() / n;
        let variance = window.iter().map(|s| (s.z - mean).powi(2)).sum::<f64>() / n;
        std_devs.push(variance.sqrt());
    }

    std_devs
}

/// Tier index (0 = smooth .. 4 = very rough) for one std-dev value.
fn tier_index(std_dev: f64, config: &RoughnessConfig) -> usize {
    if std_dev < config.smooth_below {
        0
    } else if std_dev < config.light_below {
        1
    } else if std_dev < config.moderate_below {
        2
    } else if std_dev < config.rough_below {
        3
    } else {
        4
    }
}

/// Analyze a time-ordered accelerometer sequence.
///
/// Returns `None` when the sequence is shorter than the configured window -
/// insufficient data, not an error.
///
/// Only values computed from a full window count toward the result: the
/// first `window_size - 1` rolling values are warm-up and are discarded.
/// Tier counts convert to integer percentages with a single residual
/// correction applied to the largest tier, so the breakdown always sums to
/// exactly 100.
pub fn analyze_roughness(
    samples: &[AccelSample],
    config: &RoughnessConfig,
) -> Option<RoughnessResult> {
    if samples.len() < config.window_size {
        return None;
    }

    let std_devs = rolling_std_dev(samples, config.window_size);
    let warm_up = config.window_size.saturating_sub(1);
    let retained = &std_devs[warm_up..];

    if retained.is_empty() {
        return None;
    }

    let mut counts = [0u32; 5];
    let mut total_roughness = 0.0;
    let mut max_roughness = 0.0f64;

    for &value in retained {
        counts[tier_index(value, config)] += 1;
        total_roughness += value;
        max_roughness = max_roughness.max(value);
    }

    let total = retained.len() as f64;
    let mut percentages: [i32; 5] = [0; 5];
    for (pct, &count) in percentages.iter_mut().zip(counts.iter()) {
        *pct = ((count as f64 / total) * 100.0).round() as i32;
    }

    // Rounding can leave the sum off by a point or two; put the residual on
    // the largest tier (first wins on ties) so the total is exactly 100
    let sum: i32 = percentages.iter().sum();
    if sum != 100 && sum > 0 {
        let largest = percentages
            .iter()
            .enumerate()
            .max_by_key(|&(i, &pct)| (pct, std::cmp::Reverse(i)))
            .map(|(i, _)| i)
            .unwrap_or(0);
        percentages[largest] += 100 - sum;
    }

    let weighted: i64 = percentages
        .iter()
        .zip(TIER_WEIGHTS.iter())
        .map(|(&pct, &w)| pct as i64 * w as i64)
        .sum();
    let score = ((weighted as f64) / 100.0).round() as u8;

    let breakdown = RoughnessBreakdown {
        smooth: percentages[0] as u8,
        light: percentages[1] as u8,
        moderate: percentages[2] as u8,
        rough: percentages[3] as u8,
        very_rough: percentages[4] as u8,
    };

    debug!(
        "roughness: {} samples -> score {} (avg {:.3}, max {:.3})",
        samples.len(),
        score,
        total_roughness / total,
        max_roughness
    );

    Some(RoughnessResult {
        score,
        breakdown,
        avg_roughness: total_roughness / total,
        max_roughness,
    })
}

// ============================================================================
// Tests
// ============================================================================
