#![deny(warnings)]

//! Sample statistics shared by the forecasting engines.
//!
//! This module provides validated utilities for:
//! - Linear-interpolation percentiles over unsorted samples
//! - Equal-width histograms whose bin counts always sum to the sample count
//! - The P10/P50/P90/mean summary used for forecast bounds

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by statistics helpers.
#[derive(Debug, Error, PartialEq)]
pub enum StatsError {
    /// Percentile rank must be finite and within [0, 100].
    #[error("percentile rank must be within [0,100], got {0}")]
    InvalidRank(f64),
    /// A histogram needs at least one bin.
    #[error("histogram requires at least one bin")]
    ZeroBins,
    /// Samples must be finite.
    #[error("non-finite sample value")]
    NonFinite,
}

/// Percentile of `samples` at rank `p` (0..=100) with linear interpolation
/// between the two order statistics bracketing position `(n-1)·p/100`.
///
/// The input is not modified. An empty sample set yields `0.0`.
///
/// Example:
/// let v = percentile(&[3.0, 1.0, 2.0], 50.0).unwrap();
/// assert_eq!(v, 2.0);
pub fn percentile(samples: &[f64], p: f64) -> Result<f64, StatsError> {
    check_rank(p)?;
    let sorted = sorted_copy(samples)?;
    Ok(interpolate(&sorted, p))
}

/// Percentile over samples that are already sorted ascending.
///
/// Lets callers that need several ranks sort once.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Result<f64, StatsError> {
    check_rank(p)?;
    Ok(interpolate(sorted, p))
}

/// Arithmetic mean; `0.0` for an empty sample set.
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Conservative, median and optimistic bounds plus the mean of a sample set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
    pub mean: f64,
}

impl Percentiles {
    /// Summarize `samples`, sorting a single copy for all three ranks.
    pub fn from_samples(samples: &[f64]) -> Result<Self, StatsError> {
        let sorted = sorted_copy(samples)?;
        Ok(Self {
            p10: interpolate(&sorted, 10.0),
            p50: interpolate(&sorted, 50.0),
            p90: interpolate(&sorted, 90.0),
            mean: mean(&sorted),
        })
    }
}

/// One equal-width histogram bin.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    /// Inclusive lower edge.
    pub start: f64,
    /// Upper edge; exclusive except for the final bin.
    pub end: f64,
    /// Number of samples assigned to this bin.
    pub count: usize,
}

impl HistogramBin {
    /// Whether `value` lies within `[start, end]`, both edges inclusive.
    ///
    /// Used to mark reference values; a value sitting exactly on a shared
    /// edge is covered by both neighbouring bins.
    pub fn covers(&self, value: f64) -> bool {
        value >= self.start && value <= self.end
    }
}

/// Partition `[min, max]` of `samples` into `bin_count` equal-width bins.
///
/// Bins are left-inclusive and right-exclusive, except the last which also
/// includes the maximum, so the counts sum to `samples.len()`. When every
/// sample is identical a unit width is used and all mass lands in bin 0.
/// An empty sample set yields unit-width bins starting at zero, all empty.
pub fn histogram(samples: &[f64], bin_count: usize) -> Result<Vec<HistogramBin>, StatsError> {
    if bin_count == 0 {
        return Err(StatsError::ZeroBins);
    }
    if samples.iter().any(|v| !v.is_finite()) {
        return Err(StatsError::NonFinite);
    }
    let (min, max) = samples
        .iter()
        .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .unwrap_or((0.0, 0.0));

    let degenerate = max <= min;
    let width = if degenerate {
        1.0
    } else {
        (max - min) / bin_count as f64
    };

    let mut bins: Vec<HistogramBin> = (0..bin_count)
        .map(|i| HistogramBin {
            start: min + i as f64 * width,
            end: min + (i + 1) as f64 * width,
            count: 0,
        })
        .collect();
    if !degenerate {
        // Pin the closed upper edge to the exact maximum.
        bins[bin_count - 1].end = max;
    }

    for &v in samples {
        let raw = ((v - min) / width).floor();
        let idx = if raw <= 0.0 {
            0
        } else {
            (raw as usize).min(bin_count - 1)
        };
        bins[idx].count += 1;
    }
    Ok(bins)
}

fn check_rank(p: f64) -> Result<(), StatsError> {
    if !p.is_finite() || !(0.0..=100.0).contains(&p) {
        return Err(StatsError::InvalidRank(p));
    }
    Ok(())
}

fn sorted_copy(samples: &[f64]) -> Result<Vec<f64>, StatsError> {
    if samples.iter().any(|v| !v.is_finite()) {
        return Err(StatsError::NonFinite);
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    Ok(sorted)
}

fn interpolate(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = (n - 1) as f64 * p / 100.0;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            if lo == hi {
                return sorted[lo];
            }
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}
