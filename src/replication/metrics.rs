//! Summary Statistics
//!
//! Small, allocation-light statistics shared by the report builders. Every
//! function returns `None` on empty input so reports can tell "no samples" apart
//! from a real zero.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};
use std::cmp::Ordering;

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().mean())
}

/// Median (average of the two middle values for even counts).
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(Data::new(values.to_vec()).median())
}

/// Population standard deviation (divides by n).
pub fn population_std(values: &[f64]) -> Option<f64> {
    match values.len() {
        0 => None,
        1 => Some(0.0),
        _ => Some(values.iter().population_std_dev()),
    }
}

/// Sample standard deviation (divides by n - 1); a single sample has zero spread.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    match values.len() {
        0 => None,
        1 => Some(0.0),
        _ => Some(values.iter().std_dev()),
    }
}

/// Sort ascending; NaN never reaches here because callers drop non-finite input.
pub fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

/// Quantile with linear interpolation between closest ranks.
///
/// `sorted` must be ascending. `q` is clamped to [0, 1].
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Nearest-rank quantile: the element at `round((n - 1) * q)`.
///
/// Used for latency percentiles, where reporting an observed sample matters
/// more than interpolation.
pub fn quantile_nearest(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted_copy(values);
    let idx = ((sorted.len() - 1) as f64 * q.clamp(0.0, 1.0)).round() as usize;
    Some(sorted[idx.min(sorted.len() - 1)])
}

/// Mean / median / population standard deviation of a difference series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiffStats {
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
}

impl DiffStats {
    /// `None` when there are no samples.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        Some(Self {
            n: values.len(),
            mean: mean(values)?,
            median: median(values)?,
            std: population_std(values)?,
        })
    }
}

/// Absolute time-delta distribution for matched pairs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub n: usize,
    pub median_ms: f64,
    pub p90_ms: f64,
}

impl LatencySummary {
    pub fn from_abs_deltas_ms(abs_deltas_ms: &[f64]) -> Option<Self> {
        Some(Self {
            n: abs_deltas_ms.len(),
            median_ms: median(abs_deltas_ms)?,
            p90_ms: quantile_nearest(abs_deltas_ms, 0.9)?,
        })
    }
}

/// `num / den`, or `None` for an empty denominator.
#[inline]
pub fn ratio(num: usize, den: usize) -> Option<f64> {
    if den == 0 {
        None
    } else {
        Some(num as f64 / den as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_inputs() {
        assert_eq!(mean(&[]), None);
        assert_eq!(median(&[]), None);
        assert_eq!(population_std(&[]), None);
        assert_eq!(quantile_sorted(&[], 0.5), None);
        assert_eq!(quantile_nearest(&[], 0.5), None);
        assert!(DiffStats::from_values(&[]).is_none());
        assert!(LatencySummary::from_abs_deltas_ms(&[]).is_none());
        assert_eq!(ratio(3, 0), None);
    }

    #[test]
    fn test_moments() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((mean(&v).unwrap() - 2.5).abs() < 1e-12);
        assert!((median(&v).unwrap() - 2.5).abs() < 1e-12);
        // population variance = 1.25
        assert!((population_std(&v).unwrap() - 1.25f64.sqrt()).abs() < 1e-12);
        // sample variance = 5/3
        assert!((sample_std(&v).unwrap() - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(sample_std(&[7.0]), Some(0.0));
    }

    #[test]
    fn test_linear_quantile() {
        let sorted = [0.0, 10.0, 20.0, 30.0, 40.0];
        assert_eq!(quantile_sorted(&sorted, 0.0), Some(0.0));
        assert_eq!(quantile_sorted(&sorted, 1.0), Some(40.0));
        assert_eq!(quantile_sorted(&sorted, 0.5), Some(20.0));
        assert!((quantile_sorted(&sorted, 0.05).unwrap() - 2.0).abs() < 1e-12);
        assert!((quantile_sorted(&sorted, 0.99).unwrap() - 39.6).abs() < 1e-9);
    }

    #[test]
    fn test_nearest_rank_quantile() {
        let v = [500.0, 100.0, 300.0, 200.0, 400.0];
        assert_eq!(quantile_nearest(&v, 0.9), Some(500.0));
        assert_eq!(quantile_nearest(&v, 0.5), Some(300.0));
        assert_eq!(quantile_nearest(&[42.0], 0.9), Some(42.0));
    }
}
