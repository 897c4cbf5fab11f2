//! Circular Block Bootstrap
//!
//! Estimates the distribution of total PnL and max drawdown of a time-ordered
//! PnL series by resampling contiguous blocks (with wrap-around), which keeps
//! short-range dependence that an i.i.d. bootstrap would destroy.
//!
//! # Determinism Contract
//!
//! Iteration `i` draws from `ChaCha8Rng::seed_from_u64(seed)` on stream `i`.
//! Iterations are independent, so they run in parallel and the quantile maps
//! are bit-identical for a given (series, seed, iterations, block_len) no
//! matter how rayon schedules them.

use crate::replication::config::ConfigError;
use crate::replication::interrupt::{Interrupt, Interrupted};
use crate::replication::metrics::{quantile_sorted, sorted_copy};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Default quantile levels reported for each metric.
pub const DEFAULT_QUANTILES: [f64; 5] = [0.01, 0.05, 0.50, 0.95, 0.99];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub iterations: usize,
    pub block_len: usize,
    pub seed: u64,
    pub quantiles: Vec<f64>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            iterations: 20_000,
            block_len: 50,
            seed: 42,
            quantiles: DEFAULT_QUANTILES.to_vec(),
        }
    }
}

impl BootstrapConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::InvalidBootstrapParameter {
                field: "iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.block_len == 0 {
            return Err(ConfigError::InvalidBootstrapParameter {
                field: "block_len",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.quantiles.is_empty() {
            return Err(ConfigError::InvalidBootstrapParameter {
                field: "quantiles",
                reason: "at least one level required".to_string(),
            });
        }
        if let Some(q) = self.quantiles.iter().find(|q| !(0.0..=1.0).contains(*q)) {
            return Err(ConfigError::InvalidBootstrapParameter {
                field: "quantiles",
                reason: format!("level {} outside [0, 1]", q),
            });
        }
        Ok(())
    }
}

// =============================================================================
// DRAWDOWN
// =============================================================================

/// Streaming max drawdown of a cumulative sum: `max(running_max(cumsum) - cumsum)`.
///
/// The running peak starts at the first cumulative value, not at zero.
#[derive(Debug, Clone, Copy, Default)]
struct DrawdownTracker {
    cum: f64,
    peak: Option<f64>,
    max_dd: f64,
}

impl DrawdownTracker {
    #[inline]
    fn push(&mut self, value: f64) {
        self.cum += value;
        let peak = match self.peak {
            Some(p) if p >= self.cum => p,
            _ => self.cum,
        };
        self.peak = Some(peak);
        let dd = peak - self.cum;
        if dd > self.max_dd {
            self.max_dd = dd;
        }
    }
}

/// Max peak-to-trough decline of the cumulative sum of `pnl`. Zero for empty input.
pub fn max_drawdown(pnl: &[f64]) -> f64 {
    let mut tracker = DrawdownTracker::default();
    for &v in pnl {
        tracker.push(v);
    }
    tracker.max_dd
}

// =============================================================================
// RESULTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantilePoint {
    pub q: f64,
    pub value: f64,
}

/// Quantile level -> value, in configured level order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileMap {
    pub points: Vec<QuantilePoint>,
}

impl QuantileMap {
    fn from_samples(samples: &[f64], levels: &[f64]) -> Self {
        let sorted = sorted_copy(samples);
        Self {
            points: levels
                .iter()
                .filter_map(|&q| quantile_sorted(&sorted, q).map(|value| QuantilePoint { q, value }))
                .collect(),
        }
    }

    pub fn get(&self, q: f64) -> Option<f64> {
        self.points
            .iter()
            .find(|p| (p.q - q).abs() < 1e-12)
            .map(|p| p.value)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapResult {
    /// Finite samples resampled.
    pub n: usize,
    pub iterations: usize,
    pub block_len: usize,
    pub seed: u64,
    pub total_pnl: QuantileMap,
    pub max_drawdown: QuantileMap,
}

/// Bootstrap output. `Empty` when no finite samples were supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BootstrapOutcome {
    Empty,
    Distribution(BootstrapResult),
}

impl BootstrapOutcome {
    pub fn result(&self) -> Option<&BootstrapResult> {
        match self {
            Self::Empty => None,
            Self::Distribution(r) => Some(r),
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Circular block bootstrap over a validated config.
#[derive(Debug, Clone)]
pub struct BlockBootstrap {
    config: BootstrapConfig,
}

impl BlockBootstrap {
    pub fn new(config: BootstrapConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Run to completion.
    pub fn run(&self, pnl: &[f64]) -> BootstrapOutcome {
        match self.run_with_interrupt(pnl, &Interrupt::never()) {
            Ok(outcome) => outcome,
            Err(Interrupted) => unreachable!("never-interrupt flag was raised"),
        }
    }

    /// Run, checking `interrupt` between iterations. An interrupted run
    /// yields no partial quantiles.
    pub fn run_with_interrupt(
        &self,
        pnl: &[f64],
        interrupt: &Interrupt,
    ) -> Result<BootstrapOutcome, Interrupted> {
        let series: Vec<f64> = pnl.iter().copied().filter(|v| v.is_finite()).collect();
        let dropped = pnl.len() - series.len();
        if dropped > 0 {
            tracing::warn!(dropped, "dropped non-finite PnL values before resampling");
        }
        if series.is_empty() {
            tracing::info!("bootstrap on empty series");
            return Ok(BootstrapOutcome::Empty);
        }

        let BootstrapConfig {
            iterations,
            block_len,
            seed,
            ref quantiles,
        } = self.config;

        tracing::info!(n = series.len(), iterations, block_len, seed, "starting block bootstrap");

        let draws: Vec<Option<(f64, f64)>> = (0..iterations)
            .into_par_iter()
            .map(|i| {
                if interrupt.is_raised() {
                    return None;
                }
                Some(resample_once(&series, block_len, seed, i as u64))
            })
            .collect();

        let mut totals = Vec::with_capacity(iterations);
        let mut drawdowns = Vec::with_capacity(iterations);
        for draw in draws {
            let (total, dd) = draw.ok_or(Interrupted)?;
            totals.push(total);
            drawdowns.push(dd);
        }

        let result = BootstrapResult {
            n: series.len(),
            iterations,
            block_len,
            seed,
            total_pnl: QuantileMap::from_samples(&totals, quantiles),
            max_drawdown: QuantileMap::from_samples(&drawdowns, quantiles),
        };
        tracing::debug!(
            p50_total = ?result.total_pnl.get(0.5),
            p50_drawdown = ?result.max_drawdown.get(0.5),
            "bootstrap complete"
        );
        Ok(BootstrapOutcome::Distribution(result))
    }
}

/// One resample of length n: (total, max drawdown).
fn resample_once(series: &[f64], block_len: usize, seed: u64, stream: u64) -> (f64, f64) {
    let n = series.len();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);

    let mut tracker = DrawdownTracker::default();
    let mut filled = 0usize;
    while filled < n {
        let start = rng.gen_range(0..n);
        let take = block_len.min(n - filled);
        for k in 0..take {
            tracker.push(series[(start + k) % n]);
        }
        filled += take;
    }
    (tracker.cum, tracker.max_dd)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(iterations: usize, block_len: usize, seed: u64) -> BlockBootstrap {
        BlockBootstrap::new(BootstrapConfig {
            iterations,
            block_len,
            seed,
            ..BootstrapConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_max_drawdown_reference_series() {
        // cumsum [5, 2, 10, 0, 2], peak [5, 5, 10, 10, 10]
        assert_eq!(max_drawdown(&[5.0, -3.0, 8.0, -10.0, 2.0]), 10.0);
        assert_eq!(max_drawdown(&[]), 0.0);
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), 0.0);
        // peak starts at first cumulative value, not zero
        assert_eq!(max_drawdown(&[-4.0, -1.0]), 1.0);
    }

    #[test]
    fn test_constant_series() {
        let series = [10.0; 5];
        for seed in [0, 7, 42, u64::MAX] {
            let outcome = engine(500, 5, seed).run(&series);
            let result = outcome.result().unwrap();
            assert!(result.total_pnl.values().all(|v| v == 50.0));
            assert!(result.max_drawdown.values().all(|v| v == 0.0));
            assert_eq!(result.total_pnl.points.len(), 5);
        }
    }

    #[test]
    fn test_same_seed_is_bit_identical() {
        let series: Vec<f64> = (0..97).map(|i| ((i * 37) % 11) as f64 - 5.0).collect();
        let a = engine(2_000, 7, 99).run(&series);
        let b = engine(2_000, 7, 99).run(&series);
        assert_eq!(a, b);
        let ra = a.result().unwrap();
        let rb = b.result().unwrap();
        for (x, y) in ra.total_pnl.values().zip(rb.total_pnl.values()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }

        let c = engine(2_000, 7, 100).run(&series);
        assert_ne!(a, c);
    }

    #[test]
    fn test_empty_and_non_finite_input() {
        assert_eq!(engine(10, 5, 1).run(&[]), BootstrapOutcome::Empty);
        assert_eq!(
            engine(10, 5, 1).run(&[f64::NAN, f64::INFINITY]),
            BootstrapOutcome::Empty
        );

        let outcome = engine(10, 5, 1).run(&[f64::NAN, 3.0]);
        let result = outcome.result().unwrap();
        assert_eq!(result.n, 1);
        assert_eq!(result.total_pnl.get(0.5), Some(3.0));
    }

    #[test]
    fn test_block_longer_than_series() {
        let series = [1.0, -2.0, 3.0];
        let outcome = engine(200, 50, 3).run(&series);
        let result = outcome.result().unwrap();
        // every resample is a rotation of the series, so the total never changes
        assert!(result.total_pnl.values().all(|v| (v - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_quantiles_are_ordered() {
        let series: Vec<f64> = (0..200).map(|i| if i % 3 == 0 { -2.0 } else { 1.5 }).collect();
        let outcome = engine(1_000, 10, 5).run(&series);
        let result = outcome.result().unwrap();
        let totals: Vec<f64> = result.total_pnl.values().collect();
        assert!(totals.windows(2).all(|w| w[0] <= w[1]));
        let dds: Vec<f64> = result.max_drawdown.values().collect();
        assert!(dds.iter().all(|d| *d >= 0.0));
    }

    #[test]
    fn test_interrupted_run_has_no_result() {
        let interrupt = Interrupt::new();
        interrupt.raise();
        let res = engine(100, 5, 1).run_with_interrupt(&[1.0, 2.0], &interrupt);
        assert_eq!(res, Err(Interrupted));
    }

    #[test]
    fn test_invalid_config() {
        assert!(BlockBootstrap::new(BootstrapConfig {
            iterations: 0,
            ..BootstrapConfig::default()
        })
        .is_err());
        assert!(BlockBootstrap::new(BootstrapConfig {
            block_len: 0,
            ..BootstrapConfig::default()
        })
        .is_err());
        assert!(BlockBootstrap::new(BootstrapConfig {
            quantiles: vec![1.5],
            ..BootstrapConfig::default()
        })
        .is_err());
    }
}
