//! Trade Stream Matcher
//!
//! Reconciles a candidate fill stream (e.g. a simulator's) against a baseline
//! stream (the observed account) and reports how much of the baseline the
//! candidate reproduces.
//!
//! # Algorithm
//!
//! Both streams are partitioned by `MatchKey` (market, outcome, side); fills
//! never match across buckets. Within a bucket, baseline fills are walked in
//! time order. For each one, unconsumed candidates inside
//! `[t - max_delta, t + max_delta]` whose price is within `price_eps` are
//! eligible; the winner has the smallest |dt|, then the smallest price
//! difference, then the earliest position in the time-sorted candidate list.
//! A matched candidate is consumed and cannot match again.
//!
//! This is a greedy assignment. An earlier baseline fill can take a candidate
//! that a later one needed, so recall is a lower bound on what an optimal
//! bipartite assignment would reach.
//!
//! # Unmatched Reasons
//!
//! - `NO_SIM`: the bucket has no candidate fills at all.
//! - `NO_PRICE_MATCH`: some unconsumed candidate is inside the time window but
//!   none is within price tolerance.
//! - `NO_TIME_MATCH`: everything else, including a window whose candidates
//!   were all consumed already.
//!
//! # Determinism
//!
//! Buckets are kept in a `BTreeMap`, matched in parallel, collected in key
//! order and reduced sequentially, so reports are identical run to run.

use crate::replication::clock::{millis_to_nanos, nanos_to_millis_f64, Nanos};
use crate::replication::config::{require_non_negative, ConfigError};
use crate::replication::events::{MarketId, MarketSeries, Outcome, Price, Side, Size};
use crate::replication::interrupt::{Interrupt, Interrupted};
use crate::replication::metrics::{ratio, LatencySummary};
use crate::replication::trade::FillPrint;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Absorbs float noise in price differences (e.g. 0.5005 - 0.5).
const PRICE_SLACK: f64 = 1e-12;

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Half-width of the time window.
    pub max_delta_ms: i64,
    /// Maximum absolute price difference.
    pub price_eps: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_delta_ms: 1500,
            price_eps: 0.0005,
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_delta_ms < 0 {
            return Err(ConfigError::NegativeTolerance {
                field: "max_delta_ms",
                value: self.max_delta_ms as f64,
            });
        }
        require_non_negative("price_eps", self.price_eps)
    }
}

// =============================================================================
// TYPES
// =============================================================================

/// Bucketing key. Fills only match within one bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchKey {
    pub market_id: MarketId,
    pub outcome: Outcome,
    pub side: Side,
}

impl MatchKey {
    pub fn of(fill: &FillPrint) -> Self {
        Self {
            market_id: fill.market_id.clone(),
            outcome: fill.outcome,
            side: fill.side,
        }
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.market_id, self.outcome, self.side)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MismatchReason {
    NoSim,
    NoPriceMatch,
    NoTimeMatch,
}

impl MismatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSim => "NO_SIM",
            Self::NoPriceMatch => "NO_PRICE_MATCH",
            Self::NoTimeMatch => "NO_TIME_MATCH",
        }
    }
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One baseline/candidate pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub market_id: MarketId,
    pub outcome: Outcome,
    pub side: Side,
    pub baseline_ts: Nanos,
    pub candidate_ts: Nanos,
    /// `candidate_ts - baseline_ts` in milliseconds.
    pub delta_ms: f64,
    /// `candidate.price - baseline.price`.
    pub price_diff: Price,
    pub baseline_size: Size,
    pub candidate_size: Size,
}

/// A baseline fill without a counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedFill {
    pub market_id: MarketId,
    pub outcome: Outcome,
    pub side: Side,
    pub timestamp: Nanos,
    pub price: Price,
    pub reason: MismatchReason,
}

/// Recall / precision / latency / reasons for one slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStats {
    pub baseline_n: usize,
    pub candidate_n: usize,
    pub matched_baseline: usize,
    pub matched_candidate: usize,
    /// `matched_baseline / baseline_n` in percent; absent without baseline fills.
    pub recall_pct: Option<f64>,
    /// `matched_candidate / candidate_n` in percent; absent without candidate fills.
    pub precision_pct: Option<f64>,
    /// |dt| distribution over matched pairs.
    pub latency: Option<LatencySummary>,
    pub reasons: BTreeMap<MismatchReason, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub config: MatcherConfig,
    pub global: MatchStats,
    pub by_series: BTreeMap<MarketSeries, MatchStats>,
    pub by_market: BTreeMap<MarketId, MatchStats>,
    /// In bucket key order, then baseline time order.
    pub pairs: Vec<MatchedPair>,
    pub unmatched: Vec<UnmatchedFill>,
}

/// `NoData` when both streams are empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchOutcome {
    NoData,
    Report(MatchReport),
}

impl MatchOutcome {
    pub fn report(&self) -> Option<&MatchReport> {
        match self {
            Self::NoData => None,
            Self::Report(r) => Some(r),
        }
    }
}

// =============================================================================
// BUCKET MATCHING
// =============================================================================

#[derive(Debug, Default)]
struct Bucket<'a> {
    baseline: Vec<&'a FillPrint>,
    candidate: Vec<&'a FillPrint>,
}

#[derive(Debug)]
struct BucketResult {
    key: MatchKey,
    baseline_n: usize,
    candidate_n: usize,
    pairs: Vec<MatchedPair>,
    unmatched: Vec<UnmatchedFill>,
}

#[derive(Debug, Clone, Copy)]
struct Pick {
    idx: usize,
    abs_dt: Nanos,
    price_diff: f64,
}

fn match_bucket(key: MatchKey, mut bucket: Bucket<'_>, max_delta: Nanos, price_eps: f64) -> BucketResult {
    // stable: equal timestamps keep stream order
    bucket.baseline.sort_by_key(|f| f.timestamp);
    bucket.candidate.sort_by_key(|f| f.timestamp);

    let cands = &bucket.candidate;
    let mut consumed = vec![false; cands.len()];
    let mut pairs = Vec::new();
    let mut unmatched = Vec::new();

    for base in &bucket.baseline {
        let reason = if cands.is_empty() {
            Some(MismatchReason::NoSim)
        } else {
            let lo_ts = base.timestamp.saturating_sub(max_delta);
            let hi_ts = base.timestamp.saturating_add(max_delta);
            let lo = cands.partition_point(|c| c.timestamp < lo_ts);
            let hi = cands.partition_point(|c| c.timestamp <= hi_ts);

            let mut any_in_window = false;
            let mut best: Option<Pick> = None;
            for (j, cand) in cands.iter().enumerate().take(hi).skip(lo) {
                if consumed[j] {
                    continue;
                }
                any_in_window = true;
                let price_diff = (cand.price - base.price).abs();
                if price_diff > price_eps + PRICE_SLACK {
                    continue;
                }
                let abs_dt = (cand.timestamp - base.timestamp).abs();
                let better = match best {
                    None => true,
                    Some(b) => abs_dt < b.abs_dt || (abs_dt == b.abs_dt && price_diff < b.price_diff),
                };
                if better {
                    best = Some(Pick {
                        idx: j,
                        abs_dt,
                        price_diff,
                    });
                }
            }

            match best {
                Some(pick) => {
                    consumed[pick.idx] = true;
                    let cand = cands[pick.idx];
                    pairs.push(MatchedPair {
                        market_id: key.market_id.clone(),
                        outcome: key.outcome,
                        side: key.side,
                        baseline_ts: base.timestamp,
                        candidate_ts: cand.timestamp,
                        delta_ms: nanos_to_millis_f64(cand.timestamp - base.timestamp),
                        price_diff: cand.price - base.price,
                        baseline_size: base.size,
                        candidate_size: cand.size,
                    });
                    None
                }
                None if any_in_window => Some(MismatchReason::NoPriceMatch),
                None => Some(MismatchReason::NoTimeMatch),
            }
        };

        if let Some(reason) = reason {
            unmatched.push(UnmatchedFill {
                market_id: key.market_id.clone(),
                outcome: key.outcome,
                side: key.side,
                timestamp: base.timestamp,
                price: base.price,
                reason,
            });
        }
    }

    BucketResult {
        baseline_n: bucket.baseline.len(),
        candidate_n: bucket.candidate.len(),
        key,
        pairs,
        unmatched,
    }
}

// =============================================================================
// AGGREGATION
// =============================================================================

#[derive(Debug, Default)]
struct StatsAccumulator {
    baseline_n: usize,
    candidate_n: usize,
    matched: usize,
    abs_deltas_ms: Vec<f64>,
    reasons: BTreeMap<MismatchReason, usize>,
}

impl StatsAccumulator {
    fn add(&mut self, bucket: &BucketResult) {
        self.baseline_n += bucket.baseline_n;
        self.candidate_n += bucket.candidate_n;
        self.matched += bucket.pairs.len();
        self.abs_deltas_ms
            .extend(bucket.pairs.iter().map(|p| p.delta_ms.abs()));
        for u in &bucket.unmatched {
            *self.reasons.entry(u.reason).or_insert(0) += 1;
        }
    }

    fn finish(self) -> MatchStats {
        MatchStats {
            baseline_n: self.baseline_n,
            candidate_n: self.candidate_n,
            matched_baseline: self.matched,
            matched_candidate: self.matched,
            recall_pct: ratio(self.matched, self.baseline_n).map(|r| r * 100.0),
            precision_pct: ratio(self.matched, self.candidate_n).map(|r| r * 100.0),
            latency: LatencySummary::from_abs_deltas_ms(&self.abs_deltas_ms),
            reasons: self.reasons,
        }
    }
}

// =============================================================================
// MATCHER
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct StreamMatcher {
    config: MatcherConfig,
}

impl StreamMatcher {
    pub fn new(config: MatcherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn run(&self, baseline: &[FillPrint], candidate: &[FillPrint]) -> MatchOutcome {
        match self.run_with_interrupt(baseline, candidate, &Interrupt::never()) {
            Ok(outcome) => outcome,
            Err(Interrupted) => unreachable!("never-interrupt flag was raised"),
        }
    }

    /// Match the streams, checking `interrupt` before each bucket.
    pub fn run_with_interrupt(
        &self,
        baseline: &[FillPrint],
        candidate: &[FillPrint],
        interrupt: &Interrupt,
    ) -> Result<MatchOutcome, Interrupted> {
        if baseline.is_empty() && candidate.is_empty() {
            tracing::info!("both streams empty; no-data match report");
            return Ok(MatchOutcome::NoData);
        }

        let mut buckets: BTreeMap<MatchKey, Bucket<'_>> = BTreeMap::new();
        for fill in baseline {
            buckets.entry(MatchKey::of(fill)).or_default().baseline.push(fill);
        }
        for fill in candidate {
            buckets.entry(MatchKey::of(fill)).or_default().candidate.push(fill);
        }

        let max_delta = millis_to_nanos(self.config.max_delta_ms);
        let price_eps = self.config.price_eps;
        tracing::info!(
            baseline = baseline.len(),
            candidate = candidate.len(),
            buckets = buckets.len(),
            max_delta_ms = self.config.max_delta_ms,
            price_eps,
            "matching trade streams"
        );

        let results: Vec<Option<BucketResult>> = buckets
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(key, bucket)| {
                if interrupt.is_raised() {
                    return None;
                }
                Some(match_bucket(key, bucket, max_delta, price_eps))
            })
            .collect();

        let mut global = StatsAccumulator::default();
        let mut by_series: BTreeMap<MarketSeries, StatsAccumulator> = BTreeMap::new();
        let mut by_market: BTreeMap<MarketId, StatsAccumulator> = BTreeMap::new();
        let mut pairs = Vec::new();
        let mut unmatched = Vec::new();

        for result in results {
            let result = result.ok_or(Interrupted)?;
            global.add(&result);
            by_series
                .entry(MarketSeries::from_slug(&result.key.market_id))
                .or_default()
                .add(&result);
            by_market
                .entry(result.key.market_id.clone())
                .or_default()
                .add(&result);
            pairs.extend(result.pairs);
            unmatched.extend(result.unmatched);
        }

        let global = global.finish();
        tracing::info!(
            matched = global.matched_baseline,
            recall_pct = ?global.recall_pct,
            precision_pct = ?global.precision_pct,
            "stream matching complete"
        );

        Ok(MatchOutcome::Report(MatchReport {
            config: self.config.clone(),
            global,
            by_series: by_series.into_iter().map(|(k, v)| (k, v.finish())).collect(),
            by_market: by_market.into_iter().map(|(k, v)| (k, v.finish())).collect(),
            pairs,
            unmatched,
        }))
    }
}
