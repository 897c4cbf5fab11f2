//! Backtest Orchestrator
//!
//! Replays an observed trade stream through the strategy evaluator and the
//! comparator in one pass and folds the comparisons into a `BacktestReport`.
//!
//! # Time Semantics
//!
//! The opposite leg's book is resolved from the `TobCache` as of the trade's
//! own timestamp. The cache never answers with a snapshot stamped after the
//! query time, so a decision can only see what was known when the trade
//! printed.
//!
//! Comparisons do not outlive the pass: each one is reduced into the report
//! accumulator as soon as it is produced.

use crate::replication::book::{BookSnapshot, TobCache, TopOfBook};
use crate::replication::clock::format_nanos;
use crate::replication::comparator::{Comparison, TradeComparator};
use crate::replication::config::ReplicaConfig;
use crate::replication::events::MarketSeries;
use crate::replication::interrupt::{Interrupt, Interrupted};
use crate::replication::metrics::{mean, ratio, DiffStats};
use crate::replication::strategy::{DecisionReason, StrategyEvaluator};
use crate::replication::trade::{screen_trades, DataQualityReport, TradeRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// REPORT TYPES
// =============================================================================

/// Observed vs simulated PnL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PnlComparison {
    /// Sum of authoritative realized PnL over all trades that carry it.
    pub observed_total: f64,
    /// Trades that carried realized PnL.
    pub observed_n: usize,
    /// Realized PnL over matched trades only.
    pub observed_on_matches: f64,
    /// Simulated PnL over matched trades with known settlement.
    pub simulated_on_matches: f64,
    pub simulated_n: usize,
}

/// Per-series slice of the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesBreakdown {
    pub total: usize,
    pub would_quote: usize,
    pub matches: usize,
    pub match_rate_pct: f64,
    pub pnl: PnlComparison,
    /// Mean observed trade size over matches.
    pub avg_trade_size: Option<f64>,
    /// Mean modeled quote size over matches.
    pub avg_quote_size: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub total_trades: usize,
    pub would_quote: usize,
    pub would_match: usize,
    pub quote_rate_pct: f64,
    pub match_rate_pct: f64,
    /// Matches as a share of quotes; absent when nothing was quoted.
    pub fill_rate_if_quoted_pct: Option<f64>,
    pub reason_counts: BTreeMap<DecisionReason, usize>,
    /// `MATCH`, `WOULD_QUOTE_NO_FILL`, or the declining reason.
    pub match_types: BTreeMap<String, usize>,
    /// `trade.price - quote_price` over matches.
    pub price_accuracy: Option<DiffStats>,
    /// `trade.size - quote_size` over matches.
    pub size_accuracy: Option<DiffStats>,
    /// `trade.size / quote_size` over matches.
    pub size_ratio: Option<DiffStats>,
    pub pnl: PnlComparison,
    pub by_series: BTreeMap<MarketSeries, SeriesBreakdown>,
    /// Present when the stream was screened before replay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_quality: Option<DataQualityReport>,
}

/// Replay result. `NoData` for an empty stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BacktestOutcome {
    NoData {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_quality: Option<DataQualityReport>,
    },
    Report(BacktestReport),
}

impl BacktestOutcome {
    pub fn report(&self) -> Option<&BacktestReport> {
        match self {
            Self::NoData { .. } => None,
            Self::Report(r) => Some(r),
        }
    }
}

// =============================================================================
// ACCUMULATOR
// =============================================================================

#[derive(Debug, Default)]
struct SeriesAccumulator {
    total: usize,
    would_quote: usize,
    matches: usize,
    pnl: PnlComparison,
    matched_trade_sizes: Vec<f64>,
    matched_quote_sizes: Vec<f64>,
}

impl SeriesAccumulator {
    fn push(&mut self, c: &Comparison) {
        self.total += 1;
        if c.decision.would_quote {
            self.would_quote += 1;
        }
        if let Some(realized) = c.trade.realized_pnl {
            self.pnl.observed_total += realized;
            self.pnl.observed_n += 1;
        }
        if !c.would_match {
            return;
        }
        self.matches += 1;
        self.matched_trade_sizes.push(c.trade.size);
        if let Some(q) = c.decision.quote_size {
            self.matched_quote_sizes.push(q);
        }
        if let Some(realized) = c.trade.realized_pnl {
            self.pnl.observed_on_matches += realized;
        }
        if let Some(sim) = c.simulated_pnl {
            self.pnl.simulated_on_matches += sim;
            self.pnl.simulated_n += 1;
        }
    }

    fn finish(self) -> SeriesBreakdown {
        SeriesBreakdown {
            total: self.total,
            would_quote: self.would_quote,
            matches: self.matches,
            match_rate_pct: pct(self.matches, self.total).unwrap_or(0.0),
            pnl: self.pnl,
            avg_trade_size: mean(&self.matched_trade_sizes),
            avg_quote_size: mean(&self.matched_quote_sizes),
        }
    }
}

/// Single-pass reduction over comparisons.
#[derive(Debug, Default)]
struct ReportBuilder {
    overall: SeriesAccumulator,
    reason_counts: BTreeMap<DecisionReason, usize>,
    match_types: BTreeMap<String, usize>,
    price_diffs: Vec<f64>,
    size_diffs: Vec<f64>,
    size_ratios: Vec<f64>,
    by_series: BTreeMap<MarketSeries, SeriesAccumulator>,
}

impl ReportBuilder {
    fn push(&mut self, c: Comparison) {
        *self.reason_counts.entry(c.decision.reason).or_insert(0) += 1;
        *self
            .match_types
            .entry(c.match_type().label().to_string())
            .or_insert(0) += 1;

        if c.would_match {
            self.price_diffs.extend(c.price_diff);
            self.size_diffs.extend(c.size_diff);
            self.size_ratios.extend(c.size_ratio());
        }

        self.overall.push(&c);
        self.by_series.entry(c.trade.series()).or_default().push(&c);
    }

    fn finish(self) -> BacktestOutcome {
        let overall = self.overall.finish();
        if overall.total == 0 {
            return BacktestOutcome::NoData { data_quality: None };
        }
        BacktestOutcome::Report(BacktestReport {
            total_trades: overall.total,
            would_quote: overall.would_quote,
            would_match: overall.matches,
            quote_rate_pct: pct(overall.would_quote, overall.total).unwrap_or(0.0),
            match_rate_pct: overall.match_rate_pct,
            fill_rate_if_quoted_pct: pct(overall.matches, overall.would_quote),
            reason_counts: self.reason_counts,
            match_types: self.match_types,
            price_accuracy: DiffStats::from_values(&self.price_diffs),
            size_accuracy: DiffStats::from_values(&self.size_diffs),
            size_ratio: DiffStats::from_values(&self.size_ratios),
            pnl: overall.pnl,
            by_series: self
                .by_series
                .into_iter()
                .map(|(series, acc)| (series, acc.finish()))
                .collect(),
            data_quality: None,
        })
    }
}

fn pct(num: usize, den: usize) -> Option<f64> {
    ratio(num, den).map(|r| r * 100.0)
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

/// Own-leg books carried on each trade, as cache rows. Lets a stream serve as
/// its own book source when no separate snapshot feed is available: each leg's
/// trades then provide the opposite leg's history.
pub fn own_book_snapshots(trades: &[TradeRecord]) -> impl Iterator<Item = BookSnapshot> + '_ {
    trades
        .iter()
        .filter(|t| !t.tob.is_empty())
        .map(|t| BookSnapshot {
            token_id: t.token_id.clone(),
            timestamp: t.tob.timestamp.unwrap_or(t.timestamp),
            tob: t.tob,
        })
}

#[derive(Debug, Clone, Default)]
pub struct BacktestOrchestrator {
    evaluator: StrategyEvaluator,
    comparator: TradeComparator,
}

impl BacktestOrchestrator {
    pub fn new(evaluator: StrategyEvaluator, comparator: TradeComparator) -> Self {
        Self {
            evaluator,
            comparator,
        }
    }

    /// Evaluator and comparator from a validated config; tolerance is one tick.
    pub fn from_config(config: &ReplicaConfig) -> Self {
        Self::new(
            StrategyEvaluator::new(config.strategy.clone(), config.sizing.clone()),
            TradeComparator::new(config.strategy.tick_size),
        )
    }

    /// Opposite-leg book as of the trade's timestamp.
    fn opposite_book(cache: &TobCache, trade: &TradeRecord) -> TopOfBook {
        match trade.opposite_token_id.as_deref() {
            Some(token) if !token.is_empty() => cache.as_of(token, trade.timestamp),
            _ => TopOfBook::empty(),
        }
    }

    /// Evaluate and compare one trade.
    pub fn compare_one(&self, cache: &TobCache, trade: &TradeRecord) -> Comparison {
        let opposite = Self::opposite_book(cache, trade);
        let decision = self.evaluator.evaluate(trade, &opposite);
        self.comparator.compare(trade, decision)
    }

    pub fn run(&self, trades: &[TradeRecord], cache: &TobCache) -> BacktestOutcome {
        match self.run_with_interrupt(trades, cache, &Interrupt::never()) {
            Ok(outcome) => outcome,
            Err(Interrupted) => unreachable!("never-interrupt flag was raised"),
        }
    }

    /// One pass over `trades`, checking `interrupt` before each record.
    pub fn run_with_interrupt(
        &self,
        trades: &[TradeRecord],
        cache: &TobCache,
        interrupt: &Interrupt,
    ) -> Result<BacktestOutcome, Interrupted> {
        if trades.is_empty() {
            tracing::info!("empty trade stream; no-data report");
            return Ok(BacktestOutcome::NoData { data_quality: None });
        }

        let out_of_order = trades
            .windows(2)
            .filter(|w| w[1].timestamp < w[0].timestamp)
            .count();
        if out_of_order > 0 {
            tracing::warn!(out_of_order, "trade stream is not chronologically ordered");
        }

        let uncached_opposites = trades
            .iter()
            .filter_map(|t| t.opposite_token_id.as_deref())
            .filter(|token| !cache.contains_token(token))
            .count();
        if uncached_opposites > 0 {
            tracing::warn!(uncached_opposites, "opposite-leg tokens missing from book cache");
        }

        tracing::info!(
            trades = trades.len(),
            cached_tokens = cache.stats().tokens,
            first = %format_nanos(trades[0].timestamp),
            last = %format_nanos(trades[trades.len() - 1].timestamp),
            "starting backtest replay"
        );

        let mut builder = ReportBuilder::default();
        for trade in trades {
            interrupt.check()?;
            builder.push(self.compare_one(cache, trade));
        }

        let outcome = builder.finish();
        if let Some(report) = outcome.report() {
            tracing::info!(
                total = report.total_trades,
                quote_rate_pct = report.quote_rate_pct,
                match_rate_pct = report.match_rate_pct,
                simulated_pnl = report.pnl.simulated_on_matches,
                "backtest replay complete"
            );
        }
        Ok(outcome)
    }

    /// Screen the stream first and attach the screening report.
    pub fn run_screened(&self, trades: Vec<TradeRecord>, cache: &TobCache) -> BacktestOutcome {
        let (kept, quality) = screen_trades(trades);
        tracing::info!(
            total_input = quality.total_input,
            total_clean = quality.total_clean,
            "screened trade stream before replay"
        );
        match self.run(&kept, cache) {
            BacktestOutcome::NoData { .. } => BacktestOutcome::NoData {
                data_quality: Some(quality),
            },
            BacktestOutcome::Report(mut report) => {
                report.data_quality = Some(quality);
                BacktestOutcome::Report(report)
            }
        }
    }
}
