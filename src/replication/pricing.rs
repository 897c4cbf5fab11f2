//! Scenario Pricing and PnL Aggregation
//!
//! Re-prices observed fills under counterfactual execution assumptions and
//! turns them into per-trade resolution PnL.
//!
//! # Scenarios
//!
//! ```text
//! actual      observed fill price
//! mid         book mid
//! all_maker   BUY at bid, SELL at ask      (optimistic bound)
//! all_taker   BUY at ask, SELL at bid      (pessimistic bound)
//! exec_proxy  per-fill execution-style tag:
//!               BUY : MAKER_LIKE->bid  TAKER_LIKE->ask  INSIDE->mid  else->actual
//!               SELL: MAKER_LIKE->ask  TAKER_LIKE->bid  INSIDE->mid  else->actual
//! ```
//!
//! # Limitations
//!
//! `size * (settle - entry)` is only correct for one directional fill per
//! trade. A token carrying both BUY and SELL fills needs a position ledger,
//! which this module does not have; such streams fail with
//! `DataQualityError::InterleavedSides` rather than produce a wrong number.

use crate::replication::bootstrap::max_drawdown;
use crate::replication::clock::Nanos;
use crate::replication::config::ConfigError;
use crate::replication::events::{ExecStyle, MarketId, Price, Side};
use crate::replication::metrics;
use crate::replication::trade::{DataQualityError, TradeRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Execution-price assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    #[default]
    Actual,
    Mid,
    ExecProxy,
    AllMaker,
    AllTaker,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Scenario::Actual,
        Scenario::Mid,
        Scenario::ExecProxy,
        Scenario::AllMaker,
        Scenario::AllTaker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Actual => "actual",
            Self::Mid => "mid",
            Self::ExecProxy => "exec_proxy",
            Self::AllMaker => "all_maker",
            Self::AllTaker => "all_taker",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.as_str() == s.trim())
            .ok_or_else(|| ConfigError::UnknownScenario {
                name: s.to_string(),
            })
    }
}

/// Rejects recomputed PnL on tokens that carry both BUY and SELL fills.
///
/// Feed it every trade whose PnL is recomputed, in stream order.
#[derive(Debug, Default)]
pub struct InterleaveGuard {
    sides: HashMap<String, (bool, bool)>,
}

impl InterleaveGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, trade: &TradeRecord) -> Result<(), DataQualityError> {
        let entry = self.sides.entry(trade.token_id.clone()).or_default();
        match trade.side {
            Side::Buy => entry.0 = true,
            Side::Sell => entry.1 = true,
        }
        if entry.0 && entry.1 {
            return Err(DataQualityError::InterleavedSides {
                token_id: trade.token_id.clone(),
            });
        }
        Ok(())
    }
}

/// Prices trades under a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioPricer {
    /// Substitute the observed price when the scenario price is not positive.
    pub fallback_to_actual: bool,
}

impl Default for ScenarioPricer {
    fn default() -> Self {
        Self {
            fallback_to_actual: true,
        }
    }
}

impl ScenarioPricer {
    pub fn new(fallback_to_actual: bool) -> Self {
        Self { fallback_to_actual }
    }

    fn raw_entry_price(trade: &TradeRecord, scenario: Scenario) -> Option<Price> {
        let tob = &trade.tob;
        let bid = tob.best_bid_price;
        let ask = tob.best_ask_price;
        match (scenario, trade.side) {
            (Scenario::Actual, _) => Some(trade.price),
            (Scenario::Mid, _) => tob.mid_price(),
            (Scenario::AllMaker, Side::Buy) | (Scenario::AllTaker, Side::Sell) => bid,
            (Scenario::AllMaker, Side::Sell) | (Scenario::AllTaker, Side::Buy) => ask,
            (Scenario::ExecProxy, side) => match (trade.exec_style, side) {
                (ExecStyle::MakerLike, Side::Buy) | (ExecStyle::TakerLike, Side::Sell) => bid,
                (ExecStyle::TakerLike, Side::Buy) | (ExecStyle::MakerLike, Side::Sell) => ask,
                (ExecStyle::Inside, _) => tob.mid_price(),
                (ExecStyle::Unknown, _) => Some(trade.price),
            },
        }
    }

    /// Assumed execution price, or `None` when the scenario price is missing
    /// or not positive and fallback is off. `None` excludes the trade from
    /// aggregation; it is not an error.
    pub fn entry_price(&self, trade: &TradeRecord, scenario: Scenario) -> Option<Price> {
        match Self::raw_entry_price(trade, scenario) {
            Some(p) if p.is_finite() && p > 0.0 => Some(p),
            _ if self.fallback_to_actual => Some(trade.price),
            _ => None,
        }
    }

    /// Resolution PnL of one trade.
    ///
    /// Under `actual`, an authoritative realized PnL is returned unchanged.
    /// Otherwise PnL is recomputed from settlement; `Ok(None)` means the trade
    /// is not priceable yet (unresolved, or no entry price) and is skipped.
    pub fn trade_pnl(
        &self,
        trade: &TradeRecord,
        scenario: Scenario,
    ) -> Result<Option<f64>, DataQualityError> {
        if scenario == Scenario::Actual {
            if let Some(realized) = trade.realized_pnl {
                return Ok(Some(realized));
            }
        }
        trade.validate_for_pnl()?;

        let Some(settle) = trade.settle_price else {
            return Ok(None);
        };
        let Some(entry) = self.entry_price(trade, scenario) else {
            return Ok(None);
        };

        let pnl = match trade.side {
            Side::Buy => trade.size * (settle - entry),
            Side::Sell => trade.size * (entry - settle),
        };
        Ok(pnl.is_finite().then_some(pnl))
    }

    /// Whether `trade_pnl` recomputes (rather than passes through) this trade.
    pub fn recomputes(&self, trade: &TradeRecord, scenario: Scenario) -> bool {
        !(scenario == Scenario::Actual && trade.realized_pnl.is_some())
    }

    /// Capital deployed at the scenario price.
    pub fn trade_cost(&self, trade: &TradeRecord, scenario: Scenario) -> Option<f64> {
        let cost = trade.size * self.entry_price(trade, scenario)?;
        (cost.is_finite() && cost > 0.0).then_some(cost)
    }

    /// Per-trade PnL aligned with the input; `None` marks excluded trades.
    pub fn trade_pnls(
        &self,
        trades: &[TradeRecord],
        scenario: Scenario,
    ) -> Result<Vec<Option<f64>>, DataQualityError> {
        let mut guard = InterleaveGuard::new();
        let mut out = Vec::with_capacity(trades.len());
        for trade in trades {
            if self.recomputes(trade, scenario) {
                guard.observe(trade)?;
            }
            out.push(self.trade_pnl(trade, scenario)?);
        }
        Ok(out)
    }

    /// Priced trades only, in stream order.
    pub fn scenario_pnl_series(
        &self,
        trades: &[TradeRecord],
        scenario: Scenario,
    ) -> Result<Vec<f64>, DataQualityError> {
        Ok(self.trade_pnls(trades, scenario)?.into_iter().flatten().collect())
    }

    /// One summary per scenario, in `Scenario::ALL` order.
    pub fn scenario_summaries(
        &self,
        trades: &[TradeRecord],
    ) -> Result<Vec<ScenarioSummary>, DataQualityError> {
        Scenario::ALL
            .into_iter()
            .map(|scenario| {
                let pnls = self.scenario_pnl_series(trades, scenario)?;
                let cost: f64 = trades
                    .iter()
                    .filter_map(|t| self.trade_cost(t, scenario))
                    .sum();
                Ok(ScenarioSummary {
                    scenario,
                    excluded: trades.len() - pnls.len(),
                    total_cost: cost,
                    summary: PnlSummary::from_series(&pnls),
                })
            })
            .collect()
    }

    /// Aggregate priced trades into per-market decision units, ordered by
    /// (latest resolution time, market id).
    pub fn build_units(
        &self,
        trades: &[TradeRecord],
        scenario: Scenario,
    ) -> Result<Vec<PnlUnit>, DataQualityError> {
        let pnls = self.trade_pnls(trades, scenario)?;
        let mut units: HashMap<&str, PnlUnit> = HashMap::new();

        for (trade, pnl) in trades.iter().zip(pnls) {
            let Some(pnl) = pnl else { continue };
            let unit = units.entry(trade.market_id.as_str()).or_insert_with(|| PnlUnit {
                market_id: trade.market_id.clone(),
                timestamp: trade.resolution_time(),
                pnl: 0.0,
                trades: 0,
            });
            unit.pnl += pnl;
            unit.trades += 1;
            unit.timestamp = unit.timestamp.max(trade.resolution_time());
        }

        let mut units: Vec<PnlUnit> = units.into_values().collect();
        units.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.market_id.cmp(&b.market_id))
        });
        Ok(units)
    }
}

/// PnL of all priced trades in one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlUnit {
    pub market_id: MarketId,
    /// Latest resolution time among the unit's trades.
    pub timestamp: Nanos,
    pub pnl: f64,
    pub trades: usize,
}

/// Descriptive statistics of a PnL series. Statistics are `None` when `n == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlSummary {
    pub n: usize,
    pub sum: f64,
    pub mean: Option<f64>,
    /// Sample standard deviation.
    pub std: Option<f64>,
    pub max_drawdown: Option<f64>,
}

impl PnlSummary {
    /// Non-finite values are dropped first.
    pub fn from_series(pnl: &[f64]) -> Self {
        let finite: Vec<f64> = pnl.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Self {
                n: 0,
                sum: 0.0,
                mean: None,
                std: None,
                max_drawdown: None,
            };
        }
        Self {
            n: finite.len(),
            sum: finite.iter().sum(),
            mean: metrics::mean(&finite),
            std: metrics::sample_std(&finite),
            max_drawdown: Some(max_drawdown(&finite)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub scenario: Scenario,
    /// Trades without a PnL under this scenario.
    pub excluded: usize,
    pub total_cost: f64,
    pub summary: PnlSummary,
}
