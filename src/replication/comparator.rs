//! Trade Comparator
//!
//! Sets a `Decision` against the trade that actually printed. A quote
//! "matches" when it was at least as aggressive as the real fill, within one
//! tick: a BUY quote at or above `price - tick`, a SELL quote at or below
//! `price + tick`.

use crate::replication::events::{Price, Side};
use crate::replication::strategy::{Decision, DecisionReason};
use crate::replication::trade::TradeRecord;
use serde::{Deserialize, Serialize};

/// Coarse classification of a comparison for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MatchType {
    Match,
    WouldQuoteNoFill,
    /// Evaluator declined; carries the rejecting reason.
    Declined(DecisionReason),
}

impl MatchType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Match => "MATCH",
            Self::WouldQuoteNoFill => "WOULD_QUOTE_NO_FILL",
            Self::Declined(reason) => reason.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub trade: TradeRecord,
    pub decision: Decision,
    pub would_match: bool,
    /// `trade.price - quote_price`; absent when not quoting.
    pub price_diff: Option<f64>,
    /// `trade.size - quote_size`; absent when not quoting.
    pub size_diff: Option<f64>,
    /// `(settle - quote_price) * quote_size` for a matched quote with known settlement.
    pub simulated_pnl: Option<f64>,
}

impl Comparison {
    pub fn match_type(&self) -> MatchType {
        if self.would_match {
            MatchType::Match
        } else if self.decision.would_quote {
            MatchType::WouldQuoteNoFill
        } else {
            MatchType::Declined(self.decision.reason)
        }
    }

    /// `trade.size / quote_size` for a matched comparison.
    pub fn size_ratio(&self) -> Option<f64> {
        if !self.would_match {
            return None;
        }
        let quote = self.decision.quote_size.filter(|q| *q > 0.0)?;
        Some(self.trade.size / quote)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeComparator {
    tolerance: Price,
}

impl Default for TradeComparator {
    fn default() -> Self {
        Self { tolerance: 0.01 }
    }
}

impl TradeComparator {
    pub fn new(tolerance: Price) -> Self {
        Self { tolerance }
    }

    pub fn compare(&self, trade: &TradeRecord, decision: Decision) -> Comparison {
        let inert = Comparison {
            trade: trade.clone(),
            decision,
            would_match: false,
            price_diff: None,
            size_diff: None,
            simulated_pnl: None,
        };
        if !decision.would_quote {
            return inert;
        }
        let (quote_price, quote_size) = match (decision.quote_price, decision.quote_size) {
            (Some(p), Some(s)) => (p, s),
            _ => return inert,
        };

        let would_match = match trade.side {
            Side::Buy => quote_price >= trade.price - self.tolerance,
            Side::Sell => quote_price <= trade.price + self.tolerance,
        };
        let simulated_pnl = if would_match {
            trade
                .settle_price
                .map(|settle| (settle - quote_price) * quote_size)
        } else {
            None
        };

        Comparison {
            would_match,
            price_diff: Some(trade.price - quote_price),
            size_diff: Some(trade.size - quote_size),
            simulated_pnl,
            ..inert
        }
    }
}
