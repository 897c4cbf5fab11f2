//! Strategy Evaluator
//!
//! Decides, for one observed trade, whether the replica strategy would have
//! been quoting at that moment. The strategy is maker-only: it rests at the
//! own-outcome best bid when the complete-set edge across both legs clears a
//! threshold and the market is inside the configured time-to-end window.
//!
//! # Guard Order
//!
//! Guards run in strict priority order and the first failure decides the
//! reason:
//!
//! 1. `BEFORE_WINDOW`   seconds-to-end below the window
//! 2. `AFTER_WINDOW`    seconds-to-end above the window
//! 3. `NO_OWN_TOB`      own-leg book invalid
//! 4. `NO_OPPOSITE_TOB` opposite-leg book invalid
//! 5. `INSUFFICIENT_EDGE`
//!
//! Passing every guard yields `WOULD_QUOTE`.

use crate::replication::book::TopOfBook;
use crate::replication::config::{require_positive, ConfigError};
use crate::replication::events::{Outcome, Price, Size};
use crate::replication::sizing::SizeTable;
use crate::replication::trade::TradeRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Minimum complete-set edge required to quote.
    pub min_edge: f64,
    /// Inclusive lower bound of the seconds-to-end window.
    pub min_seconds_to_end: i64,
    /// Inclusive upper bound of the seconds-to-end window.
    pub max_seconds_to_end: i64,
    /// One price tick. Also the comparator's match tolerance.
    pub tick_size: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_edge: 0.01,
            min_seconds_to_end: 0,
            max_seconds_to_end: 3600,
            tick_size: 0.01,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("min_edge", self.min_edge)?;
        require_positive("tick_size", self.tick_size)?;
        if self.min_seconds_to_end < 0 || self.max_seconds_to_end < self.min_seconds_to_end {
            return Err(ConfigError::InvalidWindow {
                min_seconds_to_end: self.min_seconds_to_end,
                max_seconds_to_end: self.max_seconds_to_end,
            });
        }
        Ok(())
    }
}

// =============================================================================
// DECISION
// =============================================================================

/// Why the evaluator did or did not quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionReason {
    BeforeWindow,
    AfterWindow,
    NoOwnTob,
    NoOppositeTob,
    InsufficientEdge,
    WouldQuote,
}

impl DecisionReason {
    pub const ALL: [DecisionReason; 6] = [
        DecisionReason::BeforeWindow,
        DecisionReason::AfterWindow,
        DecisionReason::NoOwnTob,
        DecisionReason::NoOppositeTob,
        DecisionReason::InsufficientEdge,
        DecisionReason::WouldQuote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeWindow => "BEFORE_WINDOW",
            Self::AfterWindow => "AFTER_WINDOW",
            Self::NoOwnTob => "NO_OWN_TOB",
            Self::NoOppositeTob => "NO_OPPOSITE_TOB",
            Self::InsufficientEdge => "INSUFFICIENT_EDGE",
            Self::WouldQuote => "WOULD_QUOTE",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluator output for one trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub would_quote: bool,
    pub reason: DecisionReason,
    /// Own best bid when quoting.
    pub quote_price: Option<Price>,
    pub quote_size: Option<Size>,
    /// Complete-set edge, once both books were valid.
    pub edge: Option<f64>,
}

impl Decision {
    fn reject(reason: DecisionReason) -> Self {
        Self {
            would_quote: false,
            reason,
            quote_price: None,
            quote_size: None,
            edge: None,
        }
    }
}

/// `1 - bid_up - bid_down`, with the legs ordered by outcome so swapping
/// which leg is "own" cannot change the floating-point result.
pub fn complete_set_edge(own_outcome: Outcome, own_bid: Price, opposite_bid: Price) -> f64 {
    let (up, down) = match own_outcome {
        Outcome::Up => (own_bid, opposite_bid),
        Outcome::Down => (opposite_bid, own_bid),
    };
    1.0 - up - down
}

// =============================================================================
// EVALUATOR
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct StrategyEvaluator {
    config: StrategyConfig,
    sizes: SizeTable,
}

impl StrategyEvaluator {
    pub fn new(config: StrategyConfig, sizes: SizeTable) -> Self {
        Self { config, sizes }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Evaluate `trade` against an explicitly supplied opposite-leg book.
    pub fn evaluate(&self, trade: &TradeRecord, opposite: &TopOfBook) -> Decision {
        let s = trade.seconds_to_end;
        if s < self.config.min_seconds_to_end {
            return Decision::reject(DecisionReason::BeforeWindow);
        }
        if s > self.config.max_seconds_to_end {
            return Decision::reject(DecisionReason::AfterWindow);
        }

        let own_bid = match (trade.tob.is_valid(), trade.tob.best_bid_price) {
            (true, Some(bid)) => bid,
            _ => return Decision::reject(DecisionReason::NoOwnTob),
        };
        let opposite_bid = match (opposite.is_valid(), opposite.best_bid_price) {
            (true, Some(bid)) => bid,
            _ => return Decision::reject(DecisionReason::NoOppositeTob),
        };

        let edge = complete_set_edge(trade.outcome, own_bid, opposite_bid);
        if edge < self.config.min_edge {
            return Decision {
                edge: Some(edge),
                ..Decision::reject(DecisionReason::InsufficientEdge)
            };
        }

        Decision {
            would_quote: true,
            reason: DecisionReason::WouldQuote,
            quote_price: Some(own_bid),
            quote_size: Some(self.sizes.size_for(trade.series(), s)),
            edge: Some(edge),
        }
    }

    /// Evaluate using the opposite-leg book carried on the record itself.
    pub fn evaluate_record(&self, trade: &TradeRecord) -> Decision {
        let opposite = trade.opposite_tob.unwrap_or_else(TopOfBook::empty);
        self.evaluate(trade, &opposite)
    }
}
