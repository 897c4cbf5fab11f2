//! Observed Trade Records
//!
//! `TradeRecord` is one enriched fill of the target account: the print itself,
//! its market context (time to resolution, settlement) and the book on both legs
//! as captured by the enrichment layer. `FillPrint` is the reduced shape used
//! when two raw streams are reconciled against each other.
//!
//! Optional fields are explicit. Consumers decide what absence means; nothing
//! here substitutes defaults.

use crate::replication::book::TopOfBook;
use crate::replication::clock::{secs_to_nanos, Nanos};
use crate::replication::events::{ExecStyle, MarketId, MarketSeries, Outcome, Price, Side, Size, TokenId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One observed fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Exchange timestamp of the fill.
    pub timestamp: Nanos,
    pub market_id: MarketId,
    /// Token the fill traded.
    pub token_id: TokenId,
    /// Token of the complementary outcome, when known.
    #[serde(default)]
    pub opposite_token_id: Option<TokenId>,
    pub outcome: Outcome,
    pub side: Side,
    pub price: Price,
    pub size: Size,
    /// Seconds until market resolution at fill time. May be negative for
    /// prints after the scheduled end.
    pub seconds_to_end: i64,
    /// Whether the data layer considers the market resolved.
    #[serde(default)]
    pub resolved: bool,
    /// Settlement price of this token (0 or 1 for binary markets).
    #[serde(default)]
    pub settle_price: Option<Price>,
    /// Authoritative realized PnL from the data layer.
    #[serde(default)]
    pub realized_pnl: Option<f64>,
    #[serde(default)]
    pub exec_style: ExecStyle,
    /// Book on the traded token at fill time.
    #[serde(default)]
    pub tob: TopOfBook,
    /// Book on the complementary token, when the data layer captured it.
    #[serde(default)]
    pub opposite_tob: Option<TopOfBook>,
}

impl TradeRecord {
    /// Series derived from the market slug.
    pub fn series(&self) -> MarketSeries {
        MarketSeries::from_slug(&self.market_id)
    }

    /// Scheduled resolution time: fill time plus seconds-to-end.
    pub fn resolution_time(&self) -> Nanos {
        self.timestamp.saturating_add(secs_to_nanos(self.seconds_to_end))
    }

    /// Check the fields PnL computation relies on.
    ///
    /// A record marked resolved must carry a settlement price; size must be
    /// finite and positive.
    pub fn validate_for_pnl(&self) -> Result<(), DataQualityError> {
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err(DataQualityError::InvalidSize {
                market_id: self.market_id.clone(),
                timestamp: self.timestamp,
                size: self.size,
            });
        }
        if self.resolved && self.settle_price.is_none() {
            return Err(DataQualityError::MissingSettlement {
                market_id: self.market_id.clone(),
                token_id: self.token_id.clone(),
                timestamp: self.timestamp,
            });
        }
        Ok(())
    }
}

/// Reduced fill shape for stream reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillPrint {
    pub timestamp: Nanos,
    pub market_id: MarketId,
    pub outcome: Outcome,
    pub side: Side,
    pub price: Price,
    pub size: Size,
}

impl From<&TradeRecord> for FillPrint {
    fn from(trade: &TradeRecord) -> Self {
        Self {
            timestamp: trade.timestamp,
            market_id: trade.market_id.clone(),
            outcome: trade.outcome,
            side: trade.side,
            price: trade.price,
            size: trade.size,
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// A record that cannot be priced without guessing.
#[derive(Debug, Clone, PartialEq)]
pub enum DataQualityError {
    /// Record is marked resolved but has no settlement price.
    MissingSettlement {
        market_id: MarketId,
        token_id: TokenId,
        timestamp: Nanos,
    },
    /// Size is missing, non-finite or non-positive.
    InvalidSize {
        market_id: MarketId,
        timestamp: Nanos,
        size: f64,
    },
    /// Both BUY and SELL fills on one token would need a position ledger.
    InterleavedSides { token_id: TokenId },
}

impl std::fmt::Display for DataQualityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSettlement {
                market_id,
                token_id,
                timestamp,
            } => write!(
                f,
                "resolved record without settlement price: market={} token={} ts={}",
                market_id, token_id, timestamp
            ),
            Self::InvalidSize {
                market_id,
                timestamp,
                size,
            } => write!(f, "invalid size {} on market={} ts={}", size, market_id, timestamp),
            Self::InterleavedSides { token_id } => write!(
                f,
                "token {} has both BUY and SELL fills; per-trade PnL needs a position ledger",
                token_id
            ),
        }
    }
}

impl std::error::Error for DataQualityError {}

// =============================================================================
// SCREENING
// =============================================================================

/// Reason a record was dropped by `screen_trades`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenIssue {
    /// Market slug does not belong to a tracked series.
    WrongSeries,
    /// Negative seconds-to-end.
    InvalidTimeToEnd,
    /// No complementary token id to look the other leg up with.
    MissingOppositeToken,
    /// Own-side book has no positive best bid.
    MissingOwnTob,
}

/// Outcome of a screening pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub total_input: usize,
    pub total_clean: usize,
    /// Percentage of input kept; `None` for empty input.
    pub clean_rate_pct: Option<f64>,
    /// First failing check per dropped record.
    pub issues: BTreeMap<ScreenIssue, usize>,
}

fn first_issue(trade: &TradeRecord) -> Option<ScreenIssue> {
    if trade.series() == MarketSeries::Other {
        return Some(ScreenIssue::WrongSeries);
    }
    if trade.seconds_to_end < 0 {
        return Some(ScreenIssue::InvalidTimeToEnd);
    }
    if trade.opposite_token_id.as_deref().map_or(true, str::is_empty) {
        return Some(ScreenIssue::MissingOppositeToken);
    }
    if trade.tob.positive_bid().is_none() {
        return Some(ScreenIssue::MissingOwnTob);
    }
    None
}

/// Optional pre-filter run before replay. Order of kept records is preserved.
pub fn screen_trades(trades: Vec<TradeRecord>) -> (Vec<TradeRecord>, DataQualityReport) {
    let total_input = trades.len();
    let mut issues: BTreeMap<ScreenIssue, usize> = BTreeMap::new();
    let mut kept = Vec::with_capacity(total_input);

    for trade in trades {
        match first_issue(&trade) {
            Some(issue) => *issues.entry(issue).or_insert(0) += 1,
            None => kept.push(trade),
        }
    }

    let total_clean = kept.len();
    let clean_rate_pct = if total_input == 0 {
        None
    } else {
        Some(total_clean as f64 / total_input as f64 * 100.0)
    };

    tracing::debug!(total_input, total_clean, ?issues, "screened trade stream");

    (
        kept,
        DataQualityReport {
            total_input,
            total_clean,
            clean_rate_pct,
            issues,
        },
    )
}
