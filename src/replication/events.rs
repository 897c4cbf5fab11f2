//! Trade Event Vocabulary
//!
//! Small closed enums shared by every stage of the replay: fill side, binary
//! outcome leg, execution-style tag and the market series a slug belongs to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Price in the native market format (0.0 to 1.0 for Polymarket).
pub type Price = f64;

/// Size/quantity of shares.
pub type Size = f64;

/// Token identifier (Polymarket clobTokenId or similar).
pub type TokenId = String;

/// Market identifier (event slug, e.g. `btc-updown-15m-1762755300`).
pub type MarketId = String;

/// Fill side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One leg of a binary Up/Down market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Up,
    Down,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Up => "Up",
            Outcome::Down => "Down",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution-style tag attached to an observed fill by the enrichment layer.
///
/// Anything the enrichment layer could not classify lands in `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecStyle {
    /// Fill rested on our side of the book.
    MakerLike,
    /// Fill crossed the spread.
    TakerLike,
    /// Fill printed strictly inside the spread.
    Inside,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Market series, derived from the market slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MarketSeries {
    #[serde(rename = "btc-15m")]
    Btc15m,
    #[serde(rename = "eth-15m")]
    Eth15m,
    #[serde(rename = "btc-1h")]
    Btc1h,
    #[serde(rename = "eth-1h")]
    Eth1h,
    #[serde(rename = "other")]
    Other,
}

impl MarketSeries {
    /// All series in reporting order.
    pub const ALL: [MarketSeries; 5] = [
        MarketSeries::Btc15m,
        MarketSeries::Eth15m,
        MarketSeries::Btc1h,
        MarketSeries::Eth1h,
        MarketSeries::Other,
    ];

    /// Classify a market slug.
    pub fn from_slug(slug: &str) -> Self {
        let s = slug.trim();
        if s.starts_with("btc-updown-15m-") {
            Self::Btc15m
        } else if s.starts_with("eth-updown-15m-") {
            Self::Eth15m
        } else if s.starts_with("bitcoin-up-or-down-") {
            Self::Btc1h
        } else if s.starts_with("ethereum-up-or-down-") {
            Self::Eth1h
        } else {
            Self::Other
        }
    }

    /// Stable label used as a key in configuration tables and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Btc15m => "btc-15m",
            Self::Eth15m => "eth-15m",
            Self::Btc1h => "btc-1h",
            Self::Eth1h => "eth-1h",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for MarketSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
