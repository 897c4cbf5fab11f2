//! Top-of-Book State and Causal Lookup
//!
//! `TopOfBook` is the L1 view of one token at one instant. `TobCache` holds, per
//! token, the full time-ordered snapshot history loaded up front and answers
//! "what was the book at time t" without ever looking past t.

use crate::replication::clock::Nanos;
use crate::replication::events::{Price, Size, TokenId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// L1 book state for one token.
///
/// Every field is optional. The all-`None` value is the canonical *empty* book
/// and is what lookups return when nothing is known; callers test `is_valid()`
/// instead of unwrapping prices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TopOfBook {
    #[serde(default)]
    pub best_bid_price: Option<Price>,
    #[serde(default)]
    pub best_bid_size: Option<Size>,
    #[serde(default)]
    pub best_ask_price: Option<Price>,
    #[serde(default)]
    pub best_ask_size: Option<Size>,
    #[serde(default)]
    pub mid: Option<Price>,
    #[serde(default)]
    pub timestamp: Option<Nanos>,
}

impl TopOfBook {
    /// The empty book.
    pub const fn empty() -> Self {
        Self {
            best_bid_price: None,
            best_bid_size: None,
            best_ask_price: None,
            best_ask_size: None,
            mid: None,
            timestamp: None,
        }
    }

    /// Build a two-sided book; mid is derived from bid and ask.
    pub fn two_sided(bid: Price, bid_size: Size, ask: Price, ask_size: Size, timestamp: Nanos) -> Self {
        Self {
            best_bid_price: Some(bid),
            best_bid_size: Some(bid_size),
            best_ask_price: Some(ask),
            best_ask_size: Some(ask_size),
            mid: Some((bid + ask) / 2.0),
            timestamp: Some(timestamp),
        }
    }

    /// Valid iff both best bid and best ask are strictly positive.
    #[inline]
    pub fn is_valid(&self) -> bool {
        matches!(self.best_bid_price, Some(b) if b > 0.0)
            && matches!(self.best_ask_price, Some(a) if a > 0.0)
    }

    /// True for the all-absent book.
    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }

    /// Best bid if it is strictly positive.
    #[inline]
    pub fn positive_bid(&self) -> Option<Price> {
        self.best_bid_price.filter(|p| *p > 0.0)
    }

    /// Mid price; falls back to (bid + ask) / 2 when the mid field is absent.
    pub fn mid_price(&self) -> Option<Price> {
        self.mid.or_else(|| match (self.best_bid_price, self.best_ask_price) {
            (Some(b), Some(a)) => Some((b + a) / 2.0),
            _ => None,
        })
    }
}

/// One snapshot row as delivered by the data layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub token_id: TokenId,
    pub timestamp: Nanos,
    pub tob: TopOfBook,
}

/// Load statistics reported by `TobCache::from_snapshots`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TobCacheStats {
    pub tokens: usize,
    pub snapshots: usize,
    /// Rows that shared a timestamp with an earlier row for the same token.
    /// The later row wins.
    pub duplicate_timestamps: usize,
    /// Rows that arrived out of order and had to be sorted into place.
    pub out_of_order: usize,
}

/// Per-token, time-ordered snapshot history with causal as-of lookup.
///
/// Built once; read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct TobCache {
    /// token -> snapshots strictly increasing by timestamp
    series: HashMap<TokenId, Vec<(Nanos, TopOfBook)>>,
    stats: TobCacheStats,
}

impl TobCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a bulk load.
    ///
    /// Input is expected time-sorted per token, but ordering is enforced here
    /// anyway: rows are stably sorted by timestamp and rows sharing a timestamp
    /// collapse to the last one loaded.
    pub fn from_snapshots<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = BookSnapshot>,
    {
        let mut series: HashMap<TokenId, Vec<(Nanos, TopOfBook)>> = HashMap::new();
        let mut stats = TobCacheStats::default();

        for row in rows {
            let entries = series.entry(row.token_id).or_default();
            if let Some((last_ts, _)) = entries.last() {
                if row.timestamp < *last_ts {
                    stats.out_of_order += 1;
                }
            }
            let mut tob = row.tob;
            tob.timestamp = Some(row.timestamp);
            entries.push((row.timestamp, tob));
        }

        for entries in series.values_mut() {
            entries.sort_by_key(|(ts, _)| *ts);
            let before = entries.len();
            // keep the last row of each equal-timestamp run
            entries.reverse();
            entries.dedup_by_key(|(ts, _)| *ts);
            entries.reverse();
            stats.duplicate_timestamps += before - entries.len();
        }

        stats.tokens = series.len();
        stats.snapshots = series.values().map(Vec::len).sum();

        Self { series, stats }
    }

    /// Latest snapshot with `timestamp <= t`, or the empty book.
    ///
    /// Binary search over the token's history; never returns a snapshot from
    /// the future.
    pub fn as_of(&self, token_id: &str, t: Nanos) -> TopOfBook {
        let Some(entries) = self.series.get(token_id) else {
            return TopOfBook::empty();
        };
        // number of entries with ts <= t
        let idx = entries.partition_point(|(ts, _)| *ts <= t);
        if idx == 0 {
            return TopOfBook::empty();
        }
        entries[idx - 1].1
    }

    pub fn contains_token(&self, token_id: &str) -> bool {
        self.series.contains_key(token_id)
    }

    pub fn stats(&self) -> TobCacheStats {
        self.stats
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(token: &str, ts: Nanos, bid: f64, ask: f64) -> BookSnapshot {
        BookSnapshot {
            token_id: token.to_string(),
            timestamp: ts,
            tob: TopOfBook::two_sided(bid, 10.0, ask, 10.0, ts),
        }
    }

    #[test]
    fn test_validity_requires_both_sides_positive() {
        assert!(!TopOfBook::empty().is_valid());
        assert!(TopOfBook::two_sided(0.45, 1.0, 0.47, 1.0, 0).is_valid());
        assert!(!TopOfBook::two_sided(0.0, 1.0, 0.47, 1.0, 0).is_valid());
        assert!(!TopOfBook::two_sided(0.45, 1.0, -0.1, 1.0, 0).is_valid());

        let bid_only = TopOfBook {
            best_bid_price: Some(0.45),
            ..TopOfBook::empty()
        };
        assert!(!bid_only.is_valid());
    }

    #[test]
    fn test_validity_matches_definition_over_grid() {
        let prices = [None, Some(-0.5), Some(0.0), Some(0.01), Some(0.99)];
        for bid in prices {
            for ask in prices {
                let tob = TopOfBook {
                    best_bid_price: bid,
                    best_ask_price: ask,
                    ..TopOfBook::empty()
                };
                let expected = bid.is_some_and(|b| b > 0.0) && ask.is_some_and(|a| a > 0.0);
                assert_eq!(tob.is_valid(), expected, "bid={:?} ask={:?}", bid, ask);
            }
        }
    }

    #[test]
    fn test_as_of_is_causal() {
        let cache = TobCache::from_snapshots(vec![
            snap("up", 100, 0.40, 0.42),
            snap("up", 200, 0.41, 0.43),
            snap("up", 300, 0.42, 0.44),
        ]);

        assert!(cache.as_of("up", 99).is_empty());
        assert_eq!(cache.as_of("up", 100).best_bid_price, Some(0.40));
        assert_eq!(cache.as_of("up", 250).best_bid_price, Some(0.41));
        assert_eq!(cache.as_of("up", 300).best_bid_price, Some(0.42));
        assert_eq!(cache.as_of("up", i64::MAX).best_bid_price, Some(0.42));

        for t in [0, 100, 150, 200, 299, 300, 1_000] {
            let tob = cache.as_of("up", t);
            if let Some(ts) = tob.timestamp {
                assert!(ts <= t, "lookahead at t={}: got {}", t, ts);
            }
        }
    }

    #[test]
    fn test_unknown_token_is_empty() {
        let cache = TobCache::from_snapshots(vec![snap("up", 100, 0.40, 0.42)]);
        assert!(cache.as_of("down", 1_000).is_empty());
        assert!(TobCache::new().as_of("up", 1_000).is_empty());
    }

    #[test]
    fn test_unsorted_load_and_duplicates() {
        let cache = TobCache::from_snapshots(vec![
            snap("up", 300, 0.42, 0.44),
            snap("up", 100, 0.40, 0.42),
            snap("up", 100, 0.39, 0.42),
            snap("down", 50, 0.55, 0.57),
        ]);

        let stats = cache.stats();
        assert_eq!(stats.tokens, 2);
        assert_eq!(stats.snapshots, 3);
        assert_eq!(stats.duplicate_timestamps, 1);
        assert_eq!(stats.out_of_order, 1);

        // last loaded row wins on equal timestamps
        assert_eq!(cache.as_of("up", 150).best_bid_price, Some(0.39));
        assert_eq!(cache.as_of("up", 99), TopOfBook::empty());
        assert_eq!(cache.as_of("up", 300).best_bid_price, Some(0.42));
    }

    #[test]
    fn test_mid_fallback() {
        let tob = TopOfBook {
            best_bid_price: Some(0.40),
            best_ask_price: Some(0.44),
            ..TopOfBook::empty()
        };
        assert!((tob.mid_price().unwrap() - 0.42).abs() < 1e-12);
        assert_eq!(TopOfBook::empty().mid_price(), None);
    }
}
