//! Replication Analytics
//!
//! Offline engine that replays an observed account's fills against a modeled
//! maker strategy, reconciles two fill streams, and estimates PnL uncertainty.
//!
//! # Architecture
//!
//! ```text
//!   TradeRecord stream            BookSnapshot rows
//!          │                             │
//!          │                             ▼
//!          │                     ┌─────────────┐
//!          │                     │  TobCache   │  as_of(token, t), no look-ahead
//!          │                     └──────┬──────┘
//!          ▼                            │
//! ┌─────────────────────────────────────┴───────────────────────────┐
//! │                     BacktestOrchestrator                        │
//! │   StrategyEvaluator ──▶ Decision ──▶ TradeComparator            │
//! │                                         │                       │
//! │                                         ▼                       │
//! │                              BacktestReport (single pass)       │
//! └─────────────────────────────────────────────────────────────────┘
//!
//!   baseline FillPrints ──┐
//!                         ├──▶ StreamMatcher ──▶ MatchReport
//!   candidate FillPrints ─┘    (per MatchKey bucket, rayon)
//!
//!   TradeRecords ──▶ ScenarioPricer ──▶ PnL series / units ──▶ BlockBootstrap
//!                    (actual, mid, exec_proxy, all_maker, all_taker)
//! ```
//!
//! # Determinism Guarantees
//!
//! - **Time**: all timestamps come from input records; no system clock reads
//! - **Book lookup**: binary search over per-token history, `timestamp <= t` only
//! - **Matching**: `BTreeMap` bucket order and fixed tie-break rules
//! - **RNG**: `ChaCha8Rng` seeded from config, one stream per bootstrap iteration

pub mod book;
pub mod bootstrap;
pub mod clock;
pub mod comparator;
pub mod config;
pub mod events;
pub mod interrupt;
pub mod matching;
pub mod metrics;
pub mod orchestrator;
pub mod pricing;
pub mod sizing;
pub mod strategy;
pub mod trade;

#[cfg(test)]
mod orchestrator_tests;

pub use book::{BookSnapshot, TobCache, TobCacheStats, TopOfBook};
pub use bootstrap::{
    max_drawdown, BlockBootstrap, BootstrapConfig, BootstrapOutcome, BootstrapResult, QuantileMap,
};
pub use clock::{Nanos, NANOS_PER_MILLI, NANOS_PER_SEC};
pub use comparator::{Comparison, MatchType, TradeComparator};
pub use config::{ConfigError, ReplicaConfig};
pub use events::{ExecStyle, MarketSeries, Outcome, Side};
pub use interrupt::{Interrupt, Interrupted};
pub use matching::{
    MatchKey, MatchOutcome, MatchReport, MatchStats, MatchedPair, MatcherConfig, MismatchReason,
    StreamMatcher,
};
pub use orchestrator::{own_book_snapshots, BacktestOrchestrator, BacktestOutcome, BacktestReport};
pub use pricing::{PnlSummary, PnlUnit, Scenario, ScenarioPricer, ScenarioSummary};
pub use sizing::{SizeSchedule, SizeTable};
pub use strategy::{Decision, DecisionReason, StrategyConfig, StrategyEvaluator};
pub use trade::{screen_trades, DataQualityError, DataQualityReport, FillPrint, TradeRecord};
