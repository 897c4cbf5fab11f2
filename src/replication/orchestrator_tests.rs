//! Tests for the backtest orchestrator.
//!
//! These tests verify:
//! 1. Empty stream yields an explicit no-data outcome
//! 2. Opposite-leg lookup is causal
//! 3. Report aggregation (rates, accuracy, PnL, series breakdown)
//! 4. Screening report is attached when requested
//! 5. Config thresholds flow through `from_config`

use crate::replication::book::{BookSnapshot, TobCache, TopOfBook};
use crate::replication::clock::Nanos;
use crate::replication::config::ReplicaConfig;
use crate::replication::events::{MarketSeries, Outcome, Side};
use crate::replication::interrupt::{Interrupt, Interrupted};
use crate::replication::orchestrator::{own_book_snapshots, BacktestOrchestrator, BacktestOutcome};
use crate::replication::strategy::DecisionReason;
use crate::replication::trade::fixtures::trade;
use crate::replication::trade::TradeRecord;

fn down_book_at(ts: Nanos) -> TobCache {
    TobCache::from_snapshots(vec![BookSnapshot {
        token_id: "tok-down".to_string(),
        timestamp: ts,
        tob: TopOfBook::two_sided(0.50, 100.0, 0.53, 100.0, ts),
    }])
}

fn sample_stream() -> Vec<TradeRecord> {
    let matched = trade(1_000, Side::Buy, 0.455);
    let no_fill = trade(2_000, Side::Buy, 0.50);
    let mut early = trade(3_000, Side::Buy, 0.455);
    early.seconds_to_end = -1;
    let mut realized = trade(4_000, Side::Buy, 0.455);
    realized.realized_pnl = Some(2.0);
    vec![matched, no_fill, early, realized]
}

#[test]
fn test_empty_stream_is_no_data() {
    let outcome = BacktestOrchestrator::default().run(&[], &TobCache::new());
    assert_eq!(outcome, BacktestOutcome::NoData { data_quality: None });
    assert!(outcome.report().is_none());
}

#[test]
fn test_opposite_book_is_causal() {
    let t = trade(1_000, Side::Buy, 0.455);
    let orchestrator = BacktestOrchestrator::default();

    // only snapshot is after the trade
    let future = down_book_at(1_001);
    let c = orchestrator.compare_one(&future, &t);
    assert_eq!(c.decision.reason, DecisionReason::NoOppositeTob);

    // the record's own opposite_tob is not consulted
    let c = orchestrator.compare_one(&TobCache::new(), &t);
    assert_eq!(c.decision.reason, DecisionReason::NoOppositeTob);

    let past = down_book_at(1_000);
    let c = orchestrator.compare_one(&past, &t);
    assert_eq!(c.decision.reason, DecisionReason::WouldQuote);
    assert!(c.would_match);
}

#[test]
fn test_report_aggregates() {
    let outcome = BacktestOrchestrator::default().run(&sample_stream(), &down_book_at(0));
    let report = outcome.report().unwrap();

    assert_eq!(report.total_trades, 4);
    assert_eq!(report.would_quote, 3);
    assert_eq!(report.would_match, 2);
    assert_eq!(report.quote_rate_pct, 75.0);
    assert_eq!(report.match_rate_pct, 50.0);
    let fill_rate = report.fill_rate_if_quoted_pct.unwrap();
    assert!((fill_rate - 200.0 / 3.0).abs() < 1e-9);

    assert_eq!(report.reason_counts.get(&DecisionReason::WouldQuote), Some(&3));
    assert_eq!(report.reason_counts.get(&DecisionReason::BeforeWindow), Some(&1));
    assert_eq!(report.match_types.get("MATCH"), Some(&2));
    assert_eq!(report.match_types.get("WOULD_QUOTE_NO_FILL"), Some(&1));
    assert_eq!(report.match_types.get("BEFORE_WINDOW"), Some(&1));

    // matched trades priced 0.455 against a 0.45 quote of 13 shares
    let price = report.price_accuracy.unwrap();
    assert_eq!(price.n, 2);
    assert!((price.mean - 0.005).abs() < 1e-9);
    assert!(price.std.abs() < 1e-9);
    let size = report.size_accuracy.unwrap();
    assert_eq!(size.median, -3.0);
    let ratio = report.size_ratio.unwrap();
    assert!((ratio.mean - 10.0 / 13.0).abs() < 1e-12);

    assert_eq!(report.pnl.observed_total, 2.0);
    assert_eq!(report.pnl.observed_n, 1);
    assert_eq!(report.pnl.observed_on_matches, 2.0);
    assert!((report.pnl.simulated_on_matches - 2.0 * 0.55 * 13.0).abs() < 1e-9);
    assert_eq!(report.pnl.simulated_n, 2);

    let btc = &report.by_series[&MarketSeries::Btc15m];
    assert_eq!(btc.total, 4);
    assert_eq!(btc.matches, 2);
    assert_eq!(btc.avg_trade_size, Some(10.0));
    assert_eq!(btc.avg_quote_size, Some(13.0));
    assert_eq!(report.by_series.len(), 1);
}

#[test]
fn test_no_quotes_has_no_fill_rate() {
    let mut t = trade(0, Side::Buy, 0.46);
    t.seconds_to_end = 10_000;
    let report = BacktestOrchestrator::default().run(&[t], &down_book_at(0));
    let report = report.report().unwrap();
    assert_eq!(report.fill_rate_if_quoted_pct, None);
    assert_eq!(report.price_accuracy, None);
    assert_eq!(report.reason_counts.get(&DecisionReason::AfterWindow), Some(&1));
}

#[test]
fn test_screened_run_attaches_quality_report() {
    let mut stream = sample_stream();
    let mut orphan = trade(5_000, Side::Buy, 0.455);
    orphan.opposite_token_id = None;
    stream.push(orphan);

    let outcome = BacktestOrchestrator::default().run_screened(stream, &down_book_at(0));
    let report = outcome.report().unwrap();
    let quality = report.data_quality.as_ref().unwrap();
    assert_eq!(quality.total_input, 5);
    // the orphan and the negative seconds-to-end record are dropped
    assert_eq!(quality.total_clean, 3);
    assert_eq!(report.total_trades, 3);

    let mut bad = trade(0, Side::Buy, 0.46);
    bad.market_id = "will-it-rain".to_string();
    let outcome = BacktestOrchestrator::default().run_screened(vec![bad], &TobCache::new());
    match outcome {
        BacktestOutcome::NoData { data_quality } => {
            assert_eq!(data_quality.unwrap().total_clean, 0);
        }
        BacktestOutcome::Report(_) => panic!("expected no data"),
    }
}

#[test]
fn test_from_config_applies_thresholds() {
    let config = ReplicaConfig::from_toml_str(
        r#"
        [strategy]
        min_edge = 0.2
        "#,
    )
    .unwrap();
    let outcome = BacktestOrchestrator::from_config(&config).run(&sample_stream(), &down_book_at(0));
    let report = outcome.report().unwrap();
    assert_eq!(report.would_quote, 0);
    assert_eq!(report.reason_counts.get(&DecisionReason::InsufficientEdge), Some(&3));
}

#[test]
fn test_stream_as_its_own_book_source() {
    let mut down = trade(500, Side::Buy, 0.51);
    down.token_id = "tok-down".to_string();
    down.opposite_token_id = Some("tok-up".to_string());
    down.outcome = Outcome::Down;
    down.tob = TopOfBook::two_sided(0.50, 50.0, 0.52, 50.0, 500);
    let up = trade(1_000, Side::Buy, 0.455);

    let stream = vec![down, up];
    let cache = TobCache::from_snapshots(own_book_snapshots(&stream));
    assert_eq!(cache.stats().tokens, 2);

    let c = BacktestOrchestrator::default().compare_one(&cache, &stream[1]);
    assert_eq!(c.decision.reason, DecisionReason::WouldQuote);
    // the Down trade at t=500 cannot see the Up book from t=1000
    let c = BacktestOrchestrator::default().compare_one(&cache, &stream[0]);
    assert_eq!(c.decision.reason, DecisionReason::NoOppositeTob);
}

#[test]
fn test_interrupt_discards_report() {
    let interrupt = Interrupt::new();
    interrupt.raise();
    let res = BacktestOrchestrator::default().run_with_interrupt(
        &sample_stream(),
        &down_book_at(0),
        &interrupt,
    );
    assert_eq!(res, Err(Interrupted));
}
