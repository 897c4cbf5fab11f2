//! Integration tests for the replication engine and the `replica` CLI.
//!
//! These tests verify:
//! 1. A TOML config loaded from disk drives every component
//! 2. Trades flow end to end: replay, pricing, units, bootstrap
//! 3. The CLI writes JSON reports and maps errors to exit codes

use replica_backend::replication::{
    BacktestOrchestrator, BlockBootstrap, BookSnapshot, BootstrapOutcome, ConfigError,
    DecisionReason, ExecStyle, FillPrint, MatchOutcome, Outcome, ReplicaConfig, Scenario,
    ScenarioPricer, Side, StreamMatcher, TobCache, TopOfBook, TradeRecord, NANOS_PER_SEC,
};
use std::fs;
use std::path::Path;
use std::process::Command;

const MARKET_A: &str = "btc-updown-15m-1762755300";
const MARKET_B: &str = "eth-updown-15m-1762756200";

fn record(market: &str, ts_secs: i64, outcome: Outcome, side: Side, price: f64, settle: f64) -> TradeRecord {
    let ts = ts_secs * NANOS_PER_SEC;
    let (token, opposite) = match outcome {
        Outcome::Up => (format!("{}-up", market), format!("{}-down", market)),
        Outcome::Down => (format!("{}-down", market), format!("{}-up", market)),
    };
    TradeRecord {
        timestamp: ts,
        market_id: market.to_string(),
        token_id: token,
        opposite_token_id: Some(opposite),
        outcome,
        side,
        price,
        size: 10.0,
        seconds_to_end: 300,
        resolved: true,
        settle_price: Some(settle),
        realized_pnl: None,
        exec_style: ExecStyle::MakerLike,
        tob: TopOfBook::two_sided(price - 0.01, 50.0, price + 0.01, 50.0, ts),
        opposite_tob: None,
    }
}

fn stream() -> Vec<TradeRecord> {
    vec![
        record(MARKET_A, 100, Outcome::Up, Side::Buy, 0.46, 1.0),
        record(MARKET_A, 101, Outcome::Down, Side::Buy, 0.50, 0.0),
        record(MARKET_B, 200, Outcome::Up, Side::Buy, 0.40, 0.0),
        record(MARKET_B, 201, Outcome::Down, Side::Buy, 0.55, 1.0),
    ]
}

fn books() -> Vec<BookSnapshot> {
    stream()
        .iter()
        .map(|t| BookSnapshot {
            token_id: t.token_id.clone(),
            timestamp: t.timestamp - NANOS_PER_SEC,
            tob: t.tob,
        })
        .collect()
}

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("replica.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_config_file_drives_components() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
        scenario = "all_maker"
        fallback_to_actual = false

        [strategy]
        min_edge = 0.02

        [matcher]
        max_delta_ms = 250
        price_eps = 0.001

        [bootstrap]
        iterations = 500
        block_len = 2
        seed = 11
        "#,
    );

    let config = ReplicaConfig::load(&path).unwrap();
    assert_eq!(config.scenario, Scenario::AllMaker);
    assert!(!config.fallback_to_actual);
    assert_eq!(config.strategy.min_edge, 0.02);
    assert_eq!(config.matcher.max_delta_ms, 250);
    assert_eq!(config.bootstrap.seed, 11);
    // untouched sections keep their defaults
    assert_eq!(config.sizing, Default::default());

    // effective config round-trips through disk
    let effective = dir.path().join("effective.toml");
    fs::write(&effective, config.to_toml_string().unwrap()).unwrap();
    assert_eq!(ReplicaConfig::load(&effective).unwrap(), config);
}

#[test]
fn test_invalid_config_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "[bootstrap]\nblock_len = 0\n");
    let err = ReplicaConfig::load(&path).unwrap_err();
    assert!(err
        .chain()
        .any(|cause| matches!(
            cause.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidBootstrapParameter { field: "block_len", .. })
        )));
}

#[test]
fn test_end_to_end_pipeline() {
    let config = ReplicaConfig::default();
    let trades = stream();
    let cache = TobCache::from_snapshots(books());

    let outcome = BacktestOrchestrator::from_config(&config).run(&trades, &cache);
    let report = outcome.report().unwrap();
    assert_eq!(report.total_trades, 4);
    // every leg sees both its own and its complement's book from one second earlier
    assert_eq!(report.reason_counts.get(&DecisionReason::NoOwnTob), None);
    assert_eq!(report.reason_counts.get(&DecisionReason::NoOppositeTob), None);
    // inside the window, so only the edge check can decline
    let priced = [DecisionReason::WouldQuote, DecisionReason::InsufficientEdge]
        .iter()
        .filter_map(|reason| report.reason_counts.get(reason))
        .sum::<usize>();
    assert_eq!(priced, 4);

    let pricer = ScenarioPricer::new(config.fallback_to_actual);
    let units = pricer.build_units(&trades, Scenario::Actual).unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].market_id, MARKET_A);
    // A: 10 * (1 - 0.46) + 10 * (0 - 0.50) = 0.4
    assert!((units[0].pnl - 0.4).abs() < 1e-9);
    // B: 10 * (0 - 0.40) + 10 * (1 - 0.55) = 0.5
    assert!((units[1].pnl - 0.5).abs() < 1e-9);

    let summaries = pricer.scenario_summaries(&trades).unwrap();
    assert_eq!(summaries.len(), Scenario::ALL.len());
    assert!(summaries.iter().all(|s| s.summary.n == 4));

    let engine = BlockBootstrap::new(config.bootstrap.clone()).unwrap();
    let series: Vec<f64> = units.iter().map(|u| u.pnl).collect();
    let first = engine.run(&series);
    assert_eq!(first, engine.run(&series));
    match first {
        BootstrapOutcome::Distribution(result) => {
            assert_eq!(result.n, 2);
            assert_eq!(result.iterations, 20_000);
            let p01 = result.total_pnl.get(0.01).unwrap();
            let p99 = result.total_pnl.get(0.99).unwrap();
            assert!(p01 >= 0.8 - 1e-9 && p99 <= 1.0 + 1e-9);
        }
        BootstrapOutcome::Empty => panic!("expected a distribution"),
    }
}

#[test]
fn test_matcher_against_shifted_copy() {
    let baseline: Vec<FillPrint> = stream().iter().map(FillPrint::from).collect();
    let candidate: Vec<FillPrint> = baseline
        .iter()
        .cloned()
        .map(|mut f| {
            f.timestamp += 300 * 1_000_000;
            f
        })
        .collect();

    let matcher = StreamMatcher::new(Default::default()).unwrap();
    let report = match matcher.run(&baseline, &candidate) {
        MatchOutcome::Report(r) => r,
        MatchOutcome::NoData => panic!("expected a report"),
    };
    assert_eq!(report.global.recall_pct, Some(100.0));
    assert_eq!(report.global.latency.unwrap().median_ms, 300.0);
    assert_eq!(report.by_market.len(), 2);
    assert_eq!(report.pairs.len(), 4);
}

// =============================================================================
// CLI
// =============================================================================

fn replica() -> Command {
    Command::new(env!("CARGO_BIN_EXE_replica"))
}

#[test]
fn test_cli_backtest_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let trades = dir.path().join("trades.json");
    let books_path = dir.path().join("books.json");
    let out = dir.path().join("report.json");
    fs::write(&trades, serde_json::to_string(&stream()).unwrap()).unwrap();
    fs::write(&books_path, serde_json::to_string(&books()).unwrap()).unwrap();

    let status = replica()
        .arg("backtest")
        .arg("--trades")
        .arg(&trades)
        .arg("--books")
        .arg(&books_path)
        .arg("--output")
        .arg(&out)
        .status()
        .unwrap();
    assert!(status.success());

    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(report["status"], "report");
    assert_eq!(report["total_trades"], 4);
}

#[test]
fn test_cli_bootstrap_from_pnl_series() {
    let dir = tempfile::tempdir().unwrap();
    let pnl = dir.path().join("pnl.json");
    fs::write(&pnl, "[10, 10, 10, 10, 10]").unwrap();

    let output = replica()
        .args(["bootstrap", "--iterations", "200", "--block-len", "5", "--seed", "3", "--pnl"])
        .arg(&pnl)
        .output()
        .unwrap();
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["status"], "distribution");
    for point in result["total_pnl"]["points"].as_array().unwrap() {
        assert_eq!(point["value"], 50.0);
    }
}

#[test]
fn test_cli_exit_codes() {
    let dir = tempfile::tempdir().unwrap();
    let trades = dir.path().join("trades.json");
    fs::write(&trades, serde_json::to_string(&stream()).unwrap()).unwrap();

    // unknown scenario is a configuration error
    let status = replica()
        .args(["bootstrap", "--scenario", "optimistic", "--trades"])
        .arg(&trades)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));

    let config = write_config(dir.path(), "[strategy]\ntick_size = 0.0\n");
    let status = replica()
        .arg("--config")
        .arg(&config)
        .args(["scenarios", "--trades"])
        .arg(&trades)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));

    // unreadable input is a runtime error
    let status = replica()
        .args(["scenarios", "--trades"])
        .arg(dir.path().join("missing.json"))
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(3));
}
