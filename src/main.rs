//! Replica CLI
//!
//! Thin plumbing around the replication engine: reads JSON inputs, runs one
//! analysis, and writes the report as pretty JSON.
//!
//! # Usage
//!
//! ```bash
//! replica --config replica.toml backtest --trades trades.json --books books.json
//! replica match --baseline observed.json --candidate sim.json --max-delta-ms 1000
//! replica bootstrap --trades trades.json --scenario exec_proxy --seed 7
//! replica scenarios --trades trades.json --output scenarios.json
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 2: Configuration error
//! - 3: Data or runtime error (I/O, malformed input, data quality)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use replica_backend::replication::{
    own_book_snapshots, BacktestOrchestrator, BlockBootstrap, BookSnapshot, ConfigError,
    FillPrint, ReplicaConfig, Scenario, ScenarioPricer, StreamMatcher, TobCache, TradeRecord,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "replica")]
#[command(about = "Replay, reconcile and bootstrap observed Polymarket fills")]
struct Cli {
    /// TOML run configuration (defaults apply when omitted)
    #[arg(short, long, env = "REPLICA_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output file path (stdout if not specified)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay trades through the strategy evaluator and comparator
    Backtest {
        /// JSON array of trade records, chronologically ordered
        #[arg(short, long)]
        trades: PathBuf,

        /// JSON array of book snapshots (defaults to the trades' own books)
        #[arg(short, long)]
        books: Option<PathBuf>,

        /// Drop unusable records first and report why
        #[arg(long)]
        screen: bool,
    },

    /// Match a candidate fill stream against a baseline stream
    Match {
        /// Baseline ("ground truth") fills
        #[arg(short, long)]
        baseline: PathBuf,

        /// Candidate fills to verify
        #[arg(short = 'k', long)]
        candidate: PathBuf,

        #[arg(long)]
        max_delta_ms: Option<i64>,

        #[arg(long)]
        price_eps: Option<f64>,
    },

    /// Block-bootstrap total PnL and max drawdown
    Bootstrap {
        /// Trade records to price
        #[arg(short, long, conflicts_with = "pnl")]
        trades: Option<PathBuf>,

        /// JSON array of PnL values, used as-is
        #[arg(long)]
        pnl: Option<PathBuf>,

        /// Pricing scenario (overrides config)
        #[arg(short, long)]
        scenario: Option<String>,

        /// Resample per-trade PnL instead of per-market units
        #[arg(long)]
        per_trade: bool,

        #[arg(long)]
        iterations: Option<usize>,

        #[arg(long)]
        block_len: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// PnL summary of every pricing scenario
    Scenarios {
        #[arg(short, long)]
        trades: PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "replica_backend=info,replica=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("Error: {:#}", err);
        let code = if err.chain().any(is_config_error) { 2 } else { 3 };
        std::process::exit(code);
    }
}

/// Invalid values and unparseable config documents both count as configuration errors.
fn is_config_error(cause: &(dyn std::error::Error + 'static)) -> bool {
    cause.downcast_ref::<ConfigError>().is_some() || cause.downcast_ref::<toml::de::Error>().is_some()
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ReplicaConfig::load(path)?,
        None => ReplicaConfig::default(),
    };

    match cli.command {
        Commands::Backtest {
            trades,
            books,
            screen,
        } => {
            let trades: Vec<TradeRecord> = read_json(&trades)?;
            let cache = match books {
                Some(path) => TobCache::from_snapshots(read_json::<Vec<BookSnapshot>>(&path)?),
                None => TobCache::from_snapshots(own_book_snapshots(&trades)),
            };
            let stats = cache.stats();
            tracing::info!(
                tokens = stats.tokens,
                snapshots = stats.snapshots,
                duplicate_timestamps = stats.duplicate_timestamps,
                out_of_order = stats.out_of_order,
                "built book cache"
            );

            let orchestrator = BacktestOrchestrator::from_config(&config);
            let outcome = if screen {
                orchestrator.run_screened(trades, &cache)
            } else {
                orchestrator.run(&trades, &cache)
            };
            write_json(cli.output.as_deref(), &outcome)
        }

        Commands::Match {
            baseline,
            candidate,
            max_delta_ms,
            price_eps,
        } => {
            if let Some(ms) = max_delta_ms {
                config.matcher.max_delta_ms = ms;
            }
            if let Some(eps) = price_eps {
                config.matcher.price_eps = eps;
            }
            let matcher = StreamMatcher::new(config.matcher)?;
            let baseline: Vec<FillPrint> = read_json(&baseline)?;
            let candidate: Vec<FillPrint> = read_json(&candidate)?;
            write_json(cli.output.as_deref(), &matcher.run(&baseline, &candidate))
        }

        Commands::Bootstrap {
            trades,
            pnl,
            scenario,
            per_trade,
            iterations,
            block_len,
            seed,
        } => {
            if let Some(name) = scenario {
                config.scenario = name.parse::<Scenario>()?;
            }
            if let Some(n) = iterations {
                config.bootstrap.iterations = n;
            }
            if let Some(len) = block_len {
                config.bootstrap.block_len = len;
            }
            if let Some(s) = seed {
                config.bootstrap.seed = s;
            }
            let engine = BlockBootstrap::new(config.bootstrap.clone())?;

            let series: Vec<f64> = match (trades, pnl) {
                (_, Some(path)) => read_json(&path)?,
                (Some(path), None) => {
                    let trades: Vec<TradeRecord> = read_json(&path)?;
                    let pricer = ScenarioPricer::new(config.fallback_to_actual);
                    if per_trade {
                        pricer.scenario_pnl_series(&trades, config.scenario)?
                    } else {
                        pricer
                            .build_units(&trades, config.scenario)?
                            .into_iter()
                            .map(|unit| unit.pnl)
                            .collect()
                    }
                }
                (None, None) => anyhow::bail!("bootstrap needs --trades or --pnl"),
            };
            write_json(cli.output.as_deref(), &engine.run(&series))
        }

        Commands::Scenarios { trades } => {
            let trades: Vec<TradeRecord> = read_json(&trades)?;
            let pricer = ScenarioPricer::new(config.fallback_to_actual);
            write_json(cli.output.as_deref(), &pricer.scenario_summaries(&trades)?)
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(output: Option<&Path>, value: &T) -> Result<()> {
    match output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            tracing::info!(path = %path.display(), "wrote report");
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.write_all(b"\n")?;
        }
    }
    Ok(())
}
