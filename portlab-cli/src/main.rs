//! portlab CLI — run portfolio backtests from the command line.
//!
//! Commands:
//! - `run` — execute a backtest from a TOML run file plus a directory of
//!   per-symbol CSV bar files, saving JSON/CSV artifacts
//! - `demo` — run the reference strategies over a seeded synthetic universe

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use portlab_core::config::RunConfig;
use portlab_core::domain::Bar;
use portlab_core::engine::PortfolioBacktestCoordinator;
use portlab_core::result::BacktestResult;
use portlab_core::strategy::{StrategyConfig, StrategyMetadata};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "portlab", about = "portlab CLI — portfolio backtesting engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML run file and a CSV bar directory.
    Run {
        /// Path to the TOML run file.
        #[arg(long)]
        config: PathBuf,

        /// Directory holding one `<SYMBOL>.csv` bar file per symbol.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Output directory for result artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Run moving-average crossover strategies over a synthetic universe.
    Demo {
        /// Number of synthetic symbols.
        #[arg(long, default_value_t = 10)]
        symbols: usize,

        /// Number of trading days to simulate.
        #[arg(long, default_value_t = 252)]
        days: usize,

        /// RNG seed; identical seeds reproduce the run exactly.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Save artifacts in addition to the printed summary.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

/// The TOML run file: date range, engine options, and one strategy per symbol.
#[derive(Debug, Deserialize)]
struct RunFile {
    start: NaiveDate,
    end: NaiveDate,
    #[serde(default)]
    engine: RunConfig,
    strategies: Vec<StrategyEntry>,
}

#[derive(Debug, Deserialize)]
struct StrategyEntry {
    symbol: String,
    sector: String,
    #[serde(default)]
    industry: String,
    /// Optional rebalance target weight (fraction of invested capital).
    weight: Option<f64>,
    strategy: StrategyConfig,
}

/// One CSV row of `date,open,high,low,close,volume`.
#[derive(Debug, Deserialize)]
struct BarRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, data_dir, output_dir } => run_cmd(&config, &data_dir, &output_dir),
        Commands::Demo { symbols, days, seed, output_dir } => {
            demo_cmd(symbols, days, seed, output_dir.as_deref())
        }
    }
}

fn run_cmd(config_path: &Path, data_dir: &Path, output_dir: &Path) -> Result<()> {
    let text = fs::read_to_string(config_path)
        .with_context(|| format!("reading run file {}", config_path.display()))?;
    let run_file: RunFile =
        toml::from_str(&text).with_context(|| format!("parsing {}", config_path.display()))?;
    if run_file.strategies.is_empty() {
        bail!("run file declares no strategies");
    }

    let mut coordinator = PortfolioBacktestCoordinator::new(run_file.engine.clone())?;
    let mut market_data = HashMap::new();
    for entry in &run_file.strategies {
        let bars = load_bars(data_dir, &entry.symbol)?;
        market_data.insert(entry.symbol.clone(), bars);
        coordinator.register_with_target(
            entry.symbol.clone(),
            entry.strategy.build(),
            StrategyMetadata { sector: entry.sector.clone(), industry: entry.industry.clone() },
            entry.weight,
        );
    }

    let result = coordinator.run_backtest(&market_data, run_file.start, run_file.end)?;
    print_summary(&result);

    let run_dir = save_artifacts(&result, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn load_bars(data_dir: &Path, symbol: &str) -> Result<Vec<Bar>> {
    let path = data_dir.join(format!("{symbol}.csv"));
    let mut reader = csv::Reader::from_path(&path)
        .with_context(|| format!("opening bar file {}", path.display()))?;

    let mut bars = Vec::new();
    for row in reader.deserialize() {
        let row: BarRow = row.with_context(|| format!("parsing {}", path.display()))?;
        let bar = Bar {
            symbol: symbol.to_string(),
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        };
        if !bar.is_sane() {
            bail!("{}: malformed bar on {}", path.display(), row.date);
        }
        bars.push(bar);
    }
    if bars.is_empty() {
        bail!("{}: no bars", path.display());
    }
    bars.sort_by_key(|bar| bar.date);
    Ok(bars)
}

fn demo_cmd(symbols: usize, days: usize, seed: u64, output_dir: Option<&Path>) -> Result<()> {
    if symbols == 0 || days < 2 {
        bail!("demo needs at least one symbol and two days");
    }

    const SECTORS: [&str; 5] = ["tech", "energy", "health", "finance", "industrials"];
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).expect("valid literal date");
    let data = synthetic_universe(symbols, days, seed, start);

    let mut coordinator = PortfolioBacktestCoordinator::new(RunConfig::default())?;
    let mut names: Vec<&String> = data.keys().collect();
    names.sort();
    for (i, symbol) in names.into_iter().enumerate() {
        coordinator.register(
            symbol.clone(),
            StrategyConfig::MaCrossover { short_period: 10, long_period: 30 }.build(),
            StrategyMetadata {
                sector: SECTORS[i % SECTORS.len()].to_string(),
                industry: "synthetic".to_string(),
            },
        );
    }

    let end = start + chrono::Days::new(days as u64);
    let result = coordinator.run_backtest(&data, start, end)?;
    print_summary(&result);

    if let Some(dir) = output_dir {
        let run_dir = save_artifacts(&result, dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

/// Seeded random-walk bars; the same seed reproduces the same universe.
fn synthetic_universe(
    symbols: usize,
    days: usize,
    seed: u64,
    start: NaiveDate,
) -> HashMap<String, Vec<Bar>> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..symbols)
        .map(|i| {
            let symbol = format!("SYM{i:03}");
            let mut price: f64 = rng.gen_range(20.0..200.0);
            let bars = (0..days)
                .map(|day| {
                    let drift: f64 = rng.gen_range(-0.02..0.021);
                    let open = price;
                    price = (price * (1.0 + drift)).max(1.0);
                    Bar {
                        symbol: symbol.clone(),
                        date: start + chrono::Days::new(day as u64),
                        open,
                        high: open.max(price) * 1.005,
                        low: open.min(price) * 0.995,
                        close: price,
                        volume: rng.gen_range(100_000..5_000_000),
                    }
                })
                .collect();
            (symbol, bars)
        })
        .collect()
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!("Run {}", &result.run_id[..12.min(result.run_id.len())]);
    println!("  Period:            {} .. {}", result.period.start, result.period.end);
    println!("  Initial capital:   {:>12.2}", result.initial_capital);
    println!("  Final value:       {:>12.2}", result.final_value);
    println!("  Total return:      {:>11.2}%", m.total_return * 100.0);
    println!("  Annualized return: {:>11.2}%", m.annualized_return * 100.0);
    println!("  Sharpe:            {:>12.3}", m.sharpe);
    println!("  Sortino:           {:>12.3}", m.sortino);
    println!("  Max drawdown:      {:>11.2}%", m.max_drawdown * 100.0);
    println!("  Volatility:        {:>11.2}%", m.volatility * 100.0);
    println!("  Win rate:          {:>11.2}%", m.win_rate * 100.0);
    println!("  Trades:            {:>12}", result.trades.len());
    println!(
        "  Signals:           {} generated, {} executed, {} rejected",
        result.signal_stats.generated,
        result.signal_stats.executed,
        result.signal_stats.rejected
    );
    for (reason, count) in &result.signal_stats.rejection_reasons {
        println!("    {reason}: {count}");
    }
    if !result.diagnostics.is_empty() {
        println!("  Diagnostics:       {}", result.diagnostics.len());
    }
    println!("  Equity hash:       {}", result.equity_hash);
}

/// Write `result.json`, `trades.csv`, and `equity.csv` under a directory
/// named by the run id. Returns the run directory.
fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(&result.run_id[..12.min(result.run_id.len())]);
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("creating {}", run_dir.display()))?;

    let json = serde_json::to_string_pretty(result)?;
    fs::write(run_dir.join("result.json"), json)?;

    let mut trades = csv::Writer::from_path(run_dir.join("trades.csv"))?;
    for trade in &result.trades {
        trades.serialize(trade)?;
    }
    trades.flush()?;

    let mut equity = csv::Writer::from_path(run_dir.join("equity.csv"))?;
    for snapshot in &result.equity_curve {
        equity.serialize(snapshot)?;
    }
    equity.flush()?;

    Ok(run_dir)
}
