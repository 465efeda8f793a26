//! End-to-end coordinator runs over small scripted universes.

use chrono::NaiveDate;
use portlab_core::config::RunConfig;
use portlab_core::domain::{Bar, Signal, SignalAction};
use portlab_core::engine::observer::RunObserver;
use portlab_core::engine::PortfolioBacktestCoordinator;
use portlab_core::error::{ConfigError, EngineError};
use portlab_core::shorts::MarginCallEvent;
use portlab_core::strategy::{BuyAndHold, Strategy, StrategyMetadata};
use std::collections::HashMap;

fn d0() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
}

fn bars(symbol: &str, closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            symbol: symbol.into(),
            date: d0() + chrono::Days::new(i as u64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000_000,
        })
        .collect()
}

fn metadata(sector: &str) -> StrategyMetadata {
    StrategyMetadata { sector: sector.into(), industry: "test".into() }
}

/// No commission or slippage, so fills land at bar closes and the cash
/// arithmetic in assertions stays exact.
fn frictionless() -> RunConfig {
    RunConfig { commission_rate: 0.0, slippage_rate: 0.0, ..RunConfig::default() }
}

/// Emits a fixed per-day script of signals, holding past the end.
struct Scripted {
    plan: Vec<Signal>,
}

impl Scripted {
    fn new(plan: Vec<Signal>) -> Self {
        Self { plan }
    }
}

impl Strategy for Scripted {
    fn generate_signal(&self, _symbol: &str, history: &[Bar], _current_price: f64) -> Signal {
        let day = history.len().saturating_sub(1);
        self.plan.get(day).copied().unwrap_or_else(Signal::hold)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct Recorder {
    margin_calls: Vec<MarginCallEvent>,
    trades: usize,
}

impl RunObserver for Recorder {
    fn on_trade(&mut self, _trade: &portlab_core::domain::TradeRecord) {
        self.trades += 1;
    }

    fn on_margin_call(&mut self, event: &MarginCallEvent) {
        self.margin_calls.push(event.clone());
    }
}

#[test]
fn buy_and_hold_tracks_equity_identity() {
    let mut coordinator = PortfolioBacktestCoordinator::new(frictionless()).unwrap();
    coordinator.register("AAA", Box::new(BuyAndHold), metadata("tech"));

    let closes = [100.0, 110.0, 120.0, 130.0, 90.0];
    let mut data = HashMap::new();
    data.insert("AAA".to_string(), bars("AAA", &closes));

    let result = coordinator
        .run_backtest(&data, d0(), d0() + chrono::Days::new(30))
        .unwrap();

    // 10% of 100k at $100 -> 100 shares, cash 90k.
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].shares, 100);
    for (snapshot, close) in result.equity_curve.iter().zip(closes) {
        assert!((snapshot.total_value - (90_000.0 + 100.0 * close)).abs() < 1e-9);
        assert!((snapshot.cash - 90_000.0).abs() < 1e-9);
        assert_eq!(snapshot.open_positions, 1);
    }
    assert!((result.final_value - 99_000.0).abs() < 1e-9);
    assert!((result.metrics.total_return + 0.01).abs() < 1e-12);

    assert_eq!(result.signal_stats.generated, 5);
    assert_eq!(result.signal_stats.executed, 1);
    assert_eq!(result.signal_stats.rejected, 0);
    assert!(result.rebalances.is_empty());

    // Sector exposure is reported every day.
    assert_eq!(result.sector_exposures.len(), 5);
    assert!(result.sector_exposures[0].exposures.contains_key("tech"));
}

#[test]
fn reruns_are_byte_identical() {
    let mut coordinator = PortfolioBacktestCoordinator::new(frictionless()).unwrap();
    coordinator.register("AAA", Box::new(BuyAndHold), metadata("tech"));

    let mut data = HashMap::new();
    data.insert("AAA".to_string(), bars("AAA", &[100.0, 104.0, 98.0, 107.0]));

    let end = d0() + chrono::Days::new(30);
    let first = coordinator.run_backtest(&data, d0(), end).unwrap();
    let second = coordinator.run_backtest(&data, d0(), end).unwrap();

    assert_eq!(first.equity_hash, second.equity_hash);
    assert_eq!(first.run_id, second.run_id);
    assert_eq!(first.metrics, second.metrics);
    assert_eq!(first.signal_stats, second.signal_stats);
}

#[test]
fn max_positions_rejects_the_overflow_entry() {
    let config = RunConfig { max_positions: 2, ..frictionless() };
    let mut coordinator = PortfolioBacktestCoordinator::new(config).unwrap();
    coordinator.register("AAA", Box::new(BuyAndHold), metadata("a"));
    coordinator.register("BBB", Box::new(BuyAndHold), metadata("b"));
    coordinator.register("CCC", Box::new(BuyAndHold), metadata("c"));

    let mut data = HashMap::new();
    for symbol in ["AAA", "BBB", "CCC"] {
        data.insert(symbol.to_string(), bars(symbol, &[100.0, 101.0, 102.0]));
    }

    let result = coordinator
        .run_backtest(&data, d0(), d0() + chrono::Days::new(30))
        .unwrap();

    assert_eq!(result.signal_stats.executed, 2);
    assert_eq!(result.signal_stats.rejected, 1);
    assert_eq!(
        result.signal_stats.rejection_reasons["Max positions limit reached"],
        1
    );
    assert_eq!(result.rejections.len(), 1);
    assert_eq!(result.rejections[0].symbol, "CCC");
    assert_eq!(result.rejections[0].date, d0());
}

#[test]
fn sell_signal_realizes_pnl() {
    let mut coordinator = PortfolioBacktestCoordinator::new(frictionless()).unwrap();
    coordinator.register(
        "AAA",
        Box::new(Scripted::new(vec![
            Signal::new(SignalAction::Buy, 1.0),
            Signal::hold(),
            Signal::new(SignalAction::Sell, 1.0),
        ])),
        metadata("tech"),
    );

    let mut data = HashMap::new();
    data.insert("AAA".to_string(), bars("AAA", &[100.0, 105.0, 110.0]));

    let result = coordinator
        .run_backtest(&data, d0(), d0() + chrono::Days::new(30))
        .unwrap();

    assert_eq!(result.trades.len(), 2);
    let close = &result.trades[1];
    assert_eq!(close.action, SignalAction::Sell);
    assert_eq!(close.shares, 100);
    assert_eq!(close.realized_pnl, Some(1_000.0));

    assert!((result.final_value - 101_000.0).abs() < 1e-9);
    assert_eq!(result.metrics.win_rate, 1.0);
    // Flat after the close.
    assert_eq!(result.equity_curve.last().unwrap().open_positions, 0);
}

#[test]
fn margin_call_auto_liquidates_the_short() {
    let mut coordinator = PortfolioBacktestCoordinator::new(frictionless()).unwrap();
    coordinator.register(
        "AAA",
        Box::new(Scripted::new(vec![Signal::new(SignalAction::Short, 1.0)])),
        metadata("tech"),
    );

    // Short 100 @ 100: margin 15000, outlay 5000. Ratio at close p is
    // 15000 / (100 p): 1.36 at 110 (no call), 1.25 at 120 (call).
    let mut data = HashMap::new();
    data.insert("AAA".to_string(), bars("AAA", &[100.0, 110.0, 120.0, 120.0]));

    let mut recorder = Recorder::default();
    let result = coordinator
        .run_with_observer(&data, d0(), d0() + chrono::Days::new(30), &mut recorder)
        .unwrap();

    // Entry is equity-neutral; the rising price bleeds equity.
    assert!((result.equity_curve[0].total_value - 100_000.0).abs() < 1e-9);
    assert!((result.equity_curve[1].total_value - 99_000.0).abs() < 1e-9);

    assert_eq!(recorder.margin_calls.len(), 1);
    assert!((recorder.margin_calls[0].margin_ratio - 1.25).abs() < 1e-12);
    assert_eq!(recorder.margin_calls[0].date, d0() + chrono::Days::new(2));

    // Forced cover @ 120 after 2 days:
    // gross -2000, interest = 10000 * (0.03 / 365) * 2, penalty = 240.
    let interest = 10_000.0 * (0.03 / 365.0) * 2.0;
    let cover = &result.trades[1];
    assert_eq!(cover.action, SignalAction::Cover);
    assert!((cover.realized_pnl.unwrap() - (-2_000.0 - interest - 240.0)).abs() < 1e-9);

    let expected_cash = 95_000.0 + (15_000.0 - 12_000.0 - interest - 240.0);
    let last = result.equity_curve.last().unwrap();
    assert_eq!(last.open_positions, 0);
    assert!((last.total_value - expected_cash).abs() < 1e-9);
    assert!((last.cash - expected_cash).abs() < 1e-9);
}

#[test]
fn rebalance_redistributes_between_longs() {
    let mut coordinator = PortfolioBacktestCoordinator::new(frictionless()).unwrap();
    coordinator.register("AAA", Box::new(BuyAndHold), metadata("a"));
    coordinator.register("BBB", Box::new(BuyAndHold), metadata("b"));

    let mut data = HashMap::new();
    data.insert("AAA".to_string(), bars("AAA", &[100.0, 150.0]));
    data.insert("BBB".to_string(), bars("BBB", &[100.0, 100.0]));

    let result = coordinator
        .run_backtest(&data, d0(), d0() + chrono::Days::new(30))
        .unwrap();

    // Day 1: invested 25k split 60/40 against a 50/50 target.
    // Sell floor(2500 / 150) = 16 AAA, buy floor(2500 / 100) = 25 BBB.
    assert_eq!(result.rebalances.len(), 2);
    let sell = &result.rebalances[0];
    assert_eq!(sell.symbol, "AAA");
    assert_eq!(sell.shares_delta, -16);
    assert!((sell.current_weight - 0.6).abs() < 1e-12);
    assert!((sell.target_weight - 0.5).abs() < 1e-12);

    let buy = &result.rebalances[1];
    assert_eq!(buy.symbol, "BBB");
    assert_eq!(buy.shares_delta, 25);

    // Cash: 80000 + 16 * 150 - 25 * 100 = 79900; total value unchanged.
    let last = result.equity_curve.last().unwrap();
    assert!((last.cash - 79_900.0).abs() < 1e-9);
    assert!((last.total_value - 105_000.0).abs() < 1e-9);

    // The partial sell realized (150 - 100) * 16.
    let partial = result
        .trades
        .iter()
        .find(|t| t.symbol == "AAA" && t.action == SignalAction::Sell)
        .unwrap();
    assert_eq!(partial.realized_pnl, Some(800.0));
}

#[test]
fn stop_loss_fills_at_the_stop_price() {
    let config = RunConfig { stop_loss_percent: Some(0.10), ..frictionless() };
    let mut coordinator = PortfolioBacktestCoordinator::new(config).unwrap();
    coordinator.register("AAA", Box::new(BuyAndHold), metadata("tech"));

    let mut data = HashMap::new();
    let mut series = bars("AAA", &[100.0, 95.0]);
    // Intraday flush through the 90 stop.
    series[1].low = 85.0;
    data.insert("AAA".to_string(), series);

    let result = coordinator
        .run_backtest(&data, d0(), d0() + chrono::Days::new(30))
        .unwrap();

    assert_eq!(result.trades.len(), 2);
    let stop_fill = &result.trades[1];
    assert_eq!(stop_fill.action, SignalAction::Sell);
    assert_eq!(stop_fill.price, 90.0);
    assert_eq!(stop_fill.realized_pnl, Some(-1_000.0));

    let last = result.equity_curve.last().unwrap();
    assert_eq!(last.open_positions, 0);
    assert!((last.total_value - 99_000.0).abs() < 1e-9);
}

#[test]
fn symbols_without_bars_are_skipped_not_fatal() {
    let mut coordinator = PortfolioBacktestCoordinator::new(frictionless()).unwrap();
    coordinator.register("AAA", Box::new(BuyAndHold), metadata("a"));
    coordinator.register("BBB", Box::new(BuyAndHold), metadata("b"));

    let mut data = HashMap::new();
    data.insert("AAA".to_string(), bars("AAA", &[100.0, 101.0, 102.0]));
    // BBB is missing the middle day.
    let mut sparse = bars("BBB", &[50.0, 52.0]);
    sparse[1].date = d0() + chrono::Days::new(2);
    data.insert("BBB".to_string(), sparse);

    let result = coordinator
        .run_backtest(&data, d0(), d0() + chrono::Days::new(30))
        .unwrap();

    assert_eq!(result.equity_curve.len(), 3);
    // 3 AAA signals + 2 BBB signals.
    assert_eq!(result.signal_stats.generated, 5);
    assert_eq!(result.equity_curve.last().unwrap().open_positions, 2);

    // The gap is noted, not swallowed.
    assert_eq!(result.diagnostics.len(), 1);
    assert!(result.diagnostics[0].contains("BBB"));
    assert!(result.diagnostics[0].contains("no bar"));
}

#[test]
fn insufficient_cash_rejects_the_whole_order() {
    let config = RunConfig {
        max_position_size: 0.5,
        max_sector_exposure: 1.0,
        ..frictionless()
    };
    let mut coordinator = PortfolioBacktestCoordinator::new(config).unwrap();
    coordinator.register(
        "AAA",
        Box::new(Scripted::new(vec![Signal::new(SignalAction::Buy, 1.0)])),
        metadata("a"),
    );
    coordinator.register(
        "BBB",
        Box::new(Scripted::new(vec![Signal::hold(), Signal::new(SignalAction::Buy, 1.0)])),
        metadata("b"),
    );

    let mut data = HashMap::new();
    data.insert("AAA".to_string(), bars("AAA", &[100.0, 200.0]));
    data.insert("BBB".to_string(), bars("BBB", &[100.0, 100.0]));

    let result = coordinator
        .run_backtest(&data, d0(), d0() + chrono::Days::new(30))
        .unwrap();

    // Day 0: AAA takes 500 shares (50% of 100k), leaving 50k cash. Day 1:
    // AAA has doubled, so BBB sizes to 750 shares (75k) against 50k cash.
    // The order is rejected whole, not trimmed to what the cash covers.
    assert!(result.trades.iter().all(|t| t.symbol != "BBB"));
    assert_eq!(result.signal_stats.rejection_reasons["Insufficient cash"], 1);
    assert_eq!(result.rejections[0].symbol, "BBB");

    let last = result.equity_curve.last().unwrap();
    assert!((last.cash - 50_000.0).abs() < 1e-9);
}

#[test]
fn sub_share_sizing_is_rejected() {
    let mut coordinator = PortfolioBacktestCoordinator::new(frictionless()).unwrap();
    coordinator.register(
        "AAA",
        Box::new(Scripted::new(vec![Signal::new(SignalAction::Buy, 0.005)])),
        metadata("tech"),
    );

    let mut data = HashMap::new();
    data.insert("AAA".to_string(), bars("AAA", &[100.0, 101.0]));

    let result = coordinator
        .run_backtest(&data, d0(), d0() + chrono::Days::new(30))
        .unwrap();

    // 10% of 100k at 0.005 confidence is a $50 allocation — below one $100
    // share, so nothing fills and the rejection is counted.
    assert!(result.trades.is_empty());
    assert_eq!(
        result.signal_stats.rejection_reasons["Position size below one share"],
        1
    );
    assert_eq!(result.equity_curve.last().unwrap().open_positions, 0);
}

#[test]
fn degenerate_runs_fail_before_simulation() {
    let coordinator = PortfolioBacktestCoordinator::new(RunConfig::default()).unwrap();
    let err = coordinator
        .run_backtest(&HashMap::new(), d0(), d0() + chrono::Days::new(10))
        .unwrap_err();
    assert!(matches!(err, EngineError::Config(ConfigError::EmptyUniverse)));

    let mut coordinator = PortfolioBacktestCoordinator::new(RunConfig::default()).unwrap();
    coordinator.register("AAA", Box::new(BuyAndHold), metadata("a"));
    let err = coordinator.run_backtest(&HashMap::new(), d0(), d0()).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Config(ConfigError::InvalidDateRange { .. })
    ));
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let config = RunConfig { initial_capital: -5.0, ..RunConfig::default() };
    assert!(PortfolioBacktestCoordinator::new(config).is_err());
}
