//! PortfolioBacktestCoordinator — the day-stepped simulation driver.
//!
//! Per trading day, in order:
//!
//! 1. sweep stop-loss/take-profit exits on open longs
//! 2. solicit one signal per registered symbol (parallel fan-out; symbols
//!    without a bar today are skipped)
//! 3. execute exits (SELL/COVER) — closing risk needs no admission
//! 4. admit, size, and execute entries (BUY/SHORT), sequentially in
//!    registration order so each admission sees earlier executions
//! 5. end-of-day margin sweep on open shorts; breaches auto-liquidate
//! 6. drift rebalancing toward target weights
//! 7. snapshot the portfolio for the equity curve
//!
//! Days are strictly chronological; within a day only signal *generation*
//! is parallel. The `PortfolioState` is owned exclusively by the coordinator
//! for the duration of a run.

use crate::config::RunConfig;
use crate::domain::{Bar, PortfolioState, Position, Signal, SignalAction, TradeRecord};
use crate::engine::admission::{self, EntryKind, RejectionReason, RejectionRecord};
use crate::engine::metrics::PerformanceMetrics;
use crate::engine::observer::{NullObserver, RunObserver};
use crate::error::{ConfigError, EngineError, ShortError};
use crate::result::{
    BacktestResult, DailySnapshot, Period, RebalanceEvent, SectorExposureSnapshot, SignalStats,
};
use crate::shorts::{ShortLedgerConfig, ShortPositionLedger};
use crate::sizing;
use crate::strategy::{Strategy, StrategyMetadata, StrategyRegistration};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Drives the multi-symbol, day-by-day simulation.
pub struct PortfolioBacktestCoordinator {
    config: RunConfig,
    registrations: Vec<StrategyRegistration>,
    sectors: HashMap<String, String>,
}

/// Everything mutable during one run. Lives and dies inside `run_backtest`;
/// nothing engine-wide outlasts it.
struct RunState {
    state: PortfolioState,
    ledger: ShortPositionLedger,
    /// Bars seen so far, per symbol, grown one bar per day.
    histories: HashMap<String, Vec<Bar>>,
    /// Last observed close per symbol, used for valuation and margin checks
    /// on days a symbol has no bar.
    prices: HashMap<String, f64>,
    trades: Vec<TradeRecord>,
    rejections: Vec<RejectionRecord>,
    stats: SignalStats,
    snapshots: Vec<DailySnapshot>,
    sector_exposures: Vec<SectorExposureSnapshot>,
    rebalances: Vec<RebalanceEvent>,
    diagnostics: Vec<String>,
}

impl RunState {
    fn new(config: &RunConfig) -> Self {
        Self {
            state: PortfolioState::new(config.initial_capital),
            ledger: ShortPositionLedger::new(ShortLedgerConfig {
                margin_requirement: config.margin_requirement,
                short_interest_rate: config.short_interest_rate,
                margin_call_threshold: config.margin_call_threshold,
                liquidation_penalty: config.liquidation_penalty,
            }),
            histories: HashMap::new(),
            prices: HashMap::new(),
            trades: Vec::new(),
            rejections: Vec::new(),
            stats: SignalStats::default(),
            snapshots: Vec::new(),
            sector_exposures: Vec::new(),
            rebalances: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn record_trade(&mut self, trade: TradeRecord, observer: &mut dyn RunObserver) {
        if let Some(pnl) = trade.realized_pnl {
            self.state.realized_pnl.push(pnl);
        }
        observer.on_trade(&trade);
        self.trades.push(trade);
    }

    fn record_rejection(
        &mut self,
        symbol: &str,
        date: NaiveDate,
        reason: RejectionReason,
        confidence: f64,
        observer: &mut dyn RunObserver,
    ) {
        let rejection = RejectionRecord {
            symbol: symbol.to_string(),
            date,
            reason,
            confidence,
        };
        self.stats.record_rejection(&rejection);
        observer.on_rejection(&rejection);
        self.rejections.push(rejection);
    }
}

impl PortfolioBacktestCoordinator {
    /// Build a coordinator. The configuration is validated here, before any
    /// simulation work.
    pub fn new(config: RunConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config, registrations: Vec::new(), sectors: HashMap::new() })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Register a strategy for a symbol. Registration order is the fixed
    /// symbol order for signal solicitation and admission.
    pub fn register(
        &mut self,
        symbol: impl Into<String>,
        strategy: Box<dyn Strategy>,
        metadata: StrategyMetadata,
    ) {
        self.register_with_target(symbol, strategy, metadata, None);
    }

    /// Register with an explicit rebalance target weight (fraction of
    /// invested long capital). Without one, the equal-weight policy applies.
    pub fn register_with_target(
        &mut self,
        symbol: impl Into<String>,
        strategy: Box<dyn Strategy>,
        metadata: StrategyMetadata,
        target_weight: Option<f64>,
    ) {
        let symbol = symbol.into();
        self.sectors.insert(symbol.clone(), metadata.sector.clone());
        self.registrations.push(StrategyRegistration {
            symbol,
            strategy,
            metadata,
            target_weight,
        });
    }

    /// Run the simulation over `[start, end]` (inclusive).
    pub fn run_backtest(
        &self,
        market_data: &HashMap<String, Vec<Bar>>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BacktestResult, EngineError> {
        self.run_with_observer(market_data, start, end, &mut NullObserver)
    }

    /// Run with an observer notified after every trade, rejection, margin
    /// call, rebalance, and day-end snapshot.
    pub fn run_with_observer(
        &self,
        market_data: &HashMap<String, Vec<Bar>>,
        start: NaiveDate,
        end: NaiveDate,
        observer: &mut dyn RunObserver,
    ) -> Result<BacktestResult, EngineError> {
        if start >= end {
            return Err(ConfigError::InvalidDateRange { start, end }.into());
        }
        if self.registrations.is_empty() {
            return Err(ConfigError::EmptyUniverse.into());
        }

        let calendar = self.trading_calendar(market_data, start, end);
        let mut run = RunState::new(&self.config);

        for date in calendar {
            let today: HashMap<String, Bar> = self.bars_for(market_data, date);
            self.start_of_day(&mut run, &today, date);

            self.sweep_protective_exits(&mut run, &today, date, observer);

            let signals = self.solicit_signals(&mut run, &today, date);

            // Exits first: closing risk is always allowed.
            for (index, signal) in &signals {
                if signal.action.is_exit() {
                    self.execute_exit(&mut run, *index, *signal, &today, date, observer);
                }
            }
            for (index, signal) in &signals {
                if signal.action.is_entry() {
                    self.execute_entry(&mut run, *index, *signal, &today, date, observer);
                }
            }

            self.margin_sweep(&mut run, date, observer);
            self.rebalance(&mut run, date, observer);
            self.end_of_day(&mut run, date, observer);
        }

        Ok(self.assemble_result(run, start, end))
    }

    /// Ordered union of bar dates across registered symbols within the range.
    fn trading_calendar(
        &self,
        market_data: &HashMap<String, Vec<Bar>>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<NaiveDate> {
        let mut dates = BTreeSet::new();
        for registration in &self.registrations {
            if let Some(bars) = market_data.get(&registration.symbol) {
                for bar in bars {
                    if bar.date >= start && bar.date <= end {
                        dates.insert(bar.date);
                    }
                }
            }
        }
        dates.into_iter().collect()
    }

    fn bars_for(
        &self,
        market_data: &HashMap<String, Vec<Bar>>,
        date: NaiveDate,
    ) -> HashMap<String, Bar> {
        let mut today = HashMap::new();
        for registration in &self.registrations {
            if let Some(bar) = market_data
                .get(&registration.symbol)
                .and_then(|bars| bars.iter().find(|bar| bar.date == date))
            {
                today.insert(registration.symbol.clone(), bar.clone());
            }
        }
        today
    }

    /// Fold today's bars into histories and the last-known price map, noting
    /// any registered symbol with no bar for the trading day.
    fn start_of_day(&self, run: &mut RunState, today: &HashMap<String, Bar>, date: NaiveDate) {
        for registration in &self.registrations {
            if let Some(bar) = today.get(&registration.symbol) {
                run.prices.insert(registration.symbol.clone(), bar.close);
                run.histories
                    .entry(registration.symbol.clone())
                    .or_default()
                    .push(bar.clone());
            } else {
                run.diagnostics.push(format!(
                    "{date}: {}: no bar for trading day, symbol skipped",
                    registration.symbol
                ));
            }
        }
    }

    /// Close any open long whose stop-loss or take-profit level was crossed
    /// intraday. Stops fill at the stop price, targets at the target price.
    fn sweep_protective_exits(
        &self,
        run: &mut RunState,
        today: &HashMap<String, Bar>,
        date: NaiveDate,
        observer: &mut dyn RunObserver,
    ) {
        for registration in &self.registrations {
            let symbol = &registration.symbol;
            let Some(bar) = today.get(symbol) else { continue };
            let Some(position) = run.state.positions.get(symbol) else { continue };
            if !position.is_long() {
                continue;
            }

            let stop_hit = position.stop_loss.filter(|stop| bar.low <= *stop);
            let target_hit = position.take_profit.filter(|target| bar.high >= *target);
            // Worst-case ordering: the stop wins when both trigger intraday.
            let Some(fill_price) = stop_hit.or(target_hit) else { continue };

            let Some(position) = run.state.positions.remove(symbol) else { continue };
            let proceeds = position.shares as f64 * fill_price;
            let commission = proceeds * self.config.commission_rate;
            let realized =
                (fill_price - position.entry_price) * position.shares as f64 - commission;
            run.state.cash += proceeds - commission;
            run.record_trade(
                TradeRecord {
                    symbol: symbol.clone(),
                    action: SignalAction::Sell,
                    shares: position.shares,
                    price: fill_price,
                    date,
                    cash_delta: proceeds - commission,
                    realized_pnl: Some(realized),
                },
                observer,
            );
        }
    }

    /// Ask every registered strategy for today's signal. Generation runs in
    /// parallel (signals only read the pre-mutation portfolio state through
    /// their bar history); results come back in registration order.
    fn solicit_signals(
        &self,
        run: &mut RunState,
        today: &HashMap<String, Bar>,
        date: NaiveDate,
    ) -> Vec<(usize, Signal)> {
        let histories = &run.histories;
        let raw: Vec<(usize, Signal)> = self
            .registrations
            .par_iter()
            .enumerate()
            .filter_map(|(index, registration)| {
                let bar = today.get(&registration.symbol)?;
                let history = histories
                    .get(&registration.symbol)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                let signal =
                    registration.strategy.generate_signal(&registration.symbol, history, bar.close);
                Some((index, signal))
            })
            .collect();

        let mut signals = Vec::with_capacity(raw.len());
        for (index, signal) in raw {
            run.stats.generated += 1;
            let (signal, clamped) = signal.sanitized();
            if clamped {
                run.diagnostics.push(format!(
                    "{date}: {}: confidence outside [0, 1], clamped to {}",
                    self.registrations[index].symbol, signal.confidence
                ));
            }
            signals.push((index, signal));
        }
        // par_iter preserves input order, but admission depends on it, so
        // make the contract explicit.
        signals.sort_by_key(|(index, _)| *index);
        signals
    }

    fn execute_exit(
        &self,
        run: &mut RunState,
        index: usize,
        signal: Signal,
        today: &HashMap<String, Bar>,
        date: NaiveDate,
        observer: &mut dyn RunObserver,
    ) {
        let symbol = &self.registrations[index].symbol;
        let Some(bar) = today.get(symbol) else { return };

        match signal.action {
            SignalAction::Sell => {
                let Some(position) = run.state.positions.get(symbol) else { return };
                if !position.is_long() {
                    return;
                }
                let Some(position) = run.state.positions.remove(symbol) else { return };
                let fill_price = bar.close * (1.0 - self.config.slippage_rate);
                let proceeds = position.shares as f64 * fill_price;
                let commission = proceeds * self.config.commission_rate;
                let realized =
                    (fill_price - position.entry_price) * position.shares as f64 - commission;
                run.state.cash += proceeds - commission;
                run.stats.executed += 1;
                run.record_trade(
                    TradeRecord {
                        symbol: symbol.clone(),
                        action: SignalAction::Sell,
                        shares: position.shares,
                        price: fill_price,
                        date,
                        cash_delta: proceeds - commission,
                        realized_pnl: Some(realized),
                    },
                    observer,
                );
            }
            SignalAction::Cover => {
                let fill_price = bar.close * (1.0 + self.config.slippage_rate);
                let exit = match run.ledger.exit_short_position(symbol, None, fill_price, date) {
                    Ok(exit) => exit,
                    Err(ShortError::PositionNotFound(_)) => return,
                    Err(err) => {
                        run.diagnostics.push(format!("{date}: {symbol}: cover skipped: {err}"));
                        return;
                    }
                };
                let commission =
                    exit.covered_shares as f64 * fill_price * self.config.commission_rate;
                run.state.cash += exit.cash_delta - commission;
                run.state.positions.remove(symbol);
                run.stats.executed += 1;
                run.record_trade(
                    TradeRecord {
                        symbol: symbol.clone(),
                        action: SignalAction::Cover,
                        shares: exit.covered_shares,
                        price: fill_price,
                        date,
                        cash_delta: exit.cash_delta - commission,
                        realized_pnl: Some(exit.net_profit - commission),
                    },
                    observer,
                );
            }
            _ => {}
        }
    }

    fn execute_entry(
        &self,
        run: &mut RunState,
        index: usize,
        signal: Signal,
        today: &HashMap<String, Bar>,
        date: NaiveDate,
        observer: &mut dyn RunObserver,
    ) {
        let registration = &self.registrations[index];
        let symbol = &registration.symbol;
        let Some(bar) = today.get(symbol) else { return };

        // One position per symbol; a repeat entry signal is a hold in effect.
        if run.state.has_position(symbol) || run.ledger.position(symbol).is_some() {
            return;
        }

        let total_value = run.state.total_value(&run.prices);
        let target_fraction = self.config.max_position_size * signal.confidence;
        let proposed_value = total_value * target_fraction;

        if let Err(reason) = admission::admit_entry(
            &self.config,
            &run.state,
            symbol,
            EntryKind::New,
            Some(registration.metadata.sector.as_str()),
            proposed_value,
            bar.close,
            &self.sectors,
            &run.histories,
            &run.prices,
        ) {
            run.record_rejection(symbol, date, reason, signal.confidence, observer);
            return;
        }

        match signal.action {
            SignalAction::Buy => {
                let fill_price = bar.close * (1.0 + self.config.slippage_rate);
                let sized = sizing::fixed_percent(total_value, target_fraction, fill_price);
                if sized.shares < 1 {
                    run.record_rejection(
                        symbol,
                        date,
                        RejectionReason::InsufficientShares,
                        signal.confidence,
                        observer,
                    );
                    return;
                }

                // Orders that cannot be paid for in full are rejected whole,
                // never trimmed to fit the remaining cash.
                let cost = sized.shares as f64 * fill_price;
                let commission = cost * self.config.commission_rate;
                if cost + commission > run.state.cash {
                    run.record_rejection(
                        symbol,
                        date,
                        RejectionReason::InsufficientCash,
                        signal.confidence,
                        observer,
                    );
                    return;
                }

                run.state.cash -= cost + commission;
                let mut position =
                    Position::new_long(symbol.clone(), sized.shares, fill_price, date);
                position.stop_loss =
                    self.config.stop_loss_percent.map(|p| fill_price * (1.0 - p));
                position.take_profit =
                    self.config.take_profit_percent.map(|p| fill_price * (1.0 + p));
                run.state.positions.insert(symbol.clone(), position);
                run.stats.executed += 1;
                run.record_trade(
                    TradeRecord {
                        symbol: symbol.clone(),
                        action: SignalAction::Buy,
                        shares: sized.shares,
                        price: fill_price,
                        date,
                        cash_delta: -(cost + commission),
                        realized_pnl: None,
                    },
                    observer,
                );
            }
            SignalAction::Short => {
                let fill_price = bar.close * (1.0 - self.config.slippage_rate);
                let sized = sizing::fixed_percent(total_value, target_fraction, fill_price);
                if sized.shares < 1 {
                    run.record_rejection(
                        symbol,
                        date,
                        RejectionReason::InsufficientShares,
                        signal.confidence,
                        observer,
                    );
                    return;
                }

                let commission =
                    sized.shares as f64 * fill_price * self.config.commission_rate;
                let available = run.state.cash - commission;
                let entry = match run.ledger.enter_short_position(
                    symbol,
                    sized.shares,
                    fill_price,
                    date,
                    available,
                ) {
                    Ok(entry) => entry,
                    Err(ShortError::InsufficientCapital { .. }) => {
                        run.record_rejection(
                            symbol,
                            date,
                            RejectionReason::InsufficientCash,
                            signal.confidence,
                            observer,
                        );
                        return;
                    }
                    Err(err) => {
                        run.diagnostics.push(format!("{date}: {symbol}: short skipped: {err}"));
                        return;
                    }
                };

                run.state.cash -= entry.cash_outlay + commission;
                run.state.positions.insert(
                    symbol.clone(),
                    Position::new_short(
                        symbol.clone(),
                        sized.shares,
                        fill_price,
                        date,
                        entry.margin_required,
                    ),
                );
                run.stats.executed += 1;
                run.record_trade(
                    TradeRecord {
                        symbol: symbol.clone(),
                        action: SignalAction::Short,
                        shares: sized.shares,
                        price: fill_price,
                        date,
                        cash_delta: -(entry.cash_outlay + commission),
                        realized_pnl: None,
                    },
                    observer,
                );
            }
            _ => {}
        }
    }

    /// End-of-day maintenance check on open shorts. Every breach is
    /// surfaced to the observer, then auto-liquidated — a backtest has no
    /// human to post more margin.
    fn margin_sweep(&self, run: &mut RunState, date: NaiveDate, observer: &mut dyn RunObserver) {
        let events = run.ledger.check_margin_requirements(&run.prices, date);
        for event in events {
            observer.on_margin_call(&event);
            if run.ledger.flag_margin_called(&event.symbol).is_err() {
                continue;
            }
            let Some(price) = run.prices.get(&event.symbol).copied() else { continue };
            let liquidation = match run.ledger.force_liquidate(&event.symbol, price, date) {
                Ok(liquidation) => liquidation,
                Err(err) => {
                    run.diagnostics
                        .push(format!("{date}: {}: liquidation failed: {err}", event.symbol));
                    continue;
                }
            };
            let commission =
                liquidation.exit.covered_shares as f64 * price * self.config.commission_rate;
            run.state.cash += liquidation.cash_delta - commission;
            run.state.positions.remove(&event.symbol);
            run.record_trade(
                TradeRecord {
                    symbol: event.symbol.clone(),
                    action: SignalAction::Cover,
                    shares: liquidation.exit.covered_shares,
                    price,
                    date,
                    cash_delta: liquidation.cash_delta - commission,
                    realized_pnl: Some(
                        liquidation.exit.net_profit - liquidation.penalty - commission,
                    ),
                },
                observer,
            );
        }

        // Keep the canonical map's margin ratios current for survivors.
        for position in run.state.positions.values_mut() {
            if let (Some(terms), Some(short)) =
                (position.short_terms.as_mut(), run.ledger.position(&position.symbol))
            {
                if let Some(price) = run.prices.get(&position.symbol) {
                    terms.last_margin_ratio = short.margin_ratio(*price);
                }
            }
        }
    }

    /// Drift rebalancing over open long positions. Weights are fractions of
    /// *invested long capital*, so rebalancing redistributes among holdings
    /// without chasing a cash-inclusive target. Targets come from
    /// registration, or equal weight across open longs when absent. Shorts
    /// are managed by the margin ledger, not by weight targets.
    ///
    /// All deltas are computed from the day-start weights, then sells run
    /// before buys so freed cash can fund the other leg.
    fn rebalance(&self, run: &mut RunState, date: NaiveDate, observer: &mut dyn RunObserver) {
        if self.config.rebalance_threshold <= 0.0 {
            return;
        }
        let open_longs = run.state.positions.values().filter(|p| p.is_long()).count();
        if open_longs == 0 {
            return;
        }
        let invested: f64 = run
            .state
            .positions
            .values()
            .filter(|p| p.is_long())
            .map(|p| {
                let price = run.prices.get(&p.symbol).copied().unwrap_or(p.entry_price);
                p.shares as f64 * price
            })
            .sum();
        if invested <= 0.0 {
            return;
        }
        let equal_weight = 1.0 / open_longs as f64;

        struct Adjustment {
            index: usize,
            current_weight: f64,
            target_weight: f64,
            drift: f64,
            delta_value: f64,
            shares_delta: u64,
            price: f64,
        }
        let mut sells: Vec<Adjustment> = Vec::new();
        let mut buys: Vec<Adjustment> = Vec::new();

        for (index, registration) in self.registrations.iter().enumerate() {
            let symbol = &registration.symbol;
            let Some(position) = run.state.positions.get(symbol) else { continue };
            if !position.is_long() {
                continue;
            }
            let Some(price) = run.prices.get(symbol).copied() else { continue };

            let target_weight = registration.target_weight.unwrap_or(equal_weight);
            let current_value = position.shares as f64 * price;
            let current_weight = current_value / invested;
            let drift = (current_weight - target_weight).abs();
            if drift <= self.config.rebalance_threshold {
                continue;
            }

            let delta_value = target_weight * invested - current_value;
            let shares_delta = (delta_value.abs() / price).floor() as u64;
            if shares_delta == 0 {
                continue;
            }

            let adjustment = Adjustment {
                index,
                current_weight,
                target_weight,
                drift,
                delta_value,
                shares_delta,
                price,
            };
            if delta_value < 0.0 {
                sells.push(adjustment);
            } else {
                buys.push(adjustment);
            }
        }

        for adjustment in &sells {
            let symbol = self.registrations[adjustment.index].symbol.clone();
            self.rebalance_sell(
                run,
                &symbol,
                adjustment.shares_delta,
                adjustment.price,
                date,
                observer,
            );
            self.record_rebalance(run, &symbol, adjustment.current_weight, adjustment.target_weight, adjustment.drift, -(adjustment.shares_delta as i64), date, observer);
        }
        for adjustment in &buys {
            let registration = &self.registrations[adjustment.index];
            let symbol = registration.symbol.clone();
            let sector = registration.metadata.sector.clone();
            if self.rebalance_buy(
                run,
                &sector,
                &symbol,
                adjustment.shares_delta,
                adjustment.delta_value,
                adjustment.price,
                date,
                observer,
            ) {
                self.record_rebalance(run, &symbol, adjustment.current_weight, adjustment.target_weight, adjustment.drift, adjustment.shares_delta as i64, date, observer);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_rebalance(
        &self,
        run: &mut RunState,
        symbol: &str,
        current_weight: f64,
        target_weight: f64,
        drift: f64,
        shares_delta: i64,
        date: NaiveDate,
        observer: &mut dyn RunObserver,
    ) {
        let event = RebalanceEvent {
            date,
            symbol: symbol.to_string(),
            current_weight,
            target_weight,
            drift,
            shares_delta,
        };
        observer.on_rebalance(&event);
        run.rebalances.push(event);
    }

    fn rebalance_sell(
        &self,
        run: &mut RunState,
        symbol: &str,
        shares: u64,
        price: f64,
        date: NaiveDate,
        observer: &mut dyn RunObserver,
    ) {
        let fill_price = price * (1.0 - self.config.slippage_rate);
        let Some(position) = run.state.positions.get_mut(symbol) else { return };
        let sold = shares.min(position.shares);
        let proceeds = sold as f64 * fill_price;
        let commission = proceeds * self.config.commission_rate;
        let realized = (fill_price - position.entry_price) * sold as f64 - commission;

        if sold == position.shares {
            run.state.positions.remove(symbol);
        } else {
            position.shares -= sold;
        }
        run.state.cash += proceeds - commission;
        run.record_trade(
            TradeRecord {
                symbol: symbol.to_string(),
                action: SignalAction::Sell,
                shares: sold,
                price: fill_price,
                date,
                cash_delta: proceeds - commission,
                realized_pnl: Some(realized),
            },
            observer,
        );
    }

    /// Rebalance buys face the same admission control as fresh entries,
    /// minus the position-count check (the position already exists).
    /// Returns false when the buy was rejected or unaffordable.
    #[allow(clippy::too_many_arguments)]
    fn rebalance_buy(
        &self,
        run: &mut RunState,
        sector: &str,
        symbol: &str,
        shares: u64,
        delta_value: f64,
        price: f64,
        date: NaiveDate,
        observer: &mut dyn RunObserver,
    ) -> bool {
        if let Err(reason) = admission::admit_entry(
            &self.config,
            &run.state,
            symbol,
            EntryKind::Increase,
            Some(sector),
            delta_value,
            price,
            &self.sectors,
            &run.histories,
            &run.prices,
        ) {
            run.record_rejection(symbol, date, reason, 1.0, observer);
            return false;
        }

        let fill_price = price * (1.0 + self.config.slippage_rate);
        let cost = shares as f64 * fill_price;
        let commission = cost * self.config.commission_rate;
        // Same whole-order cash policy as fresh entries: no trimming to fit.
        if cost + commission > run.state.cash {
            run.record_rejection(symbol, date, RejectionReason::InsufficientCash, 1.0, observer);
            return false;
        }

        let Some(position) = run.state.positions.get_mut(symbol) else { return false };
        // Weighted-average entry price across the old and new lots.
        let old_cost = position.shares as f64 * position.entry_price;
        position.entry_price = (old_cost + cost) / (position.shares + shares) as f64;
        position.shares += shares;

        run.state.cash -= cost + commission;
        run.record_trade(
            TradeRecord {
                symbol: symbol.to_string(),
                action: SignalAction::Buy,
                shares,
                price: fill_price,
                date,
                cash_delta: -(cost + commission),
                realized_pnl: None,
            },
            observer,
        );
        true
    }

    fn end_of_day(&self, run: &mut RunState, date: NaiveDate, observer: &mut dyn RunObserver) {
        let total_value = run.state.total_value(&run.prices);
        let snapshot = DailySnapshot {
            date,
            total_value,
            cash: run.state.cash,
            open_positions: run.state.open_position_count(),
        };
        observer.on_day_end(&snapshot);
        run.snapshots.push(snapshot);

        let mut exposures = BTreeMap::new();
        if total_value > 0.0 {
            for position in run.state.positions.values() {
                let Some(sector) = self.sectors.get(&position.symbol) else { continue };
                let price =
                    run.prices.get(&position.symbol).copied().unwrap_or(position.entry_price);
                *exposures.entry(sector.clone()).or_insert(0.0) +=
                    position.market_value(price) / total_value;
            }
        }
        run.sector_exposures.push(SectorExposureSnapshot { date, exposures });
    }

    fn assemble_result(&self, run: RunState, start: NaiveDate, end: NaiveDate) -> BacktestResult {
        let mut equity_values = Vec::with_capacity(run.snapshots.len() + 1);
        equity_values.push(self.config.initial_capital);
        equity_values.extend(run.snapshots.iter().map(|s| s.total_value));

        let metrics =
            PerformanceMetrics::compute(&equity_values, &run.trades, self.config.risk_free_rate);
        let final_value = *equity_values.last().unwrap_or(&self.config.initial_capital);
        let equity_hash = BacktestResult::hash_equity_curve(&run.snapshots);

        let mut stats = run.stats;
        stats.rejected = run.rejections.len();

        BacktestResult {
            run_id: self.config.run_id(),
            period: Period { start, end },
            initial_capital: self.config.initial_capital,
            final_value,
            metrics,
            trades: run.trades,
            signal_stats: stats,
            rejections: run.rejections,
            equity_curve: run.snapshots,
            sector_exposures: run.sector_exposures,
            rebalances: run.rebalances,
            equity_hash,
            diagnostics: run.diagnostics,
        }
    }
}
