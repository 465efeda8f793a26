//! ShortPositionLedger — short-sale mechanics: margin, borrow interest,
//! margin calls, and forced liquidation.
//!
//! Each symbol's short runs a small state machine:
//!
//! ```text
//! Open ──(margin ratio < threshold)──> MarginCalled
//! Open | MarginCalled ──(cover / force_liquidate)──> removed
//! ```
//!
//! A margin-called position stays open (and keeps accruing interest) until it
//! is explicitly covered or liquidated.
//!
//! Cash-flow convention, used by the coordinator when merging ledger results
//! into portfolio cash: entering a short consumes
//! `margin_required - proceeds` of cash (the sale proceeds themselves are
//! held inside the margin account). Covering returns
//! `margin_released - cover_cost - interest`, which equals the original
//! outlay plus net P&L.
//!
//! Borrow interest is a single simple proration over the holding period,
//! computed on the entry-time position value:
//! `entry_value * (annual_rate / 365) * days_held`. This matches the
//! documented formula; it is deliberately not daily mark-to-market
//! compounding.

use crate::error::ShortError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ledger parameters. Defaults follow the engine-wide defaults table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShortLedgerConfig {
    /// Margin held as a multiple of entry proceeds (1.5 = 150%).
    pub margin_requirement: f64,
    /// Annual borrow rate, prorated daily over the holding period.
    pub short_interest_rate: f64,
    /// Maintenance threshold: a margin call fires when
    /// `margin_held / current_value` drops below this.
    pub margin_call_threshold: f64,
    /// Penalty on forced liquidation, as a fraction of position value at
    /// liquidation.
    pub liquidation_penalty: f64,
}

impl Default for ShortLedgerConfig {
    fn default() -> Self {
        Self {
            margin_requirement: 1.5,
            short_interest_rate: 0.03,
            margin_call_threshold: 1.3,
            liquidation_penalty: 0.02,
        }
    }
}

/// Lifecycle state of an open short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShortState {
    Open,
    /// Maintenance margin breached; still open until covered or liquidated.
    MarginCalled,
}

/// One open short position inside the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortPosition {
    pub symbol: String,
    pub shares: u64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    /// Collateral held: `entry proceeds * margin_requirement` (shrinks
    /// proportionally on partial covers).
    pub margin_held: f64,
    pub state: ShortState,
}

impl ShortPosition {
    /// Position value at entry for the current share count.
    pub fn entry_value(&self) -> f64 {
        self.shares as f64 * self.entry_price
    }

    /// `margin_held / current_value`. Infinite when the symbol is worthless.
    pub fn margin_ratio(&self, current_price: f64) -> f64 {
        let current_value = self.shares as f64 * current_price;
        if current_value <= 0.0 {
            f64::INFINITY
        } else {
            self.margin_held / current_value
        }
    }
}

/// Result of opening a short.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShortEntry {
    pub proceeds: f64,
    pub margin_required: f64,
    /// Cash the caller must put up beyond the sale proceeds.
    pub cash_outlay: f64,
}

/// Result of covering (part of) a short.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShortExit {
    pub covered_shares: u64,
    pub exit_price: f64,
    /// `(entry_price - exit_price) * covered_shares`, before interest.
    pub gross_profit: f64,
    /// Gross profit as a fraction of entry value of the covered shares.
    pub profit_percent: f64,
    pub days_held: i64,
    /// Borrow interest accrued over the holding period.
    pub interest: f64,
    /// `gross_profit - interest` (liquidation penalty, if any, comes on top).
    pub net_profit: f64,
    /// Net cash returned to the caller: released margin minus cover cost and
    /// interest.
    pub cash_delta: f64,
    /// True when the position was fully closed by this exit.
    pub fully_closed: bool,
}

/// Result of a forced liquidation: a full cover plus a penalty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Liquidation {
    pub exit: ShortExit,
    /// `liquidation_penalty * position value at liquidation`, already
    /// deducted from `cash_delta` below.
    pub penalty: f64,
    /// `exit.cash_delta - penalty`.
    pub cash_delta: f64,
}

/// Emitted when a short's maintenance margin is breached. Consumed
/// immediately by the coordinator; not persisted as ledger state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginCallEvent {
    pub symbol: String,
    pub date: NaiveDate,
    pub margin_ratio: f64,
    /// `current_value - entry_value`; positive when the price has moved
    /// against the short.
    pub unrealized_loss: f64,
    pub action_required: MarginCallAction,
}

/// What the margin call demands of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginCallAction {
    AddMarginOrLiquidate,
}

/// Tracks every open short and its margin collateral.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShortPositionLedger {
    config: ShortLedgerConfig,
    positions: HashMap<String, ShortPosition>,
}

impl ShortPositionLedger {
    pub fn new(config: ShortLedgerConfig) -> Self {
        Self { config, positions: HashMap::new() }
    }

    pub fn config(&self) -> &ShortLedgerConfig {
        &self.config
    }

    pub fn position(&self, symbol: &str) -> Option<&ShortPosition> {
        self.positions.get(symbol)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &ShortPosition> {
        self.positions.values()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Open a short: sell `shares` at `price`, posting
    /// `proceeds * margin_requirement` as collateral.
    ///
    /// `available_cash` must cover the incremental outlay
    /// (`margin_required - proceeds`); otherwise the entry fails whole with
    /// [`ShortError::InsufficientCapital`]. One open short per symbol.
    pub fn enter_short_position(
        &mut self,
        symbol: &str,
        shares: u64,
        price: f64,
        date: NaiveDate,
        available_cash: f64,
    ) -> Result<ShortEntry, ShortError> {
        if shares == 0 {
            return Err(ShortError::InvalidOrder("share count must be positive".into()));
        }
        if price <= 0.0 || !price.is_finite() {
            return Err(ShortError::InvalidOrder(format!("price must be positive, got {price}")));
        }
        if self.positions.contains_key(symbol) {
            return Err(ShortError::InvalidOrder(format!(
                "short position for '{symbol}' already open"
            )));
        }

        let proceeds = shares as f64 * price;
        let margin_required = proceeds * self.config.margin_requirement;
        let cash_outlay = margin_required - proceeds;
        if available_cash < cash_outlay {
            return Err(ShortError::InsufficientCapital {
                required: cash_outlay,
                available: available_cash,
            });
        }

        self.positions.insert(
            symbol.to_string(),
            ShortPosition {
                symbol: symbol.to_string(),
                shares,
                entry_price: price,
                entry_date: date,
                margin_held: margin_required,
                state: ShortState::Open,
            },
        );

        Ok(ShortEntry { proceeds, margin_required, cash_outlay })
    }

    /// Cover `shares` of the open short (all remaining shares when `None`)
    /// at `price` on `date`.
    ///
    /// Interest accrues once here, over the full holding period, on the
    /// entry-time value of the covered shares.
    pub fn exit_short_position(
        &mut self,
        symbol: &str,
        shares: Option<u64>,
        price: f64,
        date: NaiveDate,
    ) -> Result<ShortExit, ShortError> {
        if price <= 0.0 || !price.is_finite() {
            return Err(ShortError::InvalidOrder(format!("price must be positive, got {price}")));
        }

        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| ShortError::PositionNotFound(symbol.to_string()))?;

        let covered = shares.unwrap_or(position.shares);
        if covered == 0 || covered > position.shares {
            return Err(ShortError::InvalidOrder(format!(
                "cannot cover {covered} of {} open shares",
                position.shares
            )));
        }

        let entry_value = covered as f64 * position.entry_price;
        let gross_profit = (position.entry_price - price) * covered as f64;
        let profit_percent = gross_profit / entry_value;
        let days_held = date.signed_duration_since(position.entry_date).num_days().max(0);
        let interest =
            entry_value * (self.config.short_interest_rate / 365.0) * days_held as f64;
        let net_profit = gross_profit - interest;

        let margin_released = position.margin_held * covered as f64 / position.shares as f64;
        let cover_cost = covered as f64 * price;
        let cash_delta = margin_released - cover_cost - interest;

        let fully_closed = covered == position.shares;
        if fully_closed {
            self.positions.remove(symbol);
        } else {
            position.shares -= covered;
            position.margin_held -= margin_released;
        }

        Ok(ShortExit {
            covered_shares: covered,
            exit_price: price,
            gross_profit,
            profit_percent,
            days_held,
            interest,
            net_profit,
            cash_delta,
            fully_closed,
        })
    }

    /// Pure maintenance check against the day's prices: emits a
    /// [`MarginCallEvent`] for every open short whose margin ratio has
    /// dropped below the threshold. Mutates nothing; flagging and
    /// liquidation are separate, explicit steps.
    ///
    /// Symbols missing from `prices` are skipped (no data, no verdict).
    /// Events are ordered by symbol so output is deterministic.
    pub fn check_margin_requirements(
        &self,
        prices: &HashMap<String, f64>,
        date: NaiveDate,
    ) -> Vec<MarginCallEvent> {
        let mut events: Vec<MarginCallEvent> = self
            .positions
            .values()
            .filter_map(|position| {
                let price = *prices.get(&position.symbol)?;
                let ratio = position.margin_ratio(price);
                if ratio >= self.config.margin_call_threshold {
                    return None;
                }
                let current_value = position.shares as f64 * price;
                Some(MarginCallEvent {
                    symbol: position.symbol.clone(),
                    date,
                    margin_ratio: ratio,
                    unrealized_loss: current_value - position.entry_value(),
                    action_required: MarginCallAction::AddMarginOrLiquidate,
                })
            })
            .collect();
        events.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        events
    }

    /// Transition a short to `MarginCalled`. The position remains open.
    pub fn flag_margin_called(&mut self, symbol: &str) -> Result<(), ShortError> {
        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| ShortError::PositionNotFound(symbol.to_string()))?;
        position.state = ShortState::MarginCalled;
        Ok(())
    }

    /// Force-cover the full position at `price`, then deduct a liquidation
    /// penalty of `liquidation_penalty * position value at liquidation` from
    /// the realized proceeds.
    pub fn force_liquidate(
        &mut self,
        symbol: &str,
        price: f64,
        date: NaiveDate,
    ) -> Result<Liquidation, ShortError> {
        let shares = self
            .positions
            .get(symbol)
            .ok_or_else(|| ShortError::PositionNotFound(symbol.to_string()))?
            .shares;

        let exit = self.exit_short_position(symbol, None, price, date)?;
        let penalty = self.config.liquidation_penalty * (shares as f64 * price);
        Ok(Liquidation { exit, penalty, cash_delta: exit.cash_delta - penalty })
    }
}
