//! PortfolioState — aggregate of cash and all open positions.

use super::position::Position;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Mutable portfolio aggregate, owned exclusively by the coordinator for the
/// duration of a run.
///
/// The accounting identity must hold at every valuation point:
/// `total_value(prices) == cash + sum(position carrying values)`. Cash never
/// goes negative from an engine-initiated trade; trades that cannot be paid
/// for are rejected whole, never partially filled.
///
/// Positions live in a `BTreeMap` so every iteration (and therefore every
/// float summation order) is identical across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    pub cash: f64,
    pub positions: BTreeMap<String, Position>,
    /// Realized P&L of every closed (or partially closed) trade, in close order.
    pub realized_pnl: Vec<f64>,
}

impl PortfolioState {
    pub fn new(initial_cash: f64) -> Self {
        Self { cash: initial_cash, positions: BTreeMap::new(), realized_pnl: Vec::new() }
    }

    /// Total portfolio value: cash plus every position's carrying value.
    /// A symbol missing from `prices` is valued at its entry price.
    pub fn total_value(&self, prices: &HashMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .map(|pos| {
                let price = prices.get(&pos.symbol).copied().unwrap_or(pos.entry_price);
                pos.market_value(price)
            })
            .sum();
        self.cash + position_value
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    /// Market value held in `sector`, given the symbol → sector map supplied
    /// at strategy registration. Short carrying values count toward their
    /// sector like any other exposure.
    pub fn sector_value(
        &self,
        sector: &str,
        sectors: &HashMap<String, String>,
        prices: &HashMap<String, f64>,
    ) -> f64 {
        self.positions
            .values()
            .filter(|pos| sectors.get(&pos.symbol).map(String::as_str) == Some(sector))
            .map(|pos| {
                let price = prices.get(&pos.symbol).copied().unwrap_or(pos.entry_price);
                pos.market_value(price)
            })
            .sum()
    }
}
