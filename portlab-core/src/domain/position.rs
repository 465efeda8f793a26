//! Position — an open long or short holding.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Side of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

/// Margin bookkeeping carried only by short positions.
///
/// Kept as a separate optional struct rather than zeroed fields on every
/// position, so "no margin" and "zero margin held" cannot be confused.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShortTerms {
    /// Collateral held against the short: `entry proceeds * margin_requirement`.
    pub margin_held: f64,
    /// Maintenance margin ratio observed at the most recent margin check.
    pub last_margin_ratio: f64,
}

/// An open holding. Share count is strictly positive while the position is
/// open; a fully closed position is removed from the portfolio map, never
/// kept at zero shares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub shares: u64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// Present iff `side == Short`.
    pub short_terms: Option<ShortTerms>,
}

impl Position {
    pub fn new_long(symbol: String, shares: u64, entry_price: f64, entry_date: NaiveDate) -> Self {
        Self {
            symbol,
            side: PositionSide::Long,
            shares,
            entry_price,
            entry_date,
            stop_loss: None,
            take_profit: None,
            short_terms: None,
        }
    }

    pub fn new_short(
        symbol: String,
        shares: u64,
        entry_price: f64,
        entry_date: NaiveDate,
        margin_held: f64,
    ) -> Self {
        Self {
            symbol,
            side: PositionSide::Short,
            shares,
            entry_price,
            entry_date,
            stop_loss: None,
            take_profit: None,
            short_terms: Some(ShortTerms { margin_held, last_margin_ratio: f64::INFINITY }),
        }
    }

    /// Carrying value at `current_price` for the equity identity
    /// `total_value == cash + sum(carrying values)`.
    ///
    /// Longs carry `shares * price`. Shorts carry the margin collateral minus
    /// the cost to cover, so entering a short is equity-neutral and a falling
    /// price raises equity.
    pub fn market_value(&self, current_price: f64) -> f64 {
        let gross = self.shares as f64 * current_price;
        match self.side {
            PositionSide::Long => gross,
            PositionSide::Short => {
                let margin = self.short_terms.map(|t| t.margin_held).unwrap_or(0.0);
                margin - gross
            }
        }
    }

    /// Unrealized P&L at `current_price`.
    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        let per_share = match self.side {
            PositionSide::Long => current_price - self.entry_price,
            PositionSide::Short => self.entry_price - current_price,
        };
        per_share * self.shares as f64
    }

    pub fn is_long(&self) -> bool {
        self.side == PositionSide::Long
    }

    pub fn is_short(&self) -> bool {
        self.side == PositionSide::Short
    }
}
