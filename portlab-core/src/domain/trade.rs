//! TradeRecord — an immutable log entry for every executed fill.

use super::signal::SignalAction;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One executed fill. Appended to the trade log on execution, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub action: SignalAction,
    pub shares: u64,
    /// Fill price after slippage.
    pub price: f64,
    pub date: NaiveDate,
    /// Net effect on cash, commission included. Negative for buys.
    pub cash_delta: f64,
    /// Realized P&L when this fill closes (part of) a position.
    pub realized_pnl: Option<f64>,
}

impl TradeRecord {
    pub fn is_closing(&self) -> bool {
        self.realized_pnl.is_some()
    }

    pub fn is_winner(&self) -> bool {
        self.realized_pnl.is_some_and(|pnl| pnl > 0.0)
    }
}
