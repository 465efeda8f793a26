//! Performance metrics — pure functions over the equity curve and trade log.
//!
//! Every metric is equity curve and/or trades in, scalar out, with guarded
//! zero-variance and short-series cases returning 0.0. Annualization assumes
//! 252 trading days.

use crate::domain::TradeRecord;
use serde::{Deserialize, Serialize};

const TRADING_DAYS: f64 = 252.0;

/// Aggregate performance statistics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Total return as a fraction: (final - initial) / initial.
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe: f64,
    pub sortino: f64,
    /// Largest peak-to-trough decline, as a positive fraction.
    pub max_drawdown: f64,
    /// Closed winning trades / closed trades.
    pub win_rate: f64,
    /// Annualized standard deviation of daily returns.
    pub volatility: f64,
}

impl PerformanceMetrics {
    pub fn compute(equity_curve: &[f64], trades: &[TradeRecord], risk_free_rate: f64) -> Self {
        Self {
            total_return: total_return(equity_curve),
            annualized_return: annualized_return(equity_curve),
            sharpe: sharpe_ratio(equity_curve, risk_free_rate),
            sortino: sortino_ratio(equity_curve, risk_free_rate),
            max_drawdown: max_drawdown(equity_curve),
            win_rate: win_rate(trades),
            volatility: annualized_volatility(equity_curve),
        }
    }
}

/// Day-over-day fractional returns.
pub fn daily_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .filter(|pair| pair[0] > 0.0)
        .map(|pair| pair[1] / pair[0] - 1.0)
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

pub fn total_return(equity_curve: &[f64]) -> f64 {
    if equity_curve.len() < 2 || equity_curve[0] <= 0.0 {
        return 0.0;
    }
    equity_curve.last().unwrap() / equity_curve[0] - 1.0
}

/// Geometric annualization over the observed span.
pub fn annualized_return(equity_curve: &[f64]) -> f64 {
    let days = equity_curve.len();
    if days < 2 || equity_curve[0] <= 0.0 {
        return 0.0;
    }
    let final_eq = *equity_curve.last().unwrap();
    if final_eq <= 0.0 {
        return -1.0;
    }
    let years = (days - 1) as f64 / TRADING_DAYS;
    (final_eq / equity_curve[0]).powf(1.0 / years) - 1.0
}

/// Annualized Sharpe: `mean(daily - rf/252) / std(daily) * sqrt(252)`.
pub fn sharpe_ratio(equity_curve: &[f64], risk_free_rate: f64) -> f64 {
    let returns = daily_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let daily_rf = risk_free_rate / TRADING_DAYS;
    let excess: Vec<f64> = returns.iter().map(|r| r - daily_rf).collect();
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean(&excess) / std * TRADING_DAYS.sqrt()
}

/// Annualized Sortino: same numerator as Sharpe, denominator is the stdev of
/// negative daily returns only. 0.0 when there is no downside.
pub fn sortino_ratio(equity_curve: &[f64], risk_free_rate: f64) -> f64 {
    let returns = daily_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let daily_rf = risk_free_rate / TRADING_DAYS;
    let excess_mean = mean(&returns) - daily_rf;

    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_std = std_dev(&downside);
    if downside_std < 1e-15 {
        return 0.0;
    }
    excess_mean / downside_std * TRADING_DAYS.sqrt()
}

/// Largest peak-to-trough decline of the curve, as a positive fraction.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0f64;
    for &equity in equity_curve {
        peak = peak.max(equity);
        if peak > 0.0 {
            worst = worst.max((peak - equity) / peak);
        }
    }
    worst
}

/// Closed winning trades over closed trades; 0.0 with no closed trades.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    let closed: Vec<&TradeRecord> = trades.iter().filter(|t| t.is_closing()).collect();
    if closed.is_empty() {
        return 0.0;
    }
    closed.iter().filter(|t| t.is_winner()).count() as f64 / closed.len() as f64
}

/// Annualized stdev of daily returns.
pub fn annualized_volatility(equity_curve: &[f64]) -> f64 {
    std_dev(&daily_returns(equity_curve)) * TRADING_DAYS.sqrt()
}
