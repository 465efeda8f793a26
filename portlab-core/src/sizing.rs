//! Position sizing — pure functions mapping portfolio state to share counts.
//!
//! Every method here is stateless: portfolio value and method parameters in,
//! a [`SizingResult`] out. Nonsensical inputs (non-positive price, negative
//! percentages, zero stop distance) size to zero shares rather than erroring;
//! rejecting a zero-share proposal is the coordinator's job, not the sizer's.
//!
//! Numeric policy: every divisor that could be zero is guarded, and all share
//! counts are floored to whole shares. No method returns a fractional or
//! negative share count.

use serde::{Deserialize, Serialize};

/// Kelly sizing never allocates more than this fraction of the portfolio,
/// regardless of the requested Kelly fraction.
pub const KELLY_CAP: f64 = 0.25;

/// Output of a sizing method.
///
/// Method-specific fields are `Option`s so "not applicable" is distinct from
/// a numeric zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SizingResult {
    /// Whole shares to trade. Zero means "do not trade".
    pub shares: u64,
    /// Dollar value of the proposed position (`shares * price`).
    pub value: f64,
    /// Uncapped full-Kelly fraction (Kelly method only). May be <= 0 when
    /// there is no edge.
    pub kelly_percent: Option<f64>,
    /// Fraction-scaled, capped Kelly allocation actually used (Kelly only).
    pub adjusted_percent: Option<f64>,
    /// Long-side stop price, `price - stop_distance` (volatility method only).
    pub stop_loss_price: Option<f64>,
    /// Stop distance in dollars (volatility method only).
    pub stop_loss_distance: Option<f64>,
    /// Margin consumed by the chosen share count (margin method only).
    pub margin_used: Option<f64>,
    /// Realized leverage for the chosen share count (margin method only).
    pub leverage: Option<f64>,
}

impl SizingResult {
    fn zero() -> Self {
        Self::default()
    }

    fn from_shares(shares: u64, price: f64) -> Self {
        Self { shares, value: shares as f64 * price, ..Self::default() }
    }
}

/// An asset handed to [`risk_parity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAsset {
    pub symbol: String,
    /// Volatility measure (any consistent unit). Non-positive volatility
    /// excludes the asset from the allocation.
    pub volatility: f64,
    pub price: f64,
}

/// Size a position worth a fixed dollar amount.
///
/// `shares = floor(fixed_amount / price)`. Zero shares if `price <= 0` or
/// `fixed_amount <= 0`.
pub fn fixed_dollar(fixed_amount: f64, price: f64) -> SizingResult {
    if price <= 0.0 || fixed_amount <= 0.0 || !price.is_finite() || !fixed_amount.is_finite() {
        return SizingResult::zero();
    }
    // Tolerance so a mathematically-integral quotient survives accumulated
    // float error (0.15 * 100k / 50 lands at 299.999...96 in doubles).
    let shares = (fixed_amount / price + 1e-9).floor() as u64;
    SizingResult::from_shares(shares, price)
}

/// Size a position worth a fixed fraction of portfolio value.
///
/// `percent` is expected in (0, 1]; out-of-range positive values are the
/// caller's responsibility, but a negative percent sizes to zero.
pub fn fixed_percent(portfolio_value: f64, percent: f64, price: f64) -> SizingResult {
    if percent <= 0.0 {
        return SizingResult::zero();
    }
    fixed_dollar(portfolio_value * percent, price)
}

/// Size a position by the Kelly criterion.
///
/// Full Kelly: `f* = (p * avg_win - (1 - p) * avg_loss) / avg_win`. A
/// non-positive `f*` (no edge) sizes to zero shares. Otherwise the allocation
/// is `f* * fraction`, capped at [`KELLY_CAP`] of the portfolio.
///
/// The result exposes both `kelly_percent` (uncapped `f*`) and
/// `adjusted_percent` (fraction-scaled, capped).
pub fn kelly_criterion(
    portfolio_value: f64,
    win_probability: f64,
    avg_win: f64,
    avg_loss: f64,
    price: f64,
    fraction: f64,
) -> SizingResult {
    if avg_win <= 0.0 || avg_loss < 0.0 || !(0.0..=1.0).contains(&win_probability) {
        return SizingResult::zero();
    }

    let full_kelly =
        (win_probability * avg_win - (1.0 - win_probability) * avg_loss) / avg_win;

    if full_kelly <= 0.0 {
        return SizingResult { kelly_percent: Some(full_kelly), ..SizingResult::zero() };
    }

    let adjusted = (full_kelly * fraction).min(KELLY_CAP);
    if adjusted <= 0.0 {
        return SizingResult { kelly_percent: Some(full_kelly), ..SizingResult::zero() };
    }

    let mut result = fixed_percent(portfolio_value, adjusted, price);
    result.kelly_percent = Some(full_kelly);
    result.adjusted_percent = Some(adjusted);
    result
}

/// Size a position so a stop-out loses a fixed fraction of the portfolio.
///
/// ```text
/// stop_distance = atr * atr_multiplier
/// shares        = floor(portfolio_value * risk_percent / stop_distance)
/// ```
///
/// Zero ATR (or multiplier) means no measurable volatility to size against,
/// so the result is zero shares. The long-side stop price
/// (`price - stop_distance`) rides along for the opened position.
pub fn volatility_based(
    portfolio_value: f64,
    risk_percent: f64,
    atr: f64,
    price: f64,
    atr_multiplier: f64,
) -> SizingResult {
    let stop_distance = atr * atr_multiplier;
    if stop_distance <= 0.0 || risk_percent <= 0.0 || price <= 0.0 || !stop_distance.is_finite() {
        return SizingResult::zero();
    }

    let shares = ((portfolio_value * risk_percent) / stop_distance).floor() as u64;
    let mut result = SizingResult::from_shares(shares, price);
    result.stop_loss_price = Some(price - stop_distance);
    result.stop_loss_distance = Some(stop_distance);
    result
}

/// Inverse-volatility (risk parity) allocation across several assets.
///
/// `weight_i ∝ 1 / volatility_i`, normalized to sum to 1 over the assets with
/// positive volatility. Assets with `volatility <= 0` are excluded from the
/// normalization and receive zero shares, in input order.
pub fn risk_parity(portfolio_value: f64, assets: &[RiskAsset]) -> Vec<(String, SizingResult)> {
    let inverse_total: f64 = assets
        .iter()
        .filter(|a| a.volatility > 0.0)
        .map(|a| 1.0 / a.volatility)
        .sum();

    assets
        .iter()
        .map(|asset| {
            if asset.volatility <= 0.0 || inverse_total <= 0.0 {
                return (asset.symbol.clone(), SizingResult::zero());
            }
            let weight = (1.0 / asset.volatility) / inverse_total;
            (asset.symbol.clone(), fixed_percent(portfolio_value, weight, asset.price))
        })
        .collect()
}

/// Maximum position size under both a margin requirement and a leverage cap.
///
/// Buying power is the lesser of `available_cash / margin_requirement` and
/// `portfolio_value * max_leverage`; the binding constraint determines the
/// share count. `margin_used` and realized `leverage` reflect the floored
/// share count, not the theoretical maximum.
pub fn max_position_with_margin(
    portfolio_value: f64,
    available_cash: f64,
    margin_requirement: f64,
    max_leverage: f64,
    price: f64,
) -> SizingResult {
    if price <= 0.0 || margin_requirement <= 0.0 || available_cash <= 0.0 {
        return SizingResult::zero();
    }

    let margin_power = available_cash / margin_requirement;
    let leverage_power = portfolio_value * max_leverage;
    let buying_power = margin_power.min(leverage_power);
    if buying_power <= 0.0 {
        return SizingResult::zero();
    }

    let shares = (buying_power / price).floor() as u64;
    let mut result = SizingResult::from_shares(shares, price);
    result.margin_used = Some(result.value * margin_requirement);
    result.leverage = Some(if portfolio_value > 0.0 { result.value / portfolio_value } else { 0.0 });
    result
}
