//! Admission control — deterministic accept/reject for entry signals.
//!
//! Checks run in one fixed order and the first breach wins, so a rejection
//! always has exactly one reason and replays are byte-identical:
//!
//! 1. max open positions
//! 2. projected sector exposure
//! 3. mean absolute correlation against current holdings
//! 4. available cash for at least one share
//!
//! (The fifth reason, `InsufficientShares`, is raised by the coordinator
//! after sizing.) Exits never pass through admission — closing risk is
//! always allowed.

use crate::config::RunConfig;
use crate::domain::{Bar, PortfolioState};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Why an entry signal was refused. Not an error: a first-class recorded
/// outcome, aggregated into the run's signal statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionReason {
    MaxPositionsReached,
    SectorExposureLimitReached,
    HighCorrelation,
    InsufficientCash,
    InsufficientShares,
}

impl RejectionReason {
    /// Human-readable report key, used in `rejection_reasons` counts.
    pub fn report_key(&self) -> &'static str {
        match self {
            RejectionReason::MaxPositionsReached => "Max positions limit reached",
            RejectionReason::SectorExposureLimitReached => "Sector exposure limit reached",
            RejectionReason::HighCorrelation => "High correlation with existing positions",
            RejectionReason::InsufficientCash => "Insufficient cash",
            RejectionReason::InsufficientShares => "Position size below one share",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.report_key())
    }
}

/// Immutable record of one rejected entry signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub symbol: String,
    pub date: NaiveDate,
    pub reason: RejectionReason,
    /// Signal confidence at the time of rejection.
    pub confidence: f64,
}

/// Pearson correlation of two equal-length return series.
/// Returns 0.0 when either side has no variance.
fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[a.len() - n..], &b[b.len() - n..]);
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

/// Daily close-to-close returns over the last `lookback` bars.
fn trailing_returns(history: &[Bar], lookback: usize) -> Vec<f64> {
    let window = &history[history.len().saturating_sub(lookback + 1)..];
    window
        .windows(2)
        .filter(|pair| pair[0].close > 0.0)
        .map(|pair| pair[1].close / pair[0].close - 1.0)
        .collect()
}

/// Mean absolute pairwise return correlation between `candidate` and every
/// held symbol. Trivially 0.0 with no open positions.
pub fn mean_abs_correlation(
    candidate: &str,
    holdings: impl Iterator<Item = impl AsRef<str>>,
    histories: &HashMap<String, Vec<Bar>>,
    lookback: usize,
) -> f64 {
    let Some(candidate_history) = histories.get(candidate) else {
        return 0.0;
    };
    let candidate_returns = trailing_returns(candidate_history, lookback);

    let mut total = 0.0;
    let mut count = 0usize;
    for held in holdings {
        let Some(held_history) = histories.get(held.as_ref()) else {
            continue;
        };
        let held_returns = trailing_returns(held_history, lookback);
        total += pearson(&candidate_returns, &held_returns).abs();
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

/// Whether the candidate opens a new position or grows an existing one.
/// Increases (rebalance buys) skip the position-count check — they do not
/// add a position — but face every other constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    New,
    Increase,
}

/// Evaluate an entry candidate against the portfolio-level constraints, in
/// the fixed order above. `Ok(())` admits the signal to sizing.
///
/// `proposed_value` is the candidate's target dollar size, used only for the
/// sector projection; the cash check needs just one share's worth. The
/// candidate itself is excluded from the correlation comparison set.
#[allow(clippy::too_many_arguments)]
pub fn admit_entry(
    config: &RunConfig,
    state: &PortfolioState,
    symbol: &str,
    kind: EntryKind,
    sector: Option<&str>,
    proposed_value: f64,
    price: f64,
    sectors: &HashMap<String, String>,
    histories: &HashMap<String, Vec<Bar>>,
    prices: &HashMap<String, f64>,
) -> Result<(), RejectionReason> {
    // 1. Position count.
    if kind == EntryKind::New && state.open_position_count() >= config.max_positions {
        return Err(RejectionReason::MaxPositionsReached);
    }

    // 2. Projected sector allocation.
    if let Some(sector) = sector {
        let total = state.total_value(prices);
        if total > 0.0 {
            let projected = state.sector_value(sector, sectors, prices) + proposed_value;
            if projected / total > config.max_sector_exposure {
                return Err(RejectionReason::SectorExposureLimitReached);
            }
        }
    }

    // 3. Correlation against current holdings, in symbol order so the float
    // summation is replay-stable.
    let holdings = state.positions.keys().filter(|held| held.as_str() != symbol);
    let correlation =
        mean_abs_correlation(symbol, holdings, histories, config.correlation_lookback);
    if correlation > config.correlation_limit {
        return Err(RejectionReason::HighCorrelation);
    }

    // 4. One share must be affordable.
    if state.cash < price {
        return Err(RejectionReason::InsufficientCash);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Position;

    fn d0() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    fn bars_from_closes(symbol: &str, closes: &[f64]) -> Vec<Bar> {
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

    fn base_setup() -> (RunConfig, PortfolioState, HashMap<String, String>, HashMap<String, f64>) {
        (
            RunConfig::default(),
            PortfolioState::new(100_000.0),
            HashMap::new(),
            HashMap::new(),
        )
    }

    #[test]
    fn pearson_of_identical_series_is_one() {
        let series = vec![0.01, -0.02, 0.03, 0.005];
        assert!((pearson(&series, &series) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn pearson_of_constant_series_is_zero() {
        let flat = vec![0.0, 0.0, 0.0];
        let moving = vec![0.01, -0.01, 0.02];
        assert_eq!(pearson(&flat, &moving), 0.0);
    }

    #[test]
    fn correlation_trivially_passes_with_no_holdings() {
        let histories = HashMap::new();
        let empty: Vec<String> = vec![];
        assert_eq!(mean_abs_correlation("AAPL", empty.iter(), &histories, 60), 0.0);
    }

    #[test]
    fn max_positions_checked_first() {
        let (mut config, mut state, sectors, prices) = base_setup();
        config.max_positions = 1;
        state
            .positions
            .insert("SPY".into(), Position::new_long("SPY".into(), 10, 100.0, d0()));
        // Even with no cash, the position-count breach is reported.
        state.cash = 0.0;

        let verdict = admit_entry(
            &config,
            &state,
            "AAPL",
            EntryKind::New,
            None,
            1_000.0,
            100.0,
            &sectors,
            &HashMap::new(),
            &prices,
        );
        assert_eq!(verdict, Err(RejectionReason::MaxPositionsReached));
    }

    #[test]
    fn sector_projection_includes_proposed_value() {
        let (config, mut state, mut sectors, mut prices) = base_setup();
        sectors.insert("AAPL".to_string(), "tech".to_string());
        sectors.insert("MSFT".to_string(), "tech".to_string());
        state
            .positions
            .insert("AAPL".into(), Position::new_long("AAPL".into(), 250, 100.0, d0()));
        state.cash = 75_000.0;
        prices.insert("AAPL".to_string(), 100.0);
        prices.insert("MSFT".to_string(), 100.0);

        // Portfolio = 100k, tech already 25%; an 8k proposal projects to 33%.
        let verdict = admit_entry(
            &config,
            &state,
            "MSFT",
            EntryKind::New,
            Some("tech"),
            8_000.0,
            100.0,
            &sectors,
            &HashMap::new(),
            &prices,
        );
        assert_eq!(verdict, Err(RejectionReason::SectorExposureLimitReached));

        // A 4k proposal projects to 29% and passes.
        let verdict = admit_entry(
            &config,
            &state,
            "MSFT",
            EntryKind::New,
            Some("tech"),
            4_000.0,
            100.0,
            &sectors,
            &HashMap::new(),
            &prices,
        );
        assert_eq!(verdict, Ok(()));
    }

    #[test]
    fn high_correlation_rejected() {
        let (mut config, mut state, sectors, mut prices) = base_setup();
        config.correlation_limit = 0.8;
        state
            .positions
            .insert("SPY".into(), Position::new_long("SPY".into(), 10, 100.0, d0()));
        prices.insert("SPY".to_string(), 100.0);

        // Identical price paths: correlation 1.0.
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + ((i * 7) % 13) as f64).collect();
        let mut histories = HashMap::new();
        histories.insert("SPY".to_string(), bars_from_closes("SPY", &closes));
        histories.insert("VOO".to_string(), bars_from_closes("VOO", &closes));

        let verdict = admit_entry(
            &config,
            &state,
            "VOO",
            EntryKind::New,
            None,
            1_000.0,
            100.0,
            &sectors,
            &histories,
            &prices,
        );
        assert_eq!(verdict, Err(RejectionReason::HighCorrelation));
    }

    #[test]
    fn insufficient_cash_needs_one_share() {
        let (config, mut state, sectors, prices) = base_setup();
        state.cash = 99.0;

        let verdict = admit_entry(
            &config,
            &state,
            "AAPL",
            EntryKind::New,
            None,
            1_000.0,
            100.0,
            &sectors,
            &HashMap::new(),
            &prices,
        );
        assert_eq!(verdict, Err(RejectionReason::InsufficientCash));
    }

    #[test]
    fn report_keys_are_stable() {
        assert_eq!(
            RejectionReason::MaxPositionsReached.to_string(),
            "Max positions limit reached"
        );
        assert_eq!(RejectionReason::InsufficientCash.to_string(), "Insufficient cash");
    }
}
