//! Strategy seam — the capability interface the coordinator consumes, plus
//! the closed set of serializable strategy variants.
//!
//! Signal *generation* is an external concern: the engine asks a registered
//! strategy for one [`Signal`] per symbol per day and never looks inside.
//! Concrete strategies are resolved from [`StrategyConfig`] once at
//! configuration time, not per call; there is no string dispatch on the hot
//! path.

use crate::domain::{Bar, Signal, SignalAction};
use serde::{Deserialize, Serialize};

/// The single capability the coordinator requires of a strategy.
///
/// `history` is every bar strictly up to and including the current day;
/// implementations must not assume any minimum length.
pub trait Strategy: Send + Sync {
    fn generate_signal(&self, symbol: &str, history: &[Bar], current_price: f64) -> Signal;

    /// Stable identifier for reports.
    fn name(&self) -> &str;
}

/// Sector/industry metadata supplied at registration, not per-signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyMetadata {
    pub sector: String,
    pub industry: String,
}

/// One registered (symbol, strategy) pair. Registration order is the fixed
/// symbol order for the whole run.
pub struct StrategyRegistration {
    pub symbol: String,
    pub strategy: Box<dyn Strategy>,
    pub metadata: StrategyMetadata,
    /// Optional rebalance target weight; equal weight across open positions
    /// when absent.
    pub target_weight: Option<f64>,
}

/// Serializable strategy selection, resolved once into a boxed [`Strategy`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Buy on the first bar, then hold.
    BuyAndHold,
    /// Long when the short MA is above the long MA, exit when it crosses back.
    MaCrossover { short_period: usize, long_period: usize },
}

impl StrategyConfig {
    pub fn build(&self) -> Box<dyn Strategy> {
        match self {
            StrategyConfig::BuyAndHold => Box::new(BuyAndHold),
            StrategyConfig::MaCrossover { short_period, long_period } => {
                Box::new(MaCrossover { short_period: *short_period, long_period: *long_period })
            }
        }
    }
}

/// Reference strategy: enter once, never exit.
pub struct BuyAndHold;

impl Strategy for BuyAndHold {
    fn generate_signal(&self, _symbol: &str, history: &[Bar], _current_price: f64) -> Signal {
        if history.len() <= 1 {
            Signal::new(SignalAction::Buy, 1.0)
        } else {
            Signal::hold()
        }
    }

    fn name(&self) -> &str {
        "buy_and_hold"
    }
}

/// Reference strategy: simple moving-average crossover.
pub struct MaCrossover {
    pub short_period: usize,
    pub long_period: usize,
}

impl MaCrossover {
    fn sma(history: &[Bar], period: usize) -> Option<f64> {
        if period == 0 || history.len() < period {
            return None;
        }
        let sum: f64 = history[history.len() - period..].iter().map(|b| b.close).sum();
        Some(sum / period as f64)
    }
}

impl Strategy for MaCrossover {
    fn generate_signal(&self, _symbol: &str, history: &[Bar], _current_price: f64) -> Signal {
        let (Some(short), Some(long)) =
            (Self::sma(history, self.short_period), Self::sma(history, self.long_period))
        else {
            return Signal::hold();
        };

        if short > long {
            // Conviction scales with the spread between the averages.
            let spread = ((short - long) / long).min(0.10) / 0.10;
            Signal::new(SignalAction::Buy, spread.max(0.1))
        } else if short < long {
            Signal::new(SignalAction::Sell, 1.0)
        } else {
            Signal::hold()
        }
    }

    fn name(&self) -> &str {
        "ma_crossover"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                symbol: "SPY".into(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(i as u64),
                open: close,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume: 1_000_000,
            })
            .collect()
    }

    #[test]
    fn buy_and_hold_buys_once() {
        let strategy = BuyAndHold;
        let history = bars(&[100.0]);
        assert_eq!(
            strategy.generate_signal("SPY", &history, 100.0).action,
            SignalAction::Buy
        );
        let history = bars(&[100.0, 101.0]);
        assert_eq!(
            strategy.generate_signal("SPY", &history, 101.0).action,
            SignalAction::Hold
        );
    }

    #[test]
    fn ma_crossover_holds_during_warmup() {
        let strategy = MaCrossover { short_period: 2, long_period: 5 };
        let history = bars(&[100.0, 101.0, 102.0]);
        assert_eq!(
            strategy.generate_signal("SPY", &history, 102.0).action,
            SignalAction::Hold
        );
    }

    #[test]
    fn ma_crossover_signals_trend() {
        let strategy = MaCrossover { short_period: 2, long_period: 4 };

        let rising = bars(&[100.0, 100.0, 104.0, 108.0]);
        let signal = strategy.generate_signal("SPY", &rising, 108.0);
        assert_eq!(signal.action, SignalAction::Buy);
        assert!(signal.confidence > 0.0 && signal.confidence <= 1.0);

        let falling = bars(&[108.0, 104.0, 100.0, 96.0]);
        assert_eq!(
            strategy.generate_signal("SPY", &falling, 96.0).action,
            SignalAction::Sell
        );
    }

    #[test]
    fn config_resolves_to_named_strategy() {
        let config = StrategyConfig::MaCrossover { short_period: 10, long_period: 50 };
        assert_eq!(config.build().name(), "ma_crossover");
        assert_eq!(StrategyConfig::BuyAndHold.build().name(), "buy_and_hold");
    }

    #[test]
    fn config_serialization_is_tagged() {
        let config = StrategyConfig::MaCrossover { short_period: 10, long_period: 50 };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"type\":\"ma_crossover\""));
        let back: StrategyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
