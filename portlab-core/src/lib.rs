//! portlab-core — a deterministic multi-asset portfolio backtesting and risk
//! engine.
//!
//! The engine simulates a portfolio of independent per-symbol strategies over
//! daily bars: position sizing, portfolio-level admission control (position
//! count, sector exposure, correlation, cash), full short-sale mechanics with
//! margin calls and forced liquidation, drift rebalancing, and performance
//! metrics over the resulting equity curve.
//!
//! Determinism is a core contract: identical inputs produce byte-identical
//! results, checkable in one string via the equity-curve content hash.
//! Parallelism is confined to read-only signal generation; all portfolio
//! mutation is sequential in a fixed order.
//!
//! ```no_run
//! use portlab_core::config::RunConfig;
//! use portlab_core::engine::PortfolioBacktestCoordinator;
//! use portlab_core::strategy::{StrategyConfig, StrategyMetadata};
//! use std::collections::HashMap;
//!
//! # fn main() -> Result<(), portlab_core::error::EngineError> {
//! let mut coordinator = PortfolioBacktestCoordinator::new(RunConfig::default())?;
//! coordinator.register(
//!     "SPY",
//!     StrategyConfig::BuyAndHold.build(),
//!     StrategyMetadata { sector: "index".into(), industry: "etf".into() },
//! );
//! let bars: HashMap<String, Vec<portlab_core::domain::Bar>> = HashMap::new();
//! let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
//! let end = chrono::NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
//! let result = coordinator.run_backtest(&bars, start, end)?;
//! println!("{}", result.metrics.sharpe);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod result;
pub mod shorts;
pub mod sizing;
pub mod strategy;

pub use config::RunConfig;
pub use engine::PortfolioBacktestCoordinator;
pub use result::BacktestResult;

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn coordinator_is_send_and_sync() {
        assert_send_sync::<PortfolioBacktestCoordinator>();
        assert_send_sync::<RunConfig>();
        assert_send_sync::<BacktestResult>();
    }
}
