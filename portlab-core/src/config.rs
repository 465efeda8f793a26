//! RunConfig — the immutable engine configuration, validated before a run.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Unique identifier for a run configuration (content-addressable hash).
pub type RunId = String;

/// All recognized engine options. Every field has a documented default, so a
/// TOML config only needs to name what it overrides.
///
/// Validation happens once, up front; a [`RunConfig`] inside a running
/// coordinator is known-good.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub initial_capital: f64,
    /// Commission as a fraction of fill value.
    pub commission_rate: f64,
    /// Per-fill slippage as a fraction of price (adverse direction).
    pub slippage_rate: f64,
    /// Largest single position as a fraction of portfolio value; scaled by
    /// signal confidence at admission.
    pub max_position_size: f64,
    /// Cap on any one sector's share of portfolio value.
    pub max_sector_exposure: f64,
    pub max_positions: usize,
    /// Weight drift that triggers a rebalance trade.
    pub rebalance_threshold: f64,
    /// Cap on mean absolute correlation between a candidate and holdings.
    pub correlation_limit: f64,
    /// Return-correlation lookback window, in bars.
    pub correlation_lookback: usize,
    /// Annual risk-free rate used by Sharpe/Sortino.
    pub risk_free_rate: f64,
    /// Short collateral as a multiple of entry proceeds.
    pub margin_requirement: f64,
    /// Annual borrow rate on shorts.
    pub short_interest_rate: f64,
    /// Maintenance margin ratio below which a margin call fires.
    pub margin_call_threshold: f64,
    /// Fraction of liquidation value forfeited on a forced cover.
    pub liquidation_penalty: f64,
    /// Optional protective stop on long entries, as a fraction below the
    /// fill price. `None` disables stops.
    pub stop_loss_percent: Option<f64>,
    /// Optional profit target on long entries, as a fraction above the fill
    /// price. `None` disables targets.
    pub take_profit_percent: Option<f64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            commission_rate: 0.001,
            slippage_rate: 0.0005,
            max_position_size: 0.10,
            max_sector_exposure: 0.30,
            max_positions: 10,
            rebalance_threshold: 0.05,
            correlation_limit: 0.70,
            correlation_lookback: 60,
            risk_free_rate: 0.02,
            margin_requirement: 1.5,
            short_interest_rate: 0.03,
            margin_call_threshold: 1.3,
            liquidation_penalty: 0.02,
            stop_loss_percent: None,
            take_profit_percent: None,
        }
    }
}

impl RunConfig {
    /// Validate every option. Called by the coordinator before any
    /// simulation work; the run never starts with a bad config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_capital <= 0.0 {
            return Err(ConfigError::NonPositiveCapital(self.initial_capital));
        }
        for (name, value) in [
            ("max_position_size", self.max_position_size),
            ("max_sector_exposure", self.max_sector_exposure),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidFraction { name, value });
            }
        }
        for (name, value) in [
            ("margin_requirement", self.margin_requirement),
            ("margin_call_threshold", self.margin_call_threshold),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositiveParameter { name, value });
            }
        }
        for (name, value) in [
            ("commission_rate", self.commission_rate),
            ("slippage_rate", self.slippage_rate),
            ("rebalance_threshold", self.rebalance_threshold),
            ("correlation_limit", self.correlation_limit),
            ("short_interest_rate", self.short_interest_rate),
            ("liquidation_penalty", self.liquidation_penalty),
        ] {
            if value < 0.0 {
                return Err(ConfigError::NonPositiveParameter { name, value });
            }
        }
        if let Some(value) = self.stop_loss_percent {
            if !(value > 0.0 && value < 1.0) {
                return Err(ConfigError::InvalidFraction { name: "stop_loss_percent", value });
            }
        }
        if let Some(value) = self.take_profit_percent {
            if value <= 0.0 {
                return Err(ConfigError::NonPositiveParameter {
                    name: "take_profit_percent",
                    value,
                });
            }
        }
        if self.max_positions == 0 {
            return Err(ConfigError::NonPositiveParameter {
                name: "max_positions",
                value: 0.0,
            });
        }
        Ok(())
    }

    /// Deterministic content hash of this configuration.
    ///
    /// Two identical configs share a `RunId`, which is what makes replayed
    /// runs comparable end to end.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).expect("RunConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
