//! BacktestResult — everything a run produces.

use crate::config::RunId;
use crate::domain::TradeRecord;
use crate::engine::admission::RejectionRecord;
use crate::engine::metrics::PerformanceMetrics;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive date range of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// End-of-day portfolio snapshot; the equity curve is the sequence of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub date: NaiveDate,
    pub total_value: f64,
    pub cash: f64,
    pub open_positions: usize,
}

/// Per-day sector allocation snapshot (fractions of total value).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorExposureSnapshot {
    pub date: NaiveDate,
    pub exposures: BTreeMap<String, f64>,
}

/// One rebalance adjustment: a position drifted past the threshold and was
/// traded back toward its target weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceEvent {
    pub date: NaiveDate,
    pub symbol: String,
    pub current_weight: f64,
    pub target_weight: f64,
    pub drift: f64,
    /// Signed share adjustment: positive bought, negative sold.
    pub shares_delta: i64,
}

/// Signal flow accounting for the run. Rejection counts are keyed by the
/// human-readable reason string and kept in a BTreeMap so serialized output
/// is byte-stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalStats {
    pub generated: usize,
    pub executed: usize,
    pub rejected: usize,
    pub rejection_reasons: BTreeMap<String, usize>,
}

impl SignalStats {
    pub fn record_rejection(&mut self, rejection: &RejectionRecord) {
        self.rejected += 1;
        *self
            .rejection_reasons
            .entry(rejection.reason.report_key().to_string())
            .or_insert(0) += 1;
    }
}

/// Complete result of one backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Content hash of the run configuration.
    pub run_id: RunId,
    pub period: Period,
    pub initial_capital: f64,
    pub final_value: f64,
    pub metrics: PerformanceMetrics,
    pub trades: Vec<TradeRecord>,
    pub signal_stats: SignalStats,
    pub rejections: Vec<RejectionRecord>,
    pub equity_curve: Vec<DailySnapshot>,
    pub sector_exposures: Vec<SectorExposureSnapshot>,
    pub rebalances: Vec<RebalanceEvent>,
    /// blake3 hash of the serialized equity curve; two runs are identical
    /// iff these match.
    pub equity_hash: String,
    /// Degraded-path notes: clamped signals, symbols skipped for missing
    /// data, short entries refused by the ledger.
    pub diagnostics: Vec<String>,
}

impl BacktestResult {
    /// Content hash of an equity curve, for one-string idempotence checks.
    pub fn hash_equity_curve(curve: &[DailySnapshot]) -> String {
        let json = serde_json::to_string(curve).expect("equity curve serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
