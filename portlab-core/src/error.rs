//! Error types for the portfolio engine.
//!
//! The only failure a caller ever sees from a run is a [`ConfigError`],
//! raised before any simulation work. Per-day conditions (missing bars,
//! short-ledger refusals) degrade gracefully: the coordinator converts them
//! into rejection records or skipped symbols and keeps going. Admission
//! rejections are not errors at all — they are first-class recorded outcomes.

use chrono::NaiveDate;
use thiserror::Error;

/// Fatal configuration problems, checked before a run starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid date range: start {start} is not before end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("initial capital must be positive, got {0}")]
    NonPositiveCapital(f64),

    #[error("no strategies registered; the symbol set is empty")]
    EmptyUniverse,

    #[error("{name} must be in (0, 1], got {value}")]
    InvalidFraction { name: &'static str, value: f64 },

    #[error("{name} must be positive, got {value}")]
    NonPositiveParameter { name: &'static str, value: f64 },
}

/// Refusals from the short-position ledger. Caught by the coordinator and
/// converted into a skipped trade, never fatal to the run.
#[derive(Debug, Error, PartialEq)]
pub enum ShortError {
    #[error("insufficient capital: margin requires {required:.2}, available {available:.2}")]
    InsufficientCapital { required: f64, available: f64 },

    #[error("no open short position for symbol '{0}'")]
    PositionNotFound(String),

    #[error("invalid short order: {0}")]
    InvalidOrder(String),
}

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
