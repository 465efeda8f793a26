//! The backtest engine: admission control, the day-stepped coordinator, and
//! performance metrics.

pub mod admission;
pub mod coordinator;
pub mod metrics;
pub mod observer;

pub use admission::{EntryKind, RejectionReason, RejectionRecord};
pub use coordinator::PortfolioBacktestCoordinator;
pub use metrics::PerformanceMetrics;
pub use observer::{NullObserver, RunObserver};
