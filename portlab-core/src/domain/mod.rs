//! Domain types for the portfolio engine.

pub mod bar;
pub mod portfolio;
pub mod position;
pub mod signal;
pub mod trade;

pub use bar::Bar;
pub use portfolio::PortfolioState;
pub use position::{Position, PositionSide, ShortTerms};
pub use signal::{Signal, SignalAction};
pub use trade::TradeRecord;
