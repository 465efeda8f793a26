//! RunObserver — event hook the coordinator notifies as the run progresses.
//!
//! Replaces logging interleaved with business logic: sizing and ledger
//! primitives stay silent, and the coordinator emits events after each step.
//! Every method has a no-op default, so an observer implements only what it
//! cares about.

use crate::domain::TradeRecord;
use crate::engine::admission::RejectionRecord;
use crate::result::{DailySnapshot, RebalanceEvent};
use crate::shorts::MarginCallEvent;

pub trait RunObserver {
    fn on_trade(&mut self, _trade: &TradeRecord) {}

    fn on_rejection(&mut self, _rejection: &RejectionRecord) {}

    /// Called before the automatic liquidation the event triggers.
    fn on_margin_call(&mut self, _event: &MarginCallEvent) {}

    fn on_rebalance(&mut self, _event: &RebalanceEvent) {}

    fn on_day_end(&mut self, _snapshot: &DailySnapshot) {}
}

/// Observer that ignores everything; the default when a caller passes none.
pub struct NullObserver;

impl RunObserver for NullObserver {}
