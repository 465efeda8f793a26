//! Signal — immutable per-symbol, per-day strategy output.

use serde::{Deserialize, Serialize};

/// What the strategy wants done with a symbol today.
///
/// Unknown action strings in serialized input decode as `Hold` rather than
/// failing the run; a malformed callback result degrades, it never halts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Short,
    Cover,
    #[serde(other)]
    Hold,
}

impl SignalAction {
    /// Entry actions require admission control; exits are always allowed.
    pub fn is_entry(&self) -> bool {
        matches!(self, SignalAction::Buy | SignalAction::Short)
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, SignalAction::Sell | SignalAction::Cover)
    }
}

/// A strategy's output for one symbol on one trading day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action: SignalAction,
    /// Conviction in [0, 1]; scales the target position size.
    pub confidence: f64,
}

impl Signal {
    pub fn new(action: SignalAction, confidence: f64) -> Self {
        Self { action, confidence }
    }

    pub fn hold() -> Self {
        Self { action: SignalAction::Hold, confidence: 0.0 }
    }

    /// Clamp confidence into [0, 1], mapping NaN to 0.
    ///
    /// Returns the sanitized signal and whether anything was changed, so the
    /// coordinator can record a diagnostic without this type logging.
    pub fn sanitized(self) -> (Self, bool) {
        let c = self.confidence;
        let clamped = if c.is_nan() { 0.0 } else { c.clamp(0.0, 1.0) };
        let changed = clamped != c || c.is_nan();
        (Self { action: self.action, confidence: clamped }, changed)
    }
}
