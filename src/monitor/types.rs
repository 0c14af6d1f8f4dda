//! Monitor types

use rust_decimal::Decimal;
use serde::Serialize;

/// Summary of one risk monitor pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Trackers evaluated this pass
    pub evaluated: usize,
    /// Trackers passed over because an exit was already in flight
    pub skipped: usize,
    pub exits_dispatched: usize,
    /// Trackers whose evaluation failed; the pass continued without them
    pub errors: usize,
}

/// Position heartbeat snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartbeatReport {
    pub open_positions: usize,
    /// Active trackers without a usable price
    pub unpriced: usize,
    pub unrealized_pnl: Decimal,
    pub balance: Decimal,
}

/// Result of one ledger reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReconcileOutcome {
    InSync,
    /// Drift seen for the first time; corrected only if it persists
    DriftObserved { drift: Decimal },
    /// Persistent drift replaced by the derived balance
    Corrected { from: Decimal, to: Decimal },
    /// Drift on a live ledger; reported, never rewritten
    DriftReported { drift: Decimal },
}
