//! Monitor module
//!
//! Background workers: the risk monitor that drives exits, the position
//! heartbeat, and ledger reconciliation

mod heartbeat;
mod reconcile;
mod risk_monitor;
mod types;

pub use heartbeat::PositionHeartbeat;
pub use reconcile::LedgerReconciler;
pub use risk_monitor::RiskMonitor;
pub use types::{HeartbeatReport, ReconcileOutcome, TickReport};

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::position::PositionTracker;
use crate::risk::ExitSignals;

/// Per-tracker qualitative exit inputs from the signal layer
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn signals_for(&self, tracker: &PositionTracker) -> ExitSignals;
}

/// Signal source that never reports anything
pub struct NoSignals;

#[async_trait]
impl SignalSource for NoSignals {
    async fn signals_for(&self, _tracker: &PositionTracker) -> ExitSignals {
        ExitSignals::default()
    }
}

/// Signals pushed in by an external producer, keyed by tracker
#[derive(Default)]
pub struct SignalBoard {
    signals: DashMap<Uuid, ExitSignals>,
}

impl SignalBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, tracker_id: Uuid, signals: ExitSignals) {
        self.signals.insert(tracker_id, signals);
    }

    pub fn clear(&self, tracker_id: Uuid) {
        self.signals.remove(&tracker_id);
    }
}

#[async_trait]
impl SignalSource for SignalBoard {
    async fn signals_for(&self, tracker: &PositionTracker) -> ExitSignals {
        self.signals
            .get(&tracker.id)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }
}
