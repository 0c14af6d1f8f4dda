//! Ledger reconciliation worker
//!
//! Compares the day's ledger balance with the balance implied by the day's
//! trackers. Paper ledgers are rewritten only when the same drift shows up on
//! two consecutive passes, so an exit settling mid-pass is not "corrected".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::ReconcileOutcome;
use crate::capital::{derive_balance, BalanceLedger};
use crate::position::PositionRepository;
use crate::session::SessionClock;
use crate::supervisor::Worker;

const DRIFT_TOLERANCE: Decimal = dec!(0.01);

pub struct LedgerReconciler {
    repository: Arc<dyn PositionRepository>,
    ledger: Arc<BalanceLedger>,
    session: SessionClock,
    paper: bool,
    interval: Duration,
    last_drift: Mutex<Option<Decimal>>,
}

impl LedgerReconciler {
    pub fn new(
        repository: Arc<dyn PositionRepository>,
        ledger: Arc<BalanceLedger>,
        session: SessionClock,
        paper: bool,
        interval: Duration,
    ) -> Self {
        Self {
            repository,
            ledger,
            session,
            paper,
            interval,
            last_drift: Mutex::new(None),
        }
    }

    pub async fn reconcile(&self, now: DateTime<Utc>) -> anyhow::Result<ReconcileOutcome> {
        let day = self.session.trading_day(now);
        let trackers = self
            .repository
            .list_since(self.session.day_start(now))
            .await?;
        let initial = self.ledger.initial_balance(day)?;
        let actual = self.ledger.balance(day)?;
        let expected = derive_balance(initial, &trackers);
        let drift = actual - expected;

        if drift.abs() <= DRIFT_TOLERANCE {
            *self.last_drift.lock() = None;
            debug!(%day, balance = %actual, "Ledger in sync");
            return Ok(ReconcileOutcome::InSync);
        }

        if !self.paper {
            warn!(%day, %actual, %expected, %drift, "Ledger drift on live account");
            return Ok(ReconcileOutcome::DriftReported { drift });
        }

        let persistent = {
            let mut last = self.last_drift.lock();
            let persistent = *last == Some(drift);
            *last = if persistent { None } else { Some(drift) };
            persistent
        };
        if !persistent {
            info!(%day, %actual, %expected, %drift, "Ledger drift observed");
            return Ok(ReconcileOutcome::DriftObserved { drift });
        }

        let to = self.ledger.rederive(day, initial, &trackers)?;
        warn!(%day, from = %actual, %to, "Ledger corrected from positions");
        Ok(ReconcileOutcome::Corrected { from: actual, to })
    }
}

#[async_trait]
impl Worker for LedgerReconciler {
    fn name(&self) -> &str {
        "ledger_reconciler"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self) -> anyhow::Result<()> {
        self.reconcile(Utc::now()).await?;
        Ok(())
    }
}
