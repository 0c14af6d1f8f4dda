//! Position repository
//!
//! Trackers are the unit of shared mutable state. Every status change goes
//! through [`PositionRepository::transition`], which validates the edge and
//! applies it with check-and-set semantics under a single write lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use super::state::PositionStateMachine;
use super::tracker::PositionTracker;
use super::types::{EntryFill, PositionMarks, PositionStatus, RepositoryError};

/// Mutation applied to a tracker together with a status change
pub type TrackerPatch = Box<dyn FnOnce(&mut PositionTracker) + Send>;

/// Durable store of position trackers
#[async_trait]
pub trait PositionRepository: Send + Sync {
    /// Insert a new tracker
    async fn insert(&self, tracker: PositionTracker) -> Result<(), RepositoryError>;

    /// Fetch a tracker by id
    async fn get(&self, id: Uuid) -> Result<Option<PositionTracker>, RepositoryError>;

    /// The active tracker for a contract, if any
    async fn find_active(
        &self,
        segment: &str,
        security_id: &str,
    ) -> Result<Option<PositionTracker>, RepositoryError>;

    /// All trackers in a status
    async fn list_by_status(
        &self,
        status: PositionStatus,
    ) -> Result<Vec<PositionTracker>, RepositoryError>;

    /// All trackers created at or after `since`
    async fn list_since(&self, since: DateTime<Utc>)
        -> Result<Vec<PositionTracker>, RepositoryError>;

    /// Atomically move a tracker from `from` to `to`, applying `patch`
    ///
    /// Fails with [`RepositoryError::StatusConflict`] if the tracker is no
    /// longer in `from`; the first committer wins.
    async fn transition(
        &self,
        id: Uuid,
        from: PositionStatus,
        to: PositionStatus,
        patch: Option<TrackerPatch>,
    ) -> Result<PositionTracker, RepositoryError>;

    /// Persist monitor marks on an active tracker
    async fn update_marks(
        &self,
        id: Uuid,
        marks: &PositionMarks,
        at: DateTime<Utc>,
    ) -> Result<PositionTracker, RepositoryError>;

    /// Record an entry fill, averaging into the active tracker for the contract
    async fn record_fill(&self, fill: EntryFill) -> Result<PositionTracker, RepositoryError>;

    /// Sum of realized P&L of trackers exited at or after `since`
    async fn realized_pnl_since(&self, since: DateTime<Utc>) -> Result<Decimal, RepositoryError>;
}

/// In-process repository guarded by one read-write lock
#[derive(Default)]
pub struct InMemoryPositionRepository {
    trackers: RwLock<HashMap<Uuid, PositionTracker>>,
}

impl InMemoryPositionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn active_for<'a>(
        trackers: &'a mut HashMap<Uuid, PositionTracker>,
        segment: &str,
        security_id: &str,
    ) -> Option<&'a mut PositionTracker> {
        trackers
            .values_mut()
            .find(|t| t.is_active() && t.instrument.same_contract(segment, security_id))
    }
}

#[async_trait]
impl PositionRepository for InMemoryPositionRepository {
    async fn insert(&self, tracker: PositionTracker) -> Result<(), RepositoryError> {
        let mut trackers = self.trackers.write();
        if tracker.is_active() {
            let segment = &tracker.instrument.exchange_segment;
            let security_id = &tracker.instrument.security_id;
            if Self::active_for(&mut trackers, segment, security_id).is_some() {
                return Err(RepositoryError::DuplicateActive {
                    segment: segment.clone(),
                    security_id: security_id.clone(),
                });
            }
        }
        trackers.insert(tracker.id, tracker);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PositionTracker>, RepositoryError> {
        Ok(self.trackers.read().get(&id).cloned())
    }

    async fn find_active(
        &self,
        segment: &str,
        security_id: &str,
    ) -> Result<Option<PositionTracker>, RepositoryError> {
        Ok(self
            .trackers
            .read()
            .values()
            .find(|t| t.is_active() && t.instrument.same_contract(segment, security_id))
            .cloned())
    }

    async fn list_by_status(
        &self,
        status: PositionStatus,
    ) -> Result<Vec<PositionTracker>, RepositoryError> {
        let mut found: Vec<PositionTracker> = self
            .trackers
            .read()
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        found.sort_by_key(|t| t.created_at);
        Ok(found)
    }

    async fn list_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<PositionTracker>, RepositoryError> {
        let mut found: Vec<PositionTracker> = self
            .trackers
            .read()
            .values()
            .filter(|t| t.created_at >= since)
            .cloned()
            .collect();
        found.sort_by_key(|t| t.created_at);
        Ok(found)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: PositionStatus,
        to: PositionStatus,
        patch: Option<TrackerPatch>,
    ) -> Result<PositionTracker, RepositoryError> {
        PositionStateMachine::assert_transition(from, to)?;

        let mut trackers = self.trackers.write();
        let tracker = trackers.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;
        if tracker.status != from {
            return Err(RepositoryError::StatusConflict {
                id,
                expected: from,
                actual: tracker.status,
            });
        }

        // Apply to a copy so a panicking patch leaves the stored tracker intact
        let mut updated = tracker.clone();
        if let Some(patch) = patch {
            patch(&mut updated);
        }
        updated.status = to;
        updated.updated_at = Utc::now();
        *tracker = updated.clone();

        tracing::debug!(tracker_id = %id, %from, %to, "Position transitioned");
        Ok(updated)
    }

    async fn update_marks(
        &self,
        id: Uuid,
        marks: &PositionMarks,
        at: DateTime<Utc>,
    ) -> Result<PositionTracker, RepositoryError> {
        let mut trackers = self.trackers.write();
        let tracker = trackers.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;
        if PositionStateMachine::is_terminal(tracker.status) {
            return Err(RepositoryError::Terminal(id));
        }
        if tracker.status != PositionStatus::Active {
            return Err(RepositoryError::StatusConflict {
                id,
                expected: PositionStatus::Active,
                actual: tracker.status,
            });
        }
        tracker.apply_marks(marks, at);
        Ok(tracker.clone())
    }

    async fn record_fill(&self, fill: EntryFill) -> Result<PositionTracker, RepositoryError> {
        if fill.quantity == 0 {
            return Err(RepositoryError::InvalidFill("quantity must be positive".into()));
        }
        if fill.price <= Decimal::ZERO {
            return Err(RepositoryError::InvalidFill("price must be positive".into()));
        }

        let mut trackers = self.trackers.write();
        let segment = fill.instrument.exchange_segment.clone();
        let security_id = fill.instrument.security_id.clone();

        if let Some(existing) = Self::active_for(&mut trackers, &segment, &security_id) {
            if existing.side != fill.side {
                return Err(RepositoryError::InvalidFill(format!(
                    "fill side {:?} does not match active position side {:?}",
                    fill.side, existing.side
                )));
            }
            existing.average_in(fill.quantity, fill.price, fill.filled_at);
            tracing::info!(
                tracker_id = %existing.id,
                quantity = existing.quantity,
                average_price = %existing.average_price,
                "Averaged fill into active position"
            );
            return Ok(existing.clone());
        }

        let mut tracker = PositionTracker::pending(fill);
        PositionStateMachine::assert_transition(tracker.status, PositionStatus::Active)?;
        tracker.status = PositionStatus::Active;
        trackers.insert(tracker.id, tracker.clone());

        tracing::info!(
            tracker_id = %tracker.id,
            symbol = %tracker.instrument.symbol,
            quantity = tracker.quantity,
            price = %tracker.entry_price,
            "Position activated"
        );
        Ok(tracker)
    }

    async fn realized_pnl_since(&self, since: DateTime<Utc>) -> Result<Decimal, RepositoryError> {
        Ok(self
            .trackers
            .read()
            .values()
            .filter(|t| t.status == PositionStatus::Exited)
            .filter(|t| t.exited_at.map(|at| at >= since).unwrap_or(false))
            .filter_map(|t| t.realized_pnl)
            .sum())
    }
}
