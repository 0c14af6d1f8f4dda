//! In-flight exit claims
//!
//! At most one exit attempt may be in flight for a tracker. The claim is held
//! for the lifetime of the attempt (including retries) and released on drop.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Registry of trackers with an exit in flight
#[derive(Debug, Clone, Default)]
pub struct ExitClaims {
    inner: Arc<DashMap<Uuid, DateTime<Utc>>>,
}

impl ExitClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the exit slot for a tracker; `None` if already claimed
    pub fn try_claim(&self, tracker_id: Uuid) -> Option<ExitClaim> {
        match self.inner.entry(tracker_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Utc::now());
                Some(ExitClaim {
                    tracker_id,
                    claims: self.inner.clone(),
                })
            }
        }
    }

    pub fn is_claimed(&self, tracker_id: Uuid) -> bool {
        self.inner.contains_key(&tracker_id)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.len()
    }
}

/// Guard for a claimed exit slot
#[derive(Debug)]
pub struct ExitClaim {
    tracker_id: Uuid,
    claims: Arc<DashMap<Uuid, DateTime<Utc>>>,
}

impl ExitClaim {
    pub fn tracker_id(&self) -> Uuid {
        self.tracker_id
    }
}

impl Drop for ExitClaim {
    fn drop(&mut self) {
        self.claims.remove(&self.tracker_id);
    }
}
