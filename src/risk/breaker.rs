//! Circuit breaker
//!
//! A global kill switch for new entries. Tripped manually or by the risk
//! monitor after repeated exit failures; an expired trip clears itself on the
//! next read.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::{info, warn};

use super::types::BreakerStatus;

#[derive(Debug, Clone)]
struct BreakerTrip {
    reason: String,
    tripped_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl BreakerTrip {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// Read-mostly trading kill switch
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    state: RwLock<Option<BreakerTrip>>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip now; `ttl` of `None` holds until [`CircuitBreaker::reset`]
    pub fn trip(&self, reason: impl Into<String>, ttl: Option<Duration>) {
        self.trip_at(reason, ttl, Utc::now());
    }

    /// Trip as of `now`
    pub fn trip_at(&self, reason: impl Into<String>, ttl: Option<Duration>, now: DateTime<Utc>) {
        let reason = reason.into();
        let expires_at = ttl.map(|ttl| now + ttl);
        warn!(%reason, ?expires_at, "Circuit breaker tripped");
        *self.state.write() = Some(BreakerTrip {
            reason,
            tripped_at: now,
            expires_at,
        });
    }

    /// True while a trip is in force
    pub fn is_tripped(&self, now: DateTime<Utc>) -> bool {
        {
            let state = self.state.read();
            match state.as_ref() {
                None => return false,
                Some(trip) if !trip.expired(now) => return true,
                Some(_) => {}
            }
        }
        self.clear_expired(now);
        false
    }

    pub fn status(&self, now: DateTime<Utc>) -> BreakerStatus {
        if !self.is_tripped(now) {
            return BreakerStatus::default();
        }
        match self.state.read().as_ref() {
            Some(trip) => BreakerStatus {
                tripped: true,
                reason: Some(trip.reason.clone()),
                tripped_at: Some(trip.tripped_at),
                expires_at: trip.expires_at,
            },
            None => BreakerStatus::default(),
        }
    }

    pub fn reset(&self) {
        if self.state.write().take().is_some() {
            info!("Circuit breaker reset");
        }
    }

    fn clear_expired(&self, now: DateTime<Utc>) {
        let mut state = self.state.write();
        if state.as_ref().map(|t| t.expired(now)).unwrap_or(false) {
            *state = None;
            info!("Circuit breaker trip expired");
        }
    }
}
