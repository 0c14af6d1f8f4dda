//! Position lifecycle module
//!
//! Trackers, the lifecycle state machine, the repository boundary and
//! in-flight exit claims

mod claims;
mod repository;
mod state;
mod tracker;
mod types;

pub use claims::{ExitClaim, ExitClaims};
pub use repository::{InMemoryPositionRepository, PositionRepository, TrackerPatch};
pub use state::PositionStateMachine;
pub use tracker::{PositionTracker, META_DIRECTION, META_INDEX_KEY, META_MODE};
pub use types::{
    EntryFill, ExitReason, Instrument, PositionMarks, PositionSide, PositionStatus,
    RepositoryError, TransitionError,
};

#[cfg(test)]
pub(crate) use tracker::fixtures;
