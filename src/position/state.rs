//! Position lifecycle state machine
//!
//! `pending -> {active, cancelled}`, `active -> {exited, cancelled}`.
//! `exited` and `cancelled` are terminal. Nothing is inferred: callers must
//! validate before applying a status change.

use super::types::{PositionStatus, TransitionError};

/// Pure transition rules for [`PositionStatus`]
pub struct PositionStateMachine;

impl PositionStateMachine {
    /// True if `from -> to` is a legal edge
    pub fn is_valid_transition(from: PositionStatus, to: PositionStatus) -> bool {
        Self::valid_transitions_from(from).contains(&to)
    }

    /// All states reachable in one step from `state`
    pub fn valid_transitions_from(state: PositionStatus) -> &'static [PositionStatus] {
        use super::types::PositionStatus::{Active, Cancelled, Exited, Pending};
        match state {
            Pending => &[Active, Cancelled],
            Active => &[Exited, Cancelled],
            Exited | Cancelled => &[],
        }
    }

    /// Terminal states have no outgoing edges
    pub fn is_terminal(state: PositionStatus) -> bool {
        Self::valid_transitions_from(state).is_empty()
    }

    /// Fail with [`TransitionError::InvalidTransition`] on an illegal edge
    pub fn assert_transition(
        from: PositionStatus,
        to: PositionStatus,
    ) -> Result<(), TransitionError> {
        if Self::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }
}
