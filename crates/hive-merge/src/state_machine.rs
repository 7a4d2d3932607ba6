//! Pure merge state machine
//!
//! No I/O and no async: `transition(state, event)` either yields the next
//! state or explains why the event is not allowed. The controller owns the
//! side effects.
//!
//! ```text
//! pending -> verifying -> approved -> merging -> completed
//!                     \-> rejected          \-> failed
//!                     \-> failed
//! ```

use hive_core::{HiveError, Result};

use crate::types::MergeState;

/// Events that drive a merge run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeEvent {
    /// Gate evaluation begins
    StartVerification,
    /// Decision rule accepted the change set
    Approve,
    /// Decision rule refused the change set
    Reject,
    /// A critical gate failed under strict mode
    Abort { reason: String },
    /// The change set is being applied to the target
    StartMerge,
    MergeSucceeded,
    MergeFailed { reason: String },
}

/// Next state for `event`, or `InvalidTransition`
pub fn transition(state: MergeState, event: &MergeEvent) -> Result<MergeState> {
    use MergeState::*;

    let next = match (state, event) {
        (Pending, MergeEvent::StartVerification) => Verifying,
        (Verifying, MergeEvent::Approve) => Approved,
        (Verifying, MergeEvent::Reject) => Rejected,
        (Verifying, MergeEvent::Abort { .. }) => Failed,
        (Approved, MergeEvent::StartMerge) => Merging,
        (Merging, MergeEvent::MergeSucceeded) => Completed,
        (Merging, MergeEvent::MergeFailed { .. }) => Failed,
        (state, event) => {
            return Err(HiveError::InvalidTransition(format!(
                "{} cannot handle {:?}",
                state, event
            )))
        }
    };
    Ok(next)
}

/// Whether `event` is allowed in `state`
pub fn can_transition(state: MergeState, event: &MergeEvent) -> bool {
    transition(state, event).is_ok()
}
