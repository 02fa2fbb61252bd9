//! Legal job-state transitions.
//!
//! ```text
//!   pending ──claim──▶ executing ──success──▶ completed
//!      │  ▲                │
//!      │  └────retry───────┤
//!      │                   └────exhausted───▶ failed
//!      └──cancel──▶ cancelled
//! ```
//!
//! `completed`, `failed` and `cancelled` are terminal.

use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::types::JobStatus;

impl JobStatus {
    /// True for states no transition leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// True when `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Executing)
                | (Pending, Cancelled)
                | (Executing, Completed)
                | (Executing, Pending)
                | (Executing, Failed)
        )
    }
}

/// Check a transition for job `id`, returning the target state or a conflict.
pub fn transition(id: Uuid, from: JobStatus, to: JobStatus) -> Result<JobStatus> {
    if from.can_transition_to(to) {
        Ok(to)
    } else {
        Err(SchedulerError::Conflict { id, from, to })
    }
}
