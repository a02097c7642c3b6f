//! Legal moves of a task through its lifecycle.
//!
//! ```text
//! Pending ──► Assigned ──► Running ──► Succeeded
//!    │           │            │
//!    └───────────┴──► Failed ◄┘
//!    └───────────┴──► Skipped
//! ```

use sowcrew_core::{TaskId, TaskStatus};

use crate::error::{OrchestratorError, Result};

pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Statuses reachable from `from` in one step. Terminal statuses have none.
    pub fn successors(from: &TaskStatus) -> &'static [TaskStatus] {
        use TaskStatus::*;
        match from {
            Pending => &[Assigned, Failed, Skipped],
            Assigned => &[Running, Failed, Skipped],
            Running => &[Succeeded, Failed],
            Succeeded | Failed | Skipped => &[],
        }
    }

    pub fn permits(from: &TaskStatus, to: &TaskStatus) -> bool {
        Self::successors(from).contains(to)
    }

    pub fn validate_transition(task_id: &TaskId, from: &TaskStatus, to: &TaskStatus) -> Result<()> {
        if !Self::permits(from, to) {
            return Err(OrchestratorError::InvalidTransition {
                task_id: task_id.clone(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}
