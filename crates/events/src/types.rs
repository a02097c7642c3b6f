//! Event types for the sowcrew status feed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sowcrew_core::{AgentErrorKind, RunId, RunSummary, TaskId, TaskStatus};
use std::fmt;
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// Run the event belongs to
    pub run_id: RunId,
    /// Position within the run, strictly increasing
    pub seq: u64,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(run_id: RunId, seq: u64, event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            seq,
            timestamp: Utc::now(),
            event,
        }
    }
}

impl fmt::Display for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.event
        )
    }
}

/// All possible events in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Run events
    /// Tasks were derived and the run is about to dispatch them
    #[serde(rename = "run.started")]
    RunStarted {
        task_count: usize,
        roles: Vec<String>,
        /// Task ids in document order
        #[serde(default)]
        task_ids: Vec<TaskId>,
    },

    /// The run stopped before any task was created
    #[serde(rename = "run.aborted")]
    RunAborted { reason: String },

    /// Operator asked the run to stop
    #[serde(rename = "run.cancelled")]
    RunCancelled { reason: String },

    /// All tasks reached a terminal state
    #[serde(rename = "run.finished")]
    RunFinished { summary: RunSummary },

    // Task events
    /// Task status changed
    #[serde(rename = "task.status_changed")]
    TaskStatusChanged {
        task_id: TaskId,
        from_status: TaskStatus,
        to_status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    /// An agent call failed and will be attempted again
    #[serde(rename = "task.retry_scheduled")]
    TaskRetryScheduled {
        task_id: TaskId,
        /// 1-based retry number
        attempt: u32,
        max_retries: u32,
        kind: AgentErrorKind,
        reason: String,
        delay_ms: u64,
    },

    /// Message or result text from an agent
    #[serde(rename = "agent.message")]
    AgentMessage {
        task_id: TaskId,
        role: String,
        content: String,
    },

    /// An agent answered after its task was already settled
    #[serde(rename = "task.late_result_discarded")]
    LateResultDiscarded { task_id: TaskId, detail: String },
}

impl Event {
    /// Get the task ID associated with this event, if any
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Event::TaskStatusChanged { task_id, .. } => Some(task_id),
            Event::TaskRetryScheduled { task_id, .. } => Some(task_id),
            Event::AgentMessage { task_id, .. } => Some(task_id),
            Event::LateResultDiscarded { task_id, .. } => Some(task_id),
            Event::RunStarted { .. }
            | Event::RunAborted { .. }
            | Event::RunCancelled { .. }
            | Event::RunFinished { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::RunStarted { .. } => "run.started",
            Event::RunAborted { .. } => "run.aborted",
            Event::RunCancelled { .. } => "run.cancelled",
            Event::RunFinished { .. } => "run.finished",
            Event::TaskStatusChanged { .. } => "task.status_changed",
            Event::TaskRetryScheduled { .. } => "task.retry_scheduled",
            Event::AgentMessage { .. } => "agent.message",
            Event::LateResultDiscarded { .. } => "task.late_result_discarded",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::RunStarted {
                task_count,
                roles,
                ..
            } => write!(
                f,
                "run started: {} tasks, roles [{}]",
                task_count,
                roles.join(", ")
            ),
            Event::RunAborted { reason } => write!(f, "run aborted: {}", reason),
            Event::RunCancelled { reason } => write!(f, "run cancelled: {}", reason),
            Event::RunFinished { summary } => write!(f, "run finished: {}", summary),
            Event::TaskStatusChanged {
                task_id,
                from_status,
                to_status,
                detail,
            } => {
                write!(f, "[{}] {} -> {}", task_id, from_status, to_status)?;
                if let Some(detail) = detail {
                    write!(f, " ({})", detail)?;
                }
                Ok(())
            }
            Event::TaskRetryScheduled {
                task_id,
                attempt,
                max_retries,
                kind,
                reason,
                delay_ms,
            } => write!(
                f,
                "[{}] retry {}/{} in {}ms after {} error: {}",
                task_id, attempt, max_retries, delay_ms, kind, reason
            ),
            Event::AgentMessage {
                task_id,
                role,
                content,
            } => write!(f, "[{}] {}: {}", task_id, role, content),
            Event::LateResultDiscarded { task_id, detail } => {
                write!(f, "[{}] late result discarded: {}", task_id, detail)
            }
        }
    }
}
