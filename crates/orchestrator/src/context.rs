use chrono::{DateTime, Utc};
use events::Event;
use sowcrew_core::{
    AgentContext, PriorResult, RoleSet, RunId, RunReport, RunSummary, Task, TaskId, TaskStatus,
};
use tracing::{debug, info, warn};

use crate::emitter::EventEmitter;
use crate::error::{OrchestratorError, Result};
use crate::state_machine::TaskStateMachine;
use crate::task_parser::ParsedSow;

/// Aggregate state of one pipeline execution.
///
/// Owns the task list and role set for the run. Task status only changes
/// through [`RunContext::transition`], which validates the move and emits
/// the matching status event.
pub struct RunContext {
    run_id: RunId,
    started_at: DateTime<Utc>,
    preamble: String,
    tasks: Vec<Task>,
    roles: RoleSet,
    emitter: EventEmitter,
    cancelled: bool,
}

impl RunContext {
    pub fn new(started_at: DateTime<Utc>, parsed: ParsedSow, roles: RoleSet, emitter: EventEmitter) -> Self {
        let mut tasks = parsed.tasks;
        tasks.sort_by_key(|t| t.order_index);
        Self {
            run_id: emitter.run_id().clone(),
            started_at,
            preamble: parsed.preamble,
            tasks,
            roles,
            emitter,
            cancelled: false,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    pub fn task(&self, task_id: &TaskId) -> Result<&Task> {
        self.tasks
            .iter()
            .find(|t| &t.id == task_id)
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.clone()))
    }

    fn task_mut(&mut self, task_id: &TaskId) -> Result<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|t| &t.id == task_id)
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.clone()))
    }

    pub fn emit(&self, event: Event) {
        self.emitter.emit(event);
    }

    pub fn transition(&mut self, task_id: &TaskId, to: TaskStatus, detail: Option<String>) -> Result<()> {
        let run_id = self.run_id.clone();
        let task = self.task_mut(task_id)?;
        let from = task.status;

        if let Err(e) = TaskStateMachine::validate_transition(task_id, &from, &to) {
            warn!(run_id = %run_id, task_id = %task_id, error = %e, "Rejected task state transition");
            return Err(e);
        }

        info!(
            run_id = %run_id,
            task_id = %task_id,
            from = %from.as_str(),
            to = %to.as_str(),
            "Task state transition"
        );
        task.status = to;
        task.updated_at = Utc::now();

        self.emit(Event::TaskStatusChanged {
            task_id: task_id.clone(),
            from_status: from,
            to_status: to,
            detail,
        });

        debug!(
            task_id = %task_id,
            new_status = %to.as_str(),
            "State transition completed"
        );

        Ok(())
    }

    /// Pending → Assigned to `role`.
    pub fn assign(&mut self, task_id: &TaskId, role: &str) -> Result<()> {
        self.transition(task_id, TaskStatus::Assigned, Some(role.to_string()))?;
        self.task_mut(task_id)?.assigned_role = Some(role.to_string());
        Ok(())
    }

    pub fn record_attempts(&mut self, task_id: &TaskId, attempts: u32) -> Result<()> {
        self.task_mut(task_id)?.attempts = attempts;
        Ok(())
    }

    /// Running → Succeeded with the agent's output.
    pub fn succeed(&mut self, task_id: &TaskId, output: serde_json::Value) -> Result<()> {
        self.transition(task_id, TaskStatus::Succeeded, None)?;
        self.task_mut(task_id)?.result = Some(output);
        Ok(())
    }

    pub fn fail(&mut self, task_id: &TaskId, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.transition(task_id, TaskStatus::Failed, Some(reason.clone()))?;
        self.task_mut(task_id)?.failure_reason = Some(reason);
        Ok(())
    }

    pub fn skip(&mut self, task_id: &TaskId, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.transition(task_id, TaskStatus::Skipped, Some(reason.clone()))?;
        self.task_mut(task_id)?.failure_reason = Some(reason);
        Ok(())
    }

    /// Outputs of the tasks that have succeeded so far, in document order.
    pub fn prior_results(&self) -> Vec<PriorResult> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Succeeded)
            .filter_map(|t| {
                t.result.as_ref().map(|output| PriorResult {
                    task_id: t.id.clone(),
                    title: t.title.clone(),
                    role: t.assigned_role.clone().unwrap_or_default(),
                    output: output.clone(),
                })
            })
            .collect()
    }

    pub fn agent_context(&self) -> AgentContext {
        AgentContext {
            preamble: Some(self.preamble.clone()).filter(|p| !p.trim().is_empty()),
            prior_results: self.prior_results(),
        }
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_tasks(&self.tasks, self.cancelled)
    }

    pub fn into_report(self, finished_at: DateTime<Utc>) -> RunReport {
        let summary = self.summary();
        RunReport {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at,
            roles: self.roles.names(),
            summary,
            tasks: self.tasks,
        }
    }
}
