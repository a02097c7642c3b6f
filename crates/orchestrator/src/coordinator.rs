//! Execution coordinator.
//!
//! A single dispatch loop drives both modes: with `max_concurrency = 1`
//! tasks run strictly one after another in document order, with more the
//! loop keeps up to that many workers in flight. Workers own their request
//! and report back over a channel; only the coordinator touches the
//! [`RunContext`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use events::Event;
use sowcrew_core::{
    AgentError, AgentRequest, AgentResponse, AgentRuntime, RunSummary, TaskId, TaskStatus,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CoordinatorConfig, FailurePolicy};
use crate::context::RunContext;
use crate::error::Result;
use crate::prompts::RolePrompts;
use crate::role_resolver::RoleResolver;

const CANCELLED_WHILE_RUNNING: &str = "cancelled while running";

#[derive(Debug)]
enum WorkerMsg {
    Retrying {
        task_id: TaskId,
        /// 1-based retry number
        retry: u32,
        error: AgentError,
        delay: Duration,
    },
    Finished {
        task_id: TaskId,
        attempts: u32,
        outcome: std::result::Result<AgentResponse, AgentError>,
    },
    Cancelled {
        task_id: TaskId,
    },
}

impl WorkerMsg {
    fn task_id(&self) -> &TaskId {
        match self {
            Self::Retrying { task_id, .. }
            | Self::Finished { task_id, .. }
            | Self::Cancelled { task_id } => task_id,
        }
    }
}

pub struct Coordinator {
    runtime: Arc<dyn AgentRuntime>,
    config: CoordinatorConfig,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(runtime: Arc<dyn AgentRuntime>, mut config: CoordinatorConfig) -> Self {
        // The dispatch loop needs at least one slot to make progress.
        config.max_concurrency = config.max_concurrency.max(1);
        Self {
            runtime,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Drive every pending task of the run to a terminal state.
    pub async fn run(&self, ctx: &mut RunContext) -> Result<RunSummary> {
        let mut queue: VecDeque<TaskId> = ctx
            .tasks()
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| t.id.clone())
            .collect();

        info!(
            run_id = %ctx.run_id(),
            tasks = queue.len(),
            max_concurrency = self.config.max_concurrency,
            max_retries = self.config.max_retries,
            runtime = %self.runtime.name(),
            "Coordinator starting"
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut in_flight = 0usize;

        loop {
            while in_flight < self.config.max_concurrency && !self.cancel.is_cancelled() {
                let Some(task_id) = queue.pop_front() else {
                    break;
                };
                if ctx.task(&task_id)?.status != TaskStatus::Pending {
                    continue;
                }

                match self.prepare(ctx, &task_id)? {
                    Some(request) => {
                        self.spawn_worker(request, tx.clone());
                        in_flight += 1;
                    }
                    None => self.apply_failure_policy(ctx, &task_id)?,
                }
            }

            if self.cancel.is_cancelled() {
                self.cancel_run(ctx, &mut queue)?;
            }

            if in_flight == 0 {
                if queue.is_empty() || ctx.is_cancelled() {
                    break;
                }
                continue;
            }

            tokio::select! {
                biased;
                Some(msg) = rx.recv() => {
                    if matches!(msg, WorkerMsg::Finished { .. } | WorkerMsg::Cancelled { .. }) {
                        in_flight -= 1;
                    }
                    if self.cancel.is_cancelled() {
                        self.cancel_run(ctx, &mut queue)?;
                    }
                    self.handle(ctx, msg)?;
                }
                _ = self.cancel.cancelled(), if !ctx.is_cancelled() => {
                    self.cancel_run(ctx, &mut queue)?;
                }
                else => break,
            }
        }

        let summary = ctx.summary();
        info!(run_id = %ctx.run_id(), summary = %summary, "Coordinator finished");
        Ok(summary)
    }

    /// Resolve the role, assign, render the prompt and move the task to
    /// Running. `None` when the task failed before dispatch.
    fn prepare(&self, ctx: &mut RunContext, task_id: &TaskId) -> Result<Option<AgentRequest>> {
        let task = ctx.task(task_id)?.clone();

        let role = match RoleResolver::resolve(&task, ctx.roles()) {
            Ok(role) => role.clone(),
            Err(e) => {
                warn!(run_id = %ctx.run_id(), task_id = %task_id, error = %e, "Role resolution failed");
                ctx.fail(task_id, e.to_string())?;
                return Ok(None);
            }
        };

        ctx.assign(task_id, &role.name)?;

        let context = ctx.agent_context();
        let prompt = match RolePrompts::render(&role, &task, &context) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(run_id = %ctx.run_id(), task_id = %task_id, error = %e, "Prompt rendering failed");
                ctx.fail(task_id, e.to_string())?;
                return Ok(None);
            }
        };

        ctx.transition(
            task_id,
            TaskStatus::Running,
            Some(format!("dispatched to {}", self.runtime.name())),
        )?;
        ctx.record_attempts(task_id, 1)?;

        Ok(Some(AgentRequest {
            run_id: ctx.run_id().clone(),
            task_id: task_id.clone(),
            title: task.title,
            description: task.description,
            role,
            prompt,
            context,
        }))
    }

    fn spawn_worker(&self, request: AgentRequest, tx: mpsc::UnboundedSender<WorkerMsg>) {
        let runtime = Arc::clone(&self.runtime);
        let config = self.config.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(run_worker(runtime, request, config, cancel, tx));
    }

    fn handle(&self, ctx: &mut RunContext, msg: WorkerMsg) -> Result<()> {
        let task_id = msg.task_id().clone();
        let status = ctx.task(&task_id)?.status;

        if status.is_terminal() {
            match msg {
                WorkerMsg::Finished { outcome, .. } => {
                    let detail = match outcome {
                        Ok(_) => format!("result arrived after task was {}", status),
                        Err(e) => format!("{} arrived after task was {}", e, status),
                    };
                    warn!(run_id = %ctx.run_id(), task_id = %task_id, "Discarding late agent result");
                    ctx.emit(Event::LateResultDiscarded { task_id, detail });
                }
                other => debug!(task_id = %task_id, msg = ?other, "Ignoring worker message for settled task"),
            }
            return Ok(());
        }

        match msg {
            WorkerMsg::Retrying {
                retry,
                error,
                delay,
                ..
            } => {
                warn!(
                    run_id = %ctx.run_id(),
                    task_id = %task_id,
                    attempt = retry,
                    max_retries = self.config.max_retries,
                    kind = %error.kind,
                    delay_ms = delay.as_millis() as u64,
                    "Agent call failed, retrying"
                );
                ctx.record_attempts(&task_id, retry + 1)?;
                ctx.emit(Event::TaskRetryScheduled {
                    task_id,
                    attempt: retry,
                    max_retries: self.config.max_retries,
                    kind: error.kind,
                    reason: error.message,
                    delay_ms: delay.as_millis() as u64,
                });
            }
            WorkerMsg::Finished {
                attempts, outcome, ..
            } => {
                ctx.record_attempts(&task_id, attempts)?;
                match outcome {
                    Ok(response) => {
                        let role = ctx.task(&task_id)?.assigned_role.clone().unwrap_or_default();
                        for content in response.messages {
                            ctx.emit(Event::AgentMessage {
                                task_id: task_id.clone(),
                                role: role.clone(),
                                content,
                            });
                        }
                        ctx.succeed(&task_id, response.output)?;
                    }
                    Err(e) => {
                        let reason = if attempts > 1 {
                            format!("{} (after {} attempts)", e, attempts)
                        } else {
                            e.to_string()
                        };
                        warn!(run_id = %ctx.run_id(), task_id = %task_id, error = %reason, "Task failed");
                        ctx.fail(&task_id, reason)?;
                        self.apply_failure_policy(ctx, &task_id)?;
                    }
                }
            }
            WorkerMsg::Cancelled { .. } => {
                ctx.fail(&task_id, CANCELLED_WHILE_RUNNING)?;
            }
        }

        Ok(())
    }

    fn apply_failure_policy(&self, ctx: &mut RunContext, failed: &TaskId) -> Result<()> {
        if self.config.failure_policy != FailurePolicy::SkipRemaining {
            return Ok(());
        }

        let pending: Vec<TaskId> = ctx
            .tasks()
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| t.id.clone())
            .collect();

        if !pending.is_empty() {
            info!(run_id = %ctx.run_id(), failed = %failed, skipped = pending.len(), "Skipping remaining tasks");
        }
        for task_id in pending {
            ctx.skip(&task_id, format!("skipped after {} failed", failed))?;
        }
        Ok(())
    }

    fn cancel_run(&self, ctx: &mut RunContext, queue: &mut VecDeque<TaskId>) -> Result<()> {
        if ctx.is_cancelled() {
            return Ok(());
        }

        ctx.mark_cancelled();
        queue.clear();
        info!(run_id = %ctx.run_id(), "Run cancelled by operator");
        ctx.emit(Event::RunCancelled {
            reason: "cancelled by operator".to_string(),
        });

        let open: Vec<(TaskId, TaskStatus)> = ctx
            .tasks()
            .iter()
            .filter(|t| !t.status.is_terminal())
            .map(|t| (t.id.clone(), t.status))
            .collect();

        for (task_id, status) in open {
            match status {
                TaskStatus::Running => ctx.fail(&task_id, CANCELLED_WHILE_RUNNING)?,
                _ => ctx.skip(&task_id, "run cancelled")?,
            }
        }
        Ok(())
    }
}

async fn run_worker(
    runtime: Arc<dyn AgentRuntime>,
    request: AgentRequest,
    config: CoordinatorConfig,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<WorkerMsg>,
) {
    let task_id = request.task_id.clone();
    let max_attempts = config.max_attempts();
    let mut attempt = 1;

    loop {
        debug!(task_id = %task_id, role = %request.role.name, attempt, "Invoking agent");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = tx.send(WorkerMsg::Cancelled { task_id });
                return;
            }
            result = tokio::time::timeout(config.agent_timeout, runtime.invoke(&request)) => {
                result.unwrap_or_else(|_| {
                    Err(AgentError::timeout(format!(
                        "no response within {}ms",
                        config.agent_timeout.as_millis()
                    )))
                })
            }
        };

        match outcome {
            Err(error) if error.is_retryable() && attempt < max_attempts => {
                let delay = config.backoff_for(attempt);
                let _ = tx.send(WorkerMsg::Retrying {
                    task_id: task_id.clone(),
                    retry: attempt,
                    error,
                    delay,
                });

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let _ = tx.send(WorkerMsg::Cancelled { task_id });
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            outcome => {
                let _ = tx.send(WorkerMsg::Finished {
                    task_id,
                    attempts: attempt,
                    outcome,
                });
                return;
            }
        }
    }
}
