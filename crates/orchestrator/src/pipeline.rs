//! End-to-end run: parse the SOW, hand tasks to the coordinator, keep the
//! run log.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use events::{Event, EventBus};
use sowcrew_core::{AgentRuntime, RoleSet, RunId, RunReport, Task};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::CoordinatorConfig;
use crate::context::RunContext;
use crate::coordinator::Coordinator;
use crate::emitter::EventEmitter;
use crate::error::{ParseError, Result, UnresolvedRoleError};
use crate::role_resolver::RoleResolver;
use crate::run_logger::RunLogger;
use crate::task_parser::{ParserConfig, TaskParser};

/// A task together with the role it would be routed to.
#[derive(Debug, Clone)]
pub struct PlannedTask {
    pub task: Task,
    pub role: std::result::Result<String, UnresolvedRoleError>,
}

/// Dry-run view of a document: what would be dispatched, and to whom.
#[derive(Debug, Clone)]
pub struct Plan {
    pub preamble: String,
    pub entries: Vec<PlannedTask>,
}

impl Plan {
    pub fn unresolved(&self) -> impl Iterator<Item = &PlannedTask> {
        self.entries.iter().filter(|e| e.role.is_err())
    }
}

pub struct Pipeline {
    runtime: Arc<dyn AgentRuntime>,
    roles: RoleSet,
    parser: TaskParser,
    config: CoordinatorConfig,
    logs_root: PathBuf,
    bus: EventBus,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(runtime: Arc<dyn AgentRuntime>, roles: RoleSet, logs_root: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            roles,
            parser: TaskParser::default(),
            config: CoordinatorConfig::default(),
            logs_root: logs_root.into(),
            bus: EventBus::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_parser_config(mut self, config: ParserConfig) -> Self {
        self.parser = TaskParser::new(config);
        self
    }

    pub fn with_coordinator_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    pub fn logs_root(&self) -> &Path {
        &self.logs_root
    }

    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.logs_root.join(run_id.as_str())
    }

    /// Parse and resolve without dispatching anything or writing a log.
    pub fn plan(&self, raw_text: &str) -> std::result::Result<Plan, ParseError> {
        let parsed = self.parser.parse(raw_text)?;
        let entries = parsed
            .tasks
            .into_iter()
            .map(|task| {
                let role = RoleResolver::resolve(&task, &self.roles).map(|r| r.name.clone());
                PlannedTask { task, role }
            })
            .collect();

        Ok(Plan {
            preamble: parsed.preamble,
            entries,
        })
    }

    /// Run the whole document. A document without tasks is logged as
    /// aborted and returned as [`ParseError`]; task failures are reported
    /// in the summary and never fail the run itself.
    pub async fn run(&self, raw_text: &str) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = RunId::at(started_at);
        let logger = RunLogger::create(&self.logs_root, &run_id).await;
        let emitter = EventEmitter::new(run_id.clone(), self.bus.clone(), logger.clone());

        let parsed = match self.parser.parse(raw_text) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Run aborted, no tasks derived");
                emitter.emit(Event::RunAborted {
                    reason: e.to_string(),
                });
                close_logger(&logger).await;
                return Err(e.into());
            }
        };

        let mut ctx = RunContext::new(started_at, parsed, self.roles.clone(), emitter.clone());
        info!(
            run_id = %run_id,
            tasks = ctx.tasks().len(),
            roles = ?self.roles.names(),
            "Run started"
        );
        ctx.emit(Event::RunStarted {
            task_count: ctx.tasks().len(),
            roles: self.roles.names(),
            task_ids: ctx.tasks().iter().map(|t| t.id.clone()).collect(),
        });

        let coordinator = Coordinator::new(Arc::clone(&self.runtime), self.config.clone())
            .with_cancellation(self.cancel.clone());
        let outcome = coordinator.run(&mut ctx).await;

        let summary = ctx.summary();
        ctx.emit(Event::RunFinished {
            summary: summary.clone(),
        });

        let report = ctx.into_report(Utc::now());
        logger.write_summary(&report);
        close_logger(&logger).await;

        outcome?;
        info!(run_id = %run_id, summary = %summary, "Run finished");
        Ok(report)
    }
}

async fn close_logger(logger: &RunLogger) {
    let stats = logger.close().await;
    if stats.failed > 0 {
        warn!(
            run_id = %logger.run_id(),
            written = stats.written,
            failed = stats.failed,
            "Run log incomplete"
        );
    }
}
