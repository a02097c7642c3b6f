//! SOW-to-crew orchestration: task parsing, role resolution, dispatch and
//! the per-run log.

pub mod config;
pub mod context;
pub mod coordinator;
pub mod emitter;
pub mod error;
pub mod monitor;
pub mod pipeline;
pub mod prompts;
pub mod role_resolver;
pub mod run_logger;
pub mod state_machine;
pub mod task_parser;

pub use config::{
    default_roles, AgentSection, CoordinatorConfig, ExecutionSection, FailurePolicy,
    LoggingSection, ProjectConfig, CONFIG_DIR, CONFIG_FILE, ENDPOINT_ENV,
};
pub use context::RunContext;
pub use coordinator::Coordinator;
pub use emitter::EventEmitter;
pub use error::{
    ConfigError, LoggingError, OrchestratorError, ParseError, PromptError, Result,
    UnresolvedRoleError,
};
pub use monitor::{MonitorSnapshot, RunMonitor, TaskView};
pub use pipeline::{Pipeline, Plan, PlannedTask};
pub use prompts::RolePrompts;
pub use role_resolver::RoleResolver;
pub use run_logger::{list_runs, read_events, read_report, LoggerStats, RunListing, RunLogger};
pub use state_machine::TaskStateMachine;
pub use task_parser::{parse_tasks, ParsedSow, ParserConfig, TaskParser};
