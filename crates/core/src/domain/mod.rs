pub mod agent;
pub mod role;
pub mod run;
pub mod task;

pub use agent::{
    AgentContext, AgentError, AgentErrorKind, AgentRequest, AgentResponse, AgentRuntime,
    PriorResult,
};
pub use role::{AgentRole, RoleSet};
pub use run::{RunId, RunReport, RunSummary};
pub use task::{Task, TaskId, TaskStatus};
