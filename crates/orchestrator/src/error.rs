use sowcrew_core::{CoreError, TaskId};
use thiserror::Error;

/// The document carries no task structure the parser recognises.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No tasks found: {reason}")]
pub struct ParseError {
    pub reason: String,
    /// Number of non-blank lines that were inspected.
    pub lines_scanned: usize,
}

/// No configured role accepts a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnresolvedRoleError {
    #[error("Task {task_id}: role hint '{hint}' matches no configured role")]
    UnknownHint { task_id: TaskId, hint: String },

    #[error("Task {task_id}: no role's capability tags match the task")]
    NoMatch { task_id: TaskId },
}

impl UnresolvedRoleError {
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::UnknownHint { task_id, .. } | Self::NoMatch { task_id } => task_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("Role '{role}' template references unknown placeholder {{{placeholder}}}")]
    UnknownPlaceholder { role: String, placeholder: String },

    #[error("Role '{role}' template has an unclosed placeholder")]
    Unclosed { role: String },
}

/// Run log write failures. Reported and counted, never propagated into task
/// or run outcomes.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create run directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write run log: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode run log record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Run log writer is gone")]
    WriterClosed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid role set in {path}: {source}")]
    Roles {
        path: String,
        #[source]
        source: CoreError,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid state transition for task {task_id} from {from} to {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: String,
        to: String,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    UnresolvedRole(#[from] UnresolvedRoleError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_role_display() {
        let err = UnresolvedRoleError::UnknownHint {
            task_id: TaskId::from("T3"),
            hint: "Designer".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Task T3: role hint 'Designer' matches no configured role"
        );
        assert_eq!(err.task_id().as_str(), "T3");
    }

    #[test]
    fn test_prompt_error_display() {
        let err = PromptError::UnknownPlaceholder {
            role: "PM".to_string(),
            placeholder: "budget".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Role 'PM' template references unknown placeholder {budget}"
        );
    }

    #[test]
    fn test_parse_error_converts() {
        let err: OrchestratorError = ParseError {
            reason: "no numbered items".to_string(),
            lines_scanned: 4,
        }
        .into();
        assert!(matches!(err, OrchestratorError::Parse(_)));
        assert_eq!(err.to_string(), "No tasks found: no numbered items");
    }
}
