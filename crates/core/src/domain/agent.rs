//! Contract between the coordinator and whatever performs the AI round trip.
//!
//! The coordinator only ever sees [`AgentRuntime::invoke`]: a request in, a
//! structured result or a classified [`AgentError`] out. Timeouts are enforced
//! by the caller, so implementations may simply await their transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::role::AgentRole;
use super::run::RunId;
use super::task::TaskId;

/// Output of a task that already succeeded, handed to later tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorResult {
    pub task_id: TaskId,
    pub title: String,
    pub role: String,
    pub output: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    /// Document text before the first task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preamble: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prior_results: Vec<PriorResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub run_id: RunId,
    pub task_id: TaskId,
    pub title: String,
    pub description: String,
    pub role: AgentRole,
    /// Role template rendered for this task.
    pub prompt: String,
    pub context: AgentContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub output: serde_json::Value,
    /// Intermediate messages the agent produced, recorded in the run log.
    #[serde(default)]
    pub messages: Vec<String>,
}

impl AgentResponse {
    pub fn new(output: serde_json::Value) -> Self {
        Self {
            output,
            messages: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentErrorKind {
    /// May succeed on retry (transport hiccup, rate limit, 5xx).
    Transient,
    /// Will not succeed on retry.
    Permanent,
    Timeout,
}

impl AgentErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for AgentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} agent error: {message}")]
pub struct AgentError {
    pub kind: AgentErrorKind,
    pub message: String,
}

impl AgentError {
    pub fn new(kind: AgentErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Permanent, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Timeout, message)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, AgentErrorKind::Transient | AgentErrorKind::Timeout)
    }
}

/// Performs the completion/tool-call round trip for one task.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    async fn invoke(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError>;
}
