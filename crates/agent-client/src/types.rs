use serde::Deserialize;
use serde_json::Value;
use sowcrew_core::{AgentError, AgentErrorKind, AgentResponse};

#[derive(Debug, Clone, Deserialize)]
pub struct ReportedError {
    #[serde(default = "default_error_kind")]
    pub kind: AgentErrorKind,
    pub message: String,
}

fn default_error_kind() -> AgentErrorKind {
    AgentErrorKind::Permanent
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireReply {
    Failure {
        error: ReportedError,
    },
    Success {
        output: Value,
        #[serde(default)]
        messages: Vec<String>,
    },
}

/// Body of a 2xx webhook reply.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookReply {
    Success(AgentResponse),
    Failure { kind: AgentErrorKind, message: String },
}

impl WebhookReply {
    /// Interpret a reply body. Bodies that match neither the success nor the
    /// failure shape are taken as raw output: JSON as-is, anything else as a
    /// string.
    pub fn parse(body: &str) -> Self {
        if let Ok(reply) = serde_json::from_str::<WireReply>(body) {
            return match reply {
                WireReply::Failure { error } => Self::Failure {
                    kind: error.kind,
                    message: error.message,
                },
                WireReply::Success { output, messages } => Self::Success(AgentResponse {
                    output,
                    messages,
                }),
            };
        }

        let output = serde_json::from_str::<Value>(body)
            .unwrap_or_else(|_| Value::String(body.trim().to_string()));
        Self::Success(AgentResponse::new(output))
    }

    pub fn into_result(self) -> Result<AgentResponse, AgentError> {
        match self {
            Self::Success(response) => Ok(response),
            Self::Failure { kind, message } => Err(AgentError::new(kind, message)),
        }
    }
}
