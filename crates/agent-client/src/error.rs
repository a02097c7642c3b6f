use sowcrew_core::AgentError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl From<ClientError> for AgentError {
    fn from(err: ClientError) -> Self {
        let message = err.to_string();
        match err {
            ClientError::Request(e) if e.is_timeout() => AgentError::timeout(message),
            ClientError::Request(e) if e.is_decode() || e.is_builder() => {
                AgentError::permanent(message)
            }
            ClientError::Request(_) => AgentError::transient(message),
            ClientError::Status { status, .. } => match status {
                408 | 504 => AgentError::timeout(message),
                429 | 500..=599 => AgentError::transient(message),
                _ => AgentError::permanent(message),
            },
            ClientError::InvalidConfig(_) => AgentError::permanent(message),
        }
    }
}
