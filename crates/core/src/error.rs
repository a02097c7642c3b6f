use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid task status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Duplicate role name: {0}")]
    DuplicateRole(String),

    #[error("Malformed role set: {0}")]
    RoleFormat(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
