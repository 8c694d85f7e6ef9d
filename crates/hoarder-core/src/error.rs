use thiserror::Error;

/// Core-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Interactive input is not available")]
    NoAskFn,

    #[error("Ask failed: {0}")]
    AskFailed(String),

    #[error("Question is already pending for {0}")]
    DuplicateQuestion(String),

    #[error("No question is pending for {0}")]
    NoQuestion(String),

    #[error("Cannot upgrade a read lock to a write lock on the same context")]
    LockUpgrade,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(&'static str),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
