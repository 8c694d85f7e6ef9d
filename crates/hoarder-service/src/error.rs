use hoarder_api::error::ApiError;
use hoarder_core::context::Errors;
use hoarder_core::error::CoreError;
use hoarder_db::error::DbError;
use thiserror::Error;

/// Service layer errors - combines all error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    DatabaseError(#[from] DbError),

    #[error(transparent)]
    ApiError(#[from] ApiError),

    #[error(transparent)]
    CoreError(#[from] CoreError),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl ServiceError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::CoreError(err) => *err == CoreError::Cancelled,
            Self::ApiError(err) => err.is_cancelled(),
            Self::DatabaseError(DbError::CoreError(err)) => *err == CoreError::Cancelled,
            Self::DatabaseError(_) | Self::InvalidValue(_) => false,
        }
    }

    #[must_use]
    pub fn is_no_data_found(&self) -> bool {
        matches!(self, Self::ApiError(ApiError::NoDataFound))
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Outcome of one job run as reported to the trigger.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("already running")]
    AlreadyRunning,

    #[error("unknown job {0:?}")]
    UnknownJob(String),

    #[error("unauthorized:\n{0}")]
    Unauthorized(Errors),

    #[error("{0}")]
    Failed(Errors),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    ServiceError(#[from] ServiceError),
}
