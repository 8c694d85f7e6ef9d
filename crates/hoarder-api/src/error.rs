use hoarder_core::error::CoreError;
use thiserror::Error;

/// Errors raised by the remote API clients.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("insufficient privileges")]
    InsufficientPrivileges,

    #[error("no data found")]
    NoDataFound,

    #[error("{code}: {message}")]
    Remote { code: String, message: String },

    #[error("Authorization failed: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ApiError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Core(CoreError::Cancelled))
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
