//! Pipeline error taxonomy
//!
//! One error type for the whole alert pipeline. Transient infrastructure
//! failures are retryable; data and state errors are surfaced immediately.

use thiserror::Error;

/// Errors surfaced by the alert pipeline.
#[derive(Debug, Error)]
pub enum SentinelError {
    /// Downstream unreachable (connection refused / timeout). Retried with
    /// backoff by the scoring client before reaching the caller.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Downstream answered with a malformed or protocol-violating payload.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Caller-supplied data failed boundary validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Admission denied. Carries the wait hint so callers can back off.
    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Illegal alert state transition. No side effect has occurred.
    #[error("Invalid transition: alert is {state}, cannot {action}")]
    InvalidTransition { state: String, action: String },

    /// Record not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Pipeline result type.
pub type Result<T> = std::result::Result<T, SentinelError>;

impl SentinelError {
    /// Whether a local retry with backoff is appropriate.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Stable machine-readable code, used by the API error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::InvalidResponse(_) => "INVALID_RESPONSE",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Configuration(_) => "CONFIG_ERROR",
        }
    }
}

impl From<serde_json::Error> for SentinelError {
    fn from(err: serde_json::Error) -> Self {
        SentinelError::InvalidResponse(err.to_string())
    }
}
