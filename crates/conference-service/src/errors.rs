//! Conference service error types.
//!
//! Every variant carries the internal detail for server-side logging.
//! [`ConferenceError::client_message`] is what adapters hand back to callers;
//! it never includes persistence or upstream detail.

use thiserror::Error;

/// Conference service error type.
///
/// Maps to status codes:
/// - NotFound: 404
/// - Conflict: 409
/// - Invalid: 400
/// - Upstream: 502
/// - Database, Redis, Internal: 500
#[derive(Debug, Error)]
pub enum ConferenceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid: {0}")]
    Invalid(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConferenceError {
    /// Returns the status code for this error (for adapters and metrics).
    pub fn status_code(&self) -> u16 {
        match self {
            ConferenceError::NotFound(_) => 404,
            ConferenceError::Conflict(_) => 409,
            ConferenceError::Invalid(_) => 400,
            ConferenceError::Upstream(_) => 502,
            ConferenceError::Database(_)
            | ConferenceError::Redis(_)
            | ConferenceError::Internal(_) => 500,
        }
    }

    /// Returns a stable machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConferenceError::NotFound(_) => "NOT_FOUND",
            ConferenceError::Conflict(_) => "CONFLICT",
            ConferenceError::Invalid(_) => "INVALID",
            ConferenceError::Upstream(_) => "UPSTREAM_ERROR",
            ConferenceError::Database(_) => "DATABASE_ERROR",
            ConferenceError::Redis(_) => "CACHE_ERROR",
            ConferenceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message that is safe to return to a caller.
    ///
    /// NotFound, Conflict and Invalid are caller-facing by nature and keep
    /// their detail. Everything else collapses to a generic message.
    pub fn client_message(&self) -> String {
        match self {
            ConferenceError::NotFound(detail)
            | ConferenceError::Conflict(detail)
            | ConferenceError::Invalid(detail) => detail.clone(),
            ConferenceError::Upstream(_) => "Call-control service unavailable".to_string(),
            ConferenceError::Database(_)
            | ConferenceError::Redis(_)
            | ConferenceError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// True for [`ConferenceError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConferenceError::NotFound(_))
    }
}

/// Convert sqlx errors to ConferenceError
impl From<sqlx::Error> for ConferenceError {
    fn from(err: sqlx::Error) -> Self {
        ConferenceError::Database(err.to_string())
    }
}

/// Convert redis errors to ConferenceError
impl From<redis::RedisError> for ConferenceError {
    fn from(err: redis::RedisError) -> Self {
        ConferenceError::Redis(err.to_string())
    }
}
