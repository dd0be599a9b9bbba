// Error taxonomy for relay operations

use hyper::StatusCode;
use thiserror::Error;

/// Failure while touching the durable message log.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to create state directory: {0}")]
    StateDir(#[from] std::io::Error),
}

/// Outcome taxonomy for the request handlers.
///
/// Everything a mutating or read request can fail with, each mapping to
/// exactly one HTTP status. Storage failures keep the process up; the
/// request fails and the cause is logged at the transport layer.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("admin key not authorized")]
    Unauthorized,

    #[error("message {0} not found")]
    NotFound(i64),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl RelayError {
    /// The HTTP status this error surfaces as.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::Unauthorized => StatusCode::FORBIDDEN,
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
