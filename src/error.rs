//! Error taxonomy for realtime relay operations.
//!
//! Handlers catch these locally and emit an `*_error` event to the
//! originating connection only; nothing propagates into other connections'
//! handling or crashes the process.

use thiserror::Error;

/// Failure modes of a relay operation.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Actor is not a party to the chat/booking it targets.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Referenced chat/taxi/user does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Durable read or write failed.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Malformed payload.
    #[error("validation failure: {0}")]
    Validation(String),
}

impl RelayError {
    /// Message surfaced to the client in `message_error` / `booking_error`
    /// events. Persistence details stay in the server log.
    pub fn client_message(&self) -> String {
        match self {
            RelayError::Unauthorized(msg) => msg.clone(),
            RelayError::NotFound(msg) => msg.clone(),
            RelayError::Persistence(_) => "Internal server error".to_string(),
            RelayError::Validation(msg) => msg.clone(),
        }
    }
}

impl From<rusqlite::Error> for RelayError {
    fn from(err: rusqlite::Error) -> Self {
        RelayError::Persistence(err.to_string())
    }
}

/// A blocking DB task that panicked or was cancelled surfaces as Persistence.
impl From<tokio::task::JoinError> for RelayError {
    fn from(err: tokio::task::JoinError) -> Self {
        RelayError::Persistence(format!("blocking task failed: {err}"))
    }
}
