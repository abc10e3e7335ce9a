//! Error types for session operations.

use crate::handler::HandlerState;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-specific errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// SeaORM database error
    #[cfg(feature = "seaorm")]
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Record store failure reported by a backend
    #[error("Store error: {0}")]
    Store(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// A session is already active on the host
    #[error("Session already started, cannot start session handler")]
    AlreadyActive,

    /// No session is active on the host
    #[error("No active session")]
    NotActive,

    /// Handler operation called in the wrong lifecycle state
    #[error("Cannot {operation} while handler is {state}")]
    InvalidState {
        /// Attempted operation
        operation: &'static str,
        /// State the handler was in
        state: HandlerState,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid session ID
    #[error("Invalid session ID: {0}")]
    InvalidSessionId(String),
}

impl SessionError {
    /// Whether the error came from the record store rather than from misuse
    /// of the lifecycle.
    pub fn is_store_fault(&self) -> bool {
        match self {
            #[cfg(feature = "seaorm")]
            SessionError::Database(_) => true,
            SessionError::Store(_) | SessionError::Connection(_) => true,
            _ => false,
        }
    }
}
