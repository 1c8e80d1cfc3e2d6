//! Error types for ensemble-client.

use thiserror::Error;

use crate::member::MemberStatus;

/// Main error type for all ensemble operations.
#[derive(Debug, Error)]
pub enum EnsembleError {
    /// The socket to the service could not be opened.
    #[error("Connect error: {0}")]
    Connect(#[source] std::io::Error),

    /// I/O error on an open connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the stream, or the connection already failed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Malformed or out-of-contract data from the service.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation not legal in the member's current status.
    #[error("Invalid state: cannot {operation} while {status}")]
    InvalidState {
        operation: &'static str,
        status: MemberStatus,
    },

    /// Argument rejected before anything was written.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl EnsembleError {
    /// Whether the connection is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EnsembleError::Connect(_)
                | EnsembleError::Io(_)
                | EnsembleError::ConnectionClosed
                | EnsembleError::Protocol(_)
        )
    }
}

/// Result type alias using EnsembleError.
pub type Result<T> = std::result::Result<T, EnsembleError>;
