//! Error types for the Strand server.

use strand_core::CoreError;
use strand_protocol::{DecodeError, ErrorResponse, ProtocolError};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while serving requests.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Request was well-framed but cannot be acted on.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Reply could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Coordination state rejected the request.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A permit needed by the request is held elsewhere.
    #[error("resource busy: {resource}")]
    Busy {
        /// Permit key that was denied.
        resource: String,
    },

    /// The transaction id is already in use.
    #[error("transaction already active: {0}")]
    TransactionActive(String),

    /// A transaction step reported failure.
    #[error("transaction {tx_id} failed to {stage}")]
    TransactionFailed {
        /// Transaction id.
        tx_id: String,
        /// Step that failed.
        stage: &'static str,
    },

    /// The storage collaborator failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Creates a busy error for a permit key.
    pub fn busy(resource: impl ToString) -> Self {
        Self::Busy {
            resource: resource.to_string(),
        }
    }

    /// Status code carried in Error packets.
    pub fn code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) | ServerError::Decode(_) => 400,
            ServerError::Core(CoreError::InvalidHook { .. }) => 400,
            ServerError::Core(err) if err.is_not_found() => 404,
            ServerError::Busy { .. }
            | ServerError::TransactionActive(_)
            | ServerError::TransactionFailed { .. } => 409,
            ServerError::Core(_)
            | ServerError::Protocol(_)
            | ServerError::Storage(_)
            | ServerError::Io(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.code() >= 500
    }

    /// Builds the Error packet body answering `request_id`.
    pub fn to_response(&self, request_id: u64) -> ErrorResponse {
        ErrorResponse::new(request_id, self.code(), self.to_string())
    }
}
