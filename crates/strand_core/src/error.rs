//! Error types for Strand core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core coordination operations.
///
/// A denied permit is not an error: [`PermitStore::acquire`] answers with a
/// boolean and the caller turns it into a busy reply.
///
/// [`PermitStore::acquire`]: crate::PermitStore::acquire
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Hook subscription payload could not be turned into a hook.
    #[error("invalid hook: {message}")]
    InvalidHook {
        /// Description of the problem.
        message: String,
    },

    /// No transaction is registered under the id.
    #[error("unknown transaction: {tx_id}")]
    UnknownTransaction {
        /// The transaction id that was looked up.
        tx_id: String,
    },

    /// No hook is registered under the id.
    #[error("hook not found: {id}")]
    HookNotFound {
        /// The hook id that was looked up.
        id: String,
    },

    /// Envelope serialization failed.
    #[error("serialization failed: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid hook error.
    pub fn invalid_hook(message: impl Into<String>) -> Self {
        Self::InvalidHook {
            message: message.into(),
        }
    }

    /// Creates an unknown transaction error.
    pub fn unknown_transaction(tx_id: impl Into<String>) -> Self {
        Self::UnknownTransaction {
            tx_id: tx_id.into(),
        }
    }

    /// Creates a hook not found error.
    pub fn hook_not_found(id: impl Into<String>) -> Self {
        Self::HookNotFound { id: id.into() }
    }

    /// Returns true if the error means a looked-up entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::UnknownTransaction { .. } | CoreError::HookNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
