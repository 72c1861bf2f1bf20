//! Error types for the record store.

use arealog_storage::StorageError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage area or medium error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The current sector cannot hold the framed record.
    #[error("no space left in the current sector")]
    NoSpace,

    /// Iteration sentinel: no further record in the sector.
    #[error("record not found")]
    NotFound,

    /// The store is not mounted.
    #[error("store is not mounted")]
    NotReady,

    /// Mount was issued on a mounted store, or wipe on a mounted one.
    #[error("store is already mounted")]
    AlreadyMounted,

    /// The operation is not defined for the store mode.
    #[error("operation not supported by the store mode")]
    Unsupported,

    /// The store or area configuration is rejected.
    #[error("invalid store configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration issue.
        message: String,
    },

    /// An argument violates the call contract.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the argument issue.
        message: String,
    },
}

impl StoreError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
