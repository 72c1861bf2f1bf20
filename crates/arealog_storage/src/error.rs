//! Error types for medium and storage area operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in medium drivers and storage areas.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred in a medium transaction.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A medium transaction failed.
    ///
    /// Reported by drivers for device-level failures that are not plain
    /// OS I/O errors, e.g. a flash program operation that did not take.
    #[error("medium failure at offset {offset}: {message}")]
    MediumFailure {
        /// Byte offset of the failed transaction.
        offset: u64,
        /// Description of the failure.
        message: String,
    },

    /// The requested range does not fit the area or medium.
    #[error("invalid range: offset {offset}, len {len}, size {size}")]
    InvalidRange {
        /// The requested offset.
        offset: u64,
        /// The requested length.
        len: usize,
        /// The total size of the area or medium.
        size: u64,
    },

    /// An argument violates the call contract.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the argument issue.
        message: String,
    },

    /// The operation is not implemented by the medium or area.
    #[error("operation not supported")]
    Unsupported,

    /// A write or erase was issued on a read-only area.
    #[error("storage area is read-only")]
    ReadOnly,

    /// The declared geometry does not match the medium or is inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration issue.
        message: String,
    },
}

impl StorageError {
    /// Creates a medium failure error.
    pub fn medium_failure(offset: u64, message: impl Into<String>) -> Self {
        Self::MediumFailure {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
