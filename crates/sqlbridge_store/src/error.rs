//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The named blob does not exist.
    #[error("no such blob: {name}")]
    NotFound {
        /// Name of the missing blob.
        name: String,
    },

    /// The name cannot be used as a blob name.
    #[error("invalid blob name: {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },
}

impl StoreError {
    /// Creates a not found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Creates an invalid name error.
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }
}
