//! Error types for sqlbridge core.

use sqlbridge_store::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sqlbridge core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The statement was freed and can no longer be used.
    #[error("statement closed")]
    StatementClosed,

    /// The database was closed.
    #[error("database closed")]
    DatabaseClosed,

    /// Compiling the SQL text produced no statement.
    #[error("nothing to prepare")]
    NothingToPrepare,

    /// A value of this kind cannot be bound to a parameter.
    #[error("unsupported bind type: {0}")]
    UnsupportedBindType(String),

    /// The engine reported a failure.
    ///
    /// Only the connection's message at the time of failure is kept.
    #[error("{message}")]
    Engine {
        /// The engine's error message.
        message: String,
    },

    /// A name passed to the engine contains an interior NUL byte.
    #[error("string contains an interior NUL byte: {0:?}")]
    InvalidString(String),

    /// The engine allocator could not satisfy a request.
    #[error("out of memory allocating {requested} bytes")]
    OutOfMemory {
        /// Size of the failed allocation.
        requested: usize,
    },

    /// The backing byte store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    /// Creates an engine error.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    /// Creates an unsupported bind type error naming the offending value.
    pub fn unsupported_bind_type(value: impl std::fmt::Debug) -> Self {
        Self::UnsupportedBindType(format!("{value:?}"))
    }
}
