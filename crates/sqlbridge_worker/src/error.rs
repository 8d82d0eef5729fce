//! Error types for the worker.

use thiserror::Error;

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors that can occur in the worker.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// A database operation failed.
    #[error(transparent)]
    Core(#[from] sqlbridge_core::Error),

    /// A message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A message is well-formed but violates the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A request named an action the worker does not know.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// A request lacks a field its action needs.
    #[error("{0}")]
    MissingArgument(&'static str),

    /// The worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The worker thread is gone.
    #[error("worker disconnected")]
    Disconnected,
}

impl WorkerError {
    /// Creates a codec error.
    pub fn codec(message: impl std::fmt::Display) -> Self {
        Self::Codec(message.to_string())
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns true if the error is fatal for the message that caused it,
    /// as opposed to a failure reported back to the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WorkerError::Codec(_)
                | WorkerError::Protocol(_)
                | WorkerError::UnknownAction(_)
                | WorkerError::Disconnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_keep_their_message() {
        let err = WorkerError::from(sqlbridge_core::Error::engine("no such table: t"));
        assert_eq!(err.to_string(), "no such table: t");
        assert!(!err.is_fatal());
    }

    #[test]
    fn missing_argument_message_is_verbatim() {
        let err = WorkerError::MissingArgument("exec: Missing query string");
        assert_eq!(err.to_string(), "exec: Missing query string");
    }

    #[test]
    fn protocol_errors_are_fatal() {
        assert!(WorkerError::UnknownAction("drop".into()).is_fatal());
        assert!(WorkerError::codec("bad cbor").is_fatal());
        assert!(WorkerError::Disconnected.is_fatal());
    }
}
