//! Error types for concordia.

use thiserror::Error;

use crate::models::OperationKind;

/// Result type alias using concordia's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for concordia operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Referenced persisted operation or history entry no longer exists.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transient transport or service failure.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Ancestry list returned by the server violates the chain invariants.
    #[error("Corrupt operation chain: {0}")]
    CorruptChain(String),

    /// Paradigmatic sub-query set cannot be combined (e.g. all negated).
    #[error("Invalid combination: {0}")]
    InvalidCombination(String),

    /// Operation kind is not allowed at this position of the chain.
    #[error("Invalid predecessor for {kind} operation")]
    InvalidPredecessor { kind: OperationKind },

    /// Chain index outside `0..len`.
    #[error("Index {index} out of range for chain of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Chain has no operations.
    #[error("Operation chain is empty")]
    EmptyChain,

    /// Background task finished with `Failed` status. Terminal.
    #[error("Task {task_id} failed: {message}")]
    TaskFailed { task_id: String, message: String },

    /// A chain append is still waiting on its persistence call.
    #[error("Another submission is still in progress")]
    SubmitInProgress,

    /// Operation already carries a persisted id.
    #[error("Operation already persisted as {0}")]
    AlreadyPersisted(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request rejected for a reason other than not-found or unavailability.
    #[error("Request error: {0}")]
    Request(String),
}

impl Error {
    /// Only transport failures are worth retrying; `NotFound` never is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }

    /// Caller-side errors that must be reported before any network call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidCombination(_)
                | Error::InvalidPredecessor { .. }
                | Error::IndexOutOfRange { .. }
                | Error::EmptyChain
                | Error::InvalidInput(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("query ~abc".to_string());
        assert_eq!(err.to_string(), "Not found: query ~abc");
    }

    #[test]
    fn test_error_display_invalid_predecessor() {
        let err = Error::InvalidPredecessor {
            kind: OperationKind::Sort,
        };
        assert_eq!(err.to_string(), "Invalid predecessor for sort operation");
    }

    #[test]
    fn test_error_display_index_out_of_range() {
        let err = Error::IndexOutOfRange { index: 4, len: 2 };
        assert_eq!(
            err.to_string(),
            "Index 4 out of range for chain of length 2"
        );
    }

    #[test]
    fn test_error_display_task_failed() {
        let err = Error::TaskFailed {
            task_id: "t-1".to_string(),
            message: "worker crashed".to_string(),
        };
        assert_eq!(err.to_string(), "Task t-1 failed: worker crashed");
    }

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(Error::Unavailable("timeout".into()).is_retryable());
        assert!(!Error::NotFound("x".into()).is_retryable());
        assert!(!Error::CorruptChain("x".into()).is_retryable());
        assert!(!Error::Request("400".into()).is_retryable());
    }

    #[test]
    fn test_validation_group() {
        assert!(Error::EmptyChain.is_validation());
        assert!(Error::IndexOutOfRange { index: 1, len: 1 }.is_validation());
        assert!(Error::InvalidCombination("all negated".into()).is_validation());
        assert!(!Error::Unavailable("x".into()).is_validation());
        assert!(!Error::NotFound("x".into()).is_validation());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
