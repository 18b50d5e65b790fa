//! Error types for botdb state documents.

use thiserror::Error;

/// Result type alias for state document operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while loading, mutating or saving a state document.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("state file {path} is empty")]
    Empty { path: String },

    #[error("state file {path} is malformed: {reason}")]
    Malformed { path: String, reason: String },

    #[error("state file {path} failed validation: {reason}")]
    Invalid { path: String, reason: String },

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("state document {0} has been disposed")]
    Disposed(String),

    #[error("state file {path} is already open for bot {owner}")]
    AlreadyOpen { path: String, owner: String },
}

impl StateError {
    /// Whether this error came from reading an existing state file.
    ///
    /// A bot whose state fails to load must not start on an empty document.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            StateError::Read { .. }
                | StateError::Empty { .. }
                | StateError::Malformed { .. }
                | StateError::Invalid { .. }
        )
    }
}
