use delta_core::TransitionError;
use thiserror::Error;

/// Errors from deal store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("invalid status transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl StateError {
    /// Build a [`StateError::NotFound`] for a record kind and id.
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{kind} {id}"))
    }
}
