use std::time::Duration;

use thiserror::Error;

/// Errors reported by external collaborators.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested content or transfer does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The collaborator failed to carry out the request.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The counterparty refused the proposal.
    #[error("proposal rejected: {0}")]
    Rejected(String),

    /// The collaborator did not respond within the allowed duration.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// A network or transport-level error occurred.
    #[error("connection error: {0}")]
    Connection(String),

    /// The collaborator was given invalid configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Local I/O failed.
    #[error("i/o error: {0}")]
    Io(String),
}

impl ProviderError {
    /// Returns `true` if the error is transient and the operation may succeed
    /// on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Connection(_) | Self::Io(_)
        )
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}
