use async_trait::async_trait;
use thiserror::Error;

/// Error reported by a job execution.
///
/// The dispatcher logs it and records it in the dead-letter sink; it never
/// stops the worker pool.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),

    #[error("job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    /// Wrap any displayable error.
    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self::Failed(err.to_string())
    }
}

/// A unit of asynchronous work executed by a [`Dispatcher`](crate::Dispatcher).
///
/// `execute` consumes the job, so an instance runs at most once. Retrying
/// means building and enqueueing a new instance.
#[async_trait]
pub trait Job: Send + 'static {
    /// Short, stable kind name used in logs (e.g. `"deal-maker"`).
    fn name(&self) -> &'static str;

    /// Identifies what this instance works on.
    fn describe(&self) -> String {
        self.name().to_owned()
    }

    async fn execute(self: Box<Self>) -> Result<(), JobError>;
}
