use delta_core::{ContentDealId, ContentId, PieceCommitmentId, TransferId, ValidationError};
use delta_executor::JobError;
use thiserror::Error;

/// Errors raised while orchestrating the deal lifecycle.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An error occurred in the deal store.
    #[error("state error: {0}")]
    State(#[from] delta_state::StateError),

    /// An external collaborator failed.
    #[error("provider error: {0}")]
    Provider(#[from] delta_provider::ProviderError),

    /// The deal request was rejected before anything was stored.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("content not found: {0}")]
    ContentNotFound(ContentId),

    #[error("deal not found: {0}")]
    DealNotFound(ContentDealId),

    #[error("piece commitment not found: {0}")]
    CommitmentNotFound(PieceCommitmentId),

    /// A deal proposal was attempted for content without a piece commitment.
    #[error("content {0} has no piece commitment")]
    MissingCommitment(ContentId),

    #[error("content {0} has no deal proposal parameters")]
    MissingProposal(ContentId),

    /// The transport has no record of the transfer.
    #[error("no transfer state for transfer {0}")]
    NoTransferState(TransferId),

    #[error("deal {0} has no transfer id")]
    MissingTransferId(ContentDealId),

    /// An end-to-end submission carried neither uploaded bytes nor an
    /// existing content address.
    #[error("content address is required")]
    MissingContent,

    /// Too much data is already in flight.
    #[error(
        "too much data is being transferred, please try again once all other transfers are complete"
    )]
    AdmissionRejected { in_flight: u64, budget: u64 },

    /// The engine was misconfigured (e.g. missing required components).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<EngineError> for JobError {
    fn from(err: EngineError) -> Self {
        JobError::failed(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_message_matches_client_contract() {
        let err = EngineError::AdmissionRejected {
            in_flight: 10,
            budget: 5,
        };
        assert_eq!(
            err.to_string(),
            "too much data is being transferred, please try again once all other transfers are complete"
        );
    }

    #[test]
    fn validation_errors_keep_their_message() {
        let err = EngineError::from(ValidationError::MissingMiner);
        assert_eq!(err.to_string(), "miner is required");
    }

    #[test]
    fn converts_into_job_error() {
        let err: JobError = EngineError::MissingCommitment(ContentId::new(3)).into();
        assert_eq!(err.to_string(), "content 3 has no piece commitment");
    }
}
