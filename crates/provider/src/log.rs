use async_trait::async_trait;
use delta_core::TransferId;
use tracing::info;

use crate::error::ProviderError;
use crate::proposer::{DealProposer, ProposalRequest};
use crate::transfer::{TransferClient, TransferState};

/// A transport that logs proposals and transfer commands without performing
/// any network I/O.
///
/// Useful for local development where no storage provider is reachable. A
/// proposal is acknowledged with the local deal id as transfer id, and no
/// channel state is ever known.
#[derive(Debug, Clone, Default)]
pub struct LogTransport {
    name: String,
}

impl LogTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl DealProposer for LogTransport {
    async fn propose(&self, request: ProposalRequest<'_>) -> Result<TransferId, ProviderError> {
        info!(
            transport = %self.name,
            content_id = %request.content.id,
            deal_id = %request.deal.id,
            miner = %request.deal.miner,
            piece = %request.commitment.piece,
            duration = request.deal.proposal.duration,
            verified = request.deal.proposal.verified_deal,
            "log transport accepted proposal"
        );
        Ok(TransferId::new(request.deal.id.to_string()))
    }
}

#[async_trait]
impl TransferClient for LogTransport {
    async fn transfer_status(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<TransferState>, ProviderError> {
        info!(transport = %self.name, transfer_id = %transfer_id, "log transport status query");
        Ok(None)
    }

    async fn restart_transfer(&self, transfer_id: &TransferId) -> Result<(), ProviderError> {
        info!(transport = %self.name, transfer_id = %transfer_id, "log transport restart");
        Ok(())
    }
}
